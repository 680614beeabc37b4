use anyhow::{Context, Result};
use dialoguer::Password;
use std::sync::Arc;

use admin_api_client::config::{Command, Config};
use admin_api_client::{ApiClient, SqliteTokenStore};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        base_url = %config.api_base_url,
        token_db = %config.token_db_file.display(),
        "Configuration loaded"
    );

    let store = Arc::new(SqliteTokenStore::open(&config.token_db_file)?);
    let client = ApiClient::new(&config, store.clone())?;

    match command {
        Command::Login { email, password } => {
            let password = match password {
                Some(password) => password,
                None => Password::new()
                    .with_prompt(format!("Password for {}", email))
                    .interact()
                    .context("Failed to read password")?,
            };

            client.login(&email, &password).await?;
            println!("✅ Signed in as {}", email);
        }

        Command::Logout => {
            client.logout()?;
            println!("Signed out");
        }

        Command::Status => {
            let creds = client.auth().credentials()?;

            println!("  Backend:        {}", config.api_base_url);
            println!("  Token store:    {}", config.token_db_file.display());
            println!("  Access token:   {}", describe_token(creds.access_token.as_deref()));
            println!("  Refresh token:  {}", describe_token(creds.refresh_token.as_deref()));
            if let Some(updated) = store.last_updated()? {
                println!("  Last updated:   {}", updated.to_rfc3339());
            }
        }

        Command::Get { path } => {
            let value: serde_json::Value = match client.get_json(&path).await {
                Ok(value) => value,
                Err(e) if e.requires_login() => {
                    tracing::error!("Session is no longer valid: {}", e);
                    anyhow::bail!("Not signed in; run `admin-api-client login --email <email>`");
                }
                Err(e) => return Err(e.into()),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

/// Masked token summary for display
fn describe_token(token: Option<&str>) -> String {
    match token {
        Some(t) => format!("present ({}...)", t.chars().take(8).collect::<String>()),
        None => "absent".to_string(),
    }
}
