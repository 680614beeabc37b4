// Token endpoint calls
// These go straight to the transport: a failing refresh must never loop
// back through the 401 interceptor.

use reqwest::Client;

use super::types::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse};
use crate::error::{truncate_body, ApiError};

/// Exchange a refresh token for a new access token
pub async fn refresh_access_token(
    client: &Client,
    url: &str,
    refresh_token: &str,
) -> Result<RefreshResponse, ApiError> {
    tracing::info!(url = %url, "Refreshing access token...");

    let response = client
        .post(url)
        .json(&RefreshRequest { refresh_token })
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(
            status = status.as_u16(),
            body = %error_text,
            "Token refresh rejected"
        );
        return Err(ApiError::RefreshRejected {
            status: Some(status.as_u16()),
            message: format!("{} - {}", status, truncate_body(&error_text)),
        });
    }

    let data: RefreshResponse = response
        .json()
        .await
        .map_err(|e| ApiError::Network(format!("Failed to parse refresh response: {}", e)))?;

    if data.access_token.is_empty() {
        return Err(ApiError::Network(
            "Refresh response does not contain accessToken".to_string(),
        ));
    }

    tracing::info!(
        rotated = data.refresh_token.is_some(),
        "Access token refreshed"
    );

    Ok(data)
}

/// Authenticate with email and password
pub async fn login(
    client: &Client,
    url: &str,
    email: &str,
    password: &str,
) -> Result<LoginResponse, ApiError> {
    tracing::info!(url = %url, email = %email, "Signing in...");

    let response = client
        .post(url)
        .json(&LoginRequest { email, password })
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "Sign-in rejected");
        return Err(ApiError::from_status(status, &error_text));
    }

    let data: LoginResponse = response
        .json()
        .await
        .map_err(|e| ApiError::Network(format!("Failed to parse login response: {}", e)))?;

    if data.access_token.is_empty() || data.refresh_token.is_empty() {
        return Err(ApiError::Network(
            "Login response does not contain a token pair".to_string(),
        ));
    }

    Ok(data)
}
