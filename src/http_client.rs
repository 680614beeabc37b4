use anyhow::Context;
use reqwest::{header, Client, Method, Request, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthManager, TokenStore};
use crate::config::Config;
use crate::error::{truncate_body, ApiError};

/// HTTP client for the admin backend
///
/// Attaches the stored access token to every request and transparently
/// renews it when the backend answers 401. Concurrent 401s share a single
/// refresh call. Callers must not retry 401s themselves.
///
/// One instance per backend; share it behind an `Arc`.
pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Credential storage and refresh coordination
    auth: AuthManager,

    base_url: String,
}

impl ApiClient {
    /// Create a new client backed by `store`
    pub fn new(config: &Config, store: Arc<dyn TokenStore>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.http_connect_timeout))
            .timeout(Duration::from_secs(config.http_request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        let auth = AuthManager::new(
            store,
            client.clone(),
            config.endpoint(&config.refresh_path),
            config.endpoint(&config.login_path),
        );

        Ok(Self {
            client,
            auth,
            base_url: config.api_base_url.clone(),
        })
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    /// Absolute URL for a backend path
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Start building a request against the backend
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Sign in and persist the credential pair
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        self.auth.login(email, password).await
    }

    /// Clear the persisted credential pair
    pub fn logout(&self) -> Result<(), ApiError> {
        self.auth.logout()
    }

    pub fn is_signed_in(&self) -> Result<bool, ApiError> {
        Ok(self.auth.access_token()?.is_some())
    }

    /// Send a request through the authentication layer
    ///
    /// - Adds `Authorization: Bearer <token>` unless the request already
    ///   carries an `Authorization` header.
    /// - On 401, renews the access token (joining any refresh already in
    ///   flight) and reissues the request once with the new token.
    /// - A second 401 is terminal (`RetryExhausted`).
    /// - Any other failure is returned as is.
    pub async fn send(&self, mut request: Request) -> Result<Response, ApiError> {
        let method = request.method().clone();
        let url = request.url().clone();

        // Taken before reading the token so a refresh settling in between is
        // attributed to this request's burst
        let sent_at = self.auth.generation();

        if !request.headers().contains_key(header::AUTHORIZATION) {
            if let Some(token) = self.auth.access_token()? {
                set_bearer(&mut request, &token)?;
            }
        }

        // Streaming bodies cannot be replayed; such requests get no retry
        let replay = request.try_clone();

        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let response = self.execute_once(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        let rejection = ApiError::from_status(status, &error_text);

        if status != StatusCode::UNAUTHORIZED {
            tracing::warn!(
                status = status.as_u16(),
                method = %method,
                url = %url,
                "Request failed with error response"
            );
            return Err(rejection);
        }

        let Some(mut retry) = replay else {
            tracing::warn!(url = %url, "Received 401 for a request that cannot be replayed");
            return Err(rejection);
        };

        tracing::warn!(method = %method, url = %url, "Received 401, renewing access token");
        let token = self.auth.renew(sent_at, rejection).await?;
        set_bearer(&mut retry, &token)?;

        let response = self.execute_once(retry).await?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!(url = %url, "Request succeeded after token renewal");
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            tracing::error!(url = %url, "Received 401 again after token renewal");
            return Err(ApiError::RetryExhausted(truncate_body(&error_text)));
        }

        tracing::warn!(
            status = status.as_u16(),
            method = %method,
            url = %url,
            "Retried request failed with error response"
        );
        Err(ApiError::from_status(status, &error_text))
    }

    /// Build and send a request
    pub async fn execute(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let request = builder.build()?;
        self.send(request).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute(self.request(Method::GET, path)).await?;
        decode(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .execute(self.request(Method::POST, path).json(body))
            .await?;
        decode(response).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .execute(self.request(Method::PUT, path).json(body))
            .await?;
        decode(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    async fn execute_once(&self, request: Request) -> Result<Response, ApiError> {
        let url = request.url().clone();
        self.client.execute(request).await.map_err(|e| {
            let err = ApiError::from(e);
            tracing::warn!(url = %url, error = %err, "HTTP request error");
            err
        })
    }
}

/// Replace the request's `Authorization` header with a bearer token
fn set_bearer(request: &mut Request, token: &str) -> Result<(), ApiError> {
    let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
        ApiError::InvalidRequest(format!("Access token is not a valid header value: {}", e))
    })?;
    value.set_sensitive(true);
    request.headers_mut().insert(header::AUTHORIZATION, value);
    Ok(())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Network(format!("Failed to parse response: {}", e)))
}
