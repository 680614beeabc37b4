use reqwest::Client;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use super::refresh;
use super::store::TokenStore;
use super::types::{Credentials, RefreshResponse};
use crate::error::ApiError;

type RefreshOutcome = Result<String, ApiError>;

/// Refresh bookkeeping shared by every request of one client
#[derive(Default)]
struct RefreshState {
    /// A refresh call is outstanding
    in_flight: bool,

    /// Requests that were rejected while `in_flight` was set, in arrival order
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,

    /// Number of refresh attempts that have settled
    generation: u64,

    /// Outcome of the most recently settled refresh
    last_outcome: Option<RefreshOutcome>,
}

/// Refresh generation observed when a request was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

enum Role {
    /// This caller issues the refresh call
    Leader(String),
    /// A refresh is running; wait for its outcome
    Follower(oneshot::Receiver<RefreshOutcome>),
    /// A refresh settled after the request was sent
    Settled(RefreshOutcome),
}

/// Authentication manager
/// Owns the persisted credential pair and guarantees at most one refresh
/// call is outstanding at any time.
pub struct AuthManager {
    /// Persisted credential pair
    store: Arc<dyn TokenStore>,

    /// HTTP client for token endpoint calls
    client: Client,

    refresh_url: String,
    login_url: String,

    /// Never held across an await point
    state: Mutex<RefreshState>,
}

impl AuthManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        client: Client,
        refresh_url: String,
        login_url: String,
    ) -> Self {
        Self {
            store,
            client,
            refresh_url,
            login_url,
            state: Mutex::new(RefreshState::default()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current persisted credential pair
    pub fn credentials(&self) -> Result<Credentials, ApiError> {
        self.store.load().map_err(storage_error)
    }

    /// Current access token, if signed in
    pub fn access_token(&self) -> Result<Option<String>, ApiError> {
        Ok(self.credentials()?.access_token)
    }

    /// Snapshot of the refresh generation, taken before a request is sent
    pub fn generation(&self) -> Generation {
        Generation(self.lock_state().generation)
    }

    /// Whether a refresh call is outstanding
    pub fn is_refreshing(&self) -> bool {
        self.lock_state().in_flight
    }

    /// Sign in and persist the returned credential pair
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let data = refresh::login(&self.client, &self.login_url, email, password).await?;

        self.store
            .set_access_token(&data.access_token)
            .map_err(storage_error)?;
        self.store
            .set_refresh_token(&data.refresh_token)
            .map_err(storage_error)?;

        tracing::info!("Signed in, credentials persisted");
        Ok(())
    }

    /// Forget the persisted credential pair
    pub fn logout(&self) -> Result<(), ApiError> {
        self.store.clear().map_err(storage_error)?;
        tracing::info!("Signed out, credentials cleared");
        Ok(())
    }

    /// Obtain a fresh access token after a request sent at `sent_at` was
    /// rejected with `rejection`.
    ///
    /// Joins an in-flight refresh if there is one, reuses the outcome of a
    /// refresh that settled after the request was sent, and otherwise runs
    /// the refresh itself. Without a refresh token the credentials are
    /// cleared and `rejection` is returned unchanged.
    pub async fn renew(&self, sent_at: Generation, rejection: ApiError) -> RefreshOutcome {
        let role = {
            let mut state = self.lock_state();

            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                tracing::debug!(
                    queued = state.waiters.len(),
                    "Refresh in flight, queueing request"
                );
                Role::Follower(rx)
            } else if state.generation != sent_at.0 && state.last_outcome.is_some() {
                Role::Settled(state.last_outcome.clone().unwrap_or(Err(rejection.clone())))
            } else {
                match self.credentials()?.refresh_token {
                    Some(refresh_token) => {
                        state.in_flight = true;
                        Role::Leader(refresh_token)
                    }
                    None => {
                        drop(state);
                        tracing::warn!("Received 401 with no refresh token, clearing credentials");
                        self.store.clear().map_err(storage_error)?;
                        return Err(rejection);
                    }
                }
            }
        };

        match role {
            Role::Leader(refresh_token) => {
                let guard = InFlight {
                    state: &self.state,
                    settled: false,
                };
                let outcome = self.perform_refresh(&refresh_token).await;
                guard.settle(&outcome);
                outcome
            }
            Role::Follower(rx) => rx.await.unwrap_or(Err(ApiError::RefreshCancelled)),
            Role::Settled(Ok(token)) => {
                // Prefer whatever is stored now; a later login may have replaced it
                Ok(self.access_token()?.unwrap_or(token))
            }
            Role::Settled(Err(e)) => Err(e),
        }
    }

    /// Call the refresh endpoint and persist the result.
    /// On failure both tokens are cleared.
    async fn perform_refresh(&self, refresh_token: &str) -> RefreshOutcome {
        let result =
            match refresh::refresh_access_token(&self.client, &self.refresh_url, refresh_token)
                .await
            {
                Ok(data) => self.persist_refreshed(data),
                Err(e) => Err(e),
            };

        if let Err(ref e) = result {
            tracing::warn!(error = %e, "Token refresh failed, clearing credentials");
            if let Err(clear_err) = self.store.clear() {
                tracing::error!(error = %clear_err, "Failed to clear credentials");
            }
        }

        result
    }

    fn persist_refreshed(&self, data: RefreshResponse) -> RefreshOutcome {
        self.store
            .set_access_token(&data.access_token)
            .map_err(storage_error)?;

        if let Some(ref rotated) = data.refresh_token {
            self.store
                .set_refresh_token(rotated)
                .map_err(storage_error)?;
        }

        Ok(data.access_token)
    }
}

/// Scope of one refresh attempt
/// Clears the in-flight flag exactly once, whether the attempt settles or
/// the driving future is dropped.
struct InFlight<'a> {
    state: &'a Mutex<RefreshState>,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.in_flight = false;
            state.generation += 1;
            state.last_outcome = Some(outcome.clone());
            std::mem::take(&mut state.waiters)
        };
        self.settled = true;

        tracing::debug!(
            released = waiters.len(),
            success = outcome.is_ok(),
            "Refresh settled, releasing queued requests"
        );
        for waiter in waiters {
            // Receiver gone means the caller stopped waiting
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let waiters = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };

        tracing::warn!(
            released = waiters.len(),
            "Refresh cancelled before settling"
        );
        for waiter in waiters {
            let _ = waiter.send(Err(ApiError::RefreshCancelled));
        }
    }
}

fn storage_error(e: anyhow::Error) -> ApiError {
    ApiError::Storage(format!("{:#}", e))
}
