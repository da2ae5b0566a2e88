/*!
The token & track session.

Owns the in-memory credential state for the single signed-in user,
keeps the access token fresh, and turns the provider's playback state
into a `TrackSnapshot`.
*/
use std::convert::TryFrom;
use std::sync::Arc;

use async_mutex::Mutex;

use crate::errors::{ClientError, UpstreamError};
use crate::models::TrackSnapshot;
use crate::spotify::{OAuthConfig, Provider, SpotifyAccess};
use crate::{utils, LOG};

/// Refresh proactively once the access token is this close to expiring
pub const EXPIRY_BUFFER_MILLIS: i64 = 5 * 60 * 1000;

/// Result of a successful authorization code exchange, not yet committed
#[derive(Debug, Clone, PartialEq)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

impl From<SpotifyAccess> for Tokens {
    fn from(access: SpotifyAccess) -> Self {
        Tokens {
            access_token: access.access_token,
            refresh_token: access.refresh_token,
            expires_in: access.expires_in,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    // epoch millis after which the access token is no good
    pub token_expiry: Option<i64>,
}

impl Credentials {
    pub fn is_authenticated_at(&self, now: i64) -> bool {
        match (&self.access_token, self.token_expiry) {
            (Some(_), Some(expiry)) => expiry > now,
            _ => false,
        }
    }

    /// `Err(NotAuthenticated)` when there's no access token at all.
    /// Without a known expiry there's nothing to check ahead of time.
    fn needs_refresh_at(&self, now: i64) -> Result<bool, ClientError> {
        if self.access_token.is_none() {
            return Err(ClientError::NotAuthenticated);
        }
        Ok(self
            .token_expiry
            .map(|expiry| now > expiry - EXPIRY_BUFFER_MILLIS)
            .unwrap_or(false))
    }
}

// saturates, a huge `expires_in` from upstream just means "far future"
fn expiry_from_now(expires_in: u64) -> i64 {
    let millis = i64::try_from(expires_in)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000);
    utils::now_millis().saturating_add(millis)
}

pub struct Session {
    config: OAuthConfig,
    provider: Arc<dyn Provider>,
    credentials: Mutex<Credentials>,
    // held for the duration of a refresh so concurrent callers share one
    refresh_guard: Mutex<()>,
}

impl Session {
    pub fn new(config: OAuthConfig, provider: Arc<dyn Provider>) -> Self {
        Self {
            config,
            provider,
            credentials: Mutex::new(Credentials::default()),
            refresh_guard: Mutex::new(()),
        }
    }

    pub fn authorization_url(&self) -> String {
        self.config.authorization_url()
    }

    /// Trade an authorization code for tokens. Nothing is stored,
    /// see `commit_tokens`.
    pub async fn exchange_code_for_tokens(&self, code: &str) -> Result<Tokens, ClientError> {
        match self.provider.exchange_code(code).await {
            Ok(access) => {
                slog::info!(
                    LOG, "got access tokens";
                    "scope" => access.scope.as_deref().unwrap_or(""),
                    "expires_in" => access.expires_in,
                    "has_refresh_token" => access.refresh_token.is_some(),
                );
                Ok(access.into())
            }
            Err(e) => {
                slog::error!(LOG, "error getting tokens"; "error" => %e);
                Err(ClientError::TokenExchangeFailed(e))
            }
        }
    }

    /// Replace the whole credential state
    pub async fn commit_tokens(&self, tokens: Tokens) {
        let mut creds = self.credentials.lock().await;
        *creds = Credentials {
            token_expiry: Some(expiry_from_now(tokens.expires_in)),
            access_token: Some(tokens.access_token),
            refresh_token: tokens.refresh_token,
        };
    }

    /// Forget everything, the next request needs a fresh login
    pub async fn clear(&self) {
        let mut creds = self.credentials.lock().await;
        *creds = Credentials::default();
    }

    pub async fn is_authenticated(&self) -> bool {
        self.credentials
            .lock()
            .await
            .is_authenticated_at(utils::now_millis())
    }

    pub async fn refresh_access_token(&self) -> Result<(), ClientError> {
        let _guard = self.refresh_guard.lock().await;
        self.refresh_locked().await
    }

    // caller must hold `refresh_guard`
    async fn refresh_locked(&self) -> Result<(), ClientError> {
        let refresh_token = self
            .credentials
            .lock()
            .await
            .refresh_token
            .clone()
            .ok_or(ClientError::NoRefreshToken)?;

        let access = match self.provider.refresh(&refresh_token).await {
            Ok(access) => access,
            Err(e) => {
                slog::error!(LOG, "error refreshing token"; "error" => %e);
                return Err(ClientError::TokenRefreshFailed(e));
            }
        };

        let mut creds = self.credentials.lock().await;
        creds.token_expiry = Some(expiry_from_now(access.expires_in));
        creds.access_token = Some(access.access_token);
        // providers don't always rotate, the old refresh token stays valid
        if let Some(rotated) = access.refresh_token {
            creds.refresh_token = Some(rotated);
        }
        slog::info!(LOG, "refreshed access token"; "expires_in" => access.expires_in);
        Ok(())
    }

    async fn needs_refresh(&self) -> Result<bool, ClientError> {
        self.credentials
            .lock()
            .await
            .needs_refresh_at(utils::now_millis())
    }

    pub async fn ensure_valid_token(&self) -> Result<(), ClientError> {
        if !self.needs_refresh().await? {
            return Ok(());
        }
        let _guard = self.refresh_guard.lock().await;
        // somebody else may have refreshed while we waited on the guard
        if !self.needs_refresh().await? {
            return Ok(());
        }
        slog::info!(LOG, "token expired, refreshing");
        self.refresh_locked().await
    }

    async fn access_token(&self) -> Result<String, ClientError> {
        self.credentials
            .lock()
            .await
            .access_token
            .clone()
            .ok_or(ClientError::NotAuthenticated)
    }

    /// Fetch and normalize what's playing right now.
    ///
    /// A rejected access token gets exactly one refresh-and-retry. A second
    /// rejection, or a failed refresh, means the user has to log in again.
    pub async fn get_currently_playing(&self) -> Result<TrackSnapshot, ClientError> {
        self.ensure_valid_token().await?;

        let mut retried = false;
        loop {
            let access_token = self.access_token().await?;
            match (self.provider.currently_playing(&access_token).await, retried) {
                (Ok(playback), _) => return Ok(playback.into()),
                (Err(UpstreamError::Unauthorized), false) => {
                    slog::info!(LOG, "access token rejected, refreshing and retrying once");
                    retried = true;
                    if let Err(e) = self.refresh_access_token().await {
                        slog::error!(LOG, "refresh after unauthorized failed"; "error" => %e);
                        return Err(ClientError::ReauthenticationRequired);
                    }
                }
                (Err(UpstreamError::Unauthorized), true) => {
                    slog::error!(LOG, "access token rejected again after refresh");
                    return Err(ClientError::ReauthenticationRequired);
                }
                (Err(UpstreamError::RateLimited { retry_after }), _) => {
                    slog::warn!(LOG, "rate limited fetching current track"; "retry_after" => retry_after);
                    return Err(ClientError::RateLimited { retry_after });
                }
                (Err(e), _) => {
                    slog::error!(LOG, "error fetching current track"; "error" => ?e);
                    return Err(ClientError::UpstreamFetchFailed(e));
                }
            }
        }
    }

    #[cfg(test)]
    async fn credentials(&self) -> Credentials {
        self.credentials.lock().await.clone()
    }

    #[cfg(test)]
    async fn set_credentials(&self, creds: Credentials) {
        *self.credentials.lock().await = creds;
    }
}
