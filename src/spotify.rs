use std::convert::TryInto;
use std::time::Duration;

use surf::{StatusCode, Url};

use crate::errors::UpstreamError;
use crate::models::{Playback, SpotifyCurrentlyPlaying};

pub const SCOPES: &[&str] = &["user-read-playback-state", "user-read-currently-playing"];

/// Everything needed to talk to the provider on behalf of our app
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub accounts_url: Url,
    pub api_url: Url,
}

impl OAuthConfig {
    /// The provider login page users get sent to. Missing client
    /// settings still produce a url, the provider will reject it.
    pub fn authorization_url(&self) -> String {
        let mut url = self.accounts_url.clone();
        url.set_path("/authorize");
        url.query_pairs_mut()
            .clear()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("show_dialog", "true");
        // form encoding writes spaces as `+`, a literal `+` is already `%2B`
        let query = url.query().map(|q| q.replace('+', "%20"));
        url.set_query(query.as_deref());
        url.to_string()
    }

    fn basic_auth(&self) -> String {
        let auth = base64::encode(format!("{}:{}", self.client_id, self.client_secret).as_bytes());
        format!("Basic {}", auth)
    }

    fn endpoint(base: &Url, path: &str) -> Url {
        let mut url = base.clone();
        url.set_path(path);
        url.set_query(None);
        url
    }
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct SpotifyAccess {
    pub access_token: String,
    // granted scopes, space separated
    pub scope: Option<String>,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
}

#[derive(serde::Serialize)]
struct SpotifyAccessParams<'a> {
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(serde::Serialize)]
struct RefreshParams<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
}

/// The upstream streaming service as seen by the session
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Trade a one-time authorization code for a token pair
    async fn exchange_code(&self, code: &str) -> Result<SpotifyAccess, UpstreamError>;

    /// Mint a new access token. The response may or may not carry a rotated refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<SpotifyAccess, UpstreamError>;

    async fn currently_playing(&self, access_token: &str) -> Result<Playback, UpstreamError>;
}

pub struct SpotifyClient {
    http: surf::Client,
    basic_auth: String,
    redirect_uri: String,
    token_url: Url,
    currently_playing_url: Url,
}

impl SpotifyClient {
    /// Build a client whose requests give up after `timeout`
    pub fn new(config: &OAuthConfig, timeout: Duration) -> crate::Result<Self> {
        let http: surf::Client = surf::Config::new()
            .set_timeout(Some(timeout))
            .try_into()
            .map_err(|e| format!("http client config error {:?}", e))?;
        Ok(Self::with_http_client(http, config))
    }

    pub fn with_http_client(http: surf::Client, config: &OAuthConfig) -> Self {
        Self {
            http,
            basic_auth: config.basic_auth(),
            redirect_uri: config.redirect_uri.clone(),
            token_url: OAuthConfig::endpoint(&config.accounts_url, "/api/token"),
            currently_playing_url: OAuthConfig::endpoint(
                &config.api_url,
                "/v1/me/player/currently-playing",
            ),
        }
    }

    async fn token_request<T: serde::Serialize>(
        &self,
        params: &T,
    ) -> Result<SpotifyAccess, UpstreamError> {
        let body = surf::Body::from_form(params)
            .map_err(|e| UpstreamError::Request(format!("form error {}", e)))?;
        let mut resp = self
            .http
            .post(self.token_url.clone())
            .body(body)
            .header("authorization", self.basic_auth.as_str())
            .send()
            .await
            .map_err(|e| UpstreamError::Request(format!("account request error {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.body_string().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status as u16,
                body,
            });
        }
        resp.body_json::<SpotifyAccess>()
            .await
            .map_err(|e| UpstreamError::Decode(format!("account json parse error {}", e)))
    }
}

#[async_trait::async_trait]
impl Provider for SpotifyClient {
    async fn exchange_code(&self, code: &str) -> Result<SpotifyAccess, UpstreamError> {
        self.token_request(&SpotifyAccessParams {
            grant_type: "authorization_code",
            code,
            redirect_uri: &self.redirect_uri,
        })
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SpotifyAccess, UpstreamError> {
        self.token_request(&RefreshParams {
            grant_type: "refresh_token",
            refresh_token,
        })
        .await
    }

    async fn currently_playing(&self, access_token: &str) -> Result<Playback, UpstreamError> {
        let mut resp = self
            .http
            .get(self.currently_playing_url.clone())
            .header("authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| UpstreamError::Request(format!("get currently playing error {}", e)))?;
        match resp.status() {
            StatusCode::NoContent => return Ok(Playback::Nothing),
            StatusCode::Unauthorized => return Err(UpstreamError::Unauthorized),
            StatusCode::TooManyRequests => {
                let retry_after = resp
                    .header("retry-after")
                    .and_then(|v| v.last().as_str().trim().parse::<u64>().ok());
                return Err(UpstreamError::RateLimited { retry_after });
            }
            status if !status.is_success() => {
                let body = resp.body_string().await.unwrap_or_default();
                return Err(UpstreamError::Status {
                    status: status as u16,
                    body,
                });
            }
            _ => {}
        }
        let body = resp
            .body_string()
            .await
            .map_err(|e| UpstreamError::Decode(format!("get currently playing body error {}", e)))?;
        if body.trim().is_empty() {
            return Ok(Playback::Nothing);
        }
        let current: Option<SpotifyCurrentlyPlaying> = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::Decode(format!("get currently playing json error {}", e)))?;
        Ok(current.map(Playback::Current).unwrap_or(Playback::Nothing))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted provider for exercising the session without a network
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn access(token: &str, refresh: Option<&str>, expires_in: u64) -> SpotifyAccess {
        SpotifyAccess {
            access_token: token.to_string(),
            scope: Some(SCOPES.join(" ")),
            expires_in,
            refresh_token: refresh.map(String::from),
        }
    }

    pub fn test_config() -> OAuthConfig {
        OAuthConfig {
            client_id: "test_client_id".to_string(),
            client_secret: "test_client_secret".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            accounts_url: Url::parse("https://accounts.spotify.com").unwrap(),
            api_url: Url::parse("https://api.spotify.com").unwrap(),
        }
    }

    #[derive(Default)]
    pub struct StubProvider {
        pub exchanges: AtomicUsize,
        pub refreshes: AtomicUsize,
        pub fetches: AtomicUsize,
        exchange_responses: Mutex<VecDeque<Result<SpotifyAccess, UpstreamError>>>,
        refresh_responses: Mutex<VecDeque<Result<SpotifyAccess, UpstreamError>>>,
        playback_responses: Mutex<VecDeque<Result<Playback, UpstreamError>>>,
        pub fetch_tokens: Mutex<Vec<String>>,
    }

    fn unscripted<T>() -> Result<T, UpstreamError> {
        Err(UpstreamError::Request("no scripted response".to_string()))
    }

    impl StubProvider {
        pub fn on_exchange(&self, r: Result<SpotifyAccess, UpstreamError>) -> &Self {
            self.exchange_responses.lock().unwrap().push_back(r);
            self
        }
        pub fn on_refresh(&self, r: Result<SpotifyAccess, UpstreamError>) -> &Self {
            self.refresh_responses.lock().unwrap().push_back(r);
            self
        }
        pub fn on_fetch(&self, r: Result<Playback, UpstreamError>) -> &Self {
            self.playback_responses.lock().unwrap().push_back(r);
            self
        }
        pub fn refresh_count(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }
        pub fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
        pub fn exchange_count(&self) -> usize {
            self.exchanges.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Provider for StubProvider {
        async fn exchange_code(&self, _code: &str) -> Result<SpotifyAccess, UpstreamError> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            let next = self.exchange_responses.lock().unwrap().pop_front();
            next.unwrap_or_else(unscripted)
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<SpotifyAccess, UpstreamError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            let next = self.refresh_responses.lock().unwrap().pop_front();
            next.unwrap_or_else(unscripted)
        }

        async fn currently_playing(&self, access_token: &str) -> Result<Playback, UpstreamError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.fetch_tokens
                .lock()
                .unwrap()
                .push(access_token.to_string());
            let next = self.playback_responses.lock().unwrap().pop_front();
            next.unwrap_or_else(unscripted)
        }
    }
}
