/*!
Error kinds surfaced by the token & track session, and the upstream
transport failures they wrap.

`Display` output is deliberately generic. Upstream detail is carried in
the wrapped `UpstreamError` so it can be logged server-side.
*/

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request error {0}")]
    Request(String),

    #[error("upstream rejected access token")]
    Unauthorized,

    #[error("upstream rate limited, retry after {retry_after:?}s")]
    RateLimited { retry_after: Option<u64> },

    #[error("upstream status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream json parse error {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no access token available, authenticate first")]
    NotAuthenticated,

    #[error("authentication failed, re-authenticate")]
    ReauthenticationRequired,

    #[error("failed to get access tokens")]
    TokenExchangeFailed(#[source] UpstreamError),

    #[error("failed to refresh access token")]
    TokenRefreshFailed(#[source] UpstreamError),

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("rate limit exceeded, try again later")]
    RateLimited { retry_after: Option<u64> },

    #[error("failed to fetch current track")]
    UpstreamFetchFailed(#[source] UpstreamError),
}

impl ClientError {
    /// Stable tag for the presentation layer to branch on
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::NotAuthenticated => "not_authenticated",
            ClientError::ReauthenticationRequired => "reauthentication_required",
            ClientError::TokenExchangeFailed(_) => "token_exchange_failed",
            ClientError::TokenRefreshFailed(_) => "token_refresh_failed",
            ClientError::NoRefreshToken => "no_refresh_token",
            ClientError::RateLimited { .. } => "rate_limited",
            ClientError::UpstreamFetchFailed(_) => "upstream_fetch_failed",
        }
    }

    /// Whether the only way forward is restarting the login flow
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            ClientError::NotAuthenticated
                | ClientError::ReauthenticationRequired
                | ClientError::NoRefreshToken
                | ClientError::TokenRefreshFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_hides_upstream_detail() {
        let e = ClientError::UpstreamFetchFailed(UpstreamError::Status {
            status: 502,
            body: "secret provider internals".into(),
        });
        assert_eq!(e.to_string(), "failed to fetch current track");
        let source = std::error::Error::source(&e).expect("missing source");
        assert!(source.to_string().contains("secret provider internals"));
    }

    #[test]
    fn login_class_errors() {
        assert!(ClientError::NotAuthenticated.requires_login());
        assert!(ClientError::ReauthenticationRequired.requires_login());
        assert!(ClientError::NoRefreshToken.requires_login());
        assert!(ClientError::TokenRefreshFailed(UpstreamError::Unauthorized).requires_login());
        assert!(!ClientError::RateLimited { retry_after: Some(3) }.requires_login());
        assert!(
            !ClientError::UpstreamFetchFailed(UpstreamError::Request("reset".into()))
                .requires_login()
        );
        assert_eq!(
            ClientError::RateLimited { retry_after: None }.kind(),
            "rate_limited"
        );
    }
}
