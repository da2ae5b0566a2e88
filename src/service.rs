use std::path::Path;
use std::sync::Arc;

use crate::session::Session;
use crate::{utils, CONFIG, LOG};

pub const CURRENT_TRACK_ERROR: &str = "Failed to fetch current track";

#[derive(Clone)]
pub struct Context {
    session: Arc<Session>,
}

impl Context {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

/// Assemble the app. Presentation assets are served from `static_dir` when given.
pub fn build(ctx: Context, static_dir: Option<&Path>) -> std::io::Result<tide::Server<Context>> {
    let mut app = tide::with_state(ctx);
    app.with(crate::logging::LogMiddleware::new());
    app.with(tide::security::CorsMiddleware::new());
    app.at("/login").get(login);
    app.at("/callback").get(auth_callback);
    app.at("/api/status").get(status);
    app.at("/api/auth-status").get(auth_status);
    app.at("/api/current-track").get(current_track);
    app.at("/api/logout").post(logout);
    if let Some(dir) = static_dir {
        let index = dir.join("index.html");
        if index.is_file() {
            app.at("/").serve_file(index)?;
        }
        app.at("/").serve_dir(dir)?;
    }
    Ok(app)
}

pub async fn start(session: Arc<Session>, static_dir: Option<&Path>) -> crate::Result<()> {
    let app = build(Context::new(session), static_dir)?;
    slog::info!(LOG, "running at {}", CONFIG.public_url());
    app.listen(CONFIG.listen_addr()).await?;
    Ok(())
}

#[derive(serde::Serialize)]
struct Status<'a> {
    ok: &'a str,
    version: &'a str,
}

async fn status(_req: tide::Request<Context>) -> tide::Result {
    Ok(resp!(json => Status {
        ok: "ok",
        version: &CONFIG.version
    }))
}

/// Send the user off to the provider to log in. The provider sends
/// them back to `/callback` with a one-time authorization code.
async fn login(req: tide::Request<Context>) -> tide::Result {
    let url = req.state().session.authorization_url();
    slog::info!(LOG, "redirecting to spotify-auth");
    Ok(tide::Redirect::new(url).into())
}

#[derive(Debug, Default, serde::Deserialize)]
struct SpotifyAuthCallback {
    code: Option<String>,
    // set instead of `code` when the user declines
    error: Option<String>,
}

async fn auth_callback(req: tide::Request<Context>) -> tide::Result {
    let callback: SpotifyAuthCallback = req.query().unwrap_or_default();
    let code = match callback.code.filter(|c| !c.is_empty()) {
        Some(code) => code,
        None => {
            slog::warn!(LOG, "login callback without authorization code"; "provider_error" => callback.error);
            return Ok(resp!(status => 400, message => "Authorization code not found"));
        }
    };

    let session = &req.state().session;
    match session.exchange_code_for_tokens(&code).await {
        Ok(tokens) => {
            session.commit_tokens(tokens).await;
            slog::info!(LOG, "completing user login");
            Ok(tide::Redirect::new("/").into())
        }
        Err(e) => {
            slog::error!(LOG, "error during login callback"; "kind" => e.kind(), "error" => ?e);
            Ok(resp!(status => 500, message => "Authentication failed"))
        }
    }
}

#[derive(serde::Serialize)]
struct AuthStatus {
    authenticated: bool,
}

async fn auth_status(req: tide::Request<Context>) -> tide::Result {
    let authenticated = req.state().session.is_authenticated().await;
    Ok(resp!(json => AuthStatus { authenticated }))
}

/// Only `error` is shown to users. `kind` and `reauthenticate` let the
/// client send login-class failures back to the login screen.
#[derive(serde::Serialize)]
struct CurrentTrackError {
    error: &'static str,
    kind: &'static str,
    reauthenticate: bool,
}

async fn current_track(req: tide::Request<Context>) -> tide::Result {
    match req.state().session.get_currently_playing().await {
        Ok(snapshot) => {
            if let Some(track) = snapshot.track() {
                slog::debug!(
                    LOG, "current track {}", track.name;
                    "is_playing" => snapshot.is_playing(),
                    "progress" => utils::format_duration_ms(track.progress_ms),
                    "duration" => utils::format_duration_ms(track.duration_ms),
                );
            }
            Ok(resp!(json => snapshot))
        }
        Err(e) => {
            slog::error!(LOG, "error fetching current track"; "kind" => e.kind(), "error" => ?e);
            Ok(resp!(status => 500, json => CurrentTrackError {
                error: CURRENT_TRACK_ERROR,
                kind: e.kind(),
                reauthenticate: e.requires_login(),
            }))
        }
    }
}

async fn logout(req: tide::Request<Context>) -> tide::Result {
    req.state().session.clear().await;
    slog::info!(LOG, "cleared session credentials");
    Ok(resp!(json => AuthStatus {
        authenticated: false
    }))
}
