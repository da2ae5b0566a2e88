use anyhow::Context as _;
use slog::o;
use slog::Drain;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::{env, fs};

macro_rules! resp {
    (json => $obj:expr) => {{
        resp!(status => 200, json => $obj)
    }};
    (status => $status:expr, json => $obj:expr) => {{
        tide::Response::builder($status)
            .body(tide::Body::from_json(&$obj)?)
            .build()
    }};
    (status => $status:expr, message => $msg:expr) => {{
        tide::Response::builder($status).body($msg).build()
    }};
}

mod errors;
mod logging;
mod models;
mod service;
mod session;
mod spotify;
mod utils;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

fn env_or(k: &str, default: &str) -> String {
    env::var(k).unwrap_or_else(|_| default.to_string())
}

lazy_static::lazy_static! {
    pub static ref CONFIG: Config = Config::load();

    // The "base" logger that all crates should branch off of
    pub static ref BASE_LOG: slog::Logger = {
        let level: slog::Level = CONFIG.log_level
                .parse()
                .expect("invalid log_level");
        if CONFIG.log_format == "pretty" {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::CompactFormat::new(decorator).build().fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(drain, o!())
        } else {
            let drain = slog_json::Json::default(std::io::stderr()).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(drain, o!())
        }
    };

    // Base logger
    pub static ref LOG: slog::Logger = BASE_LOG.new(slog::o!("app" => "spot-now"));
}

pub struct Config {
    pub version: String,
    pub host: String,
    pub port: u16,
    pub log_format: String,
    pub log_level: String,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_redirect_uri: String,
    pub spotify_accounts_url: String,
    pub spotify_api_url: String,
    pub http_timeout_seconds: u64,
    pub static_dir: String,
}
impl Config {
    pub fn load() -> Self {
        let version = fs::File::open("commit_hash.txt")
            .map(|mut f| {
                let mut s = String::new();
                f.read_to_string(&mut s).expect("Error reading commit_hash");
                s.trim().to_string()
            })
            .unwrap_or_else(|_| "unknown".to_string());
        let host = env_or("HOST", "localhost");
        let port: u16 = env_or("PORT", "3000").parse().expect("invalid port");
        let spotify_redirect_uri = env::var("SPOTIFY_REDIRECT_URI")
            .unwrap_or_else(|_| format!("http://{}:{}/callback", host, port));
        Self {
            version,
            host,
            port,
            log_format: env_or("LOG_FORMAT", "json")
                .to_lowercase()
                .trim()
                .to_string(),
            log_level: env_or("LOG_LEVEL", "INFO"),
            spotify_client_id: env_or("SPOTIFY_CLIENT_ID", ""),
            spotify_client_secret: env_or("SPOTIFY_CLIENT_SECRET", ""),
            spotify_redirect_uri,
            spotify_accounts_url: env_or("SPOTIFY_ACCOUNTS_URL", "https://accounts.spotify.com"),
            spotify_api_url: env_or("SPOTIFY_API_URL", "https://api.spotify.com"),
            http_timeout_seconds: env_or("HTTP_TIMEOUT_SECONDS", "10")
                .parse()
                .expect("invalid http_timeout_seconds"),
            static_dir: env_or("STATIC_DIR", "client"),
        }
    }
    pub fn initialize(&self) -> anyhow::Result<()> {
        slog::info!(
            LOG, "initialized config";
            "version" => &self.version,
            "host" => &self.host,
            "port" => &self.port,
            "log_format" => &self.log_format,
            "log_level" => &self.log_level,
            "redirect_uri" => &self.spotify_redirect_uri,
            "accounts_url" => &self.spotify_accounts_url,
            "api_url" => &self.spotify_api_url,
            "http_timeout_seconds" => self.http_timeout_seconds,
            "static_dir" => &self.static_dir,
        );
        if self.spotify_client_id.is_empty() || self.spotify_client_secret.is_empty() {
            slog::warn!(
                LOG,
                "SPOTIFY_CLIENT_ID or SPOTIFY_CLIENT_SECRET is not set, the provider will reject logins"
            );
        }
        Ok(())
    }
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
    pub fn public_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
    pub fn oauth_config(&self) -> anyhow::Result<spotify::OAuthConfig> {
        Ok(spotify::OAuthConfig {
            client_id: self.spotify_client_id.clone(),
            client_secret: self.spotify_client_secret.clone(),
            redirect_uri: self.spotify_redirect_uri.clone(),
            accounts_url: surf::Url::parse(&self.spotify_accounts_url)
                .with_context(|| format!("invalid accounts url {}", self.spotify_accounts_url))?,
            api_url: surf::Url::parse(&self.spotify_api_url)
                .with_context(|| format!("invalid api url {}", self.spotify_api_url))?,
        })
    }
}

#[async_std::main]
async fn main() -> Result<()> {
    // try sourcing a .env if one exists
    dotenv::dotenv().ok();
    CONFIG.initialize()?;

    let oauth = CONFIG.oauth_config()?;
    let provider = spotify::SpotifyClient::new(
        &oauth,
        Duration::from_secs(CONFIG.http_timeout_seconds),
    )?;
    let session = Arc::new(session::Session::new(oauth, Arc::new(provider)));

    let static_dir = Path::new(&CONFIG.static_dir);
    let static_dir = if static_dir.is_dir() {
        Some(static_dir)
    } else {
        slog::info!(LOG, "no static directory, serving api only"; "static_dir" => &CONFIG.static_dir);
        None
    };

    slog::info!(LOG, "visit {}/login to authenticate with spotify", CONFIG.public_url());
    service::start(session, static_dir).await
}
