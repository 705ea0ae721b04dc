//! Runtime configuration
//! Mission: Collect secrets, lifetimes and paths from the environment once at startup

use anyhow::{bail, Context, Result};
use bcrypt::DEFAULT_COST;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Longest accepted access token lifetime (one year)
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 86_400;

const DEV_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";

/// Server-side configuration, injected into the auth layer as opaque values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: String,
    pub access_token_secret: String,
    /// Access token lifetime in seconds; positive and at most [`MAX_TOKEN_LIFETIME_SECS`]
    pub access_token_life_secs: i64,
    pub bcrypt_cost: u32,
    pub bootstrap_admin_email: String,
    pub bootstrap_admin_password: String,
    pub login_rate_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            db_path: default_data_path("realty_auth.db"),
            access_token_secret: DEV_SECRET.to_string(),
            access_token_life_secs: 15 * 60,
            bcrypt_cost: DEFAULT_COST,
            bootstrap_admin_email: "admin@realty.local".to_string(),
            bootstrap_admin_password: "admin123".to_string(),
            login_rate_limit: 20,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = env::var("BIND_ADDR") {
            config.bind_addr = v;
        }

        config.db_path = resolve_data_path(env::var("AUTH_DB_PATH").ok(), "realty_auth.db");

        match env::var("ACCESS_TOKEN_SECRET") {
            Ok(v) if !v.trim().is_empty() => config.access_token_secret = v,
            _ => warn!("ACCESS_TOKEN_SECRET not set, using development secret"),
        }

        if let Ok(v) = env::var("ACCESS_TOKEN_LIFE") {
            config.access_token_life_secs =
                parse_lifetime(&v).context("Invalid ACCESS_TOKEN_LIFE")?;
        }

        if let Some(cost) = env::var("BCRYPT_COST")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config.bcrypt_cost = cost;
        }

        if let Ok(v) = env::var("ADMIN_BOOTSTRAP_EMAIL") {
            config.bootstrap_admin_email = v;
        }
        if let Ok(v) = env::var("ADMIN_BOOTSTRAP_PASSWORD") {
            config.bootstrap_admin_password = v;
        }

        if let Some(limit) = env::var("LOGIN_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|&v| v > 0)
        {
            config.login_rate_limit = limit;
        }

        Ok(config)
    }
}

/// Parse a token lifetime such as `900`, `30s`, `15m`, `12h` or `7d` into seconds.
/// Zero, negative and over-long lifetimes are rejected.
pub fn parse_lifetime(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("empty lifetime");
    }

    let (digits, unit) = match raw.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&raw[..idx], c.to_ascii_lowercase()),
        _ => (raw, 's'),
    };

    let value: i64 = digits
        .trim()
        .parse()
        .with_context(|| format!("not a number: {digits:?}"))?;

    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        other => bail!("unknown lifetime unit {other:?}"),
    };

    let secs = value
        .checked_mul(multiplier)
        .with_context(|| format!("lifetime too large: {raw:?}"))?;
    if secs <= 0 {
        bail!("lifetime must be positive, got {raw:?}");
    }
    if secs > MAX_TOKEN_LIFETIME_SECS {
        bail!("lifetime {raw:?} exceeds {MAX_TOKEN_LIFETIME_SECS}s");
    }
    Ok(secs)
}

/// Client-side configuration for [`crate::client::ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL including the API prefix, e.g. `http://localhost:3000/api/v1`.
    pub base_url: String,
    pub scope: crate::auth::models::AccountKind,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, scope: crate::auth::models::AccountKind) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            scope,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn default_data_path(filename: &str) -> String {
    // Anchor defaults to the crate directory
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    base.join(filename).to_string_lossy().to_string()
}

pub fn resolve_data_path(env_value: Option<String>, default_filename: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) else {
        return default_data_path(default_filename);
    };

    let p = PathBuf::from(raw);
    if p.is_absolute() {
        return p.to_string_lossy().to_string();
    }

    base.join(p).to_string_lossy().to_string()
}

pub fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv::dotenv();

    // 2) Also try the crate-root .env when launched from elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
