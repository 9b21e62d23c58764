//! Server configuration loaded from the environment.

use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

/// Largest image accepted by the upload routes
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

pub const DEFAULT_SESSION_HOURS: u64 = 24;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory served as the public root; uploads live in `{public_dir}/uploads`
    pub public_dir: PathBuf,
    pub db_path: PathBuf,
    pub max_upload_bytes: usize,
    pub remote_timeout: Duration,
    pub session_ttl: Duration,
    /// Shared secret for deployment-to-deployment file calls. Sent on every
    /// mirror request and accepted in place of a merchant session.
    pub mirror_secret: Option<String>,
    /// Merchant created on first start when the database has none
    pub bootstrap_merchant: Option<BootstrapMerchant>,
}

#[derive(Debug, Clone)]
pub struct BootstrapMerchant {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl ServerConfig {
    pub fn load() -> Self {
        let public_dir: PathBuf = try_load("EVENT_ADMIN_PUBLIC_DIR", "./public");
        let default_db = public_dir
            .parent()
            .map(|p| p.join("event-admin.db"))
            .unwrap_or_else(|| PathBuf::from("event-admin.db"));
        let db_path = var("EVENT_ADMIN_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(default_db);

        let bootstrap_merchant = match (
            var("EVENT_ADMIN_BOOTSTRAP_EMAIL"),
            var("EVENT_ADMIN_BOOTSTRAP_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(BootstrapMerchant {
                name: var("EVENT_ADMIN_BOOTSTRAP_NAME").unwrap_or_else(|| "Admin".to_string()),
                email,
                password,
            }),
            _ => None,
        };

        Self {
            bind_addr: try_load("EVENT_ADMIN_BIND", "127.0.0.1:8080"),
            public_dir,
            db_path,
            max_upload_bytes: try_load(
                "EVENT_ADMIN_MAX_UPLOAD_BYTES",
                &DEFAULT_MAX_UPLOAD_BYTES.to_string(),
            ),
            remote_timeout: Duration::from_secs(try_load("EVENT_ADMIN_REMOTE_TIMEOUT_SECS", "10")),
            session_ttl: session_ttl_from_hours(try_load(
                "EVENT_ADMIN_SESSION_HOURS",
                &DEFAULT_SESSION_HOURS.to_string(),
            )),
            mirror_secret: var("EVENT_ADMIN_MIRROR_SECRET"),
            bootstrap_merchant,
        }
    }

    /// Config rooted at a scratch directory, for tests
    #[cfg(test)]
    pub fn for_dir(dir: &std::path::Path) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            public_dir: dir.join("public"),
            db_path: dir.join("event-admin.db"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            remote_timeout: Duration::from_secs(5),
            session_ttl: Duration::from_secs(60 * 60),
            mirror_secret: None,
            bootstrap_merchant: None,
        }
    }
}

fn session_ttl_from_hours(hours: u64) -> Duration {
    match hours.checked_mul(60 * 60) {
        Some(secs) => Duration::from_secs(secs),
        None => {
            warn!(
                "EVENT_ADMIN_SESSION_HOURS value {hours} is too large, using default: {DEFAULT_SESSION_HOURS}"
            );
            Duration::from_secs(DEFAULT_SESSION_HOURS * 60 * 60)
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            parse_default(key, default)
        }
    }
}

fn parse_default<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    match default.parse() {
        Ok(value) => value,
        // Defaults are compile-time literals in this module
        Err(e) => panic!("default for {key} does not parse: {e}"),
    }
}
