use std::{collections::HashMap, fs};

use serde::Deserialize;
use tracing::warn;

pub const DEV_SESSION_SECRET: &str = "dev-session-secret";
pub const MAX_SESSION_TTL_SECONDS: i64 = 365 * 24 * 3600;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub session_secret: String,
    pub session_ttl_seconds: i64,
    pub max_form_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3000".into(),
            database_url: "sqlite://./data/dashboard.db".into(),
            session_secret: DEV_SESSION_SECRET.into(),
            session_ttl_seconds: 30 * 24 * 3600,
            max_form_bytes: 64 * 1024,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, &file_cfg),
            Err(error) => warn!(%error, "ignoring malformed server.toml"),
        }
    }

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Ok(v) = std::env::var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Ok(v) = std::env::var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Ok(v) = std::env::var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Ok(v) = std::env::var("AUTH_SECRET") {
        settings.session_secret = v;
    }
    if let Ok(v) = std::env::var("APP__SESSION_SECRET") {
        settings.session_secret = v;
    }

    if let Ok(v) = std::env::var("APP__SESSION_TTL_SECONDS") {
        match v.parse::<i64>().ok().filter(|ttl| session_ttl_in_range(*ttl)) {
            Some(parsed) => settings.session_ttl_seconds = parsed,
            None => warn!(value = %v, "ignoring out-of-range APP__SESSION_TTL_SECONDS"),
        }
    }

    if let Ok(v) = std::env::var("APP__MAX_FORM_BYTES") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.max_form_bytes = parsed;
        }
    }

    if settings.session_secret == DEV_SESSION_SECRET {
        warn!("using the built-in development session secret; set APP__SESSION_SECRET");
    }

    settings
}

fn apply_file_settings(settings: &mut Settings, file_cfg: &HashMap<String, toml::Value>) {
    if let Some(v) = file_cfg.get("bind_addr").and_then(toml::Value::as_str) {
        settings.server_bind = v.to_string();
    }
    if let Some(v) = file_cfg.get("database_url").and_then(toml::Value::as_str) {
        settings.database_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("session_secret").and_then(toml::Value::as_str) {
        settings.session_secret = v.to_string();
    }
    if let Some(v) = file_cfg
        .get("session_ttl_seconds")
        .and_then(toml::Value::as_integer)
    {
        if session_ttl_in_range(v) {
            settings.session_ttl_seconds = v;
        } else {
            warn!(value = v, "ignoring out-of-range session_ttl_seconds");
        }
    }
    if let Some(v) = file_cfg
        .get("max_form_bytes")
        .and_then(toml::Value::as_integer)
        .and_then(|v| usize::try_from(v).ok())
    {
        settings.max_form_bytes = v;
    }
}

fn session_ttl_in_range(ttl_seconds: i64) -> bool {
    (1..=MAX_SESSION_TTL_SECONDS).contains(&ttl_seconds)
}

/// Normalises a configured database location into an sqlx SQLite URL.
/// Plain paths and `sqlite:` prefixes become `sqlite://`; other URLs pass
/// through unchanged. `Storage::new` creates any missing parent directory.
pub fn prepare_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url)
        .replace('\\', "/");
    format!("sqlite://{path}")
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
