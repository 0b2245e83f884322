use anyhow::Context;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://physio.db?mode=rwc";

/// Application settings read from Rocket's figment (`Rocket.toml` and
/// `ROCKET_*` variables).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub session_hours: i64,
    pub chat_auto_reply: bool,
    pub chat_reply_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session_hours: 24,
            chat_auto_reply: false,
            chat_reply_delay_ms: 1500,
        }
    }
}

impl AppConfig {
    pub fn session_duration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_hours.max(1))
    }

    pub fn chat_reply_delay(&self) -> Duration {
        Duration::from_millis(self.chat_reply_delay_ms)
    }
}

/// Env files read at startup, in override order, for a Rocket profile.
pub fn env_files_for(profile: &str) -> [&'static str; 3] {
    let profile_file = match profile {
        "production" | "release" => "config/prod.env",
        _ => "config/dev.env",
    };
    ["config/common.env", profile_file, ".secrets.env"]
}

/// Which env files were applied at startup. Env files are read before the
/// tracing subscriber exists (they carry `RUST_LOG`), so the outcome is
/// reported afterwards with [`EnvReport::log`].
#[derive(Debug, Default, PartialEq)]
pub struct EnvReport {
    pub loaded: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

impl EnvReport {
    pub fn log(&self) {
        for path in &self.loaded {
            info!(path, "Loaded environment file");
        }
        for path in &self.skipped {
            warn!(path, "Environment file missing, skipped");
        }
    }
}

pub fn load_environment() -> anyhow::Result<EnvReport> {
    let profile = dotenvy::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

    let mut report = EnvReport::default();
    for path in env_files_for(&profile) {
        if load_env_file(path)? {
            report.loaded.push(path);
        } else {
            report.skipped.push(path);
        }
    }
    Ok(report)
}

/// Applies one env file over the current environment. Returns `false` when
/// the file does not exist; `.secrets.env` in particular is optional.
pub fn load_env_file(path: &str) -> anyhow::Result<bool> {
    if !Path::new(path).exists() {
        return Ok(false);
    }

    dotenvy::from_filename_override(path).with_context(|| format!("Bad env file {}", path))?;
    Ok(true)
}

pub fn database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}
