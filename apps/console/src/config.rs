use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use console_core::{ApiSettings, ConsoleOptions};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSettings {
    pub server_url: String,
    pub session_cookie: Option<String>,
    pub can_manage: bool,
    pub advanced_logging: bool,
    pub request_timeout_secs: u64,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            session_cookie: None,
            can_manage: true,
            advanced_logging: false,
            request_timeout_secs: 30,
        }
    }
}

impl ConsoleSettings {
    pub fn api_settings(&self) -> anyhow::Result<ApiSettings> {
        Ok(ApiSettings {
            server_url: normalize_server_url(&self.server_url)?,
            session_cookie: self.session_cookie.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        })
    }

    pub fn options(&self) -> ConsoleOptions {
        ConsoleOptions {
            can_manage: self.can_manage,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    session_cookie: Option<String>,
    can_manage: Option<bool>,
    advanced_logging: Option<bool>,
    request_timeout_secs: Option<u64>,
}

pub fn load_settings(path: &Path) -> anyhow::Result<ConsoleSettings> {
    load_settings_with(path, |key| std::env::var(key).ok())
}

/// File values first, then environment overrides. A missing file is not an
/// error; a malformed one is.
pub fn load_settings_with(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ConsoleSettings> {
    let mut settings = ConsoleSettings::default();

    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file_cfg: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if let Some(v) = file_cfg.server_url {
            settings.server_url = v;
        }
        if let Some(v) = file_cfg.session_cookie {
            settings.session_cookie = Some(v);
        }
        if let Some(v) = file_cfg.can_manage {
            settings.can_manage = v;
        }
        if let Some(v) = file_cfg.advanced_logging {
            settings.advanced_logging = v;
        }
        if let Some(v) = file_cfg.request_timeout_secs {
            settings.request_timeout_secs = v;
        }
    }

    if let Some(v) = env("CONSOLE_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = env("CONSOLE_SESSION") {
        settings.session_cookie = Some(v);
    }
    if let Some(v) = env("APP__SESSION_COOKIE") {
        settings.session_cookie = Some(v);
    }

    if let Some(v) = env("APP__CAN_MANAGE") {
        if let Some(parsed) = parse_flag(&v) {
            settings.can_manage = parsed;
        }
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.trim().parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    settings.session_cookie = settings
        .session_cookie
        .filter(|cookie| !cookie.trim().is_empty());
    Ok(settings)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn normalize_server_url(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        bail!("server url is empty");
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        bail!("server url must start with http:// or https://: {trimmed}");
    }
    Ok(trimmed.to_string())
}
