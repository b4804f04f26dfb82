use std::path::PathBuf;

use crate::browser::LaunchProfile;
use crate::ready::ReadinessPolicy;

// ── Constants ────────────────────────────────────────────────────────────────

const DEFAULT_PORT: u16 = 3000;

/// Fixed desktop user agent applied to every page before navigation.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// ── Response mode ────────────────────────────────────────────────────────────

/// Shape of the success payload for `POST /api/fetch-chatgpt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Run the extractor and return role-tagged messages.
    Conversation,
    /// Return the rendered page markup untouched.
    Html,
}

// ── Service configuration ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub profile: LaunchProfile,
    pub mode: ResponseMode,
    pub chrome_bin: Option<PathBuf>,
    pub headless: bool,
    pub user_agent: String,
    pub readiness: ReadinessPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            profile: LaunchProfile::Full,
            mode: ResponseMode::Conversation,
            chrome_bin: None,
            headless: true,
            user_agent: USER_AGENT.to_string(),
            readiness: ReadinessPolicy::default(),
        }
    }
}

impl Config {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }

        if let Ok(value) = std::env::var("SHARE_API_BROWSER_PROFILE") {
            match parse_profile(&value) {
                Some(profile) => config.profile = profile,
                None => tracing::warn!(
                    "unknown SHARE_API_BROWSER_PROFILE {:?}, using full",
                    value
                ),
            }
        }

        if let Ok(value) = std::env::var("SHARE_API_RESPONSE_MODE") {
            match parse_mode(&value) {
                Some(mode) => config.mode = mode,
                None => tracing::warn!(
                    "unknown SHARE_API_RESPONSE_MODE {:?}, using conversation",
                    value
                ),
            }
        }

        if let Ok(value) = std::env::var("SHARE_API_CHROME_BIN") {
            if !value.is_empty() {
                config.chrome_bin = Some(PathBuf::from(value));
            }
        }

        if let Ok(value) = std::env::var("SHARE_API_HEADLESS") {
            match parse_bool(&value) {
                Some(headless) => config.headless = headless,
                None => tracing::warn!(
                    "unknown SHARE_API_HEADLESS {:?}, keeping headless on",
                    value
                ),
            }
        }

        config
    }
}

fn parse_profile(value: &str) -> Option<LaunchProfile> {
    match value.to_ascii_lowercase().as_str() {
        "full" => Some(LaunchProfile::Full),
        "slim" => Some(LaunchProfile::Slim),
        _ => None,
    }
}

fn parse_mode(value: &str) -> Option<ResponseMode> {
    match value.to_ascii_lowercase().as_str() {
        "conversation" => Some(ResponseMode::Conversation),
        "html" => Some(ResponseMode::Html),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
