//! Headless-browser collaborator: one Chrome process per request, driven
//! over the DevTools protocol.

mod cdp;
pub mod chrome;
mod protocol;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use chrome::ChromeLauncher;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Chrome not found. Install Google Chrome or set SHARE_API_CHROME_BIN.")]
    ChromeNotFound,

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("CDP error: {message} (code: {code})")]
    Protocol { code: i64, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript error: {0}")]
    JavaScript(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for BrowserError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BrowserError::WebSocket(e.to_string())
    }
}

impl From<reqwest::Error> for BrowserError {
    fn from(e: reqwest::Error) -> Self {
        BrowserError::Http(e.to_string())
    }
}

// ── Launch profiles ──────────────────────────────────────────────────────────

/// Chrome flag set used for a launch.
///
/// `Full` is the default profile and additionally hides the webdriver
/// automation flag from page scripts. `Slim` is the trimmed single-process
/// set for constrained environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchProfile {
    Full,
    Slim,
}

impl LaunchProfile {
    pub fn chrome_args(&self) -> &'static [&'static str] {
        match self {
            LaunchProfile::Full => &[
                "--no-sandbox",
                "--disable-setuid-sandbox",
                "--disable-blink-features=AutomationControlled",
                "--disable-dev-shm-usage",
            ],
            LaunchProfile::Slim => &[
                "--no-sandbox",
                "--disable-setuid-sandbox",
                "--disable-dev-shm-usage",
                "--disable-accelerated-2d-canvas",
                "--no-first-run",
                "--no-zygote",
                "--single-process",
                "--disable-gpu",
            ],
        }
    }

    /// Whether the webdriver-hiding init script is installed before
    /// navigation.
    pub fn stealth(&self) -> bool {
        matches!(self, LaunchProfile::Full)
    }
}

// ── Collaborator traits ──────────────────────────────────────────────────────

/// Launches one browser process and hands back a driver for its single page.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, profile: LaunchProfile) -> Result<Box<dyn PageDriver>, BrowserError>;
}

/// Drives the single page of a launched browser.
///
/// `close` releases the underlying process and must be safe to call exactly
/// once per launch; implementations tolerate repeated calls.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate and block until the page has loaded and the network has
    /// gone quiet, all bounded by `timeout`.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Poll for a selector. `Ok(false)` means the wait window elapsed
    /// without a match; transport failures are errors.
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, BrowserError>;

    /// Evaluate a script in page context and return its value.
    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError>;

    /// Serialized markup of the current document.
    async fn content(&mut self) -> Result<String, BrowserError>;

    /// Shut down the browser process and release its resources.
    async fn close(&mut self) -> Result<(), BrowserError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_profile_args() {
        assert_eq!(
            LaunchProfile::Full.chrome_args(),
            &[
                "--no-sandbox",
                "--disable-setuid-sandbox",
                "--disable-blink-features=AutomationControlled",
                "--disable-dev-shm-usage",
            ]
        );
        assert!(LaunchProfile::Full.stealth());
    }

    #[test]
    fn slim_profile_args() {
        let args = LaunchProfile::Slim.chrome_args();
        assert_eq!(args.len(), 8);
        assert!(args.contains(&"--single-process"));
        assert!(args.contains(&"--disable-gpu"));
        assert!(!LaunchProfile::Slim.stealth());
    }

    #[test]
    fn error_display() {
        let err = BrowserError::LaunchFailed("permission denied".to_string());
        assert_eq!(err.to_string(), "Failed to launch Chrome: permission denied");

        let err = BrowserError::Protocol {
            code: -32000,
            message: "No target with given id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "CDP error: No target with given id (code: -32000)"
        );

        let err = BrowserError::NavigationFailed("net::ERR_NAME_NOT_RESOLVED".to_string());
        assert_eq!(
            err.to_string(),
            "Navigation failed: net::ERR_NAME_NOT_RESOLVED"
        );
    }
}
