//! Request-scoped fetch pipeline: validate the share URL, launch a browser,
//! drive the page to readiness, capture content, and always close the
//! browser before reporting the outcome.

use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserLauncher, PageDriver};
use crate::config::{Config, ResponseMode};
use crate::extract::{self, Extraction};
use crate::ready;

// ── Constants ────────────────────────────────────────────────────────────────

/// Path substrings that identify a conversation share link.
const SHARE_URL_MARKERS: &[&str] = &["chatgpt.com/share/", "chat.openai.com/share/"];

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    InvalidShareUrl(String),
    #[error("{0}")]
    Launch(String),
    #[error("{0}")]
    Navigation(String),
    #[error("{0}")]
    Page(String),
}

// ── Outcome ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum FetchOutcome {
    Conversation(Extraction),
    Html(String),
}

// ── URL validation ───────────────────────────────────────────────────────────

/// Reject anything that is not an absolute http(s) link to a known share
/// path. Runs before any browser resource is allocated.
pub fn validate_share_url(share_url: &str) -> Result<(), FetchError> {
    if !SHARE_URL_MARKERS
        .iter()
        .any(|marker| share_url.contains(marker))
    {
        return Err(FetchError::InvalidShareUrl(
            "Please provide a valid ChatGPT share link".to_string(),
        ));
    }
    let parsed = Url::parse(share_url).map_err(|_| {
        FetchError::InvalidShareUrl("shareUrl is not a valid absolute URL".to_string())
    })?;
    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return Err(FetchError::InvalidShareUrl(
            "shareUrl must be an http(s) URL".to_string(),
        ));
    }
    Ok(())
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// Fetch one share URL end to end.
///
/// The browser is closed exactly once per successful launch, on the success
/// and the failure path alike; a close failure is logged and never masks
/// the outcome.
pub async fn fetch_share(
    launcher: &dyn BrowserLauncher,
    config: &Config,
    share_url: &str,
) -> Result<FetchOutcome, FetchError> {
    validate_share_url(share_url)?;

    info!("fetching conversation from {}", share_url);
    let mut page = launcher
        .launch(config.profile)
        .await
        .map_err(|e| FetchError::Launch(e.to_string()))?;

    let outcome = drive(page.as_mut(), config, share_url).await;

    if let Err(e) = page.close().await {
        warn!("failed to close browser: {}", e);
    }

    outcome
}

async fn drive(
    page: &mut dyn PageDriver,
    config: &Config,
    share_url: &str,
) -> Result<FetchOutcome, FetchError> {
    page.navigate(share_url, config.readiness.nav_timeout)
        .await
        .map_err(|e| FetchError::Navigation(e.to_string()))?;

    ready::wait_until_ready(page, &config.readiness)
        .await
        .map_err(|e| FetchError::Page(e.to_string()))?;

    let html = page
        .content()
        .await
        .map_err(|e| FetchError::Page(e.to_string()))?;

    match config.mode {
        ResponseMode::Conversation => {
            let extraction = extract::extract_conversation(&html);
            if extraction.messages.is_empty() {
                warn!(
                    "no messages extracted ({} marked elements: {} user, {} assistant)",
                    extraction.stats.total_elements,
                    extraction.stats.user_elements,
                    extraction.stats.assistant_elements,
                );
            } else {
                info!(
                    "extracted {} messages, title {:?}",
                    extraction.messages.len(),
                    extraction.title,
                );
            }
            Ok(FetchOutcome::Conversation(extraction))
        }
        ResponseMode::Html => {
            debug!("returning {} bytes of rendered markup", html.len());
            Ok(FetchOutcome::Html(html))
        }
    }
}
