//! Page-readiness heuristic.
//!
//! The share page has no public "fully rendered" signal, so the best this
//! can do is wait for an assistant turn to appear, nudge lazy content by
//! scrolling through the document, and let client-side rendering settle.
//! All timing lives in `ReadinessPolicy` so the constants can be tuned
//! without touching extraction.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::browser::{BrowserError, PageDriver};

/// Selector that only matches once the site has rendered an assistant turn.
pub const ASSISTANT_MARKER: &str = r#"[data-message-author-role="assistant"]"#;

#[derive(Debug, Clone)]
pub struct ReadinessPolicy {
    /// Upper bound on navigation plus network-quiet detection.
    pub nav_timeout: Duration,
    /// How long to wait for an assistant turn before giving up on it.
    pub selector_timeout: Duration,
    /// Pause after each programmatic scroll.
    pub scroll_settle: Duration,
    /// Final pause to absorb rendering the other checks cannot observe.
    pub render_settle: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            nav_timeout: Duration::from_secs(90),
            selector_timeout: Duration::from_secs(20),
            scroll_settle: Duration::from_secs(1),
            render_settle: Duration::from_secs(5),
        }
    }
}

/// Run the readiness steps against an already-navigated page.
///
/// A missing assistant turn is tolerated: single unanswered conversations
/// exist, and the marker convention may change under us. Transport errors
/// still propagate.
pub async fn wait_until_ready(
    page: &mut dyn PageDriver,
    policy: &ReadinessPolicy,
) -> Result<(), BrowserError> {
    let found = page
        .wait_for_selector(ASSISTANT_MARKER, policy.selector_timeout)
        .await?;
    if found {
        debug!("assistant turn visible");
    } else {
        warn!(
            "no assistant turn after {:?}, extracting anyway",
            policy.selector_timeout
        );
    }

    // Scroll to the bottom and back to pull in lazy-loaded turns.
    page.evaluate("window.scrollTo(0, document.body.scrollHeight)")
        .await?;
    sleep(policy.scroll_settle).await;
    page.evaluate("window.scrollTo(0, 0)").await?;
    sleep(policy.scroll_settle).await;

    sleep(policy.render_settle).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;

    struct RecordingPage {
        selector_found: bool,
        calls: Vec<String>,
    }

    impl RecordingPage {
        fn new(selector_found: bool) -> Self {
            Self {
                selector_found,
                calls: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl PageDriver for RecordingPage {
        async fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<(), BrowserError> {
            self.calls.push("navigate".to_string());
            Ok(())
        }

        async fn wait_for_selector(
            &mut self,
            selector: &str,
            _timeout: Duration,
        ) -> Result<bool, BrowserError> {
            self.calls.push(format!("selector {}", selector));
            Ok(self.selector_found)
        }

        async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError> {
            self.calls.push(format!("evaluate {}", script));
            Ok(Value::Null)
        }

        async fn content(&mut self) -> Result<String, BrowserError> {
            self.calls.push("content".to_string());
            Ok(String::new())
        }

        async fn close(&mut self) -> Result<(), BrowserError> {
            self.calls.push("close".to_string());
            Ok(())
        }
    }

    fn fast_policy() -> ReadinessPolicy {
        ReadinessPolicy {
            nav_timeout: Duration::from_millis(10),
            selector_timeout: Duration::from_millis(1),
            scroll_settle: Duration::from_millis(1),
            render_settle: Duration::from_millis(1),
        }
    }

    #[test]
    fn default_policy_values() {
        let policy = ReadinessPolicy::default();
        assert_eq!(policy.nav_timeout, Duration::from_secs(90));
        assert_eq!(policy.selector_timeout, Duration::from_secs(20));
        assert_eq!(policy.scroll_settle, Duration::from_secs(1));
        assert_eq!(policy.render_settle, Duration::from_secs(5));
    }

    #[test]
    fn assistant_marker_is_an_attribute_selector() {
        assert!(ASSISTANT_MARKER.contains("data-message-author-role"));
        assert!(ASSISTANT_MARKER.contains("assistant"));
    }

    #[tokio::test]
    async fn readiness_steps_run_in_order() {
        let mut page = RecordingPage::new(true);
        wait_until_ready(&mut page, &fast_policy()).await.unwrap();

        assert_eq!(
            page.calls,
            vec![
                format!("selector {}", ASSISTANT_MARKER),
                "evaluate window.scrollTo(0, document.body.scrollHeight)".to_string(),
                "evaluate window.scrollTo(0, 0)".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn missing_assistant_turn_is_tolerated() {
        let mut page = RecordingPage::new(false);
        assert!(wait_until_ready(&mut page, &fast_policy()).await.is_ok());
        assert_eq!(page.calls.len(), 3);
    }
}
