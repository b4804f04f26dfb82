//! Chrome process launcher and DevTools-driven page.
//!
//! Every launch spawns a fresh Chrome with an ephemeral debugging port and a
//! throwaway profile directory, discovers the WebSocket endpoint through
//! `DevToolsActivePort` and `/json/version`, and attaches to a single page
//! target. Closing the page tears the whole process down.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cdp::{CdpConnection, CdpEvent};
use super::protocol::{BrowserVersion, PageInfo};
use super::{BrowserError, BrowserLauncher, LaunchProfile, PageDriver};

// ── Constants ────────────────────────────────────────────────────────────────

const DEVTOOLS_PORT_FILE: &str = "DevToolsActivePort";
const PORT_FILE_ATTEMPTS: u32 = 50;
const PORT_FILE_INTERVAL: Duration = Duration::from_millis(200);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Navigation is considered settled once at most this many requests have
/// been in flight for the whole quiet window.
const MAX_IDLE_REQUESTS: usize = 2;
const NETWORK_QUIET_WINDOW: Duration = Duration::from_millis(500);

/// How long `close` waits for the browser to acknowledge shutdown before
/// killing the process.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

const STEALTH_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => false });";

// outerHTML omits the doctype; serialize it separately when present.
const CONTENT_SCRIPT: &str = r#"(document.doctype ? new XMLSerializer().serializeToString(document.doctype) + '\n' : '') + document.documentElement.outerHTML"#;

static PROFILE_COUNTER: AtomicU64 = AtomicU64::new(0);

// ── Launcher ─────────────────────────────────────────────────────────────────

pub struct ChromeLauncher {
    chrome_bin: Option<PathBuf>,
    headless: bool,
    user_agent: String,
}

impl ChromeLauncher {
    pub fn new(chrome_bin: Option<PathBuf>, headless: bool, user_agent: String) -> Self {
        Self {
            chrome_bin,
            headless,
            user_agent,
        }
    }

    fn resolve_chrome(&self) -> Result<PathBuf, BrowserError> {
        if let Some(path) = &self.chrome_bin {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(BrowserError::ChromeNotFound);
        }
        find_chrome().ok_or(BrowserError::ChromeNotFound)
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, profile: LaunchProfile) -> Result<Box<dyn PageDriver>, BrowserError> {
        let chrome_path = self.resolve_chrome()?;
        let profile_dir = std::env::temp_dir().join(format!(
            "chatgpt-share-api-{}-{}",
            std::process::id(),
            PROFILE_COUNTER.fetch_add(1, Ordering::SeqCst),
        ));
        tokio::fs::create_dir_all(&profile_dir)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        info!(
            "launching {} with {:?} profile",
            chrome_path.display(),
            profile
        );

        let mut cmd = Command::new(&chrome_path);
        cmd.arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .args(profile.chrome_args())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if self.headless {
            cmd.arg("--headless=new");
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
        debug!("chrome started, pid {:?}", child.id());

        match connect_page(&profile_dir, &self.user_agent, profile).await {
            Ok((cdp, events, session_id)) => Ok(Box::new(ChromePage {
                cdp,
                events,
                session_id,
                child,
                profile_dir,
                closed: false,
            })),
            Err(e) => {
                let _ = child.kill().await;
                let _ = tokio::fs::remove_dir_all(&profile_dir).await;
                Err(e)
            }
        }
    }
}

/// Find a Chrome executable on well-known paths.
pub fn find_chrome() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        let paths = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for path in &paths {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let paths = [
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ];
        for path in &paths {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let paths = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        for path in &paths {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

// ── Endpoint discovery and session setup ─────────────────────────────────────

async fn connect_page(
    profile_dir: &Path,
    user_agent: &str,
    profile: LaunchProfile,
) -> Result<(CdpConnection, mpsc::UnboundedReceiver<CdpEvent>, String), BrowserError> {
    let port = wait_for_devtools_port(profile_dir).await?;
    let endpoint = format!("http://127.0.0.1:{}", port);

    let version: BrowserVersion = reqwest::get(format!("{}/json/version", endpoint))
        .await?
        .json()
        .await?;
    debug!("connected to {}", version.browser);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let cdp = CdpConnection::connect(&version.web_socket_debugger_url, event_tx).await?;

    // Chrome requires PUT for /json/new.
    let client = reqwest::Client::new();
    let page: PageInfo = client
        .put(format!("{}/json/new", endpoint))
        .send()
        .await?
        .json()
        .await?;
    debug!("created page {} at {}", page.id, page.url);

    let attached = cdp
        .call(
            "Target.attachToTarget",
            Some(json!({"targetId": page.id, "flatten": true})),
            None,
        )
        .await?;
    let session_id = attached["sessionId"]
        .as_str()
        .ok_or_else(|| BrowserError::InvalidResponse("missing sessionId".to_string()))?
        .to_string();

    cdp.call("Page.enable", None, Some(&session_id)).await?;
    cdp.call("Runtime.enable", None, Some(&session_id)).await?;
    cdp.call("Network.enable", None, Some(&session_id)).await?;

    cdp.call(
        "Network.setUserAgentOverride",
        Some(json!({"userAgent": user_agent})),
        Some(&session_id),
    )
    .await?;

    if profile.stealth() {
        cdp.call(
            "Page.addScriptToEvaluateOnNewDocument",
            Some(json!({"source": STEALTH_SCRIPT})),
            Some(&session_id),
        )
        .await?;
    }

    Ok((cdp, event_rx, session_id))
}

/// Poll the profile directory for the `DevToolsActivePort` file Chrome
/// writes once its ephemeral debugging port is bound.
async fn wait_for_devtools_port(profile_dir: &Path) -> Result<u16, BrowserError> {
    let port_file = profile_dir.join(DEVTOOLS_PORT_FILE);
    for _ in 0..PORT_FILE_ATTEMPTS {
        if let Ok(contents) = tokio::fs::read_to_string(&port_file).await {
            if let Some(port) = parse_devtools_port(&contents) {
                return Ok(port);
            }
        }
        tokio::time::sleep(PORT_FILE_INTERVAL).await;
    }
    Err(BrowserError::LaunchFailed(
        "Chrome did not publish a DevTools port in time".to_string(),
    ))
}

/// First line of `DevToolsActivePort` is the bound port number.
fn parse_devtools_port(contents: &str) -> Option<u16> {
    contents.lines().next()?.trim().parse().ok()
}

/// Track the set of in-flight request ids from Network domain events.
fn note_network_event(inflight: &mut HashSet<String>, method: &str, params: &Value) {
    let request_id = match params.get("requestId").and_then(Value::as_str) {
        Some(id) => id,
        None => return,
    };
    match method {
        "Network.requestWillBeSent" => {
            inflight.insert(request_id.to_string());
        }
        "Network.loadingFinished" | "Network.loadingFailed" => {
            inflight.remove(request_id);
        }
        _ => {}
    }
}

// ── Page driver ──────────────────────────────────────────────────────────────

pub struct ChromePage {
    cdp: CdpConnection,
    events: mpsc::UnboundedReceiver<CdpEvent>,
    session_id: String,
    child: Child,
    profile_dir: PathBuf,
    closed: bool,
}

impl ChromePage {
    async fn session_call(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, BrowserError> {
        self.cdp.call(method, params, Some(&self.session_id)).await
    }

    async fn eval(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .session_call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let text = exception["text"].as_str().unwrap_or("Unknown error");
            return Err(BrowserError::JavaScript(text.to_string()));
        }

        Ok(result["result"]["value"].clone())
    }

    async fn wait_for_ready_state(&self, deadline: Instant) -> Result<(), BrowserError> {
        loop {
            let state = self.eval("document.readyState").await?;
            if let Some(state) = state.as_str() {
                if state == "complete" || state == "interactive" {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout("page load".to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait until at most `MAX_IDLE_REQUESTS` requests have been in flight
    /// continuously for the quiet window.
    async fn wait_for_network_idle(&mut self, deadline: Instant) -> Result<(), BrowserError> {
        let mut inflight: HashSet<String> = HashSet::new();
        let mut quiet_since = Some(Instant::now());

        loop {
            if let Some(since) = quiet_since {
                if since.elapsed() >= NETWORK_QUIET_WINDOW {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout("network idle".to_string()));
            }

            match tokio::time::timeout(POLL_INTERVAL, self.events.recv()).await {
                Ok(Some(event)) => {
                    let was_quiet = inflight.len() <= MAX_IDLE_REQUESTS;
                    note_network_event(&mut inflight, &event.method, &event.params);
                    let is_quiet = inflight.len() <= MAX_IDLE_REQUESTS;
                    if is_quiet && !was_quiet {
                        quiet_since = Some(Instant::now());
                    } else if !is_quiet {
                        quiet_since = None;
                    }
                }
                Ok(None) => return Err(BrowserError::SessionClosed),
                Err(_) => {}
            }
        }
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        info!("navigating to {}", url);

        let result = self
            .session_call("Page.navigate", Some(json!({"url": url})))
            .await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            if !error.is_empty() {
                return Err(BrowserError::NavigationFailed(error.to_string()));
            }
        }

        self.wait_for_ready_state(deadline).await?;
        self.wait_for_network_idle(deadline).await?;
        debug!("navigation settled for {}", url);
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, BrowserError> {
        let script = format!(
            "document.querySelector({}) !== null",
            serde_json::to_string(selector)?
        );
        let deadline = Instant::now() + timeout;

        loop {
            if self.eval(&script).await?.as_bool().unwrap_or(false) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError> {
        self.eval(script).await
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        let value = self.eval(CONTENT_SCRIPT).await?;
        Ok(value.as_str().unwrap_or("").to_string())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match tokio::time::timeout(CLOSE_GRACE, self.cdp.call("Browser.close", None, None)).await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Browser.close failed: {}", e),
            Err(_) => warn!("Browser.close timed out, killing the process"),
        }

        let _ = self.child.kill().await;
        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!("could not remove profile dir: {}", e);
        }
        debug!("browser closed");
        Ok(())
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        // Leak backstop for paths that never reached close(). The profile
        // dir goes too, or aborted requests pile them up under temp.
        if !self.closed {
            let _ = self.child.start_kill();
            let _ = std::fs::remove_dir_all(&self.profile_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devtools_port_parses() {
        assert_eq!(
            parse_devtools_port("39251\n/devtools/browser/uuid-here\n"),
            Some(39251)
        );
        assert_eq!(parse_devtools_port("0\n"), Some(0));
        assert_eq!(parse_devtools_port(""), None);
        assert_eq!(parse_devtools_port("not-a-port\n"), None);
    }

    #[test]
    fn network_events_update_inflight_set() {
        let mut inflight = HashSet::new();

        note_network_event(
            &mut inflight,
            "Network.requestWillBeSent",
            &json!({"requestId": "R1"}),
        );
        note_network_event(
            &mut inflight,
            "Network.requestWillBeSent",
            &json!({"requestId": "R2"}),
        );
        assert_eq!(inflight.len(), 2);

        // Repeat of the same id does not double-count.
        note_network_event(
            &mut inflight,
            "Network.requestWillBeSent",
            &json!({"requestId": "R1"}),
        );
        assert_eq!(inflight.len(), 2);

        note_network_event(
            &mut inflight,
            "Network.loadingFinished",
            &json!({"requestId": "R1"}),
        );
        note_network_event(
            &mut inflight,
            "Network.loadingFailed",
            &json!({"requestId": "R2"}),
        );
        assert!(inflight.is_empty());
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let mut inflight = HashSet::new();
        note_network_event(&mut inflight, "Page.loadEventFired", &json!({}));
        note_network_event(
            &mut inflight,
            "Network.responseReceived",
            &json!({"requestId": "R1"}),
        );
        assert!(inflight.is_empty());
    }

    #[test]
    fn content_script_preserves_the_doctype() {
        assert!(CONTENT_SCRIPT.contains("document.doctype"));
        assert!(CONTENT_SCRIPT.contains("XMLSerializer"));
        assert!(CONTENT_SCRIPT.ends_with("document.documentElement.outerHTML"));
    }

    #[test]
    fn find_chrome_smoke() {
        // May or may not locate a browser depending on the machine.
        let _ = find_chrome();
    }
}
