//! DevTools WebSocket connection with id-correlated calls and an event
//! channel for the attached page session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};

use super::protocol::{CdpMessage, CdpRequest};
use super::BrowserError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Pending request waiting for its response frame.
struct PendingRequest {
    tx: oneshot::Sender<Result<Value, BrowserError>>,
}

/// Event frame forwarded to the page driver.
#[derive(Debug)]
pub(crate) struct CdpEvent {
    pub method: String,
    pub params: Value,
}

pub(crate) struct CdpConnection {
    ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
    request_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    recv_task: tokio::task::JoinHandle<()>,
}

impl CdpConnection {
    /// Connect to the browser's WebSocket debugger endpoint. Event frames
    /// are forwarded to `events`; response frames complete pending calls.
    pub(crate) async fn connect(
        ws_url: &str,
        events: mpsc::UnboundedSender<CdpEvent>,
    ) -> Result<Self, BrowserError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::ConnectionFailed(format!("WebSocket: {}", e)))?;

        let (ws_sink, ws_source) = ws_stream.split();
        let pending: Arc<Mutex<HashMap<u64, PendingRequest>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let recv_task = {
            let pending = pending.clone();
            tokio::spawn(async move {
                receive_loop(ws_source, pending, events).await;
            })
        };

        debug!("cdp connected to {}", ws_url);

        Ok(Self {
            ws_tx: Arc::new(tokio::sync::Mutex::new(ws_sink)),
            request_id: AtomicU64::new(1),
            pending,
            recv_task,
        })
    }

    /// Send a command and wait for its response.
    pub(crate) async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
    ) -> Result<Value, BrowserError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request = CdpRequest {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(|s| s.to_string()),
        };

        let json = serde_json::to_string(&request)?;
        trace!("cdp send: {}", json);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, PendingRequest { tx });

        {
            let mut ws = self.ws_tx.lock().await;
            if let Err(e) = ws.send(Message::Text(json.into())).await {
                // Nothing will ever answer a frame that never went out.
                self.pending.lock().remove(&id);
                return Err(e.into());
            }
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BrowserError::SessionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(BrowserError::Timeout(format!("{} call timed out", method)))
            }
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

async fn receive_loop(
    mut ws_source: WsSource,
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    events: mpsc::UnboundedSender<CdpEvent>,
) {
    while let Some(msg) = ws_source.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                trace!("cdp recv: {}", text);
                let frame = match serde_json::from_str::<CdpMessage>(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("unparseable cdp frame: {}", e);
                        continue;
                    }
                };

                if let Some(id) = frame.id {
                    if let Some(req) = pending.lock().remove(&id) {
                        let result = match frame.error {
                            Some(error) => Err(BrowserError::Protocol {
                                code: error.code,
                                message: error.message,
                            }),
                            None => Ok(frame.result.unwrap_or(Value::Null)),
                        };
                        let _ = req.tx.send(result);
                    }
                } else if let Some(method) = frame.method {
                    let _ = events.send(CdpEvent {
                        method,
                        params: frame.params.unwrap_or(Value::Null),
                    });
                }
            }
            Ok(Message::Close(_)) => {
                debug!("cdp socket closed");
                break;
            }
            Err(e) => {
                error!("cdp socket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Wake every in-flight call so callers see SessionClosed instead of a
    // full call timeout.
    pending.lock().clear();
}
