//! DevTools wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outgoing command frame.
#[derive(Debug, Serialize)]
pub(crate) struct CdpRequest {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Incoming frame: a command response when `id` is set, an event otherwise.
#[derive(Debug, Deserialize)]
pub(crate) struct CdpMessage {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<CdpErrorBody>,
    pub method: Option<String>,
    pub params: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CdpErrorBody {
    pub code: i64,
    pub message: String,
}

/// Payload of `/json/version`.
///
/// Chrome returns PascalCase names for most fields on this endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct BrowserVersion {
    #[serde(rename = "Browser")]
    pub browser: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

/// Payload of `PUT /json/new`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    pub id: String,
    pub url: String,
}
