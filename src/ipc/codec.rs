//! Line-delimited JSON-RPC 2.0 codec for the sidecar wire protocol.
//!
//! The sidecar speaks one JSON object per line over stdin/stdout:
//!
//! ```text
//! -> {"jsonrpc":"2.0","id":1,"method":"health.ping"}
//! <- {"jsonrpc":"2.0","id":1,"result":{"ok":true,...}}
//! ```
//!
//! Encoding appends the trailing newline. Decoding is deliberately
//! forgiving: lines that fail to parse, or parse to something without an
//! integer `id`, yield `None` so the reader can log and move on without
//! ever tearing down the connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::client::SidecarError;

/// A JSON-RPC 2.0 request, serialized to a single newline-terminated line.
///
/// `params` is omitted from the wire entirely when `None` rather than
/// serialized as `null`; the sidecar distinguishes the two.
#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }

    /// Serialize to the wire format, including the trailing newline.
    pub fn encode(&self) -> Result<String, SidecarError> {
        let mut line = serde_json::to_string(self)
            .map_err(|err| SidecarError::Protocol(format!("failed to encode request: {err}")))?;
        line.push('\n');
        Ok(line)
    }
}

/// The `error` member of a JSON-RPC response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A decoded, correlatable response line.
#[derive(Debug)]
pub struct Response {
    pub id: u64,
    pub outcome: Result<Value, ErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

/// Decode one line of sidecar stdout.
///
/// Returns `None` for blank lines, unparseable JSON, and messages whose
/// `id` is not an integer (server-initiated notifications fall in the
/// last bucket; this client never sends notification-style requests, so
/// there is nothing to correlate them to).
pub fn decode_line(line: &str) -> Option<Response> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let raw: RawResponse = match serde_json::from_str(trimmed) {
        Ok(raw) => raw,
        Err(err) => {
            warn!("discarding unparseable sidecar line: {err}");
            return None;
        }
    };

    let id = match raw.id.as_ref().and_then(Value::as_u64) {
        Some(id) => id,
        None => {
            debug!("discarding sidecar message without integer id");
            return None;
        }
    };

    let outcome = match raw.error {
        Some(error) => Err(error),
        // A response with neither member resolves to null, matching the
        // sidecar's behavior for methods that return nothing.
        None => Ok(raw.result.unwrap_or(Value::Null)),
    };

    Some(Response { id, outcome })
}
