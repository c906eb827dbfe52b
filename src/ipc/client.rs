//! Client façade for the sidecar: request ids, timeouts, typed wrappers.
//!
//! `SidecarClient` is the public entry point. Any number of tasks may
//! call it concurrently; the worker's stdin is a single serialized
//! stream, but responses are correlated by id, so calls overlap freely
//! and complete independently, in whatever order the sidecar answers.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::{timeout, Instant};

use super::codec::Request;
use super::launch::LaunchResolver;
use super::supervisor::Supervisor;
use crate::models::{
    HealthStatus, IndexJobStatus, IndexStartResult, SearchResponse, WalkTextBatchParams,
    WalkTextBatchResult,
};

/// Default per-call timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Everything that can go wrong between a caller and the sidecar.
///
/// Parsing faults on the worker's output are recovered locally and never
/// surface here; all of these are attributable to a specific caller (or,
/// for `ProcessFault`, to every caller with a request in flight).
#[derive(Debug, Error)]
pub enum SidecarError {
    /// Packaged install is missing its bundled worker binary. Fatal, not
    /// retried, and never falls back to development probing.
    #[error("sidecar binary not found at {}", .path.display())]
    LaunchNotFound { path: PathBuf },

    /// The worker process could not be started. Fails only the
    /// triggering call; the next call retries the spawn.
    #[error("failed to spawn sidecar: {source}{}", match .hint { Some(h) => format!(" ({h})"), None => String::new() })]
    SpawnFailed {
        #[source]
        source: io::Error,
        hint: Option<&'static str>,
    },

    /// Writing the request to the worker's stdin failed. Fails only this
    /// call.
    #[error("failed to send request to sidecar: {0}")]
    SendFailed(#[source] io::Error),

    /// The worker exited or errored with requests in flight. Every
    /// pending call fails with this; the next call restarts the worker.
    #[error("sidecar exited with code {}", match .code { Some(c) => c.to_string(), None => "unknown".to_string() })]
    ProcessFault { code: Option<i32> },

    /// No matching response within the call's timeout window. A late
    /// response for this id is dropped, not treated as an error.
    #[error("timed out after {}ms waiting for {method}", .elapsed.as_millis())]
    Timeout { method: String, elapsed: Duration },

    /// The worker returned a structured JSON-RPC error. Propagated with
    /// the worker's code, message, and data intact.
    #[error("sidecar error {code}: {message}")]
    Remote {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    /// Local encoding failure, or a typed wrapper received a result it
    /// could not deserialize.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// The call seam consumed by UI and storage layers.
///
/// Implemented by [`SidecarClient`]; an in-process implementation can be
/// swapped in without changing any caller code.
pub trait RpcTransport {
    fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, SidecarError>> + Send;
}

/// Multiplexed JSON-RPC client over a supervised sidecar process.
///
/// The worker is started lazily on the first call and restarted lazily
/// after a crash. Cloning is cheap and shares the same worker.
///
/// # Example
///
/// ```ignore
/// use search_sidecar::ipc::SidecarClient;
///
/// let client = SidecarClient::new();
/// let health = client.ping().await?;
/// let hits = client.search_query("cat").await?;
/// ```
#[derive(Debug, Clone)]
pub struct SidecarClient {
    supervisor: Supervisor,
    next_id: Arc<AtomicU64>,
    default_timeout: Duration,
}

impl SidecarClient {
    /// Client with launch resolution from the environment.
    pub fn new() -> Self {
        Self::with_resolver(LaunchResolver::from_env())
    }

    pub fn with_resolver(resolver: LaunchResolver) -> Self {
        Self {
            supervisor: Supervisor::new(resolver),
            next_id: Arc::new(AtomicU64::new(1)),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the default per-call timeout (20 seconds).
    pub fn set_default_timeout(&mut self, timeout: Duration) {
        self.default_timeout = timeout;
    }

    /// Send a JSON-RPC request and await its response.
    ///
    /// Allocates the next request id, registers the in-flight entry,
    /// writes the framed request, and resolves when the matching response
    /// arrives — or fails with `Timeout`, `SendFailed`, or a
    /// `ProcessFault` from a worker crash. Each call resolves exactly
    /// once.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        call_timeout: Duration,
    ) -> Result<Value, SidecarError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = Request::new(id, method, params).encode()?;
        let rx = self.supervisor.register_and_send(id, method, line).await?;

        let started = Instant::now();
        match timeout(call_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Completion slot dropped without a verdict: the bookkeeping
            // went away with the worker state.
            Ok(Err(_)) => Err(SidecarError::ProcessFault { code: None }),
            Err(_) => {
                self.supervisor.forget(id).await;
                Err(SidecarError::Timeout {
                    method: method.to_string(),
                    elapsed: started.elapsed(),
                })
            }
        }
    }

    /// [`call`](Self::call) with the client's default timeout.
    pub async fn call_default(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, SidecarError> {
        self.call(method, params, self.default_timeout).await
    }

    /// Forcibly terminate the worker. The next call restarts it.
    pub async fn stop(&self) {
        self.supervisor.stop().await;
    }

    /// Stdout lines discarded as malformed or uncorrelatable since this
    /// client was created. Diagnostic only.
    pub async fn dropped_line_count(&self) -> u64 {
        self.supervisor.dropped_lines().await
    }

    // ------------------------------------------------------------------
    // Typed wrappers over `call`: fixed method names and typed shapes,
    // no control flow of their own.
    // ------------------------------------------------------------------

    /// Health check: service identity, version, and mode flags.
    pub async fn ping(&self) -> Result<HealthStatus, SidecarError> {
        let value = self.call_default("health.ping", None).await?;
        decode_result("health.ping", value)
    }

    /// Free-text search.
    pub async fn search_query(&self, query: &str) -> Result<SearchResponse, SidecarError> {
        let value = self
            .call_default("search.query", Some(json!({ "q": query })))
            .await?;
        decode_result("search.query", value)
    }

    /// One page of a batched directory walk.
    pub async fn walk_text_batch(
        &self,
        params: WalkTextBatchParams,
    ) -> Result<WalkTextBatchResult, SidecarError> {
        let params = serde_json::to_value(params)
            .map_err(|err| SidecarError::Protocol(format!("failed to encode walk params: {err}")))?;
        let value = self.call_default("fs.walkTextBatch", Some(params)).await?;
        decode_result("fs.walkTextBatch", value)
    }

    /// Start a long-running index job over `dir`.
    pub async fn index_start(
        &self,
        dir: &str,
        batch_size: usize,
    ) -> Result<IndexStartResult, SidecarError> {
        let value = self
            .call_default(
                "index.start",
                Some(json!({ "dir": dir, "batch_size": batch_size })),
            )
            .await?;
        decode_result("index.start", value)
    }

    /// Poll a running index job.
    pub async fn index_status(&self, job_id: &str) -> Result<IndexJobStatus, SidecarError> {
        let value = self
            .call_default("index.status", Some(json!({ "job_id": job_id })))
            .await?;
        decode_result("index.status", value)
    }
}

impl Default for SidecarClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcTransport for SidecarClient {
    fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, SidecarError>> + Send {
        SidecarClient::call(self, method, params, timeout)
    }
}

fn decode_result<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, SidecarError> {
    serde_json::from_value(value)
        .map_err(|err| SidecarError::Protocol(format!("malformed {method} result: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let timeout_err = SidecarError::Timeout {
            method: "search.query".to_string(),
            elapsed: Duration::from_millis(250),
        };
        assert_eq!(
            timeout_err.to_string(),
            "timed out after 250ms waiting for search.query"
        );

        let fault = SidecarError::ProcessFault { code: Some(7) };
        assert_eq!(fault.to_string(), "sidecar exited with code 7");

        let fault = SidecarError::ProcessFault { code: None };
        assert_eq!(fault.to_string(), "sidecar exited with code unknown");

        let remote = SidecarError::Remote {
            code: -32601,
            message: "Method not found".to_string(),
            data: None,
        };
        assert_eq!(remote.to_string(), "sidecar error -32601: Method not found");
    }

    #[test]
    fn spawn_failed_display_includes_hint() {
        let err = SidecarError::SpawnFailed {
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            hint: Some("build the sidecar first"),
        };
        let message = err.to_string();
        assert!(message.contains("no such file"));
        assert!(message.contains("build the sidecar first"));

        let err = SidecarError::SpawnFailed {
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            hint: None,
        };
        assert!(!err.to_string().contains('('));
    }

    #[test]
    fn request_ids_are_monotonic() {
        let client = SidecarClient::with_resolver(LaunchResolver::fixed("true", Vec::new()));
        let first = client.next_id.fetch_add(1, Ordering::Relaxed);
        let second = client.next_id.fetch_add(1, Ordering::Relaxed);
        assert!(second > first);
    }
}
