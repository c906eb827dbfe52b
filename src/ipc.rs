//! IPC layer: process-supervised, multiplexed JSON-RPC over stdio.
//!
//! The sidecar worker is a separate process spoken to over its standard
//! streams, one JSON object per line:
//!
//! ```text
//! ┌──────────────────┐        stdin/stdout         ┌──────────────────────────┐
//! │  SidecarClient   │ ◄──────────────────────────►│  the-search-thing-sidecar │
//! │  (this crate)    │   line-delimited JSON-RPC   │        (worker)           │
//! └──────────────────┘                             └──────────────────────────┘
//! ```
//!
//! Concurrent callers share one worker. Each request carries a unique id;
//! responses are matched back to their caller through the pending table,
//! so out-of-order completion is fine. The worker starts lazily on the
//! first call and restarts lazily after a crash, with every in-flight
//! request failed in between.
//!
//! # Usage
//!
//! ```ignore
//! use search_sidecar::ipc::SidecarClient;
//! use serde_json::json;
//!
//! let client = SidecarClient::new();
//! let result = client
//!     .call_default("search.query", Some(json!({"q": "cat"})))
//!     .await?;
//! ```

mod client;
mod codec;
mod launch;
mod pending;
mod supervisor;

pub use client::{RpcTransport, SidecarClient, SidecarError};
pub use codec::{decode_line, ErrorObject, Request, Response};
pub use launch::{LaunchResolver, LaunchSpec, SIDECAR_BINARY};
