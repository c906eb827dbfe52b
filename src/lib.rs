//! search-sidecar: supervised JSON-RPC client for the search worker.
//!
//! This library owns the process boundary between the desktop app and the
//! sidecar worker that does the actual searching and indexing:
//!
//! - `ipc` - supervised, multiplexed JSON-RPC client over stdio
//! - `models` - typed request/result shapes for the worker's methods
//!
//! # IPC Module
//!
//! The `ipc` module is the entry point:
//!
//! ```ignore
//! use search_sidecar::ipc::SidecarClient;
//!
//! let client = SidecarClient::new();
//! let health = client.ping().await?;
//! let hits = client.search_query("cat pictures").await?;
//! ```

pub mod ipc;
pub mod models;
