//! Typed shapes for the sidecar's collaborator-facing surface.
//!
//! These structs match the JSON the sidecar worker produces and consumes.
//! Field casing follows the wire: `fs.walkTextBatch` speaks camelCase on
//! both sides, everything else snake_case.

use serde::{Deserialize, Serialize};

/// Result of `health.ping`: service identity, version, and mode flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ok: bool,
    pub service: String,
    pub version: String,
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default)]
    pub index_mode: Option<String>,
    #[serde(default)]
    pub search_mode: Option<String>,
}

/// One hit from `search.query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub label: String,
    #[serde(default)]
    pub content: Option<String>,
    pub path: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// Result of `search.query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

/// Parameters for `fs.walkTextBatch`.
///
/// `cursor` is opaque to callers: pass 0 to start, then the cursor from
/// the previous page until `done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkTextBatchParams {
    pub dir: String,
    pub text_exts: Vec<String>,
    #[serde(default)]
    pub ignore_exts: Vec<String>,
    #[serde(default)]
    pub ignore_files: Vec<String>,
    pub cursor: usize,
    pub batch_size: usize,
}

/// One page of `fs.walkTextBatch`: (path, text) pairs plus the resume
/// cursor and a completion flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkTextBatchResult {
    pub batch: Vec<(String, String)>,
    pub cursor: usize,
    pub done: bool,
    pub scanned_count: usize,
    pub skipped_count: usize,
}

/// Result of `index.start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStartResult {
    pub success: bool,
    pub job_id: String,
}

/// Result of `index.status`: per-media-type progress counters plus the
/// job's phase and status strings. Timestamps are the worker's free-form
/// clock strings and are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexJobStatus {
    pub job_id: String,
    pub dir: String,
    pub status: String,
    pub phase: String,
    pub batch_size: usize,
    pub text_found: usize,
    pub text_indexed: usize,
    pub text_errors: usize,
    pub text_skipped: usize,
    pub video_found: usize,
    pub video_indexed: usize,
    pub video_errors: usize,
    pub video_skipped: usize,
    pub image_found: usize,
    pub image_indexed: usize,
    pub image_errors: usize,
    pub image_skipped: usize,
    pub message: String,
    pub error: String,
    pub started_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
}
