//! Error types for the folio-ingest library.
//!
//! * [`IngestError`]: **fatal** for one job. The document cannot be ingested
//!   (no parser matched, a stage failed, the repository refused it).
//!   Returned inside [`crate::output::Outcome::Failed`] or as `Err` from
//!   helpers that operate on a single folder.
//!
//! * [`StageError`]: the underlying cause of a failed stage, carried inside
//!   [`IngestError::Process`] together with the stage and parser names.
//!
//! * [`SubJobFailure`]: **non-fatal**. One part of a decomposed input failed;
//!   its siblings are unaffected and the failure is reported alongside them.

use crate::gateway::ToolId;
use crate::pipeline::Stage;
use folio_wbb::WbbError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the folio-ingest library.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("input not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the input.
    #[error("permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Registry errors ───────────────────────────────────────────────────
    /// No registered parser recognised the input.
    #[error("no parser recognises '{path}'")]
    NoFormat { path: PathBuf },

    /// A forced format name does not match any registered parser.
    #[error("unknown format '{name}'")]
    UnknownFormat { name: String },

    /// Parser precedence constraints form a cycle.
    #[error("cyclic parser ordering constraints among: {}", parsers.join(", "))]
    OrderingConflict { parsers: Vec<String> },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// A pipeline stage failed.
    #[error("{stage} failed for parser {parser}: {source}")]
    Process {
        stage: Stage,
        parser: String,
        #[source]
        source: StageError,
    },

    /// A required external tool or service is not available.
    #[error("required resource '{resource}' is not available")]
    MissingResource { resource: String },

    // ── Repository errors ─────────────────────────────────────────────────
    /// The repository rejected our credentials.
    #[error("authentication with repository '{repository}' failed: {detail}")]
    Authentication { repository: String, detail: String },

    /// The repository could not be reached.
    #[error("cannot reach repository '{repository}': {detail}")]
    Connection { repository: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Process exit code for the CLI, one per error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            IngestError::Authentication { .. } => 3,
            IngestError::Connection { .. } => 2,
            IngestError::NoFormat { .. } | IngestError::UnknownFormat { .. } => 4,
            IngestError::Process { .. } | IngestError::MissingResource { .. } => 5,
            _ => 1,
        }
    }
}

/// The cause of a failed stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external tool ran but reported failure.
    #[error("{tool} exited with status {status}: {detail}")]
    Tool {
        tool: ToolId,
        status: i32,
        detail: String,
    },

    /// An external tool did not finish in time.
    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: ToolId, secs: u64 },

    /// An external tool the stage needs is not configured.
    #[error("{0} is not available")]
    Unsupported(ToolId),

    #[error("image error on '{path}': {detail}")]
    Image { path: PathBuf, detail: String },

    #[error(transparent)]
    Sidecar(#[from] WbbError),

    /// Another process holds the folder's advisory lock.
    #[error("folder is locked: '{path}'")]
    Locked { path: PathBuf },

    /// A tool or an input produced something we cannot interpret.
    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("{0}")]
    Other(String),
}

impl StageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A failed part of a decomposed input.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SubJobFailure {
    /// `original[start-end]`
    pub identifier: String,
    pub first_page: usize,
    pub last_page: usize,
    pub error: String,
}
