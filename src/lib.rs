//! # folio-ingest
//!
//! Turn arbitrary source files (scans, PDFs, office documents, web pages,
//! images, plain text) into canonical document folders: page images,
//! extracted text, a word-geometry sidecar, a paragraph index and metadata.
//!
//! ## Why this crate?
//!
//! Every input format needs a different converter, and several converters
//! often claim the same file. The [`ParserRegistry`] orders them by declared
//! precedence so the most specific one wins, and a single staged pipeline
//! then produces the same folder layout whatever the input was. Text comes
//! with per-word geometry wherever the extractor can supply it, which is what
//! makes paragraph reconstruction and duplicate detection possible later.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input (file, directory or URL)
//!  │
//!  ├─ 1. Select    parser registry, precedence-ordered detection
//!  ├─ 2. Copy      originals/ + SHA-256 fingerprint
//!  ├─ 3. Images    rasterize / convert / decode → page-images/pageNNNNN.png
//!  ├─ 4. Optimize  colour buckets, blank-page removal, page-size normalisation
//!  ├─ 5. Text      word boxes → plain text → quality check → OCR
//!  ├─ 6. Layout    lines → paragraphs → paragraphs.txt + paragraph-ids
//!  ├─ 7. Summary   summary.txt, links/
//!  └─ 8. Output    metadata.txt, kept folder or repository upload
//! ```
//!
//! A scan holding several documents separated by marker sheets decomposes
//! into one job per part, identified as `original[start-end]`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folio_ingest::{ingest, IngestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Tools come from the TOML table named by FOLIO_TOOLS
//!     let config = IngestConfig::default();
//!     for result in ingest("scan.tiff", &config).await? {
//!         for doc in result.outcome.documents() {
//!             println!("{} -> {:?} ({} pages)", doc.identifier, doc.folder, doc.stats.page_count);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `folio` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! folio-ingest = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod layout;
pub mod metadata;
pub mod output;
pub mod parsers;
pub mod pipeline;
pub mod progress;
pub mod raster;
pub mod registry;
pub mod repository;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder, OcrPolicy};
pub use error::{IngestError, StageError, SubJobFailure};
pub use gateway::{
    CommandGateway, ExternalToolGateway, GatewayConfig, GatewayError, ToolId, ToolOutput, ToolRequest,
};
pub use ingest::{ingest, ingest_all, ingest_sync, ingest_with, reindex};
pub use layout::LayoutThresholds;
pub use metadata::Metadata;
pub use output::{IngestedDocument, InputResult, JobStats, Outcome, TextSource};
pub use pipeline::Stage;
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use registry::{Detection, ParserDescriptor, ParserRegistry, RegistryBuilder, Selection, SourceKind};
pub use repository::{DirectoryRepository, DocId, Repository, RepositoryError};
