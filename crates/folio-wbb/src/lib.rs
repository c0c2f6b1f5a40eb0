//! # folio-wbb
//!
//! Reader and writer for the `wordbboxes` sidecar: a compact, versioned binary
//! file that aligns every extracted word's geometry with a byte offset into
//! the document's companion text stream (`contents.txt`).
//!
//! ```text
//! extractor listing ──► listing::parse ──► SidecarWriter ──► wordbboxes + contents.txt
//!                                                             │
//!                          dedup::clean_overlays ◄────────────┘
//! ```
//!
//! ## File layout
//!
//! | bytes | content |
//! |-------|---------|
//! | 0–11  | `UpLib:wbb:` + version digit + NUL |
//! | 12–   | fixed-size records, 24 bytes (v1) or 28 bytes (v2) |
//!
//! A record of all zero bytes marks a page boundary. Offsets count bytes from
//! the start of the text body, i.e. after the two header lines of
//! `contents.txt`.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod contents;
pub mod dedup;
pub mod error;
pub mod listing;
pub mod record;
pub mod sidecar;
pub mod words;
pub mod writer;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use contents::TextStream;
pub use dedup::{clean_overlays, remove_duplicates, DedupReport};
pub use error::WbbError;
pub use listing::ExtractedWord;
pub use record::{WordBox, WordFlags};
pub use sidecar::{Sidecar, Version};
pub use words::{page_words, Word};
pub use writer::SidecarWriter;

/// File name of the sidecar inside a document folder.
pub const SIDECAR_FILE: &str = "wordbboxes";

/// File name of the companion text stream inside a document folder.
pub const CONTENTS_FILE: &str = "contents.txt";
