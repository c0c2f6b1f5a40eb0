//! Configuration types for document ingestion.
//!
//! All ingestion behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. One config is shared by every job of a batch,
//! including the sub-jobs of a decomposed input.

use crate::error::IngestError;
use crate::gateway::ExternalToolGateway;
use crate::layout::LayoutThresholds;
use crate::metadata::Metadata;
use crate::progress::ProgressCallback;
use crate::repository::Repository;
use folio_wbb::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for an ingestion run.
///
/// Built via [`IngestConfig::builder()`] or using [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use folio_ingest::{IngestConfig, OcrPolicy};
///
/// let config = IngestConfig::builder()
///     .concurrency(2)
///     .ocr(OcrPolicy::Always)
///     .summary_length(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Number of documents processed at once. Default: 4.
    ///
    /// Each job runs on its own blocking worker, so this also bounds how many
    /// external tools can be running at the same time.
    pub concurrency: usize,

    /// Directory under which job folders are created. Default: system temp.
    pub work_root: Option<PathBuf>,

    /// Hand finished folders to the repository. Default: false.
    ///
    /// Without upload the finished folder is kept and returned to the caller.
    pub upload: bool,

    /// Submit a placeholder document before page images are made, and mark
    /// the final submission as its replacement. Only honoured with `upload`.
    pub early_upload: bool,

    /// When to run OCR over the page images. Default: [`OcrPolicy::WhenNeeded`].
    pub ocr: OcrPolicy,

    /// The document is known to contain no text; skip text extraction.
    pub no_text: bool,

    /// Score extracted text with the external scorer and discard it when the
    /// score is worse than `text_quality_threshold`. Default: true.
    pub check_text_quality: bool,

    /// Highest acceptable score from the text scorer (lower is better).
    /// Negative scores are always rejected. Default: 400.
    pub text_quality_threshold: i32,

    /// Re-encode page images by colour content. Default: true.
    pub optimize_images: bool,

    /// Keep pages of a single colour instead of dropping them. Default: false.
    pub save_blank_pages: bool,

    /// Ask the gateway to deskew page images. Default: false.
    pub deskew: bool,

    /// Ask the gateway to remove scanner noise from page images. Default: false.
    pub dryclean: bool,

    /// Rasterize page-description formats in colour. Default: true.
    pub color: bool,

    /// Rotate, pad or scale odd-sized pages to the document's dominant page
    /// size. Default: true.
    pub canonical_page_size: bool,

    /// Resolution for rasterizing page-description formats. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Resolution assumed for raster inputs that do not declare one. Default: 75.
    pub default_raw_dpi: u32,

    /// Maximum summary length in characters. Default: 250.
    pub summary_length: usize,

    /// Content language written to `contents.txt`. Default: "en-US".
    pub language: String,

    /// Sidecar format version to write. Default: [`Version::V2`].
    pub sidecar_version: Version,

    /// Per-tool-call timeout in seconds. Default: 300.
    pub tool_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// How long an out-of-band pass waits for a folder lock. Default: 30.
    pub lock_timeout_secs: u64,

    /// Parser name that bypasses detection.
    pub format: Option<String>,

    /// Caller-supplied metadata applied to every document.
    pub metadata: Metadata,

    /// Caller keys the pipeline may overwrite with values it derives.
    pub overridable_keys: BTreeSet<String>,

    /// Layout reconstruction thresholds.
    pub layout: LayoutThresholds,

    /// Text printed on scan separator sheets.
    pub separator_marker: String,

    /// How many times the marker must appear on one page for it to count as
    /// a separator sheet. Default: 4.
    pub separator_repeat: usize,

    /// Optional per-job progress callback.
    pub progress_callback: Option<ProgressCallback>,

    /// External tools. `None` runs with no tools at all.
    pub gateway: Option<Arc<dyn ExternalToolGateway>>,

    /// Persistence collaborator used when `upload` is set.
    pub repository: Option<Arc<dyn Repository>>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            work_root: None,
            upload: false,
            early_upload: false,
            ocr: OcrPolicy::default(),
            no_text: false,
            check_text_quality: true,
            text_quality_threshold: 400,
            optimize_images: true,
            save_blank_pages: false,
            deskew: false,
            dryclean: false,
            color: true,
            canonical_page_size: true,
            dpi: 300,
            default_raw_dpi: 75,
            summary_length: 250,
            language: "en-US".to_string(),
            sidecar_version: Version::V2,
            tool_timeout_secs: 300,
            download_timeout_secs: 120,
            lock_timeout_secs: 30,
            format: None,
            metadata: Metadata::new(),
            overridable_keys: BTreeSet::new(),
            layout: LayoutThresholds::default(),
            separator_marker: "Scan Separator Sheet".to_string(),
            separator_repeat: 4,
            progress_callback: None,
            gateway: None,
            repository: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("concurrency", &self.concurrency)
            .field("work_root", &self.work_root)
            .field("upload", &self.upload)
            .field("early_upload", &self.early_upload)
            .field("ocr", &self.ocr)
            .field("no_text", &self.no_text)
            .field("check_text_quality", &self.check_text_quality)
            .field("text_quality_threshold", &self.text_quality_threshold)
            .field("optimize_images", &self.optimize_images)
            .field("save_blank_pages", &self.save_blank_pages)
            .field("dpi", &self.dpi)
            .field("language", &self.language)
            .field("sidecar_version", &self.sidecar_version)
            .field("format", &self.format)
            .field("metadata", &self.metadata)
            .field("gateway", &self.gateway.as_ref().map(|_| "<dyn ExternalToolGateway>"))
            .field("repository", &self.repository.as_ref().map(|r| r.name()))
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Whether the pipeline may write `key` over a caller-supplied value.
    pub fn may_override(&self, key: &str) -> bool {
        !self.metadata.contains(key) || self.overridable_keys.contains(key)
    }
}

/// Builder for [`IngestConfig`].
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl fmt::Debug for IngestConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl IngestConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn work_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_root = Some(dir.into());
        self
    }

    pub fn upload(mut self, v: bool) -> Self {
        self.config.upload = v;
        self
    }

    pub fn early_upload(mut self, v: bool) -> Self {
        self.config.early_upload = v;
        self
    }

    pub fn ocr(mut self, policy: OcrPolicy) -> Self {
        self.config.ocr = policy;
        self
    }

    pub fn no_text(mut self, v: bool) -> Self {
        self.config.no_text = v;
        self
    }

    pub fn check_text_quality(mut self, v: bool) -> Self {
        self.config.check_text_quality = v;
        self
    }

    pub fn text_quality_threshold(mut self, score: i32) -> Self {
        self.config.text_quality_threshold = score;
        self
    }

    pub fn optimize_images(mut self, v: bool) -> Self {
        self.config.optimize_images = v;
        self
    }

    pub fn save_blank_pages(mut self, v: bool) -> Self {
        self.config.save_blank_pages = v;
        self
    }

    pub fn deskew(mut self, v: bool) -> Self {
        self.config.deskew = v;
        self
    }

    pub fn dryclean(mut self, v: bool) -> Self {
        self.config.dryclean = v;
        self
    }

    pub fn color(mut self, v: bool) -> Self {
        self.config.color = v;
        self
    }

    pub fn canonical_page_size(mut self, v: bool) -> Self {
        self.config.canonical_page_size = v;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn default_raw_dpi(mut self, dpi: u32) -> Self {
        self.config.default_raw_dpi = dpi.max(1);
        self
    }

    pub fn summary_length(mut self, n: usize) -> Self {
        self.config.summary_length = n;
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn sidecar_version(mut self, v: Version) -> Self {
        self.config.sidecar_version = v;
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tool_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn lock_timeout_secs(mut self, secs: u64) -> Self {
        self.config.lock_timeout_secs = secs;
        self
    }

    pub fn format(mut self, name: impl Into<String>) -> Self {
        self.config.format = Some(name.into());
        self
    }

    pub fn metadata(mut self, md: Metadata) -> Self {
        self.config.metadata = md;
        self
    }

    /// Add one caller metadata field.
    pub fn metadata_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.config.metadata.set(key, value);
        self
    }

    pub fn overridable_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.overridable_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn layout(mut self, thresholds: LayoutThresholds) -> Self {
        self.config.layout = thresholds;
        self
    }

    pub fn separator_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.separator_marker = marker.into();
        self
    }

    pub fn separator_repeat(mut self, n: usize) -> Self {
        self.config.separator_repeat = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn ExternalToolGateway>) -> Self {
        self.config.gateway = Some(gateway);
        self
    }

    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.config.repository = Some(repository);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(IngestError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(IngestError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.upload && c.repository.is_none() {
            return Err(IngestError::InvalidConfig(
                "upload requested but no repository configured".into(),
            ));
        }
        if c.separator_marker.trim().is_empty() {
            return Err(IngestError::InvalidConfig(
                "separator marker must not be empty".into(),
            ));
        }
        if let Some(root) = &c.work_root {
            if root.exists() && !root.is_dir() {
                return Err(IngestError::InvalidConfig(format!(
                    "work root '{}' is not a directory",
                    root.display()
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// When OCR runs over a document's page images.
///
/// | Policy | Behaviour |
/// |--------|-----------|
/// | `Never` | Text comes only from extractors; documents without text stay empty |
/// | `WhenNeeded` | OCR when extraction yields nothing or is rejected (default) |
/// | `Always` | Skip extractors and OCR every document |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OcrPolicy {
    Never,
    #[default]
    WhenNeeded,
    Always,
}

impl std::str::FromStr for OcrPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(OcrPolicy::Never),
            "when-needed" | "auto" => Ok(OcrPolicy::WhenNeeded),
            "always" => Ok(OcrPolicy::Always),
            other => Err(format!("unknown OCR policy '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = IngestConfig::default();
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.dpi, 300);
        assert_eq!(c.default_raw_dpi, 75);
        assert_eq!(c.summary_length, 250);
        assert_eq!(c.ocr, OcrPolicy::WhenNeeded);
        assert_eq!(c.sidecar_version, Version::V2);
        assert!(!c.upload);
        assert!(c.optimize_images);
    }

    #[test]
    fn setters_clamp() {
        let c = IngestConfig::builder()
            .dpi(10)
            .concurrency(0)
            .separator_repeat(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 72);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.separator_repeat, 1);
    }

    #[test]
    fn upload_needs_repository() {
        let err = IngestConfig::builder().upload(true).build().unwrap_err();
        assert!(matches!(err, IngestError::InvalidConfig(_)));
    }

    #[test]
    fn caller_metadata_protected_unless_overridable() {
        let c = IngestConfig::builder()
            .metadata_field("title", "Mine")
            .metadata_field("date", "1/1/2000")
            .overridable_keys(["date"])
            .build()
            .unwrap();
        assert!(!c.may_override("title"));
        assert!(c.may_override("date"));
        assert!(c.may_override("summary"));
    }

    #[test]
    fn ocr_policy_parses() {
        assert_eq!("always".parse::<OcrPolicy>().unwrap(), OcrPolicy::Always);
        assert_eq!("auto".parse::<OcrPolicy>().unwrap(), OcrPolicy::WhenNeeded);
        assert!("sometimes".parse::<OcrPolicy>().is_err());
    }
}
