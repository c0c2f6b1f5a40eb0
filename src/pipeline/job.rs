//! The per-document driver: runs every stage in order for one job.
//!
//! A job owns a private working folder from start to finish. The folder is a
//! [`WorkFolder`], removed on drop, so every exit path cleans up unless the
//! driver deliberately keeps it:
//!
//! | exit                         | folder    |
//! |------------------------------|-----------|
//! | persisted to a repository    | removed   |
//! | finished, not uploading      | kept      |
//! | failed while uploading       | removed   |
//! | failed, not uploading        | kept      |
//! | split into sub-documents     | removed   |

use super::{images, links, originals, split, summary, text, upload, Stage, ORIGINALS_DIR};
use crate::config::IngestConfig;
use crate::error::{IngestError, StageError};
use crate::gateway::ExternalToolGateway;
use crate::metadata::{
    Metadata, METADATA_FILE, MIME_TYPE, PAGE_COUNT, SHA_HASH, TITLE, TITLE_IS_FILEPATH,
};
use crate::output::{IngestedDocument, JobStats};
use crate::registry::{JobOptions, ParserDescriptor, Selection, SourceKind};
use crate::repository::DocId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{info, warn};

/// Shared, read-only services for every job of a batch.
#[derive(Clone, Copy)]
pub struct JobContext<'a> {
    pub config: &'a IngestConfig,
    pub gateway: &'a dyn ExternalToolGateway,
}

impl JobContext<'_> {
    fn report(&self, identifier: &str, stage: Stage) {
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage(identifier, stage);
        }
    }

    /// Directory for job folders and scratch space.
    pub fn work_root(&self) -> PathBuf {
        self.config
            .work_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// What to ingest: one selected input and the caller metadata it gets.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Input path, or `original[start-end]` for a part.
    pub identifier: String,
    pub selection: Selection,
    pub caller_metadata: Metadata,
}

impl JobSpec {
    pub fn new(selection: Selection, caller_metadata: Metadata) -> Self {
        Self {
            identifier: selection.path.display().to_string(),
            selection,
            caller_metadata,
        }
    }
}

/// A job's working folder, deleted on drop unless [`keep`](Self::keep) is
/// called.
#[derive(Debug)]
pub struct WorkFolder(TempDir);

impl WorkFolder {
    pub fn create(root: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        tempfile::Builder::new()
            .prefix("folio-")
            .tempdir_in(root)
            .map(WorkFolder)
    }

    pub fn path(&self) -> &Path {
        self.0.path()
    }

    /// Stop tracking the folder and return its path.
    pub fn keep(self) -> PathBuf {
        self.0.keep()
    }
}

/// Mutable state of one document's trip through the stages.
pub struct Job {
    pub identifier: String,
    pub source: PathBuf,
    pub parser: Arc<dyn ParserDescriptor>,
    pub options: JobOptions,
    pub folder: WorkFolder,
    /// Tool outputs that do not belong in the finished folder.
    pub scratch: TempDir,
    /// Fields derived by the stages.
    pub metadata: Metadata,
    pub caller_metadata: Metadata,
    pub stats: JobStats,
    /// The page-description file text extraction reads, once there is one.
    pub pdf: Option<PathBuf>,
    /// 1-based source pages removed as blank.
    pub dropped_pages: Vec<usize>,
    pub early_id: Option<DocId>,
}

impl Job {
    pub fn kind(&self) -> SourceKind {
        self.parser.kind()
    }

    pub fn path(&self) -> &Path {
        self.folder.path()
    }

    fn fail(&self, stage: Stage, source: StageError) -> IngestError {
        match source {
            StageError::Unsupported(tool) => IngestError::MissingResource {
                resource: tool.to_string(),
            },
            source => IngestError::Process {
                stage,
                parser: self.parser.name().to_string(),
                source,
            },
        }
    }
}

/// How a job ended when it did not fail.
#[derive(Debug)]
pub enum JobOutcome {
    Done(IngestedDocument),
    /// The input holds several documents; run each part as its own job.
    Split(split::SplitPlan),
}

fn run_stage<T>(
    job: &mut Job,
    ctx: &JobContext<'_>,
    stage: Stage,
    f: impl FnOnce(&mut Job, &JobContext<'_>) -> Result<T, StageError>,
) -> Result<T, IngestError> {
    info!("{}: {}", job.identifier, stage);
    ctx.report(&job.identifier, stage);
    f(job, ctx).map_err(|e| job.fail(stage, e))
}

/// Run every stage for one selected input. Blocking; call it from a worker
/// thread.
pub fn run_job(spec: JobSpec, ctx: &JobContext<'_>) -> Result<JobOutcome, IngestError> {
    let started = Instant::now();
    let JobSpec {
        identifier,
        selection,
        caller_metadata,
    } = spec;
    ctx.report(&identifier, Stage::Init);

    let root = ctx.work_root();
    let folder = WorkFolder::create(&root)
        .map_err(|e| IngestError::Internal(format!("cannot create job folder: {e}")))?;
    let scratch = tempfile::Builder::new()
        .prefix("folio-scratch-")
        .tempdir_in(&root)
        .map_err(|e| IngestError::Internal(format!("cannot create scratch folder: {e}")))?;

    let mut job = Job {
        identifier,
        source: selection.path,
        parser: selection.parser,
        options: selection.options,
        folder,
        scratch,
        metadata: Metadata::new(),
        caller_metadata,
        stats: JobStats::default(),
        pdf: None,
        dropped_pages: Vec::new(),
        early_id: None,
    };
    info!(
        "{}: ingesting with {} into {}",
        job.identifier,
        job.parser.name(),
        job.path().display()
    );

    match drive(&mut job, ctx, started) {
        Ok(JobOutcome::Done(mut doc)) => {
            if !ctx.config.upload {
                let kept = job.folder.keep();
                info!("{}: document folder at {}", doc.identifier, kept.display());
                doc.folder = Some(kept);
            }
            Ok(JobOutcome::Done(doc))
        }
        Ok(split) => Ok(split),
        Err(e) => {
            if ctx.config.upload {
                warn!("{}: {}", job.identifier, e);
            } else {
                let kept = job.folder.keep();
                warn!("{}: {} (folder kept at {})", job.identifier, e, kept.display());
            }
            Err(e)
        }
    }
}

fn drive(job: &mut Job, ctx: &JobContext<'_>, started: Instant) -> Result<JobOutcome, IngestError> {
    let config = ctx.config;

    // ── Step 1: Copy original ────────────────────────────────────────────
    run_stage(job, ctx, Stage::CopyOriginal, |j, _| {
        originals::copy_original(&j.source, j.folder.path(), j.kind())
    })?;

    // ── Step 2: Fingerprint ──────────────────────────────────────────────
    let hash = run_stage(job, ctx, Stage::Fingerprint, |j, _| {
        originals::fingerprint_tree(&j.path().join(ORIGINALS_DIR))
    })?;
    job.metadata.set(SHA_HASH, hash);

    // ── Step 3: Early upload ─────────────────────────────────────────────
    if config.upload && config.early_upload && !job.parser.splittable() {
        info!("{}: {}", job.identifier, Stage::EarlyUpload);
        ctx.report(&job.identifier, Stage::EarlyUpload);
        upload::early_upload(job, ctx)?;
    }

    // ── Step 4: Page images ──────────────────────────────────────────────
    run_stage(job, ctx, Stage::PageImages, images::page_images)?;

    // ── Step 5: Optimize page images ─────────────────────────────────────
    if job.kind() != SourceKind::Prepared
        && (config.optimize_images || config.deskew || config.dryclean)
    {
        run_stage(job, ctx, Stage::OptimizeImages, images::optimize)?;
    }

    // ── Step 6: Text ─────────────────────────────────────────────────────
    let separators = run_stage(job, ctx, Stage::TextExtraction, text::extract_text)?;
    if !separators.is_empty() {
        let plan = run_stage(job, ctx, Stage::TextExtraction, |j, c| split::plan(j, c, &separators))?;
        info!(
            "{}: separator sheets on pages {:?}, {} parts",
            job.identifier,
            separators,
            plan.parts.len()
        );
        return Ok(JobOutcome::Split(plan));
    }

    // ── Step 7: Summary ──────────────────────────────────────────────────
    run_stage(job, ctx, Stage::Summarize, summary::summarize)?;

    // ── Step 8: Links ────────────────────────────────────────────────────
    if job.parser.has_links() {
        run_stage(job, ctx, Stage::LinkExtraction, links::extract_links)?;
    }

    // ── Step 9: Metadata ─────────────────────────────────────────────────
    let metadata = run_stage(job, ctx, Stage::WriteMetadata, write_metadata)?;

    // ── Step 10: Persist ─────────────────────────────────────────────────
    info!("{}: {}", job.identifier, Stage::Persist);
    ctx.report(&job.identifier, Stage::Persist);
    let doc_id = if config.upload {
        Some(upload::persist(job, ctx, &metadata)?)
    } else {
        None
    };

    job.stats.duration_ms = started.elapsed().as_millis() as u64;
    ctx.report(&job.identifier, Stage::Done);
    info!(
        "{}: done, {} pages, text from {}",
        job.identifier, job.stats.page_count, job.stats.text_source
    );

    Ok(JobOutcome::Done(IngestedDocument {
        identifier: job.identifier.clone(),
        parser: job.parser.name().to_string(),
        folder: None,
        doc_id: doc_id.map(|id| id.0),
        metadata,
        stats: job.stats.clone(),
    }))
}

/// Merge folder, stage and caller metadata and write `metadata.txt`.
///
/// Caller values win over stage values unless the key is listed as
/// overridable.
pub(crate) fn write_metadata(job: &mut Job, ctx: &JobContext<'_>) -> Result<Metadata, StageError> {
    let path = job.path().join(METADATA_FILE);
    let mut md = Metadata::read(&path).map_err(|e| StageError::io(&path, e))?;
    md.extend(&job.metadata);
    for (key, value) in job.caller_metadata.iter() {
        let stage_wins = job.metadata.contains(key) && ctx.config.overridable_keys.contains(key);
        if !stage_wins {
            md.set(key, value);
        }
    }

    md.set_default(MIME_TYPE, job.parser.media_type_of(&job.source));
    if !md.contains(TITLE) {
        let name = job
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| job.source.display().to_string());
        md.set(TITLE, name);
        md.set(TITLE_IS_FILEPATH, "true");
    }
    md.set_default(PAGE_COUNT, job.stats.page_count);

    md.write(&path).map_err(|e| StageError::io(&path, e))?;
    Ok(md)
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::parsers::PdfDoc;

    #[test]
    fn caller_metadata_wins_unless_overridable() {
        let work = tempfile::tempdir().unwrap();
        let config = config_in(work.path())
            .overridable_keys(["date"])
            .build()
            .unwrap();
        let gw = StubGateway::new();
        let ctx = JobContext { config: &config, gateway: &gw };
        let mut job = job_for(work.path(), Arc::new(PdfDoc), &work.path().join("report.pdf"));
        job.caller_metadata = [("title", "Mine"), ("date", "1/1/2000")].into_iter().collect();
        job.metadata.set("title", "Derived");
        job.metadata.set("date", "2/2/2002");
        job.stats.page_count = 3;

        let md = write_metadata(&mut job, &ctx).unwrap();
        assert_eq!(md.get("title"), Some("Mine"));
        assert_eq!(md.get("date"), Some("2/2/2002"));
        assert_eq!(md.get(PAGE_COUNT), Some("3"));
        assert_eq!(md.get(MIME_TYPE), Some("application/pdf"));
        let on_disk = Metadata::read(&job.path().join(METADATA_FILE)).unwrap();
        assert_eq!(on_disk, md);
    }

    #[test]
    fn title_defaults_to_the_file_name() {
        let work = tempfile::tempdir().unwrap();
        let config = config_in(work.path()).build().unwrap();
        let gw = StubGateway::new();
        let ctx = JobContext { config: &config, gateway: &gw };
        let mut job = job_for(work.path(), Arc::new(PdfDoc), &work.path().join("report.pdf"));
        let md = write_metadata(&mut job, &ctx).unwrap();
        assert_eq!(md.get(TITLE), Some("report.pdf"));
        assert_eq!(md.get(TITLE_IS_FILEPATH), Some("true"));
    }

    #[test]
    fn failed_job_keeps_its_folder_when_not_uploading() {
        let work = tempfile::tempdir().unwrap();
        let config = config_in(work.path()).build().unwrap();
        let gw = StubGateway::new();
        let ctx = JobContext { config: &config, gateway: &gw };
        let source = work.path().join("report.pdf");
        std::fs::write(&source, "%PDF-1.4").unwrap();
        let selection = Selection {
            path: source,
            parser: Arc::new(PdfDoc),
            options: JobOptions::new(),
        };
        // no rasterizer configured
        let err = run_job(JobSpec::new(selection, Metadata::new()), &ctx).unwrap_err();
        assert!(matches!(err, IngestError::MissingResource { .. }), "got {err}");
        let kept = std::fs::read_dir(work.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().join("originals/report.pdf").exists())
            .count();
        assert_eq!(kept, 1);
    }
}
