//! `EarlyUpload` and `Persist`: hand documents to the repository.

use super::job::{Job, JobContext};
use super::{originals::copy_tree, page_image_name, Stage, ORIGINALS_DIR, PAGE_IMAGES_DIR};
use crate::error::{IngestError, StageError};
use crate::metadata::{Metadata, METADATA_FILE, MIME_TYPE};
use crate::repository::{DocId, Repository, RepositoryError};
use folio_wbb::{TextStream, CONTENTS_FILE};
use image::{GrayImage, Luma};
use tracing::{debug, info};

/// Metadata key marking a placeholder document.
pub const TEMPORARY_CONTENTS: &str = "temporary-contents";

/// Metadata key naming the placeholder a final submission replaces.
pub const REPLACES: &str = "replacement-contents-for";

/// Letter size at 300 dpi.
const PLACEHOLDER_SIZE: (u32, u32) = (2550, 3300);

fn repository<'a>(ctx: &JobContext<'a>) -> Result<&'a dyn Repository, IngestError> {
    ctx.config
        .repository
        .as_deref()
        .ok_or_else(|| IngestError::MissingResource {
            resource: "repository".into(),
        })
}

fn map_repository_error(
    e: RepositoryError,
    repo: &dyn Repository,
    stage: Stage,
    job: &Job,
) -> IngestError {
    match e {
        RepositoryError::Authentication(detail) => IngestError::Authentication {
            repository: repo.name().to_string(),
            detail,
        },
        RepositoryError::Connection(detail) => IngestError::Connection {
            repository: repo.name().to_string(),
            detail,
        },
        RepositoryError::Rejected(detail) => IngestError::Process {
            stage,
            parser: job.parser.name().to_string(),
            source: StageError::Other(detail),
        },
    }
}

/// Submit a placeholder (originals, one blank page, empty text) so the
/// document has an id while the slow stages run. The final submission then
/// carries [`REPLACES`].
pub fn early_upload(job: &mut Job, ctx: &JobContext<'_>) -> Result<(), IngestError> {
    let repo = repository(ctx)?;
    let stage_err = |e: StageError| IngestError::Process {
        stage: Stage::EarlyUpload,
        parser: job.parser.name().to_string(),
        source: e,
    };

    let placeholder = tempfile::Builder::new()
        .prefix("folio-early-")
        .tempdir_in(ctx.work_root())
        .map_err(|e| IngestError::Internal(format!("cannot create placeholder folder: {e}")))?;
    let dir = placeholder.path();

    let originals = job.path().join(ORIGINALS_DIR);
    if originals.is_dir() {
        copy_tree(&originals, &dir.join(ORIGINALS_DIR)).map_err(|e| stage_err(StageError::io(&originals, e)))?;
    }

    let mut metadata = job.caller_metadata.clone();
    metadata.set_default(MIME_TYPE, job.parser.media_type_of(&job.source));
    metadata.set(TEMPORARY_CONTENTS, "true");
    let md_path = dir.join(METADATA_FILE);
    metadata
        .write(&md_path)
        .map_err(|e| stage_err(StageError::io(&md_path, e)))?;

    let pages = dir.join(PAGE_IMAGES_DIR);
    std::fs::create_dir_all(&pages).map_err(|e| stage_err(StageError::io(&pages, e)))?;
    let blank = GrayImage::from_pixel(PLACEHOLDER_SIZE.0, PLACEHOLDER_SIZE.1, Luma([255]));
    let page = pages.join(page_image_name(1));
    blank.save(&page).map_err(|e| {
        stage_err(StageError::Image {
            path: page.clone(),
            detail: e.to_string(),
        })
    })?;

    TextStream::new(ctx.config.language.clone(), "")
        .write(&dir.join(CONTENTS_FILE))
        .map_err(|e| stage_err(e.into()))?;

    let id = repo
        .submit(dir, &metadata)
        .map_err(|e| map_repository_error(e, repo, Stage::EarlyUpload, job))?;
    info!("{}: placeholder uploaded as {}", job.identifier, id);
    job.metadata.set(REPLACES, &id);
    job.early_id = Some(id);
    Ok(())
}

/// Submit the finished folder. The returned id is the placeholder's when an
/// early upload ran.
pub fn persist(job: &mut Job, ctx: &JobContext<'_>, metadata: &Metadata) -> Result<DocId, IngestError> {
    let repo = repository(ctx)?;
    debug!("{}: submitting {} to {}", job.identifier, job.path().display(), repo.name());
    let id = repo
        .submit(job.path(), metadata)
        .map_err(|e| map_repository_error(e, repo, Stage::Persist, job))?;
    info!("{}: stored as {}", job.identifier, id);
    Ok(job.early_id.clone().unwrap_or(id))
}
