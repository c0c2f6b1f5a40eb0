//! Ingestion entry points.
//!
//! Inputs are resolved and matched to parsers on the async side; every job
//! then runs on a blocking worker (`spawn_blocking`), because its stages are
//! file system work and external tool calls. A semaphore sized by
//! [`IngestConfig::concurrency`] bounds how many jobs run at once across the
//! whole batch, sub-jobs of a decomposed input included.

use crate::config::IngestConfig;
use crate::error::{IngestError, SubJobFailure};
use crate::gateway::{CommandGateway, ExternalToolGateway};
use crate::layout::{self, ParagraphIndex};
use crate::output::{InputResult, Outcome};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::{run_job, JobContext, JobOutcome, JobSpec, Stage};
use crate::registry::ParserRegistry;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Shared state for every job of one call.
#[derive(Clone)]
struct Workers {
    config: Arc<IngestConfig>,
    gateway: Arc<dyn ExternalToolGateway>,
    permits: Arc<Semaphore>,
}

impl Workers {
    fn new(config: &IngestConfig) -> Result<Self, IngestError> {
        let gateway: Arc<dyn ExternalToolGateway> = match &config.gateway {
            Some(gw) => Arc::clone(gw),
            None => Arc::new(CommandGateway::from_env()?),
        };
        Ok(Self {
            config: Arc::new(config.clone()),
            gateway,
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
        })
    }

    /// Run one job on a blocking worker once a permit is free.
    async fn run(&self, spec: JobSpec) -> Result<JobOutcome, IngestError> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| IngestError::Internal(format!("worker pool closed: {e}")))?;
        let config = Arc::clone(&self.config);
        let gateway = Arc::clone(&self.gateway);
        tokio::task::spawn_blocking(move || {
            let ctx = JobContext {
                config: &config,
                gateway: gateway.as_ref(),
            };
            run_job(spec, &ctx)
        })
        .await
        .map_err(|e| IngestError::Internal(format!("job worker failed: {e}")))?
    }

    fn callback(&self) -> Option<&crate::progress::ProgressCallback> {
        self.config.progress_callback.as_ref()
    }

    /// Run a job and, when it decomposes, all of its parts.
    async fn run_input(&self, spec: JobSpec) -> Outcome {
        let identifier = spec.identifier.clone();
        if let Some(cb) = self.callback() {
            cb.on_job_start(&identifier, spec.selection.parser.name());
        }
        match self.run(spec).await {
            Ok(JobOutcome::Done(doc)) => {
                if let Some(cb) = self.callback() {
                    cb.on_job_complete(&identifier, doc.stats.page_count);
                }
                Outcome::Single(doc)
            }
            Ok(JobOutcome::Split(mut plan)) => {
                let parts = std::mem::take(&mut plan.parts);
                let ranges = plan.ranges.clone();
                info!("{}: decomposed into {} parts", identifier, parts.len());
                let outcome = self.run_parts(parts, ranges).await;
                // staged part folders live until every part has run
                drop(plan);
                outcome
            }
            Err(e) => {
                if let Some(cb) = self.callback() {
                    cb.on_job_error(&identifier, &e.to_string());
                }
                Outcome::Failed(e)
            }
        }
    }

    async fn run_parts(&self, parts: Vec<JobSpec>, ranges: Vec<(usize, usize)>) -> Outcome {
        let concurrency = self.config.concurrency.max(1);
        let mut results: Vec<_> = stream::iter(parts.into_iter().zip(ranges).enumerate().map(
            |(i, (part, range))| {
                let workers = self.clone();
                async move {
                    let identifier = part.identifier.clone();
                    if let Some(cb) = workers.callback() {
                        cb.on_job_start(&identifier, part.selection.parser.name());
                    }
                    (i, identifier, range, workers.run(part).await)
                }
            },
        ))
        .buffer_unordered(concurrency)
        .collect()
        .await;
        results.sort_by_key(|(i, ..)| *i);

        let mut docs = Vec::new();
        let mut failures = Vec::new();
        for (_, identifier, (first_page, last_page), result) in results {
            let error = match result {
                Ok(JobOutcome::Done(doc)) => {
                    if let Some(cb) = self.callback() {
                        cb.on_job_complete(&identifier, doc.stats.page_count);
                    }
                    docs.push(doc);
                    continue;
                }
                Ok(JobOutcome::Split(_)) => "part decomposed again".to_string(),
                Err(e) => e.to_string(),
            };
            warn!("{}: part failed and is left out: {}", identifier, error);
            if let Some(cb) = self.callback() {
                cb.on_job_error(&identifier, &error);
            }
            failures.push(SubJobFailure {
                identifier,
                first_page,
                last_page,
                error,
            });
        }
        Outcome::Decomposed {
            parts: docs,
            failures,
        }
    }
}

// ── Public API ───────────────────────────────────────────────────────────

/// Ingest one input (file, directory or URL) with the built-in parsers.
///
/// # Errors
/// Returns `Err` when the input cannot be resolved or no parser recognises
/// it. Failures of individual jobs are reported in the returned outcomes.
pub async fn ingest(
    input: impl AsRef<str>,
    config: &IngestConfig,
) -> Result<Vec<InputResult>, IngestError> {
    let registry = ParserRegistry::with_defaults()?;
    ingest_with(input, config, &registry).await
}

/// Like [`ingest`], with a caller-built registry.
pub async fn ingest_with(
    input: impl AsRef<str>,
    config: &IngestConfig,
    registry: &ParserRegistry,
) -> Result<Vec<InputResult>, IngestError> {
    let workers = Workers::new(config)?;
    ingest_one(input.as_ref(), &workers, registry).await
}

async fn ingest_one(
    input: &str,
    workers: &Workers,
    registry: &ParserRegistry,
) -> Result<Vec<InputResult>, IngestError> {
    let config = &workers.config;
    // held until every job of this input has finished
    let resolved = input::resolve_input(input, config.download_timeout_secs).await?;
    let selections = registry.select_with(resolved.path(), config.format.as_deref())?;
    debug!("{}: {} selection(s)", input, selections.len());
    let downloaded = matches!(resolved, ResolvedInput::Downloaded { .. });

    let specs: Vec<JobSpec> = selections
        .into_iter()
        .map(|selection| {
            let mut spec = JobSpec::new(selection, config.metadata.clone());
            if downloaded {
                spec.identifier = input.to_string();
            }
            spec
        })
        .collect();

    let mut results: Vec<(usize, InputResult)> =
        stream::iter(specs.into_iter().enumerate().map(|(i, spec)| {
            let workers = workers.clone();
            async move {
                let input = spec.identifier.clone();
                let outcome = workers.run_input(spec).await;
                (i, InputResult { input, outcome })
            }
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;
    results.sort_by_key(|(i, _)| *i);
    drop(resolved);
    Ok(results.into_iter().map(|(_, r)| r).collect())
}

/// Ingest many inputs. Inputs that cannot be resolved or matched come back
/// as [`Outcome::Failed`] entries; the batch itself fails only when the
/// parser registry or the tool gateway cannot be set up.
pub async fn ingest_all<S: AsRef<str>>(
    inputs: &[S],
    config: &IngestConfig,
) -> Result<Vec<InputResult>, IngestError> {
    let registry = ParserRegistry::with_defaults()?;
    let workers = Workers::new(config)?;
    if let Some(cb) = workers.callback() {
        cb.on_batch_start(inputs.len());
    }

    let mut batches: Vec<(usize, Vec<InputResult>)> =
        stream::iter(inputs.iter().enumerate().map(|(i, input)| {
            let workers = workers.clone();
            let registry = &registry;
            async move {
                let input = input.as_ref();
                match ingest_one(input, &workers, registry).await {
                    Ok(results) => (i, results),
                    Err(e) => {
                        warn!("{}: {}", input, e);
                        if let Some(cb) = workers.callback() {
                            cb.on_job_error(input, &e.to_string());
                        }
                        (
                            i,
                            vec![InputResult {
                                input: input.to_string(),
                                outcome: Outcome::Failed(e),
                            }],
                        )
                    }
                }
            }
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;
    batches.sort_by_key(|(i, _)| *i);

    let succeeded = batches
        .iter()
        .filter(|(_, results)| results.iter().any(|r| !r.outcome.documents().is_empty()))
        .count();
    if let Some(cb) = workers.callback() {
        cb.on_batch_complete(inputs.len(), succeeded);
    }
    info!("ingested {}/{} inputs", succeeded, inputs.len());
    Ok(batches.into_iter().flat_map(|(_, r)| r).collect())
}

/// Synchronous wrapper around [`ingest`].
///
/// Creates a temporary tokio runtime internally.
pub fn ingest_sync(
    input: impl AsRef<str>,
    config: &IngestConfig,
) -> Result<Vec<InputResult>, IngestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| IngestError::Internal(format!("failed to create tokio runtime: {e}")))?
        .block_on(ingest(input, config))
}

/// Rebuild the paragraph index of a finished document folder, under the
/// folder's advisory lock.
pub fn reindex(folder: &Path, config: &IngestConfig) -> Result<Option<ParagraphIndex>, IngestError> {
    layout::reindex_paragraphs(folder, &config.layout, config.lock_timeout()).map_err(|source| {
        IngestError::Process {
            stage: Stage::TextExtraction,
            parser: "PreparedFolder".to_string(),
            source,
        }
    })
}
