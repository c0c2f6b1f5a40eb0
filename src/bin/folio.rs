//! CLI binary for folio-ingest.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `IngestConfig` and prints one line per produced document.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use folio_ingest::{
    ingest_all, reindex, CommandGateway, DirectoryRepository, GatewayConfig, IngestConfig,
    IngestConfigBuilder, IngestError, IngestProgressCallback, InputResult, OcrPolicy, Outcome,
    ParserRegistry, ProgressCallback, Stage,
};
use folio_wbb::{page_words, Sidecar, TextStream, CONTENTS_FILE, SIDECAR_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner counting finished jobs plus a log
/// line per job. Jobs finish out of order, so start times are keyed by
/// identifier. The job total is unknown up front because inputs may
/// decompose into parts.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {pos} done  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Ingesting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self, identifier: &str) -> String {
        let started = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(identifier));
        match started {
            Some(t) => format!("{:.1}s", t.elapsed().as_secs_f64()),
            None => String::new(),
        }
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_inputs: usize) {
        self.bar.set_prefix(format!("Ingesting {total_inputs} inputs"));
    }

    fn on_job_start(&self, identifier: &str, parser: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(identifier.to_string(), Instant::now());
        }
        self.bar.set_message(format!("{identifier} {}", dim(parser)));
    }

    fn on_stage(&self, identifier: &str, stage: Stage) {
        self.bar.set_message(format!("{identifier} {}", dim(&stage.to_string())));
    }

    fn on_job_complete(&self, identifier: &str, page_count: usize) {
        let elapsed = self.elapsed(identifier);
        self.bar.println(format!(
            "  {} {}  {} pages  {}",
            green("✓"),
            identifier,
            page_count,
            dim(&elapsed),
        ));
        self.bar.inc(1);
    }

    fn on_job_error(&self, identifier: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        let elapsed = self.elapsed(identifier);
        self.bar.println(format!(
            "  {} {}  {}  {}",
            red("✗"),
            identifier,
            red(error),
            dim(&elapsed),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_inputs: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_inputs.saturating_sub(success_count);
        if failed == 0 && self.errors.load(Ordering::Relaxed) == 0 {
            eprintln!(
                "{} {} inputs ingested",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} inputs ingested  ({} job errors)",
                if failed == total_inputs { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_inputs,
                red(&self.errors.load(Ordering::Relaxed).to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ingest a scan, keep the document folder in ./out
  folio add --work-root out scan.tiff

  # Several inputs at once, uploaded to a directory repository
  folio add --repository /srv/docs report.pdf slides.pptx https://example.org/page.html

  # Force OCR and tag the documents
  folio add --ocr always -m category=invoices -m source=mailroom inbox/*.pdf

  # Rebuild the paragraph index of a finished folder
  folio paragraphs /srv/docs/00000042

  # Show the word boxes of page 3
  folio wordboxes --page 3 /srv/docs/00000042

TOOL TABLE (--tools or FOLIO_TOOLS):
  [tools.rasterize]
  command = "pdftoppm -r {dpi} -png {input} {outdir}/page"
  [tools.plain-text]
  command = "pdftotext -layout {input} {output}"

  Tools: rasterize, convert-to-pdf, word-boxes, plain-text, score-text,
  ocr, links, deskew, dryclean, find-separators. Unlisted tools are
  treated as unavailable and their stages are skipped or fall back.

EXIT CODES:
  0  every input produced at least one document
  1  other failure
  2  the repository could not be reached
  3  the repository rejected the credentials
  4  no parser recognised an input, or --format names no parser
  5  a pipeline stage failed or a required tool is missing
"#;

/// Ingest documents into canonical document folders.
#[derive(Parser, Debug)]
#[command(
    name = "folio",
    version,
    about = "Ingest documents into canonical document folders",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FOLIO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FOLIO_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest files, directories or URLs.
    Add(AddArgs),
    /// Rebuild `paragraphs.txt` and the paragraph ids of a document folder.
    Paragraphs {
        /// Finished document folder.
        folder: PathBuf,
        /// Seconds to wait for the folder lock.
        #[arg(long, env = "FOLIO_LOCK_TIMEOUT", default_value_t = 30)]
        lock_timeout: u64,
    },
    /// List the registered parsers in the order they are tried.
    Formats,
    /// Print the words and boxes stored in a folder's sidecar.
    Wordboxes {
        /// Document folder holding `wordbboxes` and `contents.txt`.
        folder: PathBuf,
        /// Only this 1-based page.
        #[arg(long)]
        page: Option<usize>,
    },
}

#[derive(clap::Args, Debug)]
struct AddArgs {
    /// Local files, directories or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Keep finished folders under this directory.
    #[arg(short = 'w', long, env = "FOLIO_WORK_ROOT")]
    work_root: Option<PathBuf>,

    /// Upload finished folders into this directory repository.
    #[arg(short, long, env = "FOLIO_REPOSITORY")]
    repository: Option<PathBuf>,

    /// TOML tool table. Defaults to the file named by FOLIO_TOOLS.
    #[arg(long)]
    tools: Option<PathBuf>,

    /// Skip detection and use this parser.
    #[arg(long, env = "FOLIO_FORMAT")]
    format: Option<String>,

    /// Metadata field, `key=value`. Repeatable.
    #[arg(short, long = "metadata", value_name = "KEY=VALUE")]
    metadata: Vec<String>,

    /// Metadata keys the input may overwrite. Repeatable.
    #[arg(long = "overridable", value_name = "KEY")]
    overridable: Vec<String>,

    /// OCR policy: never, when-needed, always.
    #[arg(long, env = "FOLIO_OCR", default_value = "when-needed")]
    ocr: OcrPolicy,

    /// Do not extract text at all.
    #[arg(long)]
    no_text: bool,

    /// Do not reject extracted text by quality score.
    #[arg(long)]
    no_quality_check: bool,

    /// Keep page images exactly as produced.
    #[arg(long)]
    no_optimize: bool,

    /// Keep blank pages.
    #[arg(long)]
    save_blank_pages: bool,

    /// Deskew page images.
    #[arg(long)]
    deskew: bool,

    /// Remove scanner noise from page images.
    #[arg(long)]
    dryclean: bool,

    /// Rasterize in colour.
    #[arg(long, env = "FOLIO_COLOR")]
    color: bool,

    /// Rasterization DPI (72–600).
    #[arg(long, env = "FOLIO_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Text language recorded in `contents.txt`.
    #[arg(long, env = "FOLIO_LANGUAGE", default_value = "en-US")]
    language: String,

    /// Number of jobs run at once.
    #[arg(short, long, env = "FOLIO_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-tool timeout in seconds.
    #[arg(long, env = "FOLIO_TOOL_TIMEOUT", default_value_t = 300)]
    tool_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FOLIO_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print results as JSON instead of one line per document.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "FOLIO_NO_PROGRESS")]
    no_progress: bool,
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            let code = e
                .downcast_ref::<IngestError>()
                .map(IngestError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides the feedback that matters; library INFO logs
    // only show when it is off.
    let show_progress = match &cli.command {
        Command::Add(args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Add(args) => add(args, show_progress, cli.quiet),
        Command::Paragraphs {
            folder,
            lock_timeout,
        } => {
            let config = IngestConfig::builder()
                .lock_timeout_secs(lock_timeout)
                .build()
                .context("Invalid configuration")?;
            match reindex(&folder, &config)? {
                Some(index) => {
                    if !cli.quiet {
                        eprintln!(
                            "{} {} paragraphs  →  {}",
                            green("✔"),
                            index.entries.len(),
                            bold(&folder.display().to_string())
                        );
                    }
                }
                None => eprintln!("{} no text in {}", cyan("⚠"), folder.display()),
            }
            Ok(0)
        }
        Command::Formats => {
            let registry = ParserRegistry::with_defaults()?;
            for (i, parser) in registry.list().iter().enumerate() {
                println!("{:>2}. {:<16} {}", i + 1, parser.name(), dim(parser.media_type()));
            }
            Ok(0)
        }
        Command::Wordboxes { folder, page } => {
            dump_wordboxes(&folder, page)?;
            Ok(0)
        }
    }
}

fn add(args: AddArgs, show_progress: bool, quiet: bool) -> Result<i32> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn IngestProgressCallback>)
    } else {
        None
    };
    let config = build_config(&args, progress)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let results = runtime.block_on(ingest_all(&args.inputs, &config))?;

    if args.json {
        println!("{}", results_json(&results)?);
    } else if !quiet {
        print_results(&results);
    }
    Ok(exit_code(&results))
}

/// Map CLI args to `IngestConfig`.
fn build_config(args: &AddArgs, progress: Option<ProgressCallback>) -> Result<IngestConfig> {
    let mut builder: IngestConfigBuilder = IngestConfig::builder()
        .concurrency(args.concurrency)
        .ocr(args.ocr)
        .no_text(args.no_text)
        .check_text_quality(!args.no_quality_check)
        .optimize_images(!args.no_optimize)
        .save_blank_pages(args.save_blank_pages)
        .deskew(args.deskew)
        .dryclean(args.dryclean)
        .color(args.color)
        .dpi(args.dpi)
        .language(args.language.clone())
        .tool_timeout_secs(args.tool_timeout)
        .download_timeout_secs(args.download_timeout)
        .overridable_keys(args.overridable.iter().cloned());

    for field in &args.metadata {
        let (key, value) = parse_field(field)?;
        builder = builder.metadata_field(key, value);
    }
    if let Some(ref dir) = args.work_root {
        builder = builder.work_root(dir.clone());
    }
    if let Some(ref dir) = args.repository {
        builder = builder
            .repository(Arc::new(DirectoryRepository::new(dir.clone())))
            .upload(true);
    }
    if let Some(ref path) = args.tools {
        let table = GatewayConfig::from_file(path)?;
        builder = builder.gateway(Arc::new(CommandGateway::new(table)));
    }
    if let Some(ref name) = args.format {
        builder = builder.format(name.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse a `-m key=value` flag.
fn parse_field(s: &str) -> Result<(String, String)> {
    let Some((key, value)) = s.split_once('=') else {
        bail!("Metadata field '{s}' is not of the form key=value");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Metadata field '{s}' has an empty key");
    }
    Ok((key.to_string(), value.to_string()))
}

fn print_results(results: &[InputResult]) {
    for result in results {
        match &result.outcome {
            Outcome::Failed(e) => println!("{}\t{}\t{}", result.input, red("failed"), e),
            Outcome::Single(_) | Outcome::Decomposed { .. } => {
                for doc in result.outcome.documents() {
                    let location = doc
                        .doc_id
                        .clone()
                        .or_else(|| doc.folder.as_ref().map(|p| p.display().to_string()))
                        .unwrap_or_default();
                    println!(
                        "{}\t{}\t{}\t{} pages\t{}",
                        doc.identifier, doc.parser, location, doc.stats.page_count, doc.stats.text_source
                    );
                }
                if let Outcome::Decomposed { failures, .. } = &result.outcome {
                    for f in failures {
                        println!("{}\t{}\t{}", f.identifier, red("failed"), f.error);
                    }
                }
            }
        }
    }
}

fn results_json(results: &[InputResult]) -> Result<String> {
    let entries: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            let failures: Vec<serde_json::Value> = match &r.outcome {
                Outcome::Failed(e) => vec![serde_json::json!({
                    "identifier": r.input,
                    "error": e.to_string(),
                    "exit_code": e.exit_code(),
                })],
                Outcome::Decomposed { failures, .. } => failures
                    .iter()
                    .map(|f| {
                        serde_json::json!({
                            "identifier": f.identifier,
                            "first_page": f.first_page,
                            "last_page": f.last_page,
                            "error": f.error,
                        })
                    })
                    .collect(),
                Outcome::Single(_) => Vec::new(),
            };
            serde_json::json!({
                "input": r.input,
                "documents": r.outcome.documents(),
                "failures": failures,
            })
        })
        .collect();
    serde_json::to_string_pretty(&entries).context("Failed to serialise results")
}

/// 0 when every input produced a document, otherwise the code of the first
/// failed input.
fn exit_code(results: &[InputResult]) -> i32 {
    results
        .iter()
        .find_map(|r| r.outcome.error().map(IngestError::exit_code))
        .unwrap_or_else(|| {
            let partial = results.iter().any(|r| {
                matches!(&r.outcome, Outcome::Decomposed { failures, .. } if !failures.is_empty())
            });
            if partial {
                5
            } else {
                0
            }
        })
}

fn dump_wordboxes(folder: &std::path::Path, page: Option<usize>) -> Result<()> {
    let sidecar = Sidecar::read(&folder.join(SIDECAR_FILE))
        .with_context(|| format!("Failed to read sidecar in {}", folder.display()))?;
    let text = TextStream::read(&folder.join(CONTENTS_FILE))
        .with_context(|| format!("Failed to read text in {}", folder.display()))?;
    let pages = page_words(&sidecar, &text).context("Sidecar does not match the text")?;

    if let Some(p) = page {
        if p == 0 || p > pages.len() {
            bail!("Page {p} out of range (1-{})", pages.len());
        }
    }
    println!("{}", dim(&format!("version {}", sidecar.version.number())));
    for (i, words) in pages.iter().enumerate() {
        if page.is_some_and(|p| p != i + 1) {
            continue;
        }
        println!("{}", bold(&format!("page {}", i + 1)));
        for w in words {
            let b = &w.bbox;
            println!(
                "  {:>7.1} {:>7.1} {:>7.1} {:>7.1}  {:>5.1}pt  {}{}",
                b.left,
                b.top,
                b.right,
                b.bottom,
                b.font_size,
                w.text,
                if b.ends_line() { dim(" ⏎") } else { String::new() },
            );
        }
    }
    Ok(())
}
