//! External tool gateway: OCR, rasterization, format conversion and friends.
//!
//! Every external program the pipeline needs is reached through the
//! [`ExternalToolGateway`] trait. Calls are blocking and bounded by a timeout;
//! the pipeline only ever calls them from a job's own blocking worker, so a
//! stalled tool holds up its own document and nothing else.
//!
//! [`CommandGateway`] is the stock implementation: it spawns a configured
//! command line per [`ToolId`]. Command templates come from a TOML file:
//!
//! ```toml
//! [tools.rasterize]
//! command = "pdftoppm -r {dpi} -png {input} {outdir}/page"
//!
//! [tools.word-boxes]
//! command = "pdftotext-wordboxes {input} {output}"
//!
//! [tools.ocr]
//! command = "ocr-wordboxes --lang {language} {outdir} {inputs}"
//! ```
//!
//! `{input}` is the first input, `{inputs}` expands to all inputs,
//! `{outdir}`/`{output}` are the request's output directory and file, and any
//! request option is available under its own name.

use crate::error::StageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::runtime::{self, Handle};
use tracing::{debug, warn};

/// The external capabilities the pipeline knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolId {
    /// Page-description file → one raster per page in the output directory.
    Rasterize,
    /// Office/web/PostScript/text file → PDF at the output file.
    ConvertToPdf,
    /// Geometry-aware text extractor producing a word-box listing.
    WordBoxes,
    /// Plain text extractor.
    PlainText,
    /// Text quality scorer; prints one integer.
    ScoreText,
    /// OCR over page images; prints a word-box listing or plain text.
    Ocr,
    /// Hyperlink/anchor extractor.
    Links,
    /// Deskews the page images in the output directory in place.
    Deskew,
    /// Removes scanner noise from the page images in place.
    Dryclean,
    /// Prints 1-based page numbers of scan separator sheets.
    FindSeparators,
}

impl ToolId {
    pub const ALL: [ToolId; 10] = [
        ToolId::Rasterize,
        ToolId::ConvertToPdf,
        ToolId::WordBoxes,
        ToolId::PlainText,
        ToolId::ScoreText,
        ToolId::Ocr,
        ToolId::Links,
        ToolId::Deskew,
        ToolId::Dryclean,
        ToolId::FindSeparators,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolId::Rasterize => "rasterize",
            ToolId::ConvertToPdf => "convert-to-pdf",
            ToolId::WordBoxes => "word-boxes",
            ToolId::PlainText => "plain-text",
            ToolId::ScoreText => "score-text",
            ToolId::Ocr => "ocr",
            ToolId::Links => "links",
            ToolId::Deskew => "deskew",
            ToolId::Dryclean => "dryclean",
            ToolId::FindSeparators => "find-separators",
        }
    }
}

impl std::str::FromStr for ToolId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolId::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown tool '{s}'"))
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation of an external tool.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub tool: ToolId,
    pub inputs: Vec<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub options: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl ToolRequest {
    pub fn new(tool: ToolId, timeout: Duration) -> Self {
        Self {
            tool,
            inputs: Vec::new(),
            output_dir: None,
            output_file: None,
            options: BTreeMap::new(),
            timeout,
        }
    }

    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn inputs(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.inputs.extend(paths);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn output_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.output_file = Some(file.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.options.insert(key.into(), value.to_string());
        self
    }
}

/// What a tool run produced.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
    /// Files created by the run: the output file if it exists, then the
    /// contents of the output directory in name order.
    pub produced: Vec<PathBuf>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// The tool's primary output: the requested output file when it was
    /// written, otherwise standard output.
    pub fn primary(&self, request: &ToolRequest) -> Result<Vec<u8>, StageError> {
        match &request.output_file {
            Some(file) if file.exists() => {
                std::fs::read(file).map_err(|e| StageError::io(file, e))
            }
            _ => Ok(self.stdout.clone()),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} is not configured")]
    Unsupported(ToolId),

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: ToolId,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: ToolId, secs: u64 },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<GatewayError> for StageError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unsupported(tool) => StageError::Unsupported(tool),
            GatewayError::Timeout { tool, secs } => StageError::Timeout { tool, secs },
            GatewayError::Spawn { tool, source } => StageError::Tool {
                tool,
                status: -1,
                detail: source.to_string(),
            },
            GatewayError::Io { path, source } => StageError::Io { path, source },
        }
    }
}

/// Abstract access to external conversion tools.
///
/// Implementations must be safe to share between job workers.
pub trait ExternalToolGateway: Send + Sync {
    /// Whether `tool` can be run at all.
    fn supports(&self, tool: ToolId) -> bool;

    /// Run one tool to completion or timeout.
    ///
    /// A non-zero exit status is reported through [`ToolOutput::status`], not
    /// as an error; callers decide whether to fall back.
    fn run(&self, request: &ToolRequest) -> Result<ToolOutput, GatewayError>;
}

/// Run a tool and turn a non-zero status into a [`StageError::Tool`].
pub fn run_checked(
    gateway: &dyn ExternalToolGateway,
    request: &ToolRequest,
) -> Result<ToolOutput, StageError> {
    let output = gateway.run(request)?;
    if output.success() {
        Ok(output)
    } else {
        Err(StageError::Tool {
            tool: request.tool,
            status: output.status,
            detail: output.stderr.trim().chars().take(200).collect(),
        })
    }
}

// ── Command-line implementation ──────────────────────────────────────────

/// Command template for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub command: String,
}

/// Tool table loaded from TOML, keyed by tool name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub tools: BTreeMap<String, ToolSpec>,
}

impl GatewayConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, crate::error::IngestError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| crate::error::IngestError::InvalidConfig(format!("tool table: {e}")))?;
        for name in config.tools.keys() {
            name.parse::<ToolId>()
                .map_err(crate::error::IngestError::InvalidConfig)?;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, crate::error::IngestError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            crate::error::IngestError::InvalidConfig(format!(
                "cannot read tool table '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&text)
    }
}

/// Runs each tool as a child process built from its command template.
#[derive(Debug, Clone, Default)]
pub struct CommandGateway {
    tools: BTreeMap<ToolId, ToolSpec>,
}

impl CommandGateway {
    /// Names that are not tool ids were rejected when the table was parsed
    /// and are ignored here.
    pub fn new(config: GatewayConfig) -> Self {
        let tools = config
            .tools
            .into_iter()
            .filter_map(|(name, spec)| name.parse::<ToolId>().ok().map(|id| (id, spec)))
            .collect();
        Self { tools }
    }

    /// Load the tool table named by `FOLIO_TOOLS`, or an empty table.
    pub fn from_env() -> Result<Self, crate::error::IngestError> {
        match std::env::var("FOLIO_TOOLS") {
            Ok(path) if !path.is_empty() => Ok(Self::new(GatewayConfig::from_file(Path::new(&path))?)),
            _ => Ok(Self::default()),
        }
    }

    fn argv(template: &str, request: &ToolRequest) -> Vec<String> {
        let lookup = |name: &str| -> Option<String> {
            match name {
                "input" => request.inputs.first().map(|p| p.display().to_string()),
                "outdir" => request.output_dir.as_ref().map(|p| p.display().to_string()),
                "output" => request.output_file.as_ref().map(|p| p.display().to_string()),
                other => request.options.get(other).cloned(),
            }
        };
        let mut argv = Vec::new();
        for word in template.split_whitespace() {
            if word == "{inputs}" {
                argv.extend(request.inputs.iter().map(|p| p.display().to_string()));
                continue;
            }
            let mut arg = String::with_capacity(word.len());
            let mut rest = word;
            while let Some(open) = rest.find('{') {
                let Some(close) = rest[open..].find('}') else {
                    break;
                };
                let name = &rest[open + 1..open + close];
                arg.push_str(&rest[..open]);
                match lookup(name) {
                    Some(value) => arg.push_str(&value),
                    None => arg.push_str(&rest[open..=open + close]),
                }
                rest = &rest[open + close + 1..];
            }
            arg.push_str(rest);
            argv.push(arg);
        }
        argv
    }
}

impl ExternalToolGateway for CommandGateway {
    fn supports(&self, tool: ToolId) -> bool {
        self.tools.contains_key(&tool)
    }

    fn run(&self, request: &ToolRequest) -> Result<ToolOutput, GatewayError> {
        let tool = request.tool;
        let spec = self
            .tools
            .get(&tool)
            .ok_or(GatewayError::Unsupported(tool))?;
        let argv = Self::argv(&spec.command, request);
        let Some((program, args)) = argv.split_first() else {
            return Err(GatewayError::Unsupported(tool));
        };
        debug!("running {}: {}", tool, argv.join(" "));

        if let Some(dir) = &request.output_dir {
            std::fs::create_dir_all(dir).map_err(|e| GatewayError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let output = block_on(wait_for(command, tool, request.timeout))
            .map_err(|e| GatewayError::Spawn { tool, source: e })??;

        let mut produced = Vec::new();
        if let Some(file) = &request.output_file {
            if file.exists() {
                produced.push(file.clone());
            }
        }
        if let Some(dir) = &request.output_dir {
            produced.extend(list_files(dir));
        }

        Ok(ToolOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            produced,
        })
    }
}

/// Run the child to completion or until `timeout`. Dropping the unfinished
/// wait kills the child.
async fn wait_for(mut command: Command, tool: ToolId, timeout: Duration) -> Result<Output, GatewayError> {
    let child = command
        .spawn()
        .map_err(|e| GatewayError::Spawn { tool, source: e })?;
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output.map_err(|e| GatewayError::Spawn { tool, source: e }),
        Err(_) => {
            warn!("{} exceeded {:?}, killing it", tool, timeout);
            Err(GatewayError::Timeout {
                tool,
                secs: timeout.as_secs(),
            })
        }
    }
}

/// Drive `fut` on the ambient runtime when called from one of its blocking
/// workers, or on a throwaway current-thread runtime otherwise.
fn block_on<F: Future>(fut: F) -> std::io::Result<F::Output> {
    match Handle::try_current() {
        Ok(handle) => Ok(handle.block_on(fut)),
        Err(_) => Ok(runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(fut)),
    }
}

/// Regular files directly inside `dir`, sorted by name.
pub(crate) fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn gateway(pairs: &[(&str, &str)]) -> CommandGateway {
        let mut text = String::new();
        for (tool, command) in pairs {
            text.push_str(&format!("[tools.{tool}]\ncommand = \"{command}\"\n"));
        }
        CommandGateway::new(GatewayConfig::from_toml_str(&text).unwrap())
    }

    #[test]
    fn tool_ids_round_trip_through_toml_keys() {
        let g = gateway(&[("word-boxes", "true"), ("find-separators", "true")]);
        assert!(g.supports(ToolId::WordBoxes));
        assert!(g.supports(ToolId::FindSeparators));
        assert!(!g.supports(ToolId::Ocr));
    }

    #[test]
    fn unknown_tool_name_rejected() {
        let err = GatewayConfig::from_toml_str("[tools.teleport]\ncommand = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn placeholders_expand_per_argument() {
        let req = ToolRequest::new(ToolId::Ocr, Duration::from_secs(1))
            .input("/a b/one.png")
            .input("/two.png")
            .output_dir("/out")
            .option("language", "de");
        let argv = CommandGateway::argv("ocr --lang={language} -o {outdir} {inputs} {missing}", &req);
        assert_eq!(
            argv,
            vec!["ocr", "--lang=de", "-o", "/out", "/a b/one.png", "/two.png", "{missing}"]
        );
    }

    #[test]
    fn captures_stdout_and_status() {
        let g = gateway(&[("plain-text", "echo {input}")]);
        let req = ToolRequest::new(ToolId::PlainText, Duration::from_secs(10)).input("hello");
        let out = g.run(&req).unwrap();
        assert!(out.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[test]
    fn unsupported_tool_is_an_error() {
        let g = CommandGateway::default();
        let req = ToolRequest::new(ToolId::Ocr, Duration::from_secs(1));
        assert!(matches!(g.run(&req), Err(GatewayError::Unsupported(ToolId::Ocr))));
    }

    #[test]
    fn slow_tool_times_out() {
        let g = gateway(&[("ocr", "sleep 5")]);
        let req = ToolRequest::new(ToolId::Ocr, Duration::from_millis(200));
        let started = Instant::now();
        assert!(matches!(g.run(&req), Err(GatewayError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn times_out_on_a_blocking_worker() {
        let started = Instant::now();
        let result = tokio::task::spawn_blocking(|| {
            let g = gateway(&[("ocr", "sleep 5")]);
            g.run(&ToolRequest::new(ToolId::Ocr, Duration::from_millis(200)))
        })
        .await
        .unwrap();
        assert!(matches!(result, Err(GatewayError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn non_zero_status_becomes_tool_error() {
        let g = gateway(&[("links", "false")]);
        let req = ToolRequest::new(ToolId::Links, Duration::from_secs(10));
        match run_checked(&g, &req) {
            Err(StageError::Tool { tool, status, .. }) => {
                assert_eq!(tool, ToolId::Links);
                assert_ne!(status, 0);
            }
            other => panic!("expected tool error, got {other:?}"),
        }
    }
}
