//! Whole-pipeline tests against a scripted tool gateway.
//!
//! No external tools are needed: every tool the pipeline calls is answered
//! by [`ScriptedGateway`], which writes plausible output files the way the
//! real command-line tools would.

use folio_ingest::metadata::{NO_TEXT, PAGE_COUNT, SHA_HASH, TITLE};
use folio_ingest::{
    ingest, DirectoryRepository, ExternalToolGateway, GatewayError, IngestConfig,
    IngestedDocument, Metadata, Outcome, TextSource, ToolId, ToolOutput, ToolRequest,
};
use folio_wbb::{TextStream, CONTENTS_FILE};
use image::{DynamicImage, GrayImage, Luma};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Answers tool requests from a fixed table of stdout texts. Rasterization
/// is handled specially and writes `pages` PNGs into the output directory.
#[derive(Default)]
struct ScriptedGateway {
    stdout: BTreeMap<ToolId, String>,
    pages: usize,
    calls: Mutex<Vec<ToolId>>,
}

impl ScriptedGateway {
    fn new() -> Self {
        Self::default()
    }

    fn tool(mut self, tool: ToolId, stdout: &str) -> Self {
        self.stdout.insert(tool, stdout.to_string());
        self
    }

    fn rasterizer(mut self, pages: usize) -> Self {
        self.pages = pages;
        self
    }

    fn called(&self, tool: ToolId) -> bool {
        self.calls.lock().unwrap().contains(&tool)
    }
}

impl ExternalToolGateway for ScriptedGateway {
    fn supports(&self, tool: ToolId) -> bool {
        self.stdout.contains_key(&tool) || (tool == ToolId::Rasterize && self.pages > 0)
    }

    fn run(&self, request: &ToolRequest) -> Result<ToolOutput, GatewayError> {
        self.calls.lock().unwrap().push(request.tool);
        if !self.supports(request.tool) {
            return Err(GatewayError::Unsupported(request.tool));
        }
        if let Some(dir) = &request.output_dir {
            std::fs::create_dir_all(dir).unwrap();
        }
        if request.tool == ToolId::Rasterize {
            let dir = request.output_dir.as_ref().unwrap();
            for i in 1..=self.pages {
                page(i).save(dir.join(format!("page-{i}.png"))).unwrap();
            }
            return Ok(ToolOutput::default());
        }
        let stdout = self.stdout[&request.tool].clone();
        if let Some(file) = &request.output_file {
            std::fs::write(file, &stdout).unwrap();
        }
        Ok(ToolOutput {
            status: 0,
            stdout: stdout.into_bytes(),
            ..Default::default()
        })
    }
}

/// A white page with a black stripe whose height varies by page number,
/// so no page is blank and no two pages are identical.
fn page(n: usize) -> DynamicImage {
    let img = GrayImage::from_fn(60, 80, |_, y| {
        if (10..10 + 4 * n as u32).contains(&y) {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    DynamicImage::ImageLuma8(img)
}

fn config(work: &Path, gateway: ScriptedGateway) -> (IngestConfig, Arc<ScriptedGateway>) {
    // RUST_LOG=folio_ingest=debug shows the stage log of a failing test
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let gateway = Arc::new(gateway);
    let config = IngestConfig::builder()
        .work_root(work)
        .concurrency(2)
        .gateway(gateway.clone())
        .build()
        .unwrap();
    (config, gateway)
}

fn single(outcome: &Outcome) -> &IngestedDocument {
    match outcome {
        Outcome::Single(doc) => doc,
        other => panic!("expected one document, got {other:?}"),
    }
}

fn contents(doc: &IngestedDocument) -> String {
    let folder = doc.folder.as_ref().expect("folder kept");
    TextStream::read(&folder.join(CONTENTS_FILE)).unwrap().body
}

// ── Scans ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scan_with_separator_sheet_becomes_two_documents() {
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("batch.tiff");
    let pages: Vec<DynamicImage> = (1..=5).map(page).collect();
    folio_ingest::raster::write_tiff_pages(&input, &pages).unwrap();

    let marker = "Scan Separator Sheet ".repeat(4);
    let ocr = format!("invoice one\n\u{c}page two\n\u{c}{marker}\n\u{c}letter\n\u{c}signature\n");
    let (config, gateway) = config(work.path(), ScriptedGateway::new().tool(ToolId::Ocr, &ocr));

    let results = ingest(input.to_string_lossy(), &config).await.unwrap();
    assert_eq!(results.len(), 1);
    let Outcome::Decomposed { parts, failures } = &results[0].outcome else {
        panic!("expected a decomposed scan, got {:?}", results[0].outcome);
    };
    assert!(failures.is_empty(), "{failures:?}");
    assert_eq!(parts.len(), 2);

    let total: usize = parts.iter().map(|d| d.stats.page_count).sum();
    assert_eq!(total, 4);
    for part in parts {
        assert_eq!(part.parser, "PreparedFolder");
        assert!(part.identifier.ends_with(']'), "{}", part.identifier);
        assert_eq!(part.stats.text_source, TextSource::Prepared);
        assert_eq!(part.metadata.get(PAGE_COUNT), Some("2"));
    }
    assert!(contents(&parts[0]).contains("invoice one"));
    assert!(contents(&parts[1]).contains("signature"));
    assert!(!contents(&parts[1]).contains("Separator"));

    // the parts reuse the scan's OCR text
    let ocr_runs = gateway.calls.lock().unwrap().iter().filter(|t| **t == ToolId::Ocr).count();
    assert_eq!(ocr_runs, 1);
}

#[tokio::test]
async fn single_page_image_is_ocred() {
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("receipt.png");
    page(3).save(&input).unwrap();
    let (config, _) = config(work.path(), ScriptedGateway::new().tool(ToolId::Ocr, "Total 12.50\n"));

    let results = ingest(input.to_string_lossy(), &config).await.unwrap();
    let doc = single(&results[0].outcome);
    assert_eq!(doc.stats.page_count, 1);
    assert_eq!(doc.stats.text_source, TextSource::Ocr);
    assert_eq!(doc.metadata.get(TITLE), Some("receipt.png"));
    assert!(contents(doc).starts_with("Total 12.50"));
}

// ── PDFs ─────────────────────────────────────────────────────────────────────

fn pdf(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("report.pdf");
    std::fs::write(&path, b"%PDF-1.4\n%stub\n").unwrap();
    path
}

#[tokio::test]
async fn missing_word_box_tool_falls_back_to_plain_text() {
    let work = tempfile::tempdir().unwrap();
    let input = pdf(work.path());
    let gw = ScriptedGateway::new()
        .rasterizer(2)
        .tool(ToolId::PlainText, "Quarterly report\n\u{c}Second page\n");
    let (config, gateway) = config(work.path(), gw);

    let results = ingest(input.to_string_lossy(), &config).await.unwrap();
    let doc = single(&results[0].outcome);
    assert_eq!(doc.parser, "PDFDoc");
    assert_eq!(doc.stats.page_count, 2);
    assert_eq!(doc.stats.text_source, TextSource::PlainText);
    assert!(gateway.called(ToolId::WordBoxes) && gateway.called(ToolId::PlainText));
    assert!(contents(doc).contains("Second page"));

    let folder = doc.folder.as_ref().unwrap();
    assert!(folder.join("page-images/page00001.png").is_file());
    assert!(!folder.join(folio_wbb::SIDECAR_FILE).exists());
}

#[tokio::test]
async fn pdf_without_text_is_marked() {
    let work = tempfile::tempdir().unwrap();
    let input = pdf(work.path());
    let gw = ScriptedGateway::new().rasterizer(1).tool(ToolId::PlainText, "  \n");
    let (config, _) = config(work.path(), gw);

    let results = ingest(input.to_string_lossy(), &config).await.unwrap();
    let doc = single(&results[0].outcome);
    assert_eq!(doc.metadata.get(NO_TEXT), Some("true"));
    assert_eq!(doc.stats.text_source, TextSource::None);
    assert_eq!(doc.stats.word_count, 0);
}

#[tokio::test]
async fn unknown_input_is_an_error() {
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("blob.bin");
    std::fs::write(&input, [0u8, 159, 146, 150, 1, 2, 3]).unwrap();
    let (config, _) = config(work.path(), ScriptedGateway::new());

    let err = ingest(input.to_string_lossy(), &config).await.unwrap_err();
    assert_eq!(err.exit_code(), 4);
}

// ── Upload ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn uploaded_documents_leave_no_work_folder() {
    let work = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    let input = work.path().join("memo.png");
    page(2).save(&input).unwrap();

    let gateway = Arc::new(ScriptedGateway::new().tool(ToolId::Ocr, "Memo to staff\n"));
    let config = IngestConfig::builder()
        .work_root(work.path())
        .gateway(gateway)
        .repository(Arc::new(DirectoryRepository::new(store.path())))
        .upload(true)
        .metadata_field("category", "memos")
        .build()
        .unwrap();

    let results = ingest(input.to_string_lossy(), &config).await.unwrap();
    let doc = single(&results[0].outcome);
    assert!(doc.folder.is_none());
    let id = doc.doc_id.clone().expect("document id");

    let stored = store.path().join(&id);
    let md = Metadata::read(&stored.join("metadata.txt")).unwrap();
    assert_eq!(md.get("category"), Some("memos"));
    assert!(md.get(SHA_HASH).is_some_and(|h| h.len() == 64));
    assert!(stored.join("page-images/page00001.png").is_file());

    let left: Vec<_> = std::fs::read_dir(work.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(left, vec![std::ffi::OsString::from("memo.png")]);
}
