//! `PageImages` and `OptimizeImages`: one PNG per page, then per-page
//! re-encoding, blank-page removal and page-size normalisation.

use super::job::{Job, JobContext};
use super::{page_image_name, PAGE_IMAGES_DIR};
use crate::error::StageError;
use crate::gateway::{list_files, run_checked, ToolId, ToolRequest};
use crate::metadata::{Metadata, METADATA_FILE, PAGE_COUNT};
use crate::raster;
use crate::registry::SourceKind;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const IMAGES_DPI: &str = "images-dpi";
pub const MONOCHROME_PAGES: &str = "monochrome-pages";
pub const PALETTED_PAGES: &str = "paletted-pages";
pub const FULLCOLOR_PAGES: &str = "fullcolor-pages";
pub const DROPPED_PAGES: &str = "dropped-pages";
pub const MODIFIED_PAGES: &str = "modified-pages";
pub const SKEW_ANGLES: &str = "page-image-skew-angles";

fn image_err(path: &Path, e: impl ToString) -> StageError {
    StageError::Image {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Page images in `dir`, in page order.
pub fn page_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = list_files(dir)
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.starts_with('.'))
        })
        .collect();
    files.sort_by_key(|p| (trailing_number(p), p.clone()));
    files
}

/// Number at the end of a file stem: `page-12.ppm` → 12. Rasterizers do not
/// all zero-pad their page numbers.
fn trailing_number(path: &Path) -> u64 {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let digits: String = stem
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().unwrap_or(0)
}

fn save_png(img: &DynamicImage, path: &Path) -> Result<(), StageError> {
    img.save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| image_err(path, e))
}

// ── PageImages ───────────────────────────────────────────────────────────

pub fn page_images(job: &mut Job, ctx: &JobContext<'_>) -> Result<(), StageError> {
    let pages_dir = job.path().join(PAGE_IMAGES_DIR);
    std::fs::create_dir_all(&pages_dir).map_err(|e| StageError::io(&pages_dir, e))?;

    match job.kind() {
        SourceKind::Pdf => {
            job.pdf = Some(job.source.clone());
            rasterize(job, ctx, &pages_dir)?;
        }
        SourceKind::ConvertedPdf => {
            let pdf = convert_to_pdf(job, ctx)?;
            job.pdf = Some(pdf);
            rasterize(job, ctx, &pages_dir)?;
        }
        SourceKind::Raster => decode_raster(job, ctx, &pages_dir)?,
        SourceKind::Prepared => copy_prepared(job, &pages_dir)?,
    }

    let count = page_files(&pages_dir).len();
    if count == 0 {
        return Err(StageError::Malformed(format!(
            "no page images were produced for '{}'",
            job.source.display()
        )));
    }
    job.stats.page_count = count;
    job.metadata.set(PAGE_COUNT, count);
    info!("{}: {} page images", job.identifier, count);
    Ok(())
}

fn convert_to_pdf(job: &Job, ctx: &JobContext<'_>) -> Result<PathBuf, StageError> {
    let out = job.scratch.path().join("document.pdf");
    let mut req = ToolRequest::new(ToolId::ConvertToPdf, ctx.config.tool_timeout())
        .input(&job.source)
        .output_file(&out);
    for (k, v) in &job.options {
        req = req.option(k.clone(), v);
    }
    let output = run_checked(ctx.gateway, &req)?;
    if !out.exists() {
        if output.stdout.is_empty() {
            return Err(StageError::Malformed(format!(
                "{} produced no PDF for '{}'",
                ToolId::ConvertToPdf,
                job.source.display()
            )));
        }
        std::fs::write(&out, &output.stdout).map_err(|e| StageError::io(&out, e))?;
    }
    debug!("{}: converted to {}", job.identifier, out.display());
    Ok(out)
}

fn rasterize(job: &mut Job, ctx: &JobContext<'_>, pages_dir: &Path) -> Result<(), StageError> {
    let pdf = job
        .pdf
        .clone()
        .ok_or_else(|| StageError::Other("nothing to rasterize".into()))?;
    let raster_dir = job.scratch.path().join("raster");
    let dpi = ctx.config.dpi;
    let req = ToolRequest::new(ToolId::Rasterize, ctx.config.tool_timeout())
        .input(&pdf)
        .output_dir(&raster_dir)
        .option("dpi", dpi)
        .option("color", ctx.config.color);
    run_checked(ctx.gateway, &req)?;

    for (i, file) in page_files(&raster_dir).iter().enumerate() {
        let target = pages_dir.join(page_image_name(i + 1));
        let is_png = file
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        if is_png {
            std::fs::copy(file, &target).map_err(|e| StageError::io(file, e))?;
        } else {
            let img = image::open(file).map_err(|e| image_err(file, e))?;
            save_png(&img, &target)?;
        }
    }
    job.metadata.set(IMAGES_DPI, dpi);
    Ok(())
}

fn is_tiff_file(path: &Path) -> bool {
    crate::parsers::head(path, 4).is_some_and(|h| h == b"II*\0" || h == b"MM\0*")
}

fn decode_raster(job: &mut Job, ctx: &JobContext<'_>, pages_dir: &Path) -> Result<(), StageError> {
    let source = &job.source;
    let pages = if is_tiff_file(source) {
        raster::decode_tiff_pages(source).map_err(|e| image_err(source, e))?
    } else {
        vec![image::open(source).map_err(|e| image_err(source, e))?]
    };
    for (i, page) in pages.iter().enumerate() {
        save_png(page, &pages_dir.join(page_image_name(i + 1)))?;
    }
    let dpi = job
        .options
        .get("dpi")
        .and_then(|d| d.parse::<u32>().ok())
        .unwrap_or(ctx.config.default_raw_dpi);
    job.metadata.set(IMAGES_DPI, dpi);
    Ok(())
}

/// Carry over a prepared folder's page images (or its multi-page TIFF) and
/// its metadata.
fn copy_prepared(job: &mut Job, pages_dir: &Path) -> Result<(), StageError> {
    let source = job.source.clone();
    let src_md = source.join(METADATA_FILE);
    if src_md.is_file() {
        let target = job.path().join(METADATA_FILE);
        std::fs::copy(&src_md, &target).map_err(|e| StageError::io(&src_md, e))?;
        let md = Metadata::read(&src_md).map_err(|e| StageError::io(&src_md, e))?;
        if let Some(dpi) = md.get(IMAGES_DPI).or_else(|| md.get("tiff-dpi")) {
            job.metadata.set_default(IMAGES_DPI, dpi);
        }
    }

    let src_pages = source.join(PAGE_IMAGES_DIR);
    if src_pages.is_dir() {
        for file in page_files(&src_pages) {
            let name = file.file_name().unwrap_or_default();
            let target = pages_dir.join(name);
            std::fs::copy(&file, &target).map_err(|e| StageError::io(&file, e))?;
        }
        return Ok(());
    }

    let tiff = [source.join("originals/document.tiff"), source.join("document.tiff")]
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| StageError::Malformed(format!("'{}' has no page images", source.display())))?;
    let pages = raster::decode_tiff_pages(&tiff).map_err(|e| image_err(&tiff, e))?;
    for (i, page) in pages.iter().enumerate() {
        save_png(page, &pages_dir.join(page_image_name(i + 1)))?;
    }
    Ok(())
}

// ── OptimizeImages ───────────────────────────────────────────────────────

/// Compression bucket of a page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    /// A single color throughout.
    Blank,
    /// Black and white only.
    Monochrome,
    /// Few enough colors for a palette. `gray` when all are neutral.
    Paletted { gray: bool },
    FullColor,
}

/// Bucket a page by counting its distinct colors, stopping once it is clearly
/// full color.
pub fn classify(img: &DynamicImage) -> PageClass {
    let mut colors: HashSet<[u8; 3]> = HashSet::new();
    let rgb = img.to_rgb8();
    for p in rgb.pixels() {
        colors.insert(p.0);
        if colors.len() > 256 {
            return PageClass::FullColor;
        }
    }
    let gray = colors.iter().all(|[r, g, b]| r == g && g == b);
    match colors.len() {
        0 | 1 => PageClass::Blank,
        2 if colors.contains(&[0, 0, 0]) && colors.contains(&[255, 255, 255]) => PageClass::Monochrome,
        n if n < 256 => PageClass::Paletted { gray },
        // 256 levels of gray still fit a palette
        _ if gray => PageClass::Paletted { gray },
        _ => PageClass::FullColor,
    }
}

fn encode(img: &DynamicImage, class: PageClass) -> DynamicImage {
    match class {
        PageClass::Blank | PageClass::Monochrome => {
            let mut l = img.to_luma8();
            l.pixels_mut().for_each(|p| p.0[0] = if p.0[0] < 128 { 0 } else { 255 });
            DynamicImage::ImageLuma8(l)
        }
        PageClass::Paletted { gray: true } => DynamicImage::ImageLuma8(img.to_luma8()),
        PageClass::Paletted { gray: false } | PageClass::FullColor => {
            DynamicImage::ImageRgb8(img.to_rgb8())
        }
    }
}

/// Size most pages share.
///
/// One size: that size. Two sizes that are rotations of each other: the first
/// page's. A size held by more than half the pages: that size. Otherwise the
/// largest.
pub fn canonical_size(sizes: &[(u32, u32)]) -> Option<(u32, u32)> {
    let first = *sizes.first()?;
    let mut counts: BTreeMap<(u32, u32), usize> = BTreeMap::new();
    for &s in sizes {
        *counts.entry(s).or_default() += 1;
    }
    if counts.len() == 1 {
        return Some(first);
    }
    if counts.len() == 2 {
        let mut keys = counts.keys();
        if let (Some(&a), Some(&b)) = (keys.next(), keys.next()) {
            if a == (b.1, b.0) {
                return Some(first);
            }
        }
    }
    if let Some((&size, _)) = counts.iter().find(|(_, &n)| n * 2 > sizes.len()) {
        return Some(size);
    }
    counts.keys().max().copied()
}

/// Bring a page to `size`: rotate a sideways page, pad a small one on the
/// right and bottom with its corner color, shrink a large one and pad.
pub fn fit_to(img: DynamicImage, size: (u32, u32)) -> (DynamicImage, Option<&'static str>) {
    let (w, h) = img.dimensions();
    let (cw, ch) = size;
    if (w, h) == (cw, ch) {
        return (img, None);
    }
    if (h, w) == (cw, ch) {
        return (img.rotate90(), Some("rotated"));
    }
    let (img, how) = if w <= cw && h <= ch {
        (img, "padded")
    } else {
        let scale = (cw as f64 / w as f64).min(ch as f64 / h as f64);
        let nw = ((w as f64 * scale).floor() as u32).clamp(1, cw);
        let nh = ((h as f64 * scale).floor() as u32).clamp(1, ch);
        (img.resize_exact(nw, nh, FilterType::Triangle), "scaled")
    };
    let background: Rgba<u8> = img.get_pixel(0, 0);
    let mut canvas = RgbaImage::from_pixel(cw, ch, background);
    imageops::overlay(&mut canvas, &img.to_rgba8(), 0, 0);
    (DynamicImage::ImageRgba8(canvas), Some(how))
}

fn join_pages(pages: &[usize]) -> String {
    pages
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn optimize(job: &mut Job, ctx: &JobContext<'_>) -> Result<(), StageError> {
    let pages_dir = job.path().join(PAGE_IMAGES_DIR);
    if ctx.config.optimize_images {
        optimize_pages(job, ctx, &pages_dir)?;
    }
    if ctx.config.deskew {
        let out = run_page_tool(ctx, ToolId::Deskew, &pages_dir)?;
        let angles: Vec<&str> = out.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if !angles.is_empty() {
            job.metadata.set(SKEW_ANGLES, angles.join(", "));
        }
    }
    if ctx.config.dryclean {
        run_page_tool(ctx, ToolId::Dryclean, &pages_dir)?;
    }
    Ok(())
}

/// Run an in-place page image tool; a missing tool is logged and skipped.
fn run_page_tool(ctx: &JobContext<'_>, tool: ToolId, pages_dir: &Path) -> Result<String, StageError> {
    if !ctx.gateway.supports(tool) {
        warn!("{} requested but not available, skipping", tool);
        return Ok(String::new());
    }
    let req = ToolRequest::new(tool, ctx.config.tool_timeout())
        .inputs(page_files(pages_dir))
        .output_dir(pages_dir);
    let out = run_checked(ctx.gateway, &req)?;
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// What the classification pass keeps of a page: no pixels.
struct PageScan {
    file: PathBuf,
    class: PageClass,
    size: (u32, u32),
}

/// Hidden name a re-encoded page is written under until every page is done.
fn staged_name(page: usize) -> String {
    format!(".optimized-{}", page_image_name(page))
}

/// Classify every page, then re-encode the kept ones one at a time under
/// staged names. Only when all of them are written do the staged files
/// replace the originals; any failure before that leaves the folder as it was.
fn optimize_pages(job: &mut Job, ctx: &JobContext<'_>, pages_dir: &Path) -> Result<(), StageError> {
    let mut scans: Vec<PageScan> = Vec::new();
    for (i, file) in page_files(pages_dir).into_iter().enumerate() {
        let img = image::open(&file).map_err(|e| image_err(&file, e))?;
        let class = classify(&img);
        debug!("{}: page {} is {:?}", job.identifier, i + 1, class);
        scans.push(PageScan {
            size: img.dimensions(),
            class,
            file,
        });
    }

    let all_blank = scans.iter().all(|s| s.class == PageClass::Blank);
    let drop_blanks = !ctx.config.save_blank_pages && !all_blank;
    if all_blank && !scans.is_empty() && !ctx.config.save_blank_pages {
        debug!("{}: every page is blank, keeping them all", job.identifier);
    }
    let mut kept: Vec<&PageScan> = Vec::with_capacity(scans.len());
    let mut dropped: Vec<usize> = Vec::new();
    for (i, scan) in scans.iter().enumerate() {
        if drop_blanks && scan.class == PageClass::Blank {
            dropped.push(i + 1);
        } else {
            kept.push(scan);
        }
    }

    let canonical = if ctx.config.canonical_page_size {
        canonical_size(&kept.iter().map(|s| s.size).collect::<Vec<_>>())
    } else {
        None
    };
    let mut modified = Vec::new();
    if let Err(e) = stage_pages(&kept, canonical, pages_dir, &mut modified) {
        for n in 1..=kept.len() {
            let _ = std::fs::remove_file(pages_dir.join(staged_name(n)));
        }
        return Err(e);
    }
    commit_staged(&scans, kept.len(), pages_dir)?;

    let (mut mono, mut pal, mut full) = (Vec::new(), Vec::new(), Vec::new());
    for (n, scan) in kept.iter().enumerate() {
        match scan.class {
            PageClass::Blank | PageClass::Monochrome => mono.push(n + 1),
            PageClass::Paletted { .. } => pal.push(n + 1),
            PageClass::FullColor => full.push(n + 1),
        }
    }
    for (key, pages) in [(MONOCHROME_PAGES, &mono), (PALETTED_PAGES, &pal), (FULLCOLOR_PAGES, &full)] {
        if !pages.is_empty() {
            job.metadata.set(key, join_pages(pages));
        }
    }
    if !dropped.is_empty() {
        info!("{}: dropped blank pages {:?}", job.identifier, dropped);
        job.metadata.set(DROPPED_PAGES, join_pages(&dropped));
    }
    if !modified.is_empty() {
        job.metadata.set(MODIFIED_PAGES, modified.join(", "));
    }
    job.metadata.set(PAGE_COUNT, kept.len());
    job.stats.page_count = kept.len();
    job.stats.monochrome_pages = mono.len();
    job.stats.paletted_pages = pal.len();
    job.stats.fullcolor_pages = full.len();
    job.stats.dropped_pages = dropped.clone();
    job.dropped_pages = dropped;
    Ok(())
}

fn stage_pages(
    kept: &[&PageScan],
    canonical: Option<(u32, u32)>,
    pages_dir: &Path,
    modified: &mut Vec<String>,
) -> Result<(), StageError> {
    for (n, scan) in kept.iter().enumerate() {
        let mut img = image::open(&scan.file).map_err(|e| image_err(&scan.file, e))?;
        if let Some(size) = canonical {
            let (fitted, how) = fit_to(img, size);
            img = fitted;
            if let Some(how) = how {
                modified.push(format!("{}:{how}", n + 1));
            }
        }
        save_png(&encode(&img, scan.class), &pages_dir.join(staged_name(n + 1)))?;
    }
    Ok(())
}

/// Rename staged pages into place and remove originals left past the end.
fn commit_staged(scans: &[PageScan], kept: usize, pages_dir: &Path) -> Result<(), StageError> {
    let finals: HashSet<PathBuf> = (1..=kept).map(|n| pages_dir.join(page_image_name(n))).collect();
    for n in 1..=kept {
        let staged = pages_dir.join(staged_name(n));
        let target = pages_dir.join(page_image_name(n));
        std::fs::rename(&staged, &target).map_err(|e| StageError::io(&staged, e))?;
    }
    for scan in scans.iter().filter(|s| !finals.contains(&s.file)) {
        std::fs::remove_file(&scan.file).map_err(|e| StageError::io(&scan.file, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::job::testutil::{config_in, job_for, StubGateway};
    use crate::parsers::TiffDoc;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use std::sync::Arc;

    fn gray(w: u32, h: u32, f: impl Fn(u32, u32) -> u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| Luma([f(x, y)])))
    }

    #[test]
    fn buckets_by_color_count() {
        assert_eq!(classify(&gray(4, 4, |_, _| 200)), PageClass::Blank);
        assert_eq!(
            classify(&gray(4, 4, |x, _| if x < 2 { 0 } else { 255 })),
            PageClass::Monochrome
        );
        assert_eq!(
            classify(&gray(4, 4, |x, _| (x * 60) as u8)),
            PageClass::Paletted { gray: true }
        );
        assert_eq!(classify(&gray(16, 16, |x, y| (y * 16 + x) as u8)), PageClass::Paletted { gray: true });
        let rainbow = DynamicImage::ImageRgb8(RgbImage::from_fn(32, 32, |x, y| {
            Rgb([(x * 8) as u8, (y * 8) as u8, ((x + y) * 4) as u8])
        }));
        assert_eq!(classify(&rainbow), PageClass::FullColor);
    }

    #[test]
    fn canonical_size_rules() {
        assert_eq!(canonical_size(&[(10, 20), (10, 20)]), Some((10, 20)));
        assert_eq!(canonical_size(&[(20, 10), (10, 20), (10, 20)]), Some((20, 10)));
        assert_eq!(canonical_size(&[(5, 5), (10, 20), (10, 20), (7, 7)]), Some((10, 20)));
        assert_eq!(canonical_size(&[(5, 5), (10, 20), (7, 7)]), Some((10, 20)));
        assert_eq!(canonical_size(&[]), None);
    }

    #[test]
    fn fitting_pads_with_corner_color_and_rotates() {
        let small = gray(2, 2, |_, _| 90);
        let (fitted, how) = fit_to(small, (4, 3));
        assert_eq!(how, Some("padded"));
        assert_eq!(fitted.dimensions(), (4, 3));
        assert_eq!(fitted.to_luma8().get_pixel(3, 2).0, [90]);

        let (rotated, how) = fit_to(gray(3, 4, |_, _| 0), (4, 3));
        assert_eq!(how, Some("rotated"));
        assert_eq!(rotated.dimensions(), (4, 3));

        let (shrunk, how) = fit_to(gray(8, 8, |_, _| 0), (4, 3));
        assert_eq!(how, Some("scaled"));
        assert_eq!(shrunk.dimensions(), (4, 3));
    }

    #[test]
    fn blank_pages_are_dropped_and_pages_renumbered() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("scan.tiff");
        crate::raster::tests::write_gray_tiff(&src, 6, 6, &[255, 255, 255]);
        let config = config_in(work.path()).build().unwrap();
        let gw = StubGateway::new();
        let ctx = JobContext { config: &config, gateway: &gw };
        let mut job = job_for(work.path(), Arc::new(TiffDoc), &src);

        let pages = job.path().join(PAGE_IMAGES_DIR);
        std::fs::create_dir_all(&pages).unwrap();
        gray(6, 6, |_, _| 255).save(pages.join(page_image_name(1))).unwrap();
        gray(6, 6, |x, _| if x < 3 { 0 } else { 255 }).save(pages.join(page_image_name(2))).unwrap();
        gray(6, 6, |_, _| 255).save(pages.join(page_image_name(3))).unwrap();
        gray(6, 6, |x, y| (x * 40 + y) as u8).save(pages.join(page_image_name(4))).unwrap();

        optimize(&mut job, &ctx).unwrap();

        assert_eq!(job.dropped_pages, vec![1, 3]);
        assert_eq!(job.metadata.get(DROPPED_PAGES), Some("1, 3"));
        assert_eq!(job.metadata.get(MONOCHROME_PAGES), Some("1"));
        assert_eq!(job.metadata.get(PALETTED_PAGES), Some("2"));
        assert_eq!(job.metadata.get(PAGE_COUNT), Some("2"));
        let names: Vec<String> = page_files(&pages)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page00001.png", "page00002.png"]);
    }

    #[test]
    fn failed_reencode_leaves_original_pages() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("scan.tiff");
        crate::raster::tests::write_gray_tiff(&src, 6, 6, &[255, 255, 255]);
        let config = config_in(work.path()).build().unwrap();
        let gw = StubGateway::new();
        let ctx = JobContext { config: &config, gateway: &gw };
        let mut job = job_for(work.path(), Arc::new(TiffDoc), &src);

        let pages = job.path().join(PAGE_IMAGES_DIR);
        std::fs::create_dir_all(&pages).unwrap();
        for n in 1..=3u32 {
            gray(6, 6, |x, _| if x < n { 0 } else { 255 }).save(pages.join(page_image_name(n as usize))).unwrap();
        }
        let before: Vec<Vec<u8>> = page_files(&pages).iter().map(|p| std::fs::read(p).unwrap()).collect();
        // a directory in the way makes writing page 2 fail
        std::fs::create_dir(pages.join(staged_name(2))).unwrap();

        assert!(optimize(&mut job, &ctx).is_err());

        let after: Vec<Vec<u8>> = page_files(&pages).iter().map(|p| std::fs::read(p).unwrap()).collect();
        assert_eq!(after, before);
        assert!(!pages.join(staged_name(1)).exists());
    }

    #[test]
    fn all_blank_document_keeps_its_pages() {
        let work = tempfile::tempdir().unwrap();
        let src = work.path().join("blank.tiff");
        crate::raster::tests::write_gray_tiff(&src, 4, 4, &[255, 255]);
        let config = config_in(work.path()).build().unwrap();
        let gw = StubGateway::new();
        let ctx = JobContext { config: &config, gateway: &gw };
        let mut job = job_for(work.path(), Arc::new(TiffDoc), &src);

        page_images(&mut job, &ctx).unwrap();
        assert_eq!(job.metadata.get(IMAGES_DPI), Some("75"));
        optimize(&mut job, &ctx).unwrap();
        assert!(job.dropped_pages.is_empty());
        assert_eq!(job.stats.page_count, 2);
        assert_eq!(job.stats.monochrome_pages, 2);
    }

    #[test]
    fn page_files_sort_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for n in ["page-10.ppm", "page-2.ppm", "page-1.ppm", ".hidden"] {
            std::fs::write(dir.path().join(n), "").unwrap();
        }
        let names: Vec<String> = page_files(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page-1.ppm", "page-2.ppm", "page-10.ppm"]);
    }
}
