//! `LinkExtraction`: hyperlinks for the formats that carry them.

use super::job::{Job, JobContext};
use crate::error::StageError;
use crate::gateway::{run_checked, ToolId, ToolRequest};
use tracing::{debug, warn};

pub const LINKS_DIR: &str = "links";
pub const LINKS_FILE: &str = "document.links";

/// Run the link extractor into `links/document.links`, one link per line.
/// A missing or failing extractor leaves the document without links.
pub fn extract_links(job: &mut Job, ctx: &JobContext<'_>) -> Result<(), StageError> {
    if !ctx.gateway.supports(ToolId::Links) {
        debug!("{}: no link extractor configured", job.identifier);
        return Ok(());
    }
    let dir = job.path().join(LINKS_DIR);
    std::fs::create_dir_all(&dir).map_err(|e| StageError::io(&dir, e))?;
    let file = dir.join(LINKS_FILE);

    let mut req = ToolRequest::new(ToolId::Links, ctx.config.tool_timeout())
        .input(&job.source)
        .output_file(&file);
    if let Some(pdf) = &job.pdf {
        req = req.option("pdf", pdf.display());
    }
    let links = match run_checked(ctx.gateway, &req).and_then(|out| out.primary(&req)) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("{}: link extraction failed: {e}", job.identifier);
            String::new()
        }
    };

    let count = links.lines().filter(|l| !l.trim().is_empty()).count();
    if count == 0 {
        std::fs::remove_dir_all(&dir).map_err(|e| StageError::io(&dir, e))?;
        return Ok(());
    }
    if !file.exists() {
        std::fs::write(&file, &links).map_err(|e| StageError::io(&file, e))?;
    }
    job.stats.link_count = count;
    debug!("{}: {} links", job.identifier, count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::WebPage;
    use crate::pipeline::job::testutil::{config_in, job_for, StubGateway};
    use crate::gateway::ToolOutput;
    use std::sync::Arc;

    #[test]
    fn links_from_stdout_are_saved_and_counted() {
        let work = tempfile::tempdir().unwrap();
        let gw = StubGateway::new().with_fn(ToolId::Links, |_| ToolOutput {
            status: 0,
            stdout: b"https://a.example/\n\nhttps://b.example/\n".to_vec(),
            ..Default::default()
        });
        let config = config_in(work.path()).build().unwrap();
        let ctx = JobContext { config: &config, gateway: &gw };
        let mut job = job_for(work.path(), Arc::new(WebPage), &work.path().join("p.html"));

        extract_links(&mut job, &ctx).unwrap();
        assert_eq!(job.stats.link_count, 2);
        assert!(job.path().join("links/document.links").exists());
    }

    #[test]
    fn failing_extractor_leaves_no_links() {
        let work = tempfile::tempdir().unwrap();
        let gw = StubGateway::new().with(ToolId::Links, 2, "");
        let config = config_in(work.path()).build().unwrap();
        let ctx = JobContext { config: &config, gateway: &gw };
        let mut job = job_for(work.path(), Arc::new(WebPage), &work.path().join("p.html"));

        extract_links(&mut job, &ctx).unwrap();
        assert_eq!(job.stats.link_count, 0);
        assert!(!job.path().join(LINKS_DIR).exists());
    }
}
