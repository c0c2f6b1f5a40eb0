//! Input resolution: turn a user-supplied path or URL into a local path.
//!
//! URL inputs are downloaded into a `TempDir` held by the [`ResolvedInput`],
//! so the download disappears when the input is dropped, whatever happened to
//! the job in between. Parser detection then runs on the local copy exactly
//! as it would on a file the user named directly.

use crate::error::IngestError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: a local file or directory, or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// The `TempDir` keeps the download alive until the job is finished.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input`, downloading it first when it is a URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, IngestError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

/// Check that a local file or directory exists and can be read.
pub fn resolve_local(path: &Path) -> Result<ResolvedInput, IngestError> {
    if !path.exists() {
        return Err(IngestError::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    let readable = if path.is_dir() {
        std::fs::read_dir(path).map(|_| ())
    } else {
        std::fs::File::open(path).map(|_| ())
    };
    match readable {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(IngestError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(IngestError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("resolved local input: {}", path.display());
    Ok(ResolvedInput::Local(path.to_path_buf()))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, IngestError> {
    info!("downloading {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| IngestError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            IngestError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            IngestError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(IngestError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let disposition = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            IngestError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            IngestError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    let filename = extract_filename(url, disposition.as_deref(), &bytes);
    let temp_dir = TempDir::new().map_err(|e| IngestError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| IngestError::Internal(format!("failed to write temp file: {e}")))?;

    info!("downloaded {} bytes to {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Pick a file name for a download: `Content-Disposition`, then the last URL
/// path segment, then `download.<ext>` with the extension sniffed from the
/// content. Detection relies on extensions, so a name without one is avoided.
fn extract_filename(url: &str, disposition: Option<&str>, bytes: &[u8]) -> String {
    if let Some(name) = disposition.and_then(disposition_filename) {
        return name;
    }

    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    let ext = infer::get(bytes).map_or("bin", |k| k.extension());
    format!("download.{ext}")
}

fn disposition_filename(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|part| {
        let value = part.strip_prefix("filename=")?;
        let value = value.trim_matches('"');
        // no directory components from the server
        let name = Path::new(value).file_name()?.to_str()?;
        (!name.is_empty()).then(|| name.to_string())
    })
}
