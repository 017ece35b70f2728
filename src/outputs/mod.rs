//! Files written to the audit directory.
//!
//! # Submodules
//!
//! - [`json`]: Checkpoint, report and archive JSON documents
//! - [`tabular`]: `articles.csv` and `daily_summary.csv`
//! - [`charts`]: PNG charts rendered from a report
//!
//! # Output Structure
//!
//! ```text
//! audit_20240205_101500/
//! ├── checkpoint.json
//! ├── articles.csv
//! ├── report.json
//! ├── daily_summary.csv
//! ├── graphs/
//! │   ├── 1_daily_articles.png
//! │   ├── 2_timeline.png
//! │   └── 3_stats_summary.png
//! ├── archiving_checkpoint.json
//! ├── articles_archived.csv
//! ├── archive_report.json
//! └── wayback_urls.txt
//! ```
//!
//! Every file is replaced whole through [`write_atomic`]: readers see either
//! the previous complete file or the new complete file, never a truncated one.

pub mod charts;
pub mod json;
pub mod tabular;

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("chart rendering failed: {0}")]
    Render(String),
}

impl OutputError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        OutputError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Replace `path` with `contents` via a synced sibling temp file and a rename.
///
/// The bytes go to `<file>.tmp` next to `path`, are flushed to disk, and the
/// temp file is then renamed over `path`. A crash at any point leaves either
/// the old file or the new one.
///
/// # Arguments
///
/// * `path` - Destination file; its directory must exist
/// * `contents` - The complete new file body
///
/// # Errors
///
/// [`OutputError::Io`] naming the temp file when creating, writing or syncing
/// it fails, or naming `path` when the rename fails.
///
/// # Examples
///
/// ```ignore
/// write_atomic(&dir.join("checkpoint.json"), json.as_bytes()).await?;
/// ```
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), OutputError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| OutputError::io(&tmp_path, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| OutputError::io(&tmp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| OutputError::io(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| OutputError::io(path, e))?;
    debug!(path = %path.display(), bytes = contents.len(), "Wrote file");
    Ok(())
}
