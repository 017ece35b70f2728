//! JSON documents: checkpoints, reports and archive results.
//!
//! Documents are pretty-printed so that an operator can inspect or hand-edit
//! a checkpoint before resuming.

use super::{OutputError, write_atomic};
use crate::models::{CheckpointSnapshot, ReportSnapshot};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument, warn};

pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const REPORT_FILE: &str = "report.json";

/// Why a checkpoint could not be restored.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed checkpoint {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Serialize `value` as pretty JSON and write it atomically to `path`.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json).await
}

#[instrument(level = "info", skip_all, fields(path = %path.display(), articles = snapshot.articles_count))]
pub async fn write_checkpoint(path: &Path, snapshot: &CheckpointSnapshot) -> Result<(), OutputError> {
    write_json(path, snapshot).await?;
    info!("Wrote checkpoint");
    Ok(())
}

pub async fn write_report(path: &Path, report: &ReportSnapshot) -> Result<(), OutputError> {
    write_json(path, report).await
}

/// Read a checkpoint written by [`write_checkpoint`].
///
/// A disagreeing `articles_count` is reconciled to the article list with a
/// warning rather than rejected.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_checkpoint(path: &Path) -> Result<CheckpointSnapshot, CheckpointError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CheckpointError::Missing(path.to_path_buf()));
        }
        Err(source) => {
            return Err(CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut snapshot: CheckpointSnapshot =
        serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    if snapshot.articles_count != snapshot.articles.len() {
        warn!(
            declared = snapshot.articles_count,
            actual = snapshot.articles.len(),
            "Checkpoint article count mismatch; trusting the article list"
        );
        snapshot.articles_count = snapshot.articles.len();
    }
    info!(articles = snapshot.articles_count, timestamp = %snapshot.timestamp, "Read checkpoint");
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleRecord, PublishedDate};

    fn snapshot() -> CheckpointSnapshot {
        CheckpointSnapshot {
            timestamp: "2024-02-05T10:15:00+00:00".to_string(),
            articles_count: 1,
            articles: vec![ArticleRecord {
                url: "https://example.com/blog/1/uno".to_string(),
                title: "Uno ñ".to_string(),
                date_raw: "lunes, 5 de febrero de 2024".to_string(),
                date_parsed: PublishedDate::from("2024-02-05".to_string()),
                page_number: 1,
                archive_url: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_checkpoint_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE);
        write_checkpoint(&path, &snapshot()).await.unwrap();

        let loaded = read_checkpoint(&path).await.unwrap();
        assert_eq!(loaded.articles, snapshot().articles);
        assert_eq!(loaded.timestamp, "2024-02-05T10:15:00+00:00");
    }

    #[tokio::test]
    async fn test_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_checkpoint(&dir.path().join(CHECKPOINT_FILE)).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Missing(_)));
    }

    #[tokio::test]
    async fn test_malformed_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE);
        std::fs::write(&path, "{ invalid json }").unwrap();
        assert!(matches!(
            read_checkpoint(&path).await.unwrap_err(),
            CheckpointError::Malformed { .. }
        ));

        std::fs::write(&path, r#"{"timestamp": "x", "articles_count": 0}"#).unwrap();
        assert!(matches!(
            read_checkpoint(&path).await.unwrap_err(),
            CheckpointError::Malformed { .. }
        ));
    }

    #[tokio::test]
    async fn test_count_mismatch_is_reconciled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE);
        let mut bad = snapshot();
        bad.articles_count = 99;
        write_checkpoint(&path, &bad).await.unwrap();
        assert_eq!(read_checkpoint(&path).await.unwrap().articles_count, 1);
    }
}
