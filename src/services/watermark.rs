use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

/// Process-wide "last successful update" marker.
///
/// Deliberately outside the transactional store: it is a best-effort
/// debounce, not a correctness guarantee, and is never read in the same
/// transaction as observation writes.
pub trait WatermarkStore: Send + Sync {
    /// When the last successful run completed, if ever.
    fn last_run(&self) -> Option<DateTime<Utc>>;

    /// Overwrite the marker. Called once per successful pipeline run.
    fn mark(&self, at: DateTime<Utc>) -> std::io::Result<()>;
}

/// File-backed watermark: one RFC 3339 line. An absent or unreadable file
/// reads as "never updated".
pub struct FileWatermark {
    path: PathBuf,
}

impl FileWatermark {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("last_update_utc.txt"),
        }
    }
}

impl WatermarkStore for FileWatermark {
    fn last_run(&self) -> Option<DateTime<Utc>> {
        let text = fs::read_to_string(&self.path).ok()?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        match DateTime::parse_from_rfc3339(trimmed) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                warn!("ignoring unparseable watermark {:?}: {}", self.path, e);
                None
            }
        }
    }

    fn mark(&self, at: DateTime<Utc>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, at.to_rfc3339())
    }
}

/// In-memory watermark for tests.
#[derive(Default)]
pub struct MemoryWatermark {
    inner: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryWatermark {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkStore for MemoryWatermark {
    fn last_run(&self) -> Option<DateTime<Utc>> {
        *self.inner.lock()
    }

    fn mark(&self, at: DateTime<Utc>) -> std::io::Result<()> {
        *self.inner.lock() = Some(at);
        Ok(())
    }
}
