use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::domain::{Bucket, ForecastEntry};
use crate::forecast::AggregatedMap;

/// Optional hook receiving every new snapshot alongside the cache builders.
///
/// Observers cannot fail a refresh cycle; they report their own problems.
/// They run on the blocking pool, so plain file I/O is fine here.
pub trait SnapshotObserver: Send + Sync {
    fn on_snapshot(&self, snapshot: &AggregatedMap);
}

/// Writes each snapshot as JSON to `<dir>/snapshot.json`
#[derive(Debug, Clone)]
pub struct SnapshotDumper {
    dir: PathBuf,
}

#[derive(Serialize)]
struct SnapshotRecord<'a> {
    bucket: &'a Bucket,
    entries: &'a [ForecastEntry],
}

impl SnapshotDumper {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("snapshot.json")
    }

    fn write(&self, snapshot: &AggregatedMap, path: &Path) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let records: Vec<SnapshotRecord<'_>> = snapshot
            .iter()
            .map(|(bucket, entries)| SnapshotRecord { bucket, entries })
            .collect();

        let mut out = BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        );
        serde_json::to_writer_pretty(&mut out, &records).context("serializing snapshot")?;
        out.flush()?;
        Ok(())
    }
}

impl SnapshotObserver for SnapshotDumper {
    fn on_snapshot(&self, snapshot: &AggregatedMap) {
        let path = self.path();
        match self.write(snapshot, &path) {
            Ok(()) => debug!(path = %path.display(), buckets = snapshot.len(), "snapshot written"),
            Err(e) => warn!(error = %e, path = %path.display(), "failed to write snapshot"),
        }
    }
}
