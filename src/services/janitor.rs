use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Outcome of one sweep over a directory
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: Vec<PathBuf>,
    pub failed: usize,
}

/// Deletes every regular file in `dir` whose last modification is more than
/// `max_age_secs` seconds before the start of the sweep.
///
/// Only immediate entries are considered. Errors never escape: a file that
/// cannot be inspected or removed is logged and skipped, an unreadable
/// directory is logged and yields an empty report.
///
/// Races with in-flight requests are accepted: a file that ages out while a
/// client is still downloading it is deleted anyway.
pub fn sweep_directory(dir: &Path, max_age_secs: u64) -> SweepReport {
    sweep_directory_at(dir, max_age_secs, SystemTime::now())
}

pub(crate) fn sweep_directory_at(dir: &Path, max_age_secs: u64, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();
    let max_age = Duration::from_secs(max_age_secs);

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("Error during cleanup of {}: {}", dir.display(), e);
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                report.failed += 1;
                continue;
            }
        };

        let path = entry.path();
        // file_type() does not follow symlinks
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        report.scanned += 1;

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!("Cannot read mtime of {}: {}", path.display(), e);
                report.failed += 1;
                continue;
            }
        };

        // mtime in the future counts as age zero
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("🧹 Deleted old file: {}", path.display());
                report.deleted.push(path);
            }
            Err(e) => {
                tracing::error!("Error deleting file {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    report
}

/// Async wrapper running the sweep on the blocking pool
pub async fn sweep(dir: PathBuf, max_age_secs: u64) -> SweepReport {
    let dir_name = dir.display().to_string();
    match tokio::task::spawn_blocking(move || sweep_directory(&dir, max_age_secs)).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Cleanup task for {} panicked: {}", dir_name, e);
            SweepReport::default()
        }
    }
}
