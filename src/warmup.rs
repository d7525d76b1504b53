//! Background warm-up of the conversion cache.
//!
//! Started once at process start and never joined. Items are converted
//! through the cache so the first preview that uses them is a hit. Template
//! fragments are converted without the cache and written as static JPEGs
//! under `<static_pages_dir>/<folder>/<stem>/page_0001.jpg`, …, so they can
//! be served without holding them in memory.
//!
//! A failing file is logged, recorded in the [`WarmupReport`] and skipped.
//! Requests arriving before warm-up finishes simply miss the cache.

use crate::compose::Composer;
use crate::error::{ComposeError, FragmentIssue};
use crate::progress::{IssueLog, NoopProgress};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Outcome of a warm-up run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarmupReport {
    pub items_cached: usize,
    pub fragments_rendered: usize,
    pub pages_written: usize,
    pub failures: Vec<FragmentIssue>,
    /// Items converted without the cache because they could not be
    /// fingerprinted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cache_bypassed: Vec<FragmentIssue>,
    pub elapsed_secs: f64,
}

/// Observable state of a detached warm-up task.
#[derive(Debug, Default)]
pub struct WarmupStatus {
    ready: AtomicBool,
    report: Mutex<Option<WarmupReport>>,
}

impl WarmupStatus {
    /// True once every item and fragment has been attempted.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn report(&self) -> Option<WarmupReport> {
        self.report.lock().clone()
    }
}

/// Spawn the warm-up on the current runtime and return immediately.
pub fn spawn_warmup(composer: Composer) -> (Arc<WarmupStatus>, JoinHandle<()>) {
    let status = Arc::new(WarmupStatus::default());
    let observed = Arc::clone(&status);
    let handle = tokio::spawn(async move {
        let report = run_warmup(&composer).await;
        *observed.report.lock() = Some(report);
        observed.ready.store(true, Ordering::Release);
    });
    (status, handle)
}

/// Warm items then fragments, to completion.
pub async fn run_warmup(composer: &Composer) -> WarmupReport {
    let start = Instant::now();
    let mut report = WarmupReport::default();

    match composer.items().files() {
        Ok(items) => {
            info!("Warm-up: {} items", items.len());
            let issues = IssueLog::default();
            for (i, path) in items.iter().enumerate() {
                info!("Warm-up item [{}/{}] {}", i + 1, items.len(), path.display());
                match composer
                    .pipeline()
                    .convert_to_images(path, true, &issues)
                    .await
                {
                    Ok(_) => report.items_cached += 1,
                    Err(e) => record_failure(&mut report, path, &e),
                }
            }
            report.cache_bypassed = issues.take();
        }
        Err(e) => warn!("Warm-up: cannot list items: {}", e),
    }

    match composer.catalog().fragment_files() {
        Ok(fragments) => {
            info!("Warm-up: {} template fragments", fragments.len());
            let root = composer.catalog().dir().to_path_buf();
            let out_root = composer.config().static_pages_dir.clone();
            for path in &fragments {
                let out_dir = static_dir_for(&root, &out_root, path);
                match composer
                    .pipeline()
                    .render_to_dir(path, &out_dir, &NoopProgress)
                    .await
                {
                    Ok(written) => {
                        report.fragments_rendered += 1;
                        report.pages_written += written.len();
                    }
                    Err(e) => record_failure(&mut report, path, &e),
                }
            }
        }
        Err(e) => warn!("Warm-up: cannot list template fragments: {}", e),
    }

    report.elapsed_secs = start.elapsed().as_secs_f64();
    info!(
        "Warm-up finished in {:.1}s: {} items cached, {} fragments rendered, {} failures",
        report.elapsed_secs,
        report.items_cached,
        report.fragments_rendered,
        report.failures.len()
    );
    report
}

fn record_failure(report: &mut WarmupReport, path: &Path, e: &ComposeError) {
    warn!("Warm-up of {} failed: {}", path.display(), e);
    report.failures.push(FragmentIssue::WarmupFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    });
}

/// `<out_root>/<folder>/<stem>` for `<root>/<folder>/<stem>.docx`, and
/// `<out_root>/<stem>` for a fragment outside `root`.
fn static_dir_for(root: &Path, out_root: &Path, fragment: &Path) -> PathBuf {
    let mut dir = out_root.to_path_buf();
    if let Ok(relative) = fragment.strip_prefix(root) {
        if let Some(parent) = relative.parent() {
            dir.push(parent);
        }
    }
    if let Some(stem) = fragment.file_stem() {
        dir.push(stem);
    }
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_dir_mirrors_template_layout() {
        let dir = static_dir_for(
            Path::new("/srv/templates"),
            Path::new("/srv/out_jpg/templates"),
            Path::new("/srv/templates/standard/01_cover.docx"),
        );
        assert_eq!(dir, PathBuf::from("/srv/out_jpg/templates/standard/01_cover"));
    }

    #[test]
    fn fragment_outside_root_stays_under_out_root() {
        let dir = static_dir_for(
            Path::new("/srv/templates"),
            Path::new("/srv/out_jpg/templates"),
            Path::new("/mnt/shared/special/01_cover.docx"),
        );
        assert_eq!(dir, PathBuf::from("/srv/out_jpg/templates/01_cover"));
    }

    #[test]
    fn status_starts_not_ready() {
        let s = WarmupStatus::default();
        assert!(!s.is_ready());
        assert!(s.report().is_none());
    }
}
