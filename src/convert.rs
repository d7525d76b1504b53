//! The conversion pipeline: DOCX in, ordered JPEG pages out.
//!
//! ## Cache and single flight
//!
//! With caching enabled the source is fingerprinted first and a hit returns
//! immediately. On a miss, callers for the same fingerprint queue on a
//! per-key lock and re-check the cache once they hold it, so N concurrent
//! requests for one uncached document trigger exactly one external
//! conversion.
//!
//! ## Scratch files
//!
//! Each conversion gets its own temporary directory under the configured
//! scratch directory. The intermediate PDF lives there and the directory is
//! removed when the call returns, whether it succeeded or not.
//!
//! An unreadable source cannot be fingerprinted. It is converted without the
//! cache and a [`FragmentIssue::HashUnavailable`] goes to the callback.

use crate::config::{ComposerConfig, RasterOptions};
use crate::error::{ComposeError, FragmentIssue};
use crate::pipeline::cache::{ConversionCache, PageSet};
use crate::pipeline::gateway::ConverterGateway;
use crate::pipeline::hash::{fingerprint_file, Fingerprint};
use crate::pipeline::render::{rasterize_pdf, PageRasterizer, PdfiumRasterizer};
use crate::progress::ProgressCallback;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

type FlightSlot = Arc<tokio::sync::Mutex<()>>;

/// Shared conversion service. Cheap to share behind an `Arc`.
pub struct ConversionPipeline {
    gateway: Arc<ConverterGateway>,
    rasterizer: Arc<dyn PageRasterizer>,
    cache: Arc<ConversionCache>,
    options: RasterOptions,
    scratch_dir: PathBuf,
    inflight: Mutex<HashMap<Fingerprint, FlightSlot>>,
}

impl ConversionPipeline {
    pub fn new(
        gateway: Arc<ConverterGateway>,
        rasterizer: Arc<dyn PageRasterizer>,
        cache: Arc<ConversionCache>,
        options: RasterOptions,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gateway,
            rasterizer,
            cache,
            options,
            scratch_dir: scratch_dir.into(),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// LibreOffice gateway, pdfium rasterizer and an empty cache.
    pub fn from_config(config: &ComposerConfig) -> Self {
        Self::new(
            Arc::new(ConverterGateway::from_config(config)),
            Arc::new(PdfiumRasterizer::new(config.pdfium_lib_path.clone())),
            Arc::new(ConversionCache::new()),
            config.raster_options(),
            config.scratch_dir.clone(),
        )
    }

    pub fn cache(&self) -> &Arc<ConversionCache> {
        &self.cache
    }

    pub fn gateway(&self) -> &Arc<ConverterGateway> {
        &self.gateway
    }

    pub fn options(&self) -> RasterOptions {
        self.options
    }

    /// Pages cached for the file at `path` as it is on disk now.
    pub fn cached_page_count(&self, path: &Path) -> Option<usize> {
        fingerprint_file(path).and_then(|fp| self.cache.page_count(&fp))
    }

    /// Convert `source` into its ordered page images.
    ///
    /// `progress` receives 20 % before the DOCX → PDF step and 50 % before
    /// rasterisation. A cache hit emits nothing.
    pub async fn convert_to_images(
        &self,
        source: &Path,
        use_cache: bool,
        progress: &dyn ProgressCallback,
    ) -> Result<PageSet, ComposeError> {
        if !use_cache {
            return self.convert_uncached(source, progress).await;
        }

        let Some(fp) = fingerprint_off_thread(source).await else {
            warn!(
                "Fingerprint unavailable for {}; cache bypassed",
                source.display()
            );
            progress.on_issue(&FragmentIssue::HashUnavailable {
                path: source.to_path_buf(),
            });
            return self.convert_uncached(source, progress).await;
        };

        if let Some(hit) = self.cache.get(&fp) {
            debug!("Cache hit for {} ({})", source.display(), fp);
            return Ok(hit);
        }

        let slot = self
            .inflight
            .lock()
            .entry(fp)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _flight = slot.lock().await;

        if let Some(hit) = self.cache.get(&fp) {
            debug!("Cache filled while waiting for {}", source.display());
            return Ok(hit);
        }

        debug!("Cache miss for {} ({})", source.display(), fp);
        let result = self.convert_uncached(source, progress).await;
        if let Ok(pages) = &result {
            self.cache.put(fp, Arc::clone(pages));
        }
        self.inflight.lock().remove(&fp);
        result
    }

    async fn convert_uncached(
        &self,
        source: &Path,
        progress: &dyn ProgressCallback,
    ) -> Result<PageSet, ComposeError> {
        let start = Instant::now();

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| ComposeError::write(&self.scratch_dir, e))?;
        let scratch = self.scratch_dir.clone();
        let work = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix("convert-")
                .tempdir_in(&scratch)
                .map_err(|e| ComposeError::write(&scratch, e))
        })
        .await
        .map_err(|e| ComposeError::Internal(format!("Scratch task panicked: {}", e)))??;

        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let pdf = work.path().join(format!("{}.pdf", stem));

        progress.on_progress("Converting DOCX → PDF", 20);
        self.gateway.convert(source, &pdf).await?;

        progress.on_progress("Rendering pages", 50);
        let pages = rasterize_pdf(Arc::clone(&self.rasterizer), &pdf, self.options).await?;

        info!(
            "Converted {} → {} pages in {}ms",
            source.display(),
            pages.len(),
            start.elapsed().as_millis()
        );
        Ok(pages.into())
    }

    /// Convert `source` without the cache and write `page_0001.jpg`, … into
    /// `out_dir`. Returns the written paths in page order.
    pub async fn render_to_dir(
        &self,
        source: &Path,
        out_dir: &Path,
        progress: &dyn ProgressCallback,
    ) -> Result<Vec<PathBuf>, ComposeError> {
        let pages = self.convert_to_images(source, false, progress).await?;

        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| ComposeError::write(out_dir, e))?;

        let mut written = Vec::with_capacity(pages.len());
        for page in pages.iter() {
            let path = out_dir.join(page_file_name(page.index));
            tokio::fs::write(&path, &page.jpeg)
                .await
                .map_err(|e| ComposeError::write(&path, e))?;
            written.push(path);
        }
        Ok(written)
    }
}

/// [`fingerprint_file`] on the blocking pool.
async fn fingerprint_off_thread(path: &Path) -> Option<Fingerprint> {
    let path = path.to_path_buf();
    match tokio::task::spawn_blocking(move || fingerprint_file(&path)).await {
        Ok(fp) => fp,
        Err(e) => {
            warn!("Fingerprint task failed: {}", e);
            None
        }
    }
}

/// `page_0001.jpg` for index 0.
pub fn page_file_name(index: usize) -> String {
    format!("page_{:04}.jpg", index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_file_names_are_one_based_and_padded() {
        assert_eq!(page_file_name(0), "page_0001.jpg");
        assert_eq!(page_file_name(41), "page_0042.jpg");
    }
}
