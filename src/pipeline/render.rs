//! PDF rasterisation: render every page to JPEG via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! [`rasterize_pdf`] moves the work onto Tokio's blocking pool so worker
//! threads never stall during CPU-heavy rendering.
//!
//! ## Why a trait?
//!
//! The pipeline holds an `Arc<dyn PageRasterizer>`. Production code uses
//! [`PdfiumRasterizer`]; tests swap in a fake that never touches a real PDF.

use crate::config::RasterOptions;
use crate::error::ComposeError;
use crate::pipeline::encode::{encode_jpeg, PageImage};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns a fixed-layout document into an ordered sequence of page images.
///
/// Implementations are blocking; callers go through [`rasterize_pdf`].
/// Any page failure aborts the whole call and no partial sequence is returned.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf: &Path, opts: RasterOptions) -> Result<Vec<PageImage>, ComposeError>;
}

/// Run a rasterizer on the blocking pool.
pub async fn rasterize_pdf(
    rasterizer: Arc<dyn PageRasterizer>,
    pdf: &Path,
    opts: RasterOptions,
) -> Result<Vec<PageImage>, ComposeError> {
    let path = pdf.to_path_buf();
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&path, opts))
        .await
        .map_err(|e| ComposeError::Internal(format!("Render task panicked: {}", e)))?
}

/// pdfium-backed rasterizer.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    lib_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Bind to the pdfium library in `lib_dir`, or the system library if None.
    pub fn new(lib_dir: Option<PathBuf>) -> Self {
        Self { lib_path: lib_dir }
    }

    fn bind(&self) -> Result<Pdfium, ComposeError> {
        let bindings = match &self.lib_path {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ComposeError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &Path, opts: RasterOptions) -> Result<Vec<PageImage>, ComposeError> {
        let pdfium = self.bind()?;

        let document =
            pdfium
                .load_pdf_from_file(pdf, None)
                .map_err(|e| ComposeError::PdfOpenFailed {
                    path: pdf.to_path_buf(),
                    detail: format!("{:?}", e),
                })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        // Opaque white background: no alpha in the output.
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(opts.scale())
            .set_clear_color(PdfColor::WHITE);

        let mut results = Vec::with_capacity(total_pages);

        for (idx, page) in pages.iter().enumerate() {
            let fail = |detail: String| ComposeError::RasterizeFailed {
                page: idx + 1,
                detail,
            };

            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| fail(format!("{:?}", e)))?;

            let image = bitmap.as_image();
            let jpeg = encode_jpeg(&image, opts.quality).map_err(|e| fail(e.to_string()))?;
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );

            results.push(PageImage::new(idx, jpeg, image.width(), image.height()));
        }

        Ok(results)
    }
}
