//! Configuration types for conversion and composition.
//!
//! Every knob lives in [`ComposerConfig`], built via its
//! [`ComposerConfigBuilder`]. One struct is shared by the converter gateway,
//! the rasterizer, the composer and the warm-up supervisor so that a single
//! value describes a whole deployment.

use crate::error::ComposeError;
use crate::progress::EventBus;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Locations probed for a LibreOffice binary when none is configured.
pub const SOFFICE_CANDIDATES: &[&str] = &[
    "/usr/bin/soffice",
    "/usr/local/bin/soffice",
    "soffice",
    "libreoffice",
    "/Applications/LibreOffice.app/Contents/MacOS/soffice",
];

/// Configuration for the conversion pipeline and the composer.
///
/// Built via [`ComposerConfig::builder()`], [`ComposerConfig::rooted_at()`] or
/// [`ComposerConfig::default()`].
///
/// # Example
/// ```rust
/// use offer_composer::ComposerConfig;
///
/// let config = ComposerConfig::builder()
///     .root("/srv/offers")
///     .dpi(150)
///     .jpeg_quality(85)
///     .build()
///     .unwrap();
/// assert_eq!(config.items_dir, std::path::PathBuf::from("/srv/offers/produkty"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerConfig {
    /// Directory holding `templates.json` and one folder per template.
    pub templates_dir: PathBuf,

    /// Directory holding item documents, one `<id>.docx` per item.
    pub items_dir: PathBuf,

    /// Directory receiving composed offers.
    pub output_dir: PathBuf,

    /// Working directory for call-scoped temporary DOCX and PDF files.
    pub scratch_dir: PathBuf,

    /// Directory receiving pre-rendered template fragment pages.
    pub static_pages_dir: PathBuf,

    /// Rendering DPI for page previews. Range: 72–400. Default: 200.
    ///
    /// pdfium renders at `dpi / 72` times the PDF's point size.
    pub dpi: u32,

    /// JPEG quality for page previews. Range: 1–100. Default: 90.
    pub jpeg_quality: u8,

    /// Hard timeout for a single converter invocation. Default: 60.
    pub converter_timeout_secs: u64,

    /// Explicit path to `soffice`. If None, [`SOFFICE_CANDIDATES`] are probed.
    pub soffice_path: Option<PathBuf>,

    /// Explicit path to `unoconvert`. If None, it is looked up on PATH.
    pub unoconvert_path: Option<PathBuf>,

    /// Try the warm unoserver instance before a cold soffice. Default: true.
    pub use_unoserver: bool,

    /// unoserver XML-RPC host. Default: 127.0.0.1.
    pub unoserver_host: String,

    /// unoserver XML-RPC port. Default: 2003.
    pub unoserver_port: u16,

    /// Directory containing the pdfium shared library. If None, the system
    /// library is used.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Buffered events per subscriber on the event bus. Default: 256.
    pub event_capacity: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self::layout(Path::new("."))
    }
}

impl ComposerConfig {
    /// Create a new builder for `ComposerConfig`.
    pub fn builder() -> ComposerConfigBuilder {
        ComposerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Default configuration with the conventional directory layout under `root`.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        Self::layout(root.as_ref())
    }

    fn layout(root: &Path) -> Self {
        Self {
            templates_dir: root.join("templates"),
            items_dir: root.join("produkty"),
            output_dir: root.join("generated_offers"),
            scratch_dir: root.join("out_jpg"),
            static_pages_dir: root.join("out_jpg").join("templates"),
            dpi: 200,
            jpeg_quality: 90,
            converter_timeout_secs: 60,
            soffice_path: None,
            unoconvert_path: None,
            use_unoserver: true,
            unoserver_host: "127.0.0.1".to_string(),
            unoserver_port: 2003,
            pdfium_lib_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
            event_capacity: 256,
        }
    }

    /// Rendering parameters derived from this configuration.
    pub fn raster_options(&self) -> RasterOptions {
        RasterOptions {
            dpi: self.dpi,
            quality: self.jpeg_quality,
        }
    }

    /// A fresh event bus buffering `event_capacity` events per subscriber.
    pub fn event_bus(&self) -> EventBus {
        EventBus::new(self.event_capacity)
    }

    /// Create every working directory this configuration writes into.
    pub fn ensure_dirs(&self) -> Result<(), ComposeError> {
        for dir in [&self.output_dir, &self.scratch_dir, &self.static_pages_dir] {
            std::fs::create_dir_all(dir).map_err(|e| ComposeError::write(dir, e))?;
        }
        Ok(())
    }
}

/// Builder for [`ComposerConfig`].
#[derive(Debug)]
pub struct ComposerConfigBuilder {
    config: ComposerConfig,
}

impl ComposerConfigBuilder {
    /// Re-root every directory under `root`, keeping the other settings.
    pub fn root(mut self, root: impl AsRef<Path>) -> Self {
        let laid_out = ComposerConfig::rooted_at(root);
        self.config.templates_dir = laid_out.templates_dir;
        self.config.items_dir = laid_out.items_dir;
        self.config.output_dir = laid_out.output_dir;
        self.config.scratch_dir = laid_out.scratch_dir;
        self.config.static_pages_dir = laid_out.static_pages_dir;
        self
    }

    pub fn templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.templates_dir = dir.into();
        self
    }

    pub fn items_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.items_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn static_pages_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.static_pages_dir = dir.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn converter_timeout_secs(mut self, secs: u64) -> Self {
        self.config.converter_timeout_secs = secs;
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = Some(path.into());
        self
    }

    pub fn unoconvert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.unoconvert_path = Some(path.into());
        self
    }

    pub fn use_unoserver(mut self, v: bool) -> Self {
        self.config.use_unoserver = v;
        self
    }

    pub fn unoserver_host(mut self, host: impl Into<String>) -> Self {
        self.config.unoserver_host = host.into();
        self
    }

    pub fn unoserver_port(mut self, port: u16) -> Self {
        self.config.unoserver_port = port;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn event_capacity(mut self, n: usize) -> Self {
        self.config.event_capacity = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ComposerConfig, ComposeError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(ComposeError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(ComposeError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.converter_timeout_secs == 0 {
            return Err(ComposeError::InvalidConfig(
                "Converter timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Rendering parameters for one rasterisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterOptions {
    /// Target resolution; pages are scaled by `dpi / 72`.
    pub dpi: u32,
    /// JPEG quality, 1–100.
    pub quality: u8,
}

impl RasterOptions {
    /// Scale factor applied to the PDF's native 72-points-per-inch size.
    pub fn scale(&self) -> f32 {
        self.dpi as f32 / 72.0
    }
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            dpi: 200,
            quality: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_conventional_layout() {
        let c = ComposerConfig::rooted_at("/srv/app");
        assert_eq!(c.templates_dir, PathBuf::from("/srv/app/templates"));
        assert_eq!(c.items_dir, PathBuf::from("/srv/app/produkty"));
        assert_eq!(c.output_dir, PathBuf::from("/srv/app/generated_offers"));
        assert_eq!(c.dpi, 200);
        assert_eq!(c.jpeg_quality, 90);
        assert_eq!(c.converter_timeout_secs, 60);
        assert_eq!(c.unoserver_port, 2003);
    }

    #[test]
    fn builder_clamps_dpi_and_quality() {
        let c = ComposerConfig::builder()
            .dpi(1000)
            .jpeg_quality(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 400);
        assert_eq!(c.jpeg_quality, 1);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ComposerConfig::builder()
            .converter_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ComposeError::InvalidConfig(_)));
    }

    #[test]
    fn event_bus_uses_configured_capacity() {
        use crate::progress::ProgressCallback;
        use tokio::sync::broadcast::error::TryRecvError;

        let c = ComposerConfig::builder().event_capacity(2).build().unwrap();
        let bus = c.event_bus();
        let mut rx = bus.subscribe();
        for p in [10, 20, 30] {
            bus.on_progress("step", p);
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(1))));
    }

    #[test]
    fn scale_follows_dpi() {
        let opts = RasterOptions {
            dpi: 144,
            quality: 80,
        };
        assert!((opts.scale() - 2.0).abs() < f32::EPSILON);
    }
}
