//! # offer-composer
//!
//! Compose business offers from DOCX fragments and render them to
//! page-accurate JPEG previews.
//!
//! ## Why this crate?
//!
//! An offer is assembled from a template (cover, table of contents, terms…)
//! split across several Word documents, plus any number of selected item
//! documents spliced in at a fixed point. Users want to see the result page by
//! page before downloading it, and only a real layout engine paginates Word
//! documents faithfully. This crate drives LibreOffice for DOCX → PDF,
//! rasterises the PDF with pdfium, caches the pages by content hash, and
//! streams every page to the caller as soon as it exists.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DOCX
//!  │
//!  ├─ 1. Hash     SHA-256 of the file bytes (cache key)
//!  ├─ 2. Cache    hit → pages returned immediately
//!  ├─ 3. Convert  unoconvert (warm) or soffice (cold), one at a time
//!  ├─ 4. Render   rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 5. Encode   RGB → JPEG, base64 data URIs for events
//!  └─ 6. Emit     progress + page_ready events, summary at the end
//! ```
//!
//! Composition works on the WordprocessingML body directly: placeholders
//! `{{key}}` are replaced inside text runs, the table of contents is written
//! into the paragraph holding `{{SPIS_TRESCI}}` / `{{TOC}}`, and documents
//! are concatenated with explicit page breaks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use offer_composer::{Composer, ComposerConfig, CompositionRequest, NoopProgress};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ComposerConfig::builder().root("/srv/offers").build()?;
//!     config.ensure_dirs()?;
//!     let composer = Composer::from_config(config);
//!
//!     let mut request: CompositionRequest =
//!         serde_json::from_str(&std::fs::read_to_string("request.json")?)?;
//!     request.template_data = Some(composer.catalog().find("standard")?);
//!
//!     let summary = composer.preview(&request, &NoopProgress).await?;
//!     eprintln!("{} pages", summary.total_pages);
//!
//!     let offer = composer.generate_offer(&request, &NoopProgress).await?;
//!     println!("{}", offer.path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `offer` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! offer-composer = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! | Tool | Required | Purpose |
//! |------|----------|---------|
//! | `soffice` | yes | Cold DOCX → PDF conversion |
//! | `unoconvert` + `unoserver` | no | Warm conversion, tried first when reachable |
//! | `libpdfium` | yes | PDF rasterisation (`PDFIUM_LIB_PATH` to pick a copy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compose;
pub mod config;
pub mod convert;
pub mod docx;
pub mod error;
pub mod library;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod template;
pub mod toc;
pub mod warmup;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compose::{ComposedDocument, Composer, GeneratedOffer, PreviewSummary};
pub use config::{ComposerConfig, ComposerConfigBuilder, RasterOptions};
pub use convert::ConversionPipeline;
pub use docx::{DocxPackage, FieldValues};
pub use error::{ComposeError, FragmentIssue};
pub use library::{ItemEntry, ItemLibrary, TemplateCatalog};
pub use pipeline::cache::{ConversionCache, PageSet};
pub use pipeline::encode::PageImage;
pub use pipeline::gateway::{ConverterBackend, ConverterGateway, SofficeBackend, UnoconvertBackend};
pub use pipeline::hash::Fingerprint;
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer};
pub use progress::{
    EventBus, IssueLog, NoopProgress, PageMetadata, PageOrigin, PageReady, PageStatus, PreviewEvent,
    ProgressCallback, ProgressEvent, SharedProgress,
};
pub use stream::{preview_stream, PreviewStream, PreviewUpdate};
pub use template::{
    CompositionRequest, InjectionPoint, ItemFields, TemplateDescriptor, TemplateFile, TemplateIndex, TocConfig,
};
pub use warmup::{run_warmup, spawn_warmup, WarmupReport, WarmupStatus};
