//! Error types for the offer-composer library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ComposeError`] — **Fatal**: the conversion or composition cannot
//!   proceed (converter failed, pdfium could not open the PDF, nothing left to
//!   merge). Returned as `Err(ComposeError)` from every fallible operation.
//!
//! * [`FragmentIssue`] — **Non-fatal**: a single fragment was skipped (file
//!   missing on disk, fingerprint unreadable, warm-up conversion failed) but the
//!   surrounding work carried on. Stored in result structs such as
//!   [`crate::compose::ComposedDocument`] and [`crate::warmup::WarmupReport`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the offer-composer library.
#[derive(Debug, Error)]
pub enum ComposeError {
    // ── Converter errors ──────────────────────────────────────────────────
    /// Neither the warm unoserver service nor a one-shot soffice is usable.
    #[error(
        "No DOCX→PDF converter is available.\n\
Install LibreOffice (`soffice`) or start unoserver and put `unoconvert` on PATH."
    )]
    ConverterUnavailable,

    /// The converter process exited with a failure status.
    #[error("Converter '{tool}' failed: {detail}")]
    ExternalTool { tool: String, detail: String },

    /// The converter process exceeded the configured timeout and was killed.
    #[error("Converter '{tool}' timed out after {secs}s")]
    ConverterTimeout { tool: String, secs: u64 },

    /// The converter reported success but no PDF could be found.
    #[error("Converter produced no PDF in '{dir}'")]
    NoOutputProduced { dir: PathBuf },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    /// pdfium could not open the intermediate PDF.
    #[error("Cannot open PDF '{path}': {detail}")]
    PdfOpenFailed { path: PathBuf, detail: String },

    /// Rendering or encoding of one page failed (1-indexed page).
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterizeFailed { page: usize, detail: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// The file is not a readable DOCX (zip) package.
    #[error("'{path}' is not a readable DOCX package: {detail}")]
    InvalidDocx { path: PathBuf, detail: String },

    /// `word/document.xml` could not be parsed or rewritten.
    #[error("Malformed document XML: {0}")]
    Xml(String),

    // ── Composition errors ────────────────────────────────────────────────
    /// Every referenced file was missing; there is nothing to merge.
    #[error("Nothing to merge: none of the {requested} referenced documents exist")]
    NothingToMerge { requested: usize },

    /// The requested template id is not in the catalog.
    #[error("Template '{id}' not found in catalog")]
    TemplateNotFound { id: String },

    /// The composition request is unusable (bad JSON, missing template data).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading an input file or directory failed.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, runtime failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ComposeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ComposeError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ComposeError::OutputWriteFailed {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal problem with a single fragment.
///
/// The surrounding composition, preview or warm-up keeps going; the issue is
/// logged and handed back to the caller for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FragmentIssue {
    /// A template or item file referenced by the request is not on disk.
    #[error("Fragment '{path}' is missing and was skipped")]
    MissingFragment { path: PathBuf },

    /// The file could not be read for fingerprinting; the cache was bypassed.
    /// Delivered through [`crate::ProgressCallback::on_issue`].
    #[error("Fingerprint unavailable for '{path}'; cache bypassed")]
    HashUnavailable { path: PathBuf },

    /// Warm-up conversion of one fragment failed.
    #[error("Warm-up of '{path}' failed: {detail}")]
    WarmupFailed { path: PathBuf, detail: String },
}
