//! Pipeline stages for DOCX-to-JPEG conversion.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the external tools can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! hash ──▶ cache? ──▶ gateway ──▶ render ──▶ encode ──▶ cache
//! (SHA-256)  (hit)    (LibreOffice) (pdfium)  (JPEG)    (store)
//! ```
//!
//! 1. [`hash`]    — fingerprint the source bytes; a read failure is a miss
//! 2. [`cache`]   — fingerprint → page sequence, never evicted
//! 3. [`gateway`] — serialised DOCX → PDF conversion, warm backend first
//! 4. [`render`]  — rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 5. [`encode`]  — opaque JPEG encoding and data-URI wrapping

pub mod cache;
pub mod encode;
pub mod gateway;
pub mod hash;
pub mod render;
