//! Shared fixtures for the integration tests.
//!
//! Nothing here touches LibreOffice or pdfium. [`FakeBackend`] stands in for
//! the converter and writes a tiny "PDF" recording the source's page count
//! and text; [`FakeRasterizer`] turns that back into one image per page, with
//! the text as the image bytes so tests can read what was rendered.

#![allow(dead_code)]

use async_trait::async_trait;
use offer_composer::{
    ComposeError, Composer, ComposerConfig, ConversionCache, ConversionPipeline, ConverterBackend,
    ConverterGateway, DocxPackage, PageImage, PageRasterizer, RasterOptions,
};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

// ── DOCX fixtures ────────────────────────────────────────────────────────────

/// `<w:p>` with a single run.
pub fn para(text: &str) -> String {
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, text)
}

/// A one-row table, one paragraph per cell.
pub fn table(cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .map(|c| format!("<w:tc>{}</w:tc>", para(c)))
        .collect();
    format!("<w:tbl><w:tr>{}</w:tr></w:tbl>", cells)
}

/// A DOCX whose body holds `body_xml` followed by a section properties block.
pub fn docx_bytes(body_xml: &str) -> Vec<u8> {
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();

    w.start_file("[Content_Types].xml", opts).unwrap();
    w.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#,
    )
    .unwrap();
    w.add_directory("word/", opts).unwrap();
    w.start_file("word/document.xml", opts).unwrap();
    write!(
        w,
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{}"><w:body>{}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#,
        W_NS, body_xml
    )
    .unwrap();

    w.finish().unwrap().into_inner()
}

pub fn write_docx(path: &Path, body_xml: &str) {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).unwrap();
    }
    std::fs::write(path, docx_bytes(body_xml)).unwrap();
}

/// Lay out a template folder and `templates.json` under `templates_dir`.
///
/// `files` are `(file name, order, is_toc, body)`; items are inserted after
/// `anchor`.
pub fn write_template(
    templates_dir: &Path,
    id: &str,
    files: &[(&str, i64, bool, &str)],
    anchor: &str,
) -> serde_json::Value {
    let folder = templates_dir.join(id);
    for (name, _, _, body) in files {
        write_docx(&folder.join(name), body);
    }
    let descriptor = serde_json::json!({
        "id": id,
        "folder": id,
        "name": format!("Template {id}"),
        "type": "multi_file",
        "files": files.iter().map(|(name, order, is_toc, _)| serde_json::json!({
            "file": name,
            "order": order,
            "is_toc": is_toc,
        })).collect::<Vec<_>>(),
        "injection_point": { "type": "between_files", "after": anchor },
        "toc": { "start_page": 5 },
    });
    std::fs::write(
        templates_dir.join("templates.json"),
        serde_json::to_string_pretty(&serde_json::json!({ "templates": [descriptor.clone()] }))
            .unwrap(),
    )
    .unwrap();
    descriptor
}

// ── Fake converter ───────────────────────────────────────────────────────────

/// Where the fake converter puts its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// `<outdir>/<source stem>.pdf`, like soffice.
    StemNamed,
    /// Exactly the requested destination, like unoconvert.
    Exact,
    /// Some unrelated name in the output directory.
    OtherName,
    /// Exits successfully without writing anything.
    Nothing,
    /// Exits with an error.
    Fail,
}

pub struct FakeBackend {
    name: String,
    output: Output,
    available: bool,
    delay: Duration,
    runs: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeBackend {
    pub fn new(name: &str, output: Output) -> Arc<Self> {
        Self::build(name, output, true, Duration::ZERO)
    }

    pub fn slow(name: &str, output: Output, delay: Duration) -> Arc<Self> {
        Self::build(name, output, true, delay)
    }

    pub fn unavailable(name: &str) -> Arc<Self> {
        Self::build(name, Output::StemNamed, false, Duration::ZERO)
    }

    fn build(name: &str, output: Output, available: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            output,
            available,
            delay,
            runs: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping runs observed.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Page count and text a fake conversion records for `source`.
fn describe(source: &Path) -> (usize, String) {
    match DocxPackage::open(source) {
        Ok(pkg) => {
            let pages = pkg.body().page_break_count().unwrap_or(0) + 1;
            let text = pkg.body().text().unwrap_or_default();
            (pages, text)
        }
        Err(_) => (1, String::new()),
    }
}

#[async_trait]
impl ConverterBackend for FakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn run(&self, source: &Path, dest: &Path, _timeout: Duration) -> Result<(), ComposeError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let (pages, text) = describe(source);
        let pdf = format!("%FAKE-PDF pages={}\n{}", pages, text);
        let outdir = dest.parent().unwrap().to_path_buf();
        let target: Option<PathBuf> = match self.output {
            Output::StemNamed => Some(outdir.join(format!(
                "{}.pdf",
                source.file_stem().unwrap().to_string_lossy()
            ))),
            Output::Exact => Some(dest.to_path_buf()),
            Output::OtherName => Some(outdir.join("lo-output-7f3a.pdf")),
            Output::Nothing | Output::Fail => None,
        };
        if let Some(target) = target {
            std::fs::write(target, pdf).unwrap();
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.output == Output::Fail {
            return Err(ComposeError::ExternalTool {
                tool: self.name.clone(),
                detail: "simulated failure".into(),
            });
        }
        Ok(())
    }
}

// ── Fake rasterizer ──────────────────────────────────────────────────────────

/// Reads a [`FakeBackend`] PDF; page `i` becomes `"page <i>\n<text>"`.
pub struct FakeRasterizer;

impl PageRasterizer for FakeRasterizer {
    fn rasterize(&self, pdf: &Path, _opts: RasterOptions) -> Result<Vec<PageImage>, ComposeError> {
        let raw = std::fs::read_to_string(pdf).map_err(|e| ComposeError::PdfOpenFailed {
            path: pdf.to_path_buf(),
            detail: e.to_string(),
        })?;
        let (header, text) = raw.split_once('\n').unwrap_or((raw.as_str(), ""));
        let pages: usize = header
            .strip_prefix("%FAKE-PDF pages=")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| ComposeError::PdfOpenFailed {
                path: pdf.to_path_buf(),
                detail: "not a fake PDF".into(),
            })?;
        Ok((0..pages)
            .map(|i| PageImage::new(i, format!("page {}\n{}", i, text).into_bytes(), 10, 14))
            .collect())
    }
}

/// Text a fake page image carries.
pub fn page_text(image_data_uri: &str) -> String {
    use base64::Engine as _;
    let payload = image_data_uri
        .strip_prefix("data:image/jpeg;base64,")
        .unwrap();
    String::from_utf8(
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .unwrap(),
    )
    .unwrap()
}

// ── Harness ──────────────────────────────────────────────────────────────────

pub fn config(root: &Path) -> ComposerConfig {
    ComposerConfig::builder()
        .root(root)
        .scratch_dir(root.join("scratch"))
        .static_pages_dir(root.join("static"))
        .converter_timeout_secs(5)
        .build()
        .unwrap()
}

pub fn pipeline(config: &ComposerConfig, backends: Vec<Arc<dyn ConverterBackend>>) -> Arc<ConversionPipeline> {
    Arc::new(ConversionPipeline::new(
        Arc::new(ConverterGateway::new(backends, Duration::from_secs(5))),
        Arc::new(FakeRasterizer),
        Arc::new(ConversionCache::new()),
        config.raster_options(),
        config.scratch_dir.clone(),
    ))
}

/// A composer over `root` backed by one stem-naming fake converter.
pub fn composer(root: &Path) -> (Composer, Arc<FakeBackend>) {
    let backend = FakeBackend::new("fake", Output::StemNamed);
    let cfg = config(root);
    let pipe = pipeline(&cfg, vec![backend.clone() as Arc<dyn ConverterBackend>]);
    (Composer::new(cfg, pipe), backend)
}
