//! Offer composition: merge template fragments and items into one DOCX,
//! write it to disk, or render a page-by-page preview.
//!
//! ## Document order
//!
//! Template files are visited in ascending `order`. Each one gets the base
//! field values and, if it carries the table of contents and items are
//! selected, the generated TOC. Right after the file named by the injection
//! point, every selected item follows in request order with its own overrides
//! applied. The first document becomes the base and every later one is
//! appended after an explicit page break.
//!
//! ## Missing files
//!
//! A referenced template file or item that is not on disk is skipped and
//! reported as a [`FragmentIssue`]. Only a request where nothing at all can be
//! merged fails, with [`ComposeError::NothingToMerge`]. When the injection
//! anchor itself is missing, the items are skipped with it.

use crate::config::ComposerConfig;
use crate::convert::ConversionPipeline;
use crate::docx::{DocxPackage, FieldValues};
use crate::error::{ComposeError, FragmentIssue};
use crate::library::{ItemLibrary, TemplateCatalog};
use crate::pipeline::cache::PageSet;
use crate::progress::{EventBus, NoopProgress, PageMetadata, PageOrigin, PageReady, PageStatus, ProgressCallback};
use crate::template::{CompositionRequest, TemplateDescriptor, TemplateFile};
use crate::toc;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Form fields consulted, in order, for the client name in file names.
pub const CLIENT_NAME_KEYS: [&str; 2] = ["NazwaFirmyKlienta", "klient"];
pub const DEFAULT_CLIENT_NAME: &str = "Klient";

/// Result of [`Composer::compose`].
#[derive(Debug, Clone)]
pub struct ComposedDocument {
    pub package: DocxPackage,
    /// Number of documents merged into `package`.
    pub documents: usize,
    pub skipped: Vec<FragmentIssue>,
}

impl ComposedDocument {
    pub fn save(&self, path: &Path) -> Result<(), ComposeError> {
        self.package.save(path)
    }
}

/// A composed offer written to the output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedOffer {
    pub path: PathBuf,
    pub filename: String,
    pub elapsed_secs: f64,
    pub skipped: Vec<FragmentIssue>,
}

/// Result of [`Composer::preview`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewSummary {
    pub total_pages: usize,
    #[serde(rename = "pages_metadata")]
    pub pages: Vec<PageMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<FragmentIssue>,
}

/// Composes offers from the template catalog and the item library.
#[derive(Clone)]
pub struct Composer {
    config: Arc<ComposerConfig>,
    pipeline: Arc<ConversionPipeline>,
    catalog: TemplateCatalog,
    items: ItemLibrary,
    events: EventBus,
}

impl Composer {
    pub fn new(config: ComposerConfig, pipeline: Arc<ConversionPipeline>) -> Self {
        Self {
            catalog: TemplateCatalog::new(&config.templates_dir),
            items: ItemLibrary::new(&config.items_dir),
            events: config.event_bus(),
            config: Arc::new(config),
            pipeline,
        }
    }

    /// Composer with the LibreOffice/pdfium pipeline described by `config`.
    pub fn from_config(config: ComposerConfig) -> Self {
        let pipeline = Arc::new(ConversionPipeline::from_config(&config));
        Self::new(config, pipeline)
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<ConversionPipeline> {
        &self.pipeline
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn items(&self) -> &ItemLibrary {
        &self.items
    }

    /// Shared bus for hosts that fan preview events out to many observers.
    /// Pass it as the `progress` argument and subscribe wherever needed.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn template_of<'a>(&self, request: &'a CompositionRequest) -> Result<&'a TemplateDescriptor, ComposeError> {
        request
            .template_data
            .as_ref()
            .ok_or_else(|| ComposeError::InvalidRequest("templateData is missing".into()))
    }

    /// TOC text for the request, paging from the template's start page.
    pub fn toc_text(&self, request: &CompositionRequest, template: &TemplateDescriptor) -> String {
        toc::generate(
            &request.selected_products,
            &request.product_custom_fields,
            template.toc.start_page,
            |id| self.pipeline.cached_page_count(&self.items.path_of(id)),
        )
    }

    /// Open a template file with base fields and, if it is the TOC carrier,
    /// the table of contents applied.
    fn prepare_base(
        &self,
        path: &Path,
        file: &TemplateFile,
        request: &CompositionRequest,
        template: &TemplateDescriptor,
        base_fields: &FieldValues,
    ) -> Result<DocxPackage, ComposeError> {
        let mut pkg = DocxPackage::open(path)?;
        pkg.substitute(base_fields)?;

        if file.is_toc && !request.selected_products.is_empty() {
            let toc = self.toc_text(request, template);
            let placement = pkg.body_mut().inject_toc(&toc)?;
            debug!("TOC placed in {} ({:?})", file.file, placement);
        }

        let leftovers = pkg.leftover_placeholders()?;
        if !leftovers.is_empty() {
            debug!("Unresolved placeholders in {}: {:?}", file.file, leftovers);
        }
        Ok(pkg)
    }

    /// Open an item with its overrides applied, if any.
    fn prepare_item(&self, path: &Path, request: &CompositionRequest, id: &str) -> Result<DocxPackage, ComposeError> {
        let mut pkg = DocxPackage::open(path)?;
        if let Some(fields) = request.item_fields(id) {
            pkg.substitute(&FieldValues::from_map(fields))?;
        }
        Ok(pkg)
    }

    /// Merge the request's template files and items into one document.
    pub fn compose(&self, request: &CompositionRequest) -> Result<ComposedDocument, ComposeError> {
        let template = self.template_of(request)?;
        let folder = self.catalog.folder_of(template);
        let base_fields = FieldValues::from_map(&request.form_data);

        let mut docs = Vec::new();
        let mut skipped = Vec::new();
        let mut requested = 0usize;

        for file in template.ordered_files() {
            requested += 1;
            let path = folder.join(&file.file);
            if !path.exists() {
                debug!("Template file {} missing; skipped", path.display());
                skipped.push(FragmentIssue::MissingFragment { path });
                if template.inserts_after(&file.file) {
                    warn!("Injection anchor {} is missing; items not inserted", file.file);
                }
                continue;
            }

            docs.push(self.prepare_base(&path, file, request, template, &base_fields)?);

            if template.inserts_after(&file.file) {
                info!("Inserting {} items after {}", request.selected_products.len(), file.file);
                for id in &request.selected_products {
                    requested += 1;
                    let path = self.items.path_of(id);
                    if !path.exists() {
                        debug!("Item {} missing; skipped", id);
                        skipped.push(FragmentIssue::MissingFragment { path });
                        continue;
                    }
                    docs.push(self.prepare_item(&path, request, id)?);
                }
            }
        }

        let documents = docs.len();
        let mut iter = docs.into_iter();
        let mut package = iter.next().ok_or(ComposeError::NothingToMerge { requested })?;
        for doc in iter {
            package.append(&doc);
        }

        info!("Composed {} documents ({} skipped)", documents, skipped.len());
        Ok(ComposedDocument {
            package,
            documents,
            skipped,
        })
    }

    /// Compose and write the offer into the output directory. Blocking.
    pub fn write_offer(&self, request: &CompositionRequest) -> Result<GeneratedOffer, ComposeError> {
        let start = Instant::now();
        let composed = self.compose(request)?;

        let filename = offer_file_name(request, Local::now());
        let dir = &self.config.output_dir;
        let path = composed
            .package
            .save_new(dir, candidate_paths(dir, &filename))?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&filename)
            .to_string();
        info!("Saved offer {}", path.display());
        Ok(GeneratedOffer {
            path,
            filename,
            elapsed_secs: start.elapsed().as_secs_f64(),
            skipped: composed.skipped,
        })
    }

    /// [`write_offer`](Self::write_offer) on the blocking pool, with progress:
    /// 10 % before, 100 % with the elapsed time after, then a reset. A failure
    /// is announced with an error message at 0 % before it is returned.
    pub async fn generate_offer(
        &self,
        request: &CompositionRequest,
        progress: &dyn ProgressCallback,
    ) -> Result<GeneratedOffer, ComposeError> {
        let start = Instant::now();
        progress.on_progress("Generating DOCX…", 10);

        let this = self.clone();
        let req = request.clone();
        let result = tokio::task::spawn_blocking(move || this.write_offer(&req))
            .await
            .map_err(|e| ComposeError::Internal(format!("Compose task panicked: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(offer) => {
                let secs = start.elapsed().as_secs_f64();
                progress.on_progress(&format!("Done! ({:.1}s)", secs), 100);
                progress.on_progress("", 0);
                Ok(GeneratedOffer {
                    elapsed_secs: secs,
                    ..offer
                })
            }
            Err(e) => {
                progress.on_progress(&format!("Error: {}", e), 0);
                Err(e)
            }
        }
    }

    /// Render every page of the offer the request describes, pushing each
    /// page to `progress` as soon as it is ready.
    ///
    /// Template files are converted from substituted temporary copies without
    /// the cache. Items without overrides are converted from their original
    /// file through the cache; items with overrides from a temporary copy
    /// without it.
    pub async fn preview(
        &self,
        request: &CompositionRequest,
        progress: &dyn ProgressCallback,
    ) -> Result<PreviewSummary, ComposeError> {
        progress.on_progress("Generating preview…", 5);
        match self.preview_pages(request, progress).await {
            Ok(summary) => {
                info!("Preview ready: {} pages", summary.total_pages);
                progress.on_progress("Done!", 100);
                progress.on_progress("", 0);
                Ok(summary)
            }
            Err(e) => {
                warn!("Preview failed: {}", e);
                progress.on_progress(&format!("Error: {}", e), 0);
                Err(e)
            }
        }
    }

    async fn preview_pages(
        &self,
        request: &CompositionRequest,
        progress: &dyn ProgressCallback,
    ) -> Result<PreviewSummary, ComposeError> {
        let template = self.template_of(request)?;
        let folder = self.catalog.folder_of(template);
        let base_fields = FieldValues::from_map(&request.form_data);
        let mut summary = PreviewSummary::default();

        for file in template.ordered_files() {
            let path = folder.join(&file.file);
            if !path.exists() {
                debug!("Template file {} missing; skipped", path.display());
                summary.skipped.push(FragmentIssue::MissingFragment { path });
                continue;
            }

            let percent = (10 + summary.pages.len() * 2).min(95) as u8;
            progress.on_progress(&format!("{}…", file.label()), percent);

            let pkg = self.prepare_base(&path, file, request, template, &base_fields)?;
            let images = self.convert_package(pkg).await?;
            for page in images.iter() {
                let ready = PageReady {
                    kind: PageOrigin::Template,
                    number: summary.pages.len() + 1,
                    product_id: None,
                    image: page.data_uri(),
                    page_index: page.index,
                    status: PageStatus::Ready,
                    source_file: Some(file.file.clone()),
                };
                progress.on_page_ready(&ready);
                summary.pages.push(PageMetadata::from(&ready));
            }

            if !template.inserts_after(&file.file) {
                continue;
            }

            progress.on_progress("Adding items…", 50);
            for id in &request.selected_products {
                let path = self.items.path_of(id);
                if !path.exists() {
                    debug!("Item {} missing; skipped", id);
                    summary.skipped.push(FragmentIssue::MissingFragment { path });
                    continue;
                }

                let images = if request.item_fields(id).is_some() {
                    let pkg = self.prepare_item(&path, request, id)?;
                    self.convert_package(pkg).await?
                } else {
                    self.pipeline
                        .convert_to_images(&path, true, &NoopProgress)
                        .await?
                };

                for page in images.iter() {
                    let ready = PageReady {
                        kind: PageOrigin::Product,
                        number: summary.pages.len() + 1,
                        product_id: Some(id.clone()),
                        image: page.data_uri(),
                        page_index: page.index,
                        status: PageStatus::Ready,
                        source_file: None,
                    };
                    progress.on_page_ready(&ready);
                    summary.pages.push(PageMetadata::from(&ready));
                }
            }
        }

        summary.total_pages = summary.pages.len();
        Ok(summary)
    }

    /// Convert an in-memory package through a temporary file, uncached.
    async fn convert_package(&self, pkg: DocxPackage) -> Result<PageSet, ComposeError> {
        let scratch = self.config.scratch_dir.clone();
        let tmp = tokio::task::spawn_blocking(move || stage_copy(&pkg, &scratch))
            .await
            .map_err(|e| ComposeError::Internal(format!("Scratch write panicked: {}", e)))??;

        // `tmp` is removed on drop, after the conversion either way.
        self.pipeline
            .convert_to_images(tmp.path(), false, &NoopProgress)
            .await
    }
}

/// Serialise `pkg` into a fresh `preview-*.docx` under `scratch`.
fn stage_copy(pkg: &DocxPackage, scratch: &Path) -> Result<NamedTempFile, ComposeError> {
    std::fs::create_dir_all(scratch).map_err(|e| ComposeError::write(scratch, e))?;
    let mut tmp = tempfile::Builder::new()
        .prefix("preview-")
        .suffix(".docx")
        .tempfile_in(scratch)
        .map_err(|e| ComposeError::write(scratch, e))?;
    let bytes = pkg.to_bytes()?;
    if let Err(e) = tmp.write_all(&bytes).and_then(|_| tmp.flush()) {
        return Err(ComposeError::write(tmp.path(), e));
    }
    Ok(tmp)
}

/// Keep letters, digits, space, `-` and `_`; trim the result.
pub fn sanitize_client_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// `Oferta_<client>_<YYYYmmdd_HHMMSS>.docx`.
pub fn offer_file_name(request: &CompositionRequest, now: DateTime<Local>) -> String {
    let raw = request
        .form_text(&CLIENT_NAME_KEYS)
        .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string());
    let mut client = sanitize_client_name(&raw);
    if client.is_empty() {
        client = DEFAULT_CLIENT_NAME.to_string();
    }
    format!("Oferta_{}_{}.docx", client, now.format("%Y%m%d_%H%M%S"))
}

/// `dir/name`, then `dir/<stem>_2.docx`, `_3`, … without end.
fn candidate_paths<'a>(dir: &'a Path, name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    std::iter::once(dir.join(name))
        .chain((2u32..).map(move |n| dir.join(format!("{}_{}.docx", stem, n))))
}
