//! On-disk catalogs: the item library and the template catalog.
//!
//! Items live flat in one directory as `<id>.docx`. Templates live in one
//! folder each under the templates directory, described by
//! `templates.json`. Word's `~$…` lock files are never treated as documents.

use crate::error::ComposeError;
use crate::template::{TemplateDescriptor, TemplateIndex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const TEMPLATE_INDEX_FILE: &str = "templates.json";
pub const FIELDS_DESCRIPTION_FILE: &str = "fields-description.json";

fn is_docx(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.starts_with("~$")
        && path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("docx"))
            .unwrap_or(false)
}

/// All `.docx` files directly in `dir`, sorted by name. A missing directory
/// is empty.
pub fn list_docx(dir: &Path) -> Result<Vec<PathBuf>, ComposeError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ComposeError::io(dir, e)),
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_docx(p))
        .collect();
    files.sort();
    Ok(files)
}

// ── Items ────────────────────────────────────────────────────────────────────

/// A selectable item document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEntry {
    pub id: String,
    pub name: String,
    pub filename: String,
}

/// The directory of item documents.
#[derive(Debug, Clone)]
pub struct ItemLibrary {
    dir: PathBuf,
}

impl ItemLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an item id resolves to. The file may not exist.
    pub fn path_of(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.docx", id))
    }

    pub fn files(&self) -> Result<Vec<PathBuf>, ComposeError> {
        list_docx(&self.dir)
    }

    pub fn list(&self) -> Result<Vec<ItemEntry>, ComposeError> {
        Ok(self
            .files()?
            .into_iter()
            .filter_map(|p| {
                let filename = p.file_name()?.to_str()?.to_string();
                let id = p.file_stem()?.to_str()?.to_string();
                Some(ItemEntry {
                    name: format!("Produkt {}", id),
                    id,
                    filename,
                })
            })
            .collect())
    }
}

// ── Templates ────────────────────────────────────────────────────────────────

/// The templates directory and its `templates.json`.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    dir: PathBuf,
}

impl TemplateCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Folder holding a descriptor's files.
    pub fn folder_of(&self, descriptor: &TemplateDescriptor) -> PathBuf {
        self.dir.join(&descriptor.folder)
    }

    pub fn load(&self) -> Result<TemplateIndex, ComposeError> {
        let path = self.dir.join(TEMPLATE_INDEX_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|e| ComposeError::io(&path, e))?;
        serde_json::from_str(&raw).map_err(|e| {
            ComposeError::InvalidRequest(format!("{}: {}", path.display(), e))
        })
    }

    /// Look a template up by id. Multi-file templates get their
    /// `fields-description.json` attached when present.
    pub fn find(&self, id: &str) -> Result<TemplateDescriptor, ComposeError> {
        let mut descriptor = self
            .load()?
            .templates
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| ComposeError::TemplateNotFound { id: id.to_string() })?;

        if descriptor.is_multi_file() {
            let path = self.folder_of(&descriptor).join(FIELDS_DESCRIPTION_FILE);
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str(&raw) {
                    Ok(v) => descriptor.fields_description = Some(v),
                    Err(e) => warn!("Ignoring malformed {}: {}", path.display(), e),
                },
                Err(_) => debug!("No {} for template {}", FIELDS_DESCRIPTION_FILE, id),
            }
        }
        Ok(descriptor)
    }

    /// Every fragment document of every template folder, for warm-up.
    ///
    /// Folders are taken from the catalog when it loads, otherwise every
    /// subdirectory of the templates directory is scanned.
    pub fn fragment_files(&self) -> Result<Vec<PathBuf>, ComposeError> {
        let folders: Vec<PathBuf> = match self.load() {
            Ok(index) => {
                let mut f: Vec<_> = index.templates.iter().map(|t| self.folder_of(t)).collect();
                f.sort();
                f.dedup();
                f
            }
            Err(e) => {
                debug!("Template catalog unavailable ({}); scanning folders", e);
                subdirectories(&self.dir)?
            }
        };

        let mut out = Vec::new();
        for folder in folders {
            out.extend(list_docx(&folder)?);
        }
        Ok(out)
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, ComposeError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ComposeError::io(dir, e)),
    };
    let mut dirs: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}
