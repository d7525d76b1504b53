//! DOCX packages: open, edit the main document part, merge, save.
//!
//! A DOCX file is a zip archive. Only `word/document.xml` is parsed (into a
//! [`DocumentBody`]); every other part is carried through byte-for-byte in its
//! original order.

pub mod body;
pub mod placeholders;
pub(crate) mod xml;

pub use body::{Block, DocumentBody, TocPlacement, TOC_TOKENS};
pub use placeholders::{leftover_placeholders, value_text, FieldValues, RESERVED_ITEMS_KEY};

use crate::error::ComposeError;
use std::io::{Cursor, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the main document part inside the archive.
pub const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Clone)]
enum Part {
    Dir,
    File(Vec<u8>),
    Document,
}

/// An opened DOCX file.
#[derive(Debug, Clone)]
pub struct DocxPackage {
    parts: Vec<(String, Part)>,
    body: DocumentBody,
    origin: Option<PathBuf>,
}

impl DocxPackage {
    /// Read and parse a DOCX file from disk.
    pub fn open(path: &Path) -> Result<Self, ComposeError> {
        let bytes = std::fs::read(path).map_err(|e| ComposeError::io(path, e))?;
        let mut pkg = Self::from_bytes(&bytes).map_err(|e| match e {
            ComposeError::InvalidDocx { detail, .. } => ComposeError::InvalidDocx {
                path: path.to_path_buf(),
                detail,
            },
            other => other,
        })?;
        pkg.origin = Some(path.to_path_buf());
        Ok(pkg)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ComposeError> {
        let invalid = |detail: String| ComposeError::InvalidDocx {
            path: PathBuf::from("<memory>"),
            detail,
        };

        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| invalid(e.to_string()))?;
        let mut parts = Vec::with_capacity(archive.len());
        let mut body = None;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| invalid(e.to_string()))?;
            let name = entry.name().to_string();
            if entry.is_dir() {
                parts.push((name, Part::Dir));
                continue;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| invalid(format!("{}: {}", name, e)))?;

            if name == DOCUMENT_PART {
                let xml = String::from_utf8(data)
                    .map_err(|e| invalid(format!("{} is not UTF-8: {}", DOCUMENT_PART, e)))?;
                body = Some(DocumentBody::parse(&xml)?);
                parts.push((name, Part::Document));
            } else {
                parts.push((name, Part::File(data)));
            }
        }

        let body = body.ok_or_else(|| invalid(format!("missing {}", DOCUMENT_PART)))?;
        Ok(Self {
            parts,
            body,
            origin: None,
        })
    }

    /// Path this package was opened from, if any.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn body(&self) -> &DocumentBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut DocumentBody {
        &mut self.body
    }

    /// Replace placeholders in the main document part.
    pub fn substitute(&mut self, fields: &FieldValues) -> Result<(), ComposeError> {
        let changed = self.body.substitute(fields)?;
        debug!(
            "Substituted {} fields in {} blocks of {}",
            fields.len(),
            changed,
            self.display_name()
        );
        Ok(())
    }

    /// Append `other` after an explicit page break.
    pub fn append(&mut self, other: &DocxPackage) {
        self.body.append_document(&other.body);
    }

    /// Keys of `{{…}}` tokens still present in the document text.
    pub fn leftover_placeholders(&self) -> Result<Vec<String>, ComposeError> {
        Ok(leftover_placeholders(&self.body.text()?))
    }

    /// Serialise the package back into DOCX bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ComposeError> {
        let zip_err = |e: zip::result::ZipError| ComposeError::Internal(format!("zip: {}", e));
        let io_err = |e: std::io::Error| ComposeError::Internal(format!("zip: {}", e));

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, part) in &self.parts {
            match part {
                Part::Dir => writer
                    .add_directory(name.as_str(), options)
                    .map_err(zip_err)?,
                Part::File(data) => {
                    writer.start_file(name.as_str(), options).map_err(zip_err)?;
                    writer.write_all(data).map_err(io_err)?;
                }
                Part::Document => {
                    writer.start_file(name.as_str(), options).map_err(zip_err)?;
                    writer
                        .write_all(self.body.to_xml().as_bytes())
                        .map_err(io_err)?;
                }
            }
        }

        Ok(writer.finish().map_err(zip_err)?.into_inner())
    }

    /// Write the package to `path` through a temporary file in the same
    /// directory, so readers never see a half-written document.
    pub fn save(&self, path: &Path) -> Result<(), ComposeError> {
        let dir = parent_dir(path);
        let (tmp, len) = self.stage_in(dir)?;
        tmp.persist(path)
            .map_err(|e| ComposeError::write(path, e.error))?;
        debug!("Saved {} ({} bytes)", path.display(), len);
        Ok(())
    }

    /// Write the package under the first of `candidates` that does not exist
    /// yet and return that path. Never replaces a file, even one created by
    /// another writer after the package was serialised.
    ///
    /// All candidates must live in `dir`.
    pub fn save_new<I>(&self, dir: &Path, candidates: I) -> Result<PathBuf, ComposeError>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let (mut tmp, len) = self.stage_in(dir)?;
        for path in candidates {
            match tmp.persist_noclobber(&path) {
                Ok(_) => {
                    debug!("Saved {} ({} bytes)", path.display(), len);
                    return Ok(path);
                }
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    debug!("{} taken; trying the next name", path.display());
                    tmp = e.file;
                }
                Err(e) => return Err(ComposeError::write(&path, e.error)),
            }
        }
        Err(ComposeError::write(
            dir,
            std::io::Error::new(ErrorKind::AlreadyExists, "every candidate name is taken"),
        ))
    }

    /// Serialise into a named temporary file inside `dir`.
    fn stage_in(&self, dir: &Path) -> Result<(NamedTempFile, usize), ComposeError> {
        let bytes = self.to_bytes()?;
        std::fs::create_dir_all(dir).map_err(|e| ComposeError::write(dir, e))?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ComposeError::write(dir, e))?;
        if let Err(e) = tmp.write_all(&bytes).and_then(|_| tmp.flush()) {
            return Err(ComposeError::write(tmp.path(), e));
        }
        Ok((tmp, bytes.len()))
    }

    fn display_name(&self) -> String {
        self.origin
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".into())
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_docx(text: &str) -> Vec<u8> {
        let mut w = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();
        w.start_file("[Content_Types].xml", opts).unwrap();
        w.write_all(b"<Types/>").unwrap();
        w.add_directory("word/", opts).unwrap();
        w.start_file(DOCUMENT_PART, opts).unwrap();
        write!(
            w,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#,
            text
        )
        .unwrap();
        w.finish().unwrap().into_inner()
    }

    #[test]
    fn roundtrip_preserves_other_parts() {
        let pkg = DocxPackage::from_bytes(&minimal_docx("Hi")).unwrap();
        let again = DocxPackage::from_bytes(&pkg.to_bytes().unwrap()).unwrap();
        assert_eq!(again.parts.len(), 3);
        assert!(matches!(&again.parts[0].1, Part::File(d) if d == b"<Types/>"));
        assert_eq!(again.body().paragraph_texts().unwrap(), ["Hi"]);
    }

    #[test]
    fn substitute_and_report_leftovers() {
        let mut pkg = DocxPackage::from_bytes(&minimal_docx("{{a}} and {{b}}")).unwrap();
        pkg.substitute(&FieldValues::from_pairs([("a", "X")])).unwrap();
        assert_eq!(pkg.body().paragraph_texts().unwrap(), ["X and {{b}}"]);
        assert_eq!(pkg.leftover_placeholders().unwrap(), ["b"]);
    }

    #[test]
    fn not_a_zip_is_invalid_docx() {
        let err = DocxPackage::from_bytes(b"plain text").unwrap_err();
        assert!(matches!(err, ComposeError::InvalidDocx { .. }));
    }

    #[test]
    fn save_writes_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("offer.docx");
        let pkg = DocxPackage::from_bytes(&minimal_docx("Saved")).unwrap();
        pkg.save(&path).unwrap();
        let back = DocxPackage::open(&path).unwrap();
        assert_eq!(back.body().paragraph_texts().unwrap(), ["Saved"]);
        assert_eq!(back.origin(), Some(path.as_path()));
    }

    #[test]
    fn save_new_never_replaces_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("a.docx");
        std::fs::write(&taken, b"keep me").unwrap();

        let pkg = DocxPackage::from_bytes(&minimal_docx("New")).unwrap();
        let written = pkg
            .save_new(dir.path(), [taken.clone(), dir.path().join("a_2.docx")])
            .unwrap();

        assert_eq!(written, dir.path().join("a_2.docx"));
        assert_eq!(std::fs::read(&taken).unwrap(), b"keep me");
        assert_eq!(
            DocxPackage::open(&written).unwrap().body().paragraph_texts().unwrap(),
            ["New"]
        );
    }

    #[test]
    fn save_new_fails_when_every_name_is_taken() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("a.docx");
        std::fs::write(&taken, b"x").unwrap();

        let pkg = DocxPackage::from_bytes(&minimal_docx("New")).unwrap();
        let err = pkg.save_new(dir.path(), [taken]).unwrap_err();
        assert!(matches!(err, ComposeError::OutputWriteFailed { .. }));
        // Only the original file remains; the staged copy is cleaned up.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
