//! Template descriptors and composition requests (JSON wire types).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Default page number of the first item in the table of contents.
pub const DEFAULT_TOC_START_PAGE: u32 = 5;

/// One file of a multi-file template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFile {
    /// File name relative to the template folder.
    pub file: String,
    /// Position in the composed document; ascending.
    pub order: i64,
    /// Carries the generated table of contents.
    #[serde(default)]
    pub is_toc: bool,
    /// Human-readable label used in progress messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TemplateFile {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.file)
    }
}

/// Rule placing the selected items inside the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionPoint {
    #[serde(rename = "type")]
    pub kind: String,
    /// Items are inserted right after the file with this name.
    #[serde(default)]
    pub after: Option<String>,
}

impl InjectionPoint {
    pub const BETWEEN_FILES: &'static str = "between_files";

    pub fn between_files(after: impl Into<String>) -> Self {
        Self {
            kind: Self::BETWEEN_FILES.into(),
            after: Some(after.into()),
        }
    }

    /// Whether items go right after `file`.
    pub fn is_after(&self, file: &str) -> bool {
        self.kind == Self::BETWEEN_FILES && self.after.as_deref() == Some(file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocConfig {
    #[serde(default = "default_start_page")]
    pub start_page: u32,
}

fn default_start_page() -> u32 {
    DEFAULT_TOC_START_PAGE
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            start_page: DEFAULT_TOC_START_PAGE,
        }
    }
}

/// A template as listed in `templates.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    pub id: String,
    /// Folder under the templates directory holding the files.
    pub folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub files: Vec<TemplateFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection_point: Option<InjectionPoint>,
    #[serde(default)]
    pub toc: TocConfig,
    /// Contents of the folder's `fields-description.json`, when loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields_description: Option<Value>,
    /// Any other keys are preserved.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TemplateDescriptor {
    pub const MULTI_FILE: &'static str = "multi_file";

    /// Files in ascending `order`; ties keep their listed order.
    pub fn ordered_files(&self) -> Vec<&TemplateFile> {
        let mut files: Vec<_> = self.files.iter().collect();
        files.sort_by_key(|f| f.order);
        files
    }

    /// Whether items are spliced in after `file`.
    pub fn inserts_after(&self, file: &str) -> bool {
        self.injection_point
            .as_ref()
            .map(|ip| ip.is_after(file))
            .unwrap_or(false)
    }

    pub fn is_multi_file(&self) -> bool {
        self.kind.as_deref() == Some(Self::MULTI_FILE)
    }
}

/// `templates.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateIndex {
    #[serde(default)]
    pub templates: Vec<TemplateDescriptor>,
}

/// Per-item field overrides: item id → field map.
pub type ItemFields = HashMap<String, Map<String, Value>>;

/// What the client asks to compose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionRequest {
    /// Values for the base template's placeholders.
    #[serde(default)]
    pub form_data: Map<String, Value>,
    #[serde(default)]
    pub product_custom_fields: ItemFields,
    /// Item ids in the order they appear in the offer.
    #[serde(default)]
    pub selected_products: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_data: Option<TemplateDescriptor>,
}

impl CompositionRequest {
    /// Overrides for one item; `None` when absent or empty.
    pub fn item_fields(&self, id: &str) -> Option<&Map<String, Value>> {
        self.product_custom_fields.get(id).filter(|m| !m.is_empty())
    }

    /// First non-empty string among `keys` in the form data.
    pub fn form_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| match self.form_data.get(*k) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(v @ Value::Number(_)) => Some(v.to_string()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> TemplateDescriptor {
        serde_json::from_value(json!({
            "id": "standard",
            "folder": "standard",
            "type": "multi_file",
            "files": [
                {"file": "03_end.docx", "order": 3},
                {"file": "01_cover.docx", "order": 1},
                {"file": "02_toc.docx", "order": 2, "is_toc": true, "name": "Spis treści"}
            ],
            "injection_point": {"type": "between_files", "after": "02_toc.docx"},
            "color": "blue"
        }))
        .unwrap()
    }

    #[test]
    fn files_sort_by_order() {
        let d = descriptor();
        let names: Vec<_> = d.ordered_files().iter().map(|f| f.file.as_str()).collect();
        assert_eq!(names, ["01_cover.docx", "02_toc.docx", "03_end.docx"]);
    }

    #[test]
    fn toc_defaults_to_page_five() {
        assert_eq!(descriptor().toc.start_page, 5);
    }

    #[test]
    fn injection_point_matches_file_name() {
        let d = descriptor();
        assert!(d.inserts_after("02_toc.docx"));
        assert!(!d.inserts_after("01_cover.docx"));
        assert!(d.is_multi_file());
        assert_eq!(d.extra["color"], "blue");
    }

    #[test]
    fn unknown_injection_type_never_matches() {
        let ip = InjectionPoint {
            kind: "at_end".into(),
            after: Some("a.docx".into()),
        };
        assert!(!ip.is_after("a.docx"));
    }

    #[test]
    fn request_uses_camel_case() {
        let req: CompositionRequest = serde_json::from_value(json!({
            "formData": {"NazwaFirmyKlienta": "ACME"},
            "selectedProducts": ["crm", "erp"],
            "productCustomFields": {"crm": {"title": "CRM"}, "erp": {}}
        }))
        .unwrap();
        assert_eq!(req.selected_products, ["crm", "erp"]);
        assert!(req.item_fields("crm").is_some());
        assert!(req.item_fields("erp").is_none());
        assert_eq!(req.form_text(&["klient", "NazwaFirmyKlienta"]).as_deref(), Some("ACME"));
    }
}
