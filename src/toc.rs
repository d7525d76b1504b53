//! Table-of-contents text for the selected items.
//!
//! Each line reads `§<TAB>Usługa <n> – <title> ……  <page>`. Page numbers
//! advance by each item's page count as last rendered from the unmodified
//! item file; items never rendered count as one page. Per-item overrides
//! that change an item's length are not reflected.

use crate::template::ItemFields;
use serde_json::Value;

/// Dots are padded so `label + dots` reaches this many characters.
pub const TARGET_WIDTH: usize = 60;
/// Fewest filler characters on any line.
pub const MIN_FILLER: usize = 10;
const FILLER: char = '…';

/// One rendered TOC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// 1-based position among the selected items.
    pub index: usize,
    pub title: String,
    pub page: u32,
}

impl TocEntry {
    pub fn line(&self) -> String {
        let label = format!("Usługa {} – {}", self.index, self.title);
        let filler = TARGET_WIDTH
            .saturating_sub(label.chars().count())
            .max(MIN_FILLER);
        format!(
            "§\t{} {}  {:02}",
            label,
            FILLER.to_string().repeat(filler),
            self.page
        )
    }
}

/// Display title: `title`, else `nazwa`, else `Produkt <position>`.
pub fn item_title(index: usize, fields: Option<&serde_json::Map<String, Value>>) -> String {
    let pick = |key: &str| {
        fields
            .and_then(|f| f.get(key))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    pick("title")
        .or_else(|| pick("nazwa"))
        .unwrap_or_else(|| format!("Produkt {}", index))
}

/// Compute entries with running page numbers.
///
/// `page_count` returns the cached page count for an item id, if known.
pub fn entries<F>(selected: &[String], fields: &ItemFields, start_page: u32, page_count: F) -> Vec<TocEntry>
where
    F: Fn(&str) -> Option<usize>,
{
    let mut page = start_page;
    selected
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let entry = TocEntry {
                index: i + 1,
                title: item_title(i + 1, fields.get(id)),
                page,
            };
            let pages = page_count(id).unwrap_or(1);
            page = page.saturating_add(pages as u32);
            entry
        })
        .collect()
}

/// The full TOC text, one line per item.
pub fn generate<F>(selected: &[String], fields: &ItemFields, start_page: u32, page_count: F) -> String
where
    F: Fn(&str) -> Option<usize>,
{
    entries(selected, fields, start_page, page_count)
        .iter()
        .map(TocEntry::line)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pages_advance_by_cached_counts() {
        let counts: HashMap<&str, usize> = [("a", 2), ("b", 1), ("c", 3)].into();
        let e = entries(&ids(&["a", "b", "c"]), &ItemFields::new(), 5, |id| {
            counts.get(id).copied()
        });
        let pages: Vec<_> = e.iter().map(|x| x.page).collect();
        assert_eq!(pages, [5, 7, 8]);
    }

    #[test]
    fn unknown_items_count_as_one_page() {
        let e = entries(&ids(&["x", "y", "z"]), &ItemFields::new(), 3, |_| None);
        let pages: Vec<_> = e.iter().map(|x| x.page).collect();
        assert_eq!(pages, [3, 4, 5]);
    }

    #[test]
    fn title_prefers_title_then_nazwa_then_position() {
        let mut fields = ItemFields::new();
        fields.insert("a".into(), json!({"title": "CRM", "nazwa": "x"}).as_object().unwrap().clone());
        fields.insert("b".into(), json!({"nazwa": "ERP"}).as_object().unwrap().clone());
        let e = entries(&ids(&["a", "b", "c"]), &fields, 1, |_| None);
        assert_eq!(e[0].title, "CRM");
        assert_eq!(e[1].title, "ERP");
        assert_eq!(e[2].title, "Produkt 3");
    }

    #[test]
    fn line_layout() {
        let line = TocEntry {
            index: 1,
            title: "CRM".into(),
            page: 5,
        }
        .line();
        assert!(line.starts_with("§\tUsługa 1 – CRM …"));
        assert!(line.ends_with("  05"));
        let label_len = "Usługa 1 – CRM".chars().count();
        assert_eq!(line.matches('…').count(), TARGET_WIDTH - label_len);
    }

    #[test]
    fn long_titles_keep_minimum_filler() {
        let line = TocEntry {
            index: 2,
            title: "x".repeat(80),
            page: 12,
        }
        .line();
        assert_eq!(line.matches('…').count(), MIN_FILLER);
        assert!(line.ends_with("  12"));
    }

    #[test]
    fn generate_joins_lines() {
        let text = generate(&ids(&["a", "b"]), &ItemFields::new(), 5, |_| None);
        assert_eq!(text.lines().count(), 2);
    }
}
