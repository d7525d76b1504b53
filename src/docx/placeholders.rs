//! `{{key}}` placeholder substitution.
//!
//! Replacement happens inside each `w:t` text node independently. A token
//! that Word split across two runs (because formatting changed mid-token) is
//! left alone.

use crate::docx::xml::xml_err;
use crate::error::ComposeError;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Field name holding the selected items list; never substituted.
pub const RESERVED_ITEMS_KEY: &str = "produkty";

static RE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap());

/// Token → replacement pairs prepared from a JSON field map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldValues {
    pairs: Vec<(String, String)>,
}

impl FieldValues {
    /// Build from a JSON object, skipping [`RESERVED_ITEMS_KEY`].
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let pairs = map
            .iter()
            .filter(|(k, _)| k.as_str() != RESERVED_ITEMS_KEY)
            .map(|(k, v)| (format!("{{{{{}}}}}", k), value_text(v)))
            .collect();
        Self { pairs }
    }

    pub fn from_pairs<K: AsRef<str>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            pairs: pairs
                .into_iter()
                .filter(|(k, _)| k.as_ref() != RESERVED_ITEMS_KEY)
                .map(|(k, v)| (format!("{{{{{}}}}}", k.as_ref()), v.into()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Replace every known token in `text`.
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !text.contains("{{") {
            return Cow::Borrowed(text);
        }
        let mut out: Option<String> = None;
        for (token, value) in &self.pairs {
            let current = out.as_deref().unwrap_or(text);
            if current.contains(token.as_str()) {
                out = Some(current.replace(token.as_str(), value));
            }
        }
        match out {
            Some(s) => Cow::Owned(s),
            None => Cow::Borrowed(text),
        }
    }
}

/// Text form of a field value: strings verbatim, null empty, the rest as JSON.
pub fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitute inside every `w:t` of an XML fragment.
///
/// Returns `None` when nothing changed, so untouched blocks keep their
/// original bytes.
pub(crate) fn substitute_fragment(
    xml: &str,
    fields: &FieldValues,
) -> Result<Option<String>, ComposeError> {
    if fields.is_empty() || !xml.contains("{{") {
        return Ok(None);
    }

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut in_text = false;
    let mut changed = false;

    loop {
        let event = reader.read_event().map_err(xml_err)?;
        match event {
            Event::Start(ref e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(ref e) if e.local_name().as_ref() == b"t" => in_text = false,
            Event::Text(ref t) if in_text => {
                let raw = t.unescape().map_err(xml_err)?;
                if let Cow::Owned(replaced) = fields.apply(&raw) {
                    changed = true;
                    writer
                        .write_event(Event::Text(BytesText::new(&replaced)))
                        .map_err(xml_err)?;
                    continue;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        writer.write_event(event).map_err(xml_err)?;
    }

    if !changed {
        return Ok(None);
    }
    String::from_utf8(writer.into_inner())
        .map(Some)
        .map_err(|e| ComposeError::Xml(e.to_string()))
}

/// Distinct `{{…}}` keys still present in `text`, in first-seen order.
pub fn leftover_placeholders(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for cap in RE_PLACEHOLDER.captures_iter(text) {
        let key = cap[1].to_string();
        if !seen.contains(&key) {
            seen.push(key);
        }
    }
    seen
}
