//! The `w:body` of `word/document.xml` as a list of top-level blocks.
//!
//! Paragraphs, tables and anything else directly under `w:body` become
//! [`Block`]s holding their original XML text. The trailing `w:sectPr` (page
//! size, margins, headers) is kept apart so appended content always lands
//! before it.

use crate::docx::placeholders::{substitute_fragment, FieldValues};
use crate::docx::xml::{count_page_breaks, fragment_text, scan_root, Element};
use crate::error::ComposeError;
use quick_xml::escape::escape;

/// Tokens replaced by the generated table of contents.
pub const TOC_TOKENS: [&str; 2] = ["{{SPIS_TRESCI}}", "{{TOC}}"];

const PAGE_BREAK_BLOCK: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;

/// One direct child of `w:body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    local: String,
    xml: String,
}

impl Block {
    fn from_element(source: &str, el: &Element) -> Self {
        Self {
            local: el.local.clone(),
            xml: source[el.range.clone()].to_string(),
        }
    }

    pub fn is_paragraph(&self) -> bool {
        self.local == "p"
    }

    pub fn is_table(&self) -> bool {
        self.local == "tbl"
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn text(&self) -> Result<String, ComposeError> {
        fragment_text(&self.xml)
    }
}

/// Where the table of contents ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocPlacement {
    /// A paragraph holding a TOC token was rewritten.
    Replaced,
    /// No token was found; a new paragraph was appended.
    Appended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentBody {
    prefix: String,
    blocks: Vec<Block>,
    sect_pr: Option<String>,
    suffix: String,
}

impl DocumentBody {
    /// Parse a full `word/document.xml`.
    pub fn parse(xml: &str) -> Result<Self, ComposeError> {
        let (root, children) = scan_root(xml)?
            .ok_or_else(|| ComposeError::Xml("document.xml has no root element".into()))?;
        if root.local != "document" {
            return Err(ComposeError::Xml(format!(
                "unexpected root element '{}'",
                root.local
            )));
        }
        let body = children
            .iter()
            .find(|c| c.local == "body")
            .ok_or_else(|| ComposeError::Xml("document.xml has no w:body".into()))?;

        let Some(inner) = body.inner.clone() else {
            // <w:body/>: open it up so blocks can be appended.
            return Ok(Self {
                prefix: format!("{}<w:body>", &xml[..body.range.start]),
                blocks: Vec::new(),
                sect_pr: None,
                suffix: format!("</w:body>{}", &xml[body.range.end..]),
            });
        };

        let body_xml = &xml[body.range.clone()];
        let (_, elements) = scan_root(body_xml)?
            .ok_or_else(|| ComposeError::Xml("w:body could not be scanned".into()))?;

        let mut blocks = Vec::with_capacity(elements.len());
        let mut sect_pr = None;
        for el in &elements {
            if el.local == "sectPr" {
                sect_pr = Some(body_xml[el.range.clone()].to_string());
            } else {
                blocks.push(Block::from_element(body_xml, el));
            }
        }

        Ok(Self {
            prefix: xml[..inner.start].to_string(),
            blocks,
            sect_pr,
            suffix: xml[inner.end..].to_string(),
        })
    }

    pub fn to_xml(&self) -> String {
        let body_len: usize = self.blocks.iter().map(|b| b.xml.len()).sum();
        let mut out = String::with_capacity(
            self.prefix.len() + body_len + self.suffix.len() + 256,
        );
        out.push_str(&self.prefix);
        for b in &self.blocks {
            out.push_str(&b.xml);
        }
        if let Some(s) = &self.sect_pr {
            out.push_str(s);
        }
        out.push_str(&self.suffix);
        out
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Replace `{{key}}` tokens in every paragraph and table, nested tables
    /// included.
    pub fn substitute(&mut self, fields: &FieldValues) -> Result<usize, ComposeError> {
        let mut changed = 0;
        for block in &mut self.blocks {
            if let Some(xml) = substitute_fragment(&block.xml, fields)? {
                block.xml = xml;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Append an explicit page break followed by all of `other`'s blocks.
    ///
    /// `other`'s own section properties are dropped; the base document's
    /// page setup applies to the whole result.
    pub fn append_document(&mut self, other: &DocumentBody) {
        self.push_page_break();
        self.blocks.extend(other.blocks.iter().cloned());
    }

    pub fn push_page_break(&mut self) {
        self.blocks.push(Block {
            local: "p".into(),
            xml: PAGE_BREAK_BLOCK.into(),
        });
    }

    /// Put `toc` into the first paragraph holding a TOC token, else append a
    /// new paragraph at the end of the body.
    pub fn inject_toc(&mut self, toc: &str) -> Result<TocPlacement, ComposeError> {
        for block in &mut self.blocks {
            if !block.is_paragraph() {
                continue;
            }
            let text = block.text()?;
            if !TOC_TOKENS.iter().any(|t| text.contains(t)) {
                continue;
            }
            let mut replaced = text.trim_end_matches('\n').to_string();
            for token in TOC_TOKENS {
                replaced = replaced.replace(token, toc);
            }
            let props = paragraph_properties(&block.xml)?;
            block.xml = build_paragraph(props.as_deref(), &replaced);
            return Ok(TocPlacement::Replaced);
        }

        self.blocks.push(Block {
            local: "p".into(),
            xml: build_paragraph(None, toc),
        });
        Ok(TocPlacement::Appended)
    }

    /// Plain text of the body, one line per paragraph.
    pub fn text(&self) -> Result<String, ComposeError> {
        let mut out = String::new();
        for b in &self.blocks {
            out.push_str(&b.text()?);
        }
        Ok(out)
    }

    /// Text of each top-level paragraph, without the trailing newline.
    pub fn paragraph_texts(&self) -> Result<Vec<String>, ComposeError> {
        self.blocks
            .iter()
            .filter(|b| b.is_paragraph())
            .map(|b| b.text().map(|t| t.trim_end_matches('\n').to_string()))
            .collect()
    }

    pub fn page_break_count(&self) -> Result<usize, ComposeError> {
        self.blocks
            .iter()
            .map(|b| count_page_breaks(&b.xml))
            .sum()
    }
}

/// The `w:pPr` child of a paragraph, if present.
fn paragraph_properties(paragraph: &str) -> Result<Option<String>, ComposeError> {
    let Some((_, children)) = scan_root(paragraph)? else {
        return Ok(None);
    };
    Ok(children
        .iter()
        .find(|c| c.local == "pPr")
        .map(|c| paragraph[c.range.clone()].to_string()))
}

/// A single-run paragraph; `\n` becomes `w:br` and `\t` becomes `w:tab`.
fn build_paragraph(props: Option<&str>, text: &str) -> String {
    let mut run = String::new();
    for (li, line) in text.split('\n').enumerate() {
        if li > 0 {
            run.push_str("<w:br/>");
        }
        for (ti, piece) in line.split('\t').enumerate() {
            if ti > 0 {
                run.push_str("<w:tab/>");
            }
            if !piece.is_empty() {
                run.push_str(r#"<w:t xml:space="preserve">"#);
                run.push_str(&escape(piece));
                run.push_str("</w:t>");
            }
        }
    }
    format!("<w:p>{}<w:r>{}</w:r></w:p>", props.unwrap_or(""), run)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#,
            body
        )
    }

    fn para(text: &str) -> String {
        format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", text)
    }

    #[test]
    fn parse_then_serialise_is_lossless() {
        let xml = doc(&format!("{}<w:tbl><w:tr><w:tc>{}</w:tc></w:tr></w:tbl>", para("a"), para("b")));
        let body = DocumentBody::parse(&xml).unwrap();
        assert_eq!(body.blocks().len(), 2);
        assert!(body.blocks()[1].is_table());
        assert_eq!(body.to_xml(), xml);
    }

    #[test]
    fn substitution_reaches_nested_tables() {
        let nested = format!(
            "<w:tbl><w:tr><w:tc><w:tbl><w:tr><w:tc>{}</w:tc></w:tr></w:tbl></w:tc></w:tr></w:tbl>",
            para("Deep {{x}}")
        );
        let mut body = DocumentBody::parse(&doc(&format!("{}{}", para("Top {{x}}"), nested))).unwrap();
        let changed = body.substitute(&FieldValues::from_pairs([("x", "42")])).unwrap();
        assert_eq!(changed, 2);
        let text = body.text().unwrap();
        assert!(text.contains("Top 42"));
        assert!(text.contains("Deep 42"));
        assert!(!text.contains("{{x}}"));
    }

    #[test]
    fn append_inserts_break_before_section_properties() {
        let mut a = DocumentBody::parse(&doc(&para("first"))).unwrap();
        let b = DocumentBody::parse(&doc(&para("second"))).unwrap();
        a.append_document(&b);
        assert_eq!(a.page_break_count().unwrap(), 1);
        assert_eq!(a.paragraph_texts().unwrap(), ["first", "", "second"]);
        let xml = a.to_xml();
        assert_eq!(xml.matches("<w:sectPr>").count(), 1);
        assert!(xml.find("second").unwrap() < xml.find("<w:sectPr>").unwrap());
    }

    #[test]
    fn toc_replaces_token_and_keeps_paragraph_properties() {
        let with_token = r#"<w:p><w:pPr><w:jc w:val="left"/></w:pPr><w:r><w:t>{{SPIS_TRESCI}}</w:t></w:r></w:p>"#;
        let mut body = DocumentBody::parse(&doc(&format!("{}{}", para("Spis"), with_token))).unwrap();
        let placement = body.inject_toc("§\tA\n§\tB").unwrap();
        assert_eq!(placement, TocPlacement::Replaced);
        let p = body.blocks()[1].xml();
        assert!(p.starts_with(r#"<w:p><w:pPr><w:jc w:val="left"/></w:pPr>"#));
        assert!(p.contains("<w:tab/>"));
        assert!(p.contains("<w:br/>"));
        assert_eq!(body.paragraph_texts().unwrap()[1], "§\tA\n§\tB");
    }

    #[test]
    fn toc_without_token_is_appended() {
        let mut body = DocumentBody::parse(&doc(&para("Intro"))).unwrap();
        assert_eq!(body.inject_toc("line").unwrap(), TocPlacement::Appended);
        assert_eq!(body.paragraph_texts().unwrap(), ["Intro", "line"]);
    }

    #[test]
    fn self_closing_body_accepts_blocks() {
        let xml = r#"<w:document xmlns:w="x"><w:body/></w:document>"#;
        let mut body = DocumentBody::parse(xml).unwrap();
        body.inject_toc("x").unwrap();
        assert!(body.to_xml().contains("<w:body><w:p>"));
    }

    #[test]
    fn missing_body_is_an_error() {
        let err = DocumentBody::parse(r#"<w:document xmlns:w="x"/>"#).unwrap_err();
        assert!(matches!(err, ComposeError::Xml(_)));
    }
}
