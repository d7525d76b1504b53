//! Low-level WordprocessingML helpers over quick-xml.
//!
//! Everything here works on byte ranges of the original text, so elements we
//! don't understand are carried through untouched.

use crate::error::ComposeError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::ops::Range;

pub(crate) fn xml_err(e: quick_xml::Error) -> ComposeError {
    ComposeError::Xml(e.to_string())
}

/// An element located in a source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Element {
    /// Local name without namespace prefix (`p`, `tbl`, `sectPr`, …).
    pub local: String,
    /// Whole element, start tag to end tag.
    pub range: Range<usize>,
    /// Content between the tags; `None` for a self-closing element.
    pub inner: Option<Range<usize>>,
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Locate the first root element of `xml` and its direct children.
///
/// Returns `None` when `xml` holds no element at all.
pub(crate) fn scan_root(xml: &str) -> Result<Option<(Element, Vec<Element>)>, ComposeError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut root: Option<(String, usize, usize)> = None;
    let mut open_child: Option<(String, usize, usize)> = None;
    let mut children = Vec::new();

    loop {
        let before = reader.buffer_position();
        let event = reader.read_event().map_err(xml_err)?;
        let after = reader.buffer_position();

        match event {
            Event::Start(e) => {
                depth += 1;
                match depth {
                    1 => root = Some((local_name(&e), before, after)),
                    2 => open_child = Some((local_name(&e), before, after)),
                    _ => {}
                }
            }
            Event::Empty(e) => match depth {
                0 => {
                    let el = Element {
                        local: local_name(&e),
                        range: before..after,
                        inner: None,
                    };
                    return Ok(Some((el, Vec::new())));
                }
                1 => children.push(Element {
                    local: local_name(&e),
                    range: before..after,
                    inner: None,
                }),
                _ => {}
            },
            Event::End(_) => {
                match depth {
                    1 => {
                        if let Some((local, start, inner_start)) = root.take() {
                            let el = Element {
                                local,
                                range: start..after,
                                inner: Some(inner_start..before),
                            };
                            return Ok(Some((el, children)));
                        }
                    }
                    2 => {
                        if let Some((local, start, inner_start)) = open_child.take() {
                            children.push(Element {
                                local,
                                range: start..after,
                                inner: Some(inner_start..before),
                            });
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Plain text of a WordprocessingML fragment.
///
/// `w:t` content is unescaped, `w:tab` becomes `\t`, `w:br`/`w:cr` become
/// `\n` and every closed paragraph ends with `\n`.
pub(crate) fn fragment_text(xml: &str) -> Result<String, ComposeError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                out.push_str(&t.unescape().map_err(xml_err)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Number of `<w:br w:type="page"/>` elements in a fragment.
pub(crate) fn count_page_breaks(xml: &str) -> Result<usize, ComposeError> {
    let mut reader = Reader::from_str(xml);
    let mut count = 0;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"br" => {
                let is_page = e.attributes().flatten().any(|a| {
                    a.key.local_name().as_ref() == b"type" && a.value.as_ref() == b"page"
                });
                if is_page {
                    count += 1;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Hello</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>Cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:sectPr/></w:body></w:document>"#;

    #[test]
    fn scan_finds_body_under_document() {
        let (root, children) = scan_root(DOC).unwrap().unwrap();
        assert_eq!(root.local, "document");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].local, "body");
        assert!(DOC[children[0].range.clone()].starts_with("<w:body>"));
    }

    #[test]
    fn scan_lists_direct_children_with_ranges() {
        let (_, doc_children) = scan_root(DOC).unwrap().unwrap();
        let body = &DOC[doc_children[0].range.clone()];
        let (_, blocks) = scan_root(body).unwrap().unwrap();
        let names: Vec<_> = blocks.iter().map(|b| b.local.as_str()).collect();
        assert_eq!(names, ["p", "tbl", "sectPr"]);
        assert_eq!(&body[blocks[2].range.clone()], "<w:sectPr/>");
        assert!(blocks[2].inner.is_none());
    }

    #[test]
    fn text_covers_nested_table_cells() {
        assert_eq!(fragment_text(DOC).unwrap(), "Hello\nCell\n");
    }

    #[test]
    fn text_unescapes_entities() {
        let xml = "<w:p><w:r><w:t>A &amp; B</w:t><w:tab/><w:t>C</w:t></w:r></w:p>";
        assert_eq!(fragment_text(xml).unwrap(), "A & B\tC\n");
    }

    #[test]
    fn counts_only_page_breaks() {
        let xml = r#"<w:body><w:p><w:r><w:br w:type="page"/><w:br/></w:r></w:p><w:p><w:r><w:br w:type="page"/></w:r></w:p></w:body>"#;
        assert_eq!(count_page_breaks(xml).unwrap(), 2);
    }
}
