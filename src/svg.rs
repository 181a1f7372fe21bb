//! SVG markup utilities built on quick-xml.
//!
//! These are event-level rewrites: the markup is streamed through a reader
//! and re-emitted with a writer, so attribute values keep their original
//! escaping and element order is preserved.

use std::io::Write;

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarkupError {
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("attribute error: {0}")]
    Attribute(#[from] AttrError),

    #[error("write error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document has no root element")]
    NoRoot,

    #[error("markup is not valid UTF-8")]
    Utf8,
}

/// Namespace prefixes written by vector editors that carry no rendering data.
const EDITOR_PREFIXES: [&str; 2] = ["sodipodi:", "inkscape:"];

fn is_editor_name(name: &[u8]) -> bool {
    EDITOR_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix.as_bytes()))
}

fn is_editor_attribute(key: &[u8]) -> bool {
    is_editor_name(key)
        || EDITOR_PREFIXES.iter().any(|prefix| {
            let ns = format!("xmlns:{}", prefix.trim_end_matches(':'));
            key == ns.as_bytes()
        })
}

/// Returns the element name as an owned string.
pub(crate) fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Minifies markup: drops the XML declaration, comments, doctype,
/// processing instructions, editor metadata and insignificant whitespace.
/// When `root_id` is given, the root element's `id` is replaced by it.
pub fn optimize(markup: &str, root_id: Option<&str>) -> Result<String, MarkupError> {
    let mut reader = Reader::from_str(markup);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new(Vec::new());

    let mut depth = 0usize;
    let mut skip_depth: Option<usize> = None;
    let mut seen_root = false;

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Eof => break,
            Event::Decl(_) | Event::Comment(_) | Event::DocType(_) | Event::PI(_) => {}
            Event::Start(e) => {
                depth += 1;
                if skip_depth.is_some() {
                    continue;
                }
                if is_editor_name(e.name().as_ref()) || e.name().as_ref() == b"metadata" {
                    skip_depth = Some(depth);
                    continue;
                }
                let is_root = !seen_root;
                seen_root = true;
                writer.write_event(Event::Start(clean_element(&e, is_root.then_some(root_id).flatten())?))?;
            }
            Event::Empty(e) => {
                if skip_depth.is_some()
                    || is_editor_name(e.name().as_ref())
                    || e.name().as_ref() == b"metadata"
                {
                    continue;
                }
                let is_root = !seen_root;
                seen_root = true;
                writer.write_event(Event::Empty(clean_element(&e, is_root.then_some(root_id).flatten())?))?;
            }
            Event::End(e) => {
                if let Some(start) = skip_depth {
                    if start == depth {
                        skip_depth = None;
                    }
                    depth = depth.saturating_sub(1);
                    continue;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e))?;
            }
            other => {
                if skip_depth.is_none() {
                    writer.write_event(other)?;
                }
            }
        }
    }

    if !seen_root {
        return Err(MarkupError::NoRoot);
    }
    String::from_utf8(writer.into_inner()).map_err(|_| MarkupError::Utf8)
}

fn clean_element(e: &BytesStart<'_>, root_id: Option<&str>) -> Result<BytesStart<'static>, MarkupError> {
    let mut out = BytesStart::new(element_name(e));
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if is_editor_attribute(key) || (root_id.is_some() && key == b"id") {
            continue;
        }
        out.push_attribute(attr);
    }
    if let Some(id) = root_id {
        out.push_attribute(("id", id));
    }
    Ok(out)
}

/// Streams the root element of `markup` (and everything inside it) into
/// `writer`, dropping anything outside the root.
pub fn append_document<W: Write>(writer: &mut Writer<W>, markup: &str) -> Result<(), MarkupError> {
    let mut reader = Reader::from_str(markup);
    reader.config_mut().trim_text(true);
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Eof => break,
            Event::Decl(_) | Event::DocType(_) | Event::PI(_) if depth == 0 => {}
            Event::Comment(_) if depth == 0 => {}
            Event::Start(e) => {
                if depth == 0 && seen_root {
                    break;
                }
                seen_root = true;
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e))?;
                if depth == 0 {
                    break;
                }
            }
            Event::Empty(e) => {
                let root = depth == 0;
                seen_root = true;
                writer.write_event(Event::Empty(e))?;
                if root {
                    break;
                }
            }
            other => {
                if depth > 0 {
                    writer.write_event(other)?;
                }
            }
        }
    }

    if !seen_root {
        return Err(MarkupError::NoRoot);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDITOR_SVG: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<!-- exported -->
<svg xmlns="http://www.w3.org/2000/svg" xmlns:sodipodi="http://sodipodi.sourceforge.net/DTD/sodipodi-0.dtd" id="old" viewBox="0 0 24 24" aria-hidden="true">
  <metadata><rdf>junk</rdf></metadata>
  <sodipodi:namedview pagecolor="#fff"/>
  <path d="M0 0h24v24H0z" sodipodi:nodetypes="cccc"/>
</svg>"##;

    #[test]
    fn optimize_strips_editor_noise() {
        let out = optimize(EDITOR_SVG, Some("home-filled")).unwrap();
        assert!(!out.contains("<?xml"));
        assert!(!out.contains("exported"));
        assert!(!out.contains("metadata"));
        assert!(!out.contains("sodipodi"));
        assert!(!out.contains("old"));
        assert!(out.contains(r#"id="home-filled""#));
        assert!(out.contains(r#"aria-hidden="true""#));
        assert!(out.contains(r#"<path d="M0 0h24v24H0z"/>"#));
    }

    #[test]
    fn optimize_is_stable() {
        let once = optimize(EDITOR_SVG, Some("x")).unwrap();
        let twice = optimize(&once, Some("x")).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn optimize_rejects_empty_document() {
        assert!(matches!(optimize("<!-- nothing -->", None), Err(MarkupError::NoRoot)));
    }

    #[test]
    fn append_document_drops_prolog() {
        let mut writer = Writer::new(Vec::new());
        append_document(&mut writer, EDITOR_SVG).unwrap();
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert!(out.starts_with("<svg"));
        assert!(out.ends_with("</svg>"));
        assert!(!out.contains("exported"));
    }
}
