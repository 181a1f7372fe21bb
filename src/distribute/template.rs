//! Handlebars component templates built from svg assets.
//!
//! The root `id` becomes the template name and is removed from the markup.
//! On an `svg` root that declares `xmlns`, the attributes are reordered so
//! `aria-hidden` and `role` come first, followed by the `...attributes`
//! splat and then everything else.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::config::{ColorScheme, DistributeOptions};
use crate::dispatch::GeneratedSet;
use crate::error::{PipelineError, Result};
use crate::icon::{Asset, Icon};
use crate::plugin::symbol_id;
use crate::svg::MarkupError;

use super::{DistributeKind, DistributionReport, assets_for, write_if_changed};

const SPLAT: &str = "...attributes";
const MIXED_SUFFIX: &str = "-mixed";

/// A rendered template and the name it is saved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub body: String,
}

/// Appends ` key="value"`; `value` is already escaped.
fn push_attribute(content: &mut String, key: &str, value: &str) {
    content.push(' ');
    content.push_str(key);
    content.push_str("=\"");
    content.push_str(value);
    content.push('"');
}

/// Rewrites the root start tag. Returns the new tag and the removed `id`.
fn rewrite_root(e: &BytesStart<'_>) -> std::result::Result<(BytesStart<'static>, Option<String>), MarkupError> {
    let name = crate::svg::element_name(e);
    let mut id = None;
    let mut aria_hidden = None;
    let mut role = None;
    let mut rest = Vec::new();
    let mut has_xmlns = false;

    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value).into_owned();
        match key.as_str() {
            "id" => id = Some(attr.unescape_value()?.into_owned()),
            "aria-hidden" => aria_hidden = Some(raw),
            "role" => role = Some(raw),
            "xmlns" => {
                has_xmlns = true;
                rest.push((key, raw));
            }
            _ => rest.push((key, raw)),
        }
    }

    let mut content = name.clone();
    if name == "svg" && has_xmlns {
        if let Some(value) = &aria_hidden {
            push_attribute(&mut content, "aria-hidden", value);
        }
        if let Some(value) = &role {
            push_attribute(&mut content, "role", value);
        }
        content.push(' ');
        content.push_str(SPLAT);
        for (key, value) in &rest {
            push_attribute(&mut content, key, value);
        }
    } else {
        // Original order, minus the id.
        for attr in e.attributes() {
            let attr = attr?;
            if attr.key.as_ref() == b"id" {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.as_ref());
            let value = String::from_utf8_lossy(&attr.value);
            push_attribute(&mut content, &key, &value);
        }
    }

    let name_len = name.len();
    Ok((BytesStart::from_content(content, name_len), id))
}

/// Converts svg markup into a template. `fallback_name` is used when the
/// root has no `id`.
pub fn render_template(markup: &str, fallback_name: &str) -> std::result::Result<Template, MarkupError> {
    let mut reader = Reader::from_str(markup);
    let mut writer = Writer::new(Vec::new());
    let mut name = None;
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Start(e) if !seen_root => {
                seen_root = true;
                let (root, id) = rewrite_root(&e)?;
                name = id;
                writer.write_event(Event::Start(root))?;
            }
            Event::Empty(e) if !seen_root => {
                seen_root = true;
                let (root, id) = rewrite_root(&e)?;
                name = id;
                writer.write_event(Event::Empty(root))?;
            }
            Event::Text(t) if !seen_root && t.iter().all(u8::is_ascii_whitespace) => {}
            event => writer.write_event(event)?,
        }
    }

    if !seen_root {
        return Err(MarkupError::NoRoot);
    }
    let body = String::from_utf8(writer.into_inner()).map_err(|_| MarkupError::Utf8)?;
    Ok(Template {
        name: name.filter(|n| !n.is_empty()).unwrap_or_else(|| fallback_name.to_string()),
        body,
    })
}

fn template_for(icon: &Icon, asset: &Asset, keep_mixed_suffix: bool) -> Result<Template> {
    let bytes = asset.contents().map_err(|e| PipelineError::io(asset.path(), e))?;
    let markup = std::str::from_utf8(&bytes).map_err(|e| {
        PipelineError::io(asset.path(), std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    let mut template = render_template(markup, &symbol_id(&icon.name(), asset.name()))
        .map_err(|e| PipelineError::io(asset.path(), std::io::Error::other(e)))?;

    if !keep_mixed_suffix && asset.scheme() == ColorScheme::Mixed {
        if let Some(stripped) = template.name.strip_suffix(MIXED_SUFFIX) {
            template.name = stripped.to_string();
        }
    }
    Ok(template)
}

pub(super) fn write(set: &GeneratedSet, root: &Path, options: &DistributeOptions, report: &mut DistributionReport) {
    for icon in set.iter() {
        for (_, asset) in assets_for(icon, "svg", true) {
            match template_for(icon, asset, options.keep_mixed_suffix) {
                Ok(template) => {
                    let path = root.join(format!("{}.hbs", template.name));
                    let outcome = write_if_changed(&path, template.body.as_bytes());
                    report.record(DistributeKind::Template, &path, outcome);
                }
                Err(err) => report.record(DistributeKind::Template, asset.path(), Err(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::{IconConfig, VariantConfig};

    #[test]
    fn reorders_root_attributes() {
        let template = render_template(
            r#"<svg xmlns="http://www.w3.org/2000/svg" id="nav-home" viewBox="0 0 24 24" role="img" aria-hidden="true"><path d="M0 0"/></svg>"#,
            "fallback",
        )
        .unwrap();
        assert_eq!(template.name, "nav-home");
        assert_eq!(
            template.body,
            r#"<svg aria-hidden="true" role="img" ...attributes xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><path d="M0 0"/></svg>"#
        );
    }

    #[test]
    fn splat_without_accessibility_attributes() {
        let template = render_template(r#"<svg xmlns="http://www.w3.org/2000/svg" width="24"/>"#, "plain").unwrap();
        assert_eq!(template.name, "plain");
        assert_eq!(template.body, r#"<svg ...attributes xmlns="http://www.w3.org/2000/svg" width="24"/>"#);
    }

    #[test]
    fn no_splat_without_xmlns() {
        let template = render_template(r#"<svg id="x" role="img" width="24"></svg>"#, "fallback").unwrap();
        assert_eq!(template.name, "x");
        assert_eq!(template.body, r#"<svg role="img" width="24"></svg>"#);
    }

    #[test]
    fn icons_sharing_a_variant_name_get_separate_templates() {
        let dir = tempfile::tempdir().unwrap();
        let icons: Vec<Icon> = ["home", "menu"]
            .into_iter()
            .map(|name| {
                let config = IconConfig::new(dir.path().join(name), vec![VariantConfig::new("filled.svg")]);
                let mut icon = Icon::from_config(&config);
                let template = icon.variant("filled").unwrap().clone();
                let path = dir.path().join(format!("{name}-filled.svg"));
                std::fs::write(&path, r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#).unwrap();
                icon.register(&template, "filled", "svg", Asset::new(path, "filled"));
                icon
            })
            .collect();
        let set: GeneratedSet = icons.into_iter().collect();

        let root = dir.path().join("hbs");
        let mut report = DistributionReport::default();
        write(&set, &root, &DistributeOptions::default(), &mut report);
        assert_eq!(report.written.len(), 2);
        assert!(root.join("home-filled.hbs").is_file());
        assert!(root.join("menu-filled.hbs").is_file());
    }

    #[test]
    fn mixed_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let config = IconConfig::new(
            "icons/home",
            vec![VariantConfig::new("filled-mixed.svg").with_color_scheme(ColorScheme::Mixed)],
        );
        let mut icon = Icon::from_config(&config);
        let template = icon.variant("filled-mixed").unwrap().clone();
        let path = dir.path().join("filled-mixed.svg");
        std::fs::write(&path, r#"<svg xmlns="http://www.w3.org/2000/svg" id="home-filled-mixed"/>"#).unwrap();
        icon.register(
            &template,
            "filled-mixed",
            "svg",
            Asset::new(path, "filled-mixed").color_scheme(ColorScheme::Mixed),
        );
        let set: GeneratedSet = [icon].into_iter().collect();

        let root = dir.path().join("hbs");
        let mut report = DistributionReport::default();
        write(&set, &root, &DistributeOptions::default(), &mut report);
        assert!(root.join("home-filled.hbs").is_file());

        let keep = DistributeOptions {
            keep_mixed_suffix: true,
            ..DistributeOptions::default()
        };
        write(&set, &root, &keep, &mut report);
        assert!(root.join("home-filled-mixed.hbs").is_file());
        assert!(report.is_success());
    }
}
