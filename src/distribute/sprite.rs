//! Merged svg sprite documents.
//!
//! Icons opt in with `distribute.svg.toSprite`. Each icon's svg assets are
//! appended to every sprite named in `spriteNames` (default `icons`), inside
//! a `<defs id="<category>">` container per category when grouping by
//! category, or directly under the root otherwise.

use std::collections::BTreeMap;
use std::path::Path;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};

use crate::config::DistributeOptions;
use crate::dispatch::GeneratedSet;
use crate::error::{PipelineError, Result};
use crate::svg::{self, MarkupError};

use super::{DistributeKind, DistributionReport, assets_for, write_if_changed};

pub const DEFAULT_SPRITE: &str = "icons";

/// Top-level children of a sprite, in insertion order.
enum Node {
    Defs { category: String, symbols: Vec<String> },
    Symbol(String),
}

#[derive(Default)]
struct Sprite {
    nodes: Vec<Node>,
}

impl Sprite {
    fn push(&mut self, category: Option<&str>, markup: String) {
        let Some(category) = category else {
            self.nodes.push(Node::Symbol(markup));
            return;
        };
        let existing = self.nodes.iter_mut().find_map(|node| match node {
            Node::Defs { category: c, symbols } if c == category => Some(symbols),
            _ => None,
        });
        match existing {
            Some(symbols) => symbols.push(markup),
            None => self.nodes.push(Node::Defs {
                category: category.to_string(),
                symbols: vec![markup],
            }),
        }
    }

    fn render(&self) -> std::result::Result<Vec<u8>, MarkupError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        let mut root = BytesStart::new("svg");
        root.push_attribute(("width", "24px"));
        root.push_attribute(("height", "390px"));
        root.push_attribute(("id", "svg-source"));
        root.push_attribute(("xmlns", "http://www.w3.org/2000/svg"));
        root.push_attribute(("xmlns:xlink", "http://www.w3.org/1999/xlink"));
        root.push_attribute(("version", "1.1"));
        writer.write_event(Event::Start(root))?;

        for node in &self.nodes {
            match node {
                Node::Defs { category, symbols } => {
                    let mut defs = BytesStart::new("defs");
                    defs.push_attribute(("id", category.as_str()));
                    writer.write_event(Event::Start(defs))?;
                    for markup in symbols {
                        svg::append_document(&mut writer, markup)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new("defs")))?;
                }
                Node::Symbol(markup) => svg::append_document(&mut writer, markup)?,
            }
        }

        writer.write_event(Event::End(BytesEnd::new("svg")))?;
        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

pub(super) fn write(set: &GeneratedSet, root: &Path, options: &DistributeOptions, report: &mut DistributionReport) {
    let mut sprites: BTreeMap<String, Sprite> = BTreeMap::new();

    for icon in set.iter() {
        let Some(svg_config) = icon
            .config()
            .distribute
            .as_ref()
            .and_then(|d| d.svg.as_ref())
            .filter(|s| s.to_sprite)
        else {
            continue;
        };
        let names: Vec<&str> = if svg_config.sprite_names.is_empty() {
            vec![DEFAULT_SPRITE]
        } else {
            svg_config.sprite_names.iter().map(String::as_str).collect()
        };
        let category = icon.category().filter(|_| options.group_by_category);

        for (_, asset) in assets_for(icon, "svg", true) {
            let markup = match read_markup(asset) {
                Ok(markup) => markup,
                Err(err) => {
                    report.record(DistributeKind::Sprite, asset.path(), Err(err));
                    continue;
                }
            };
            for name in &names {
                sprites.entry(name.to_string()).or_default().push(category, markup.clone());
            }
        }
    }

    if sprites.is_empty() {
        tracing::debug!("no icon opted into a sprite");
    }
    for (name, sprite) in sprites {
        let path = root.join(format!("{name}.svg"));
        let outcome = match sprite.render() {
            Ok(bytes) => write_if_changed(&path, &bytes),
            Err(err) => Err(PipelineError::io(&path, std::io::Error::other(err))),
        };
        report.record(DistributeKind::Sprite, &path, outcome);
    }
}

fn read_markup(asset: &crate::icon::Asset) -> Result<String> {
    let bytes = asset.contents().map_err(|e| PipelineError::io(asset.path(), e))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| {
        PipelineError::io(asset.path(), std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::{DistributeConfig, IconConfig, SvgDistributeConfig, VariantConfig};
    use crate::icon::{Asset, Icon};

    fn icon(dir: &Path, name: &str, category: Option<&str>, to_sprite: bool) -> Icon {
        let mut config = IconConfig::new(dir.join(name), vec![VariantConfig::new("filled.svg")]);
        config.category = category.map(str::to_string);
        config.distribute = Some(DistributeConfig {
            svg: Some(SvgDistributeConfig {
                to_sprite,
                ..SvgDistributeConfig::default()
            }),
            ..DistributeConfig::default()
        });
        let mut icon = Icon::from_config(&config);
        let template = icon.variant("filled").unwrap().clone();
        let path = dir.join(format!("{name}.svg"));
        std::fs::write(&path, format!(r#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg" id="{name}"><path d="M0 0"/></svg>"#)).unwrap();
        icon.register(&template, "filled", "svg", Asset::new(path, "filled"));
        icon
    }

    #[test]
    fn groups_by_category() {
        let dir = tempfile::tempdir().unwrap();
        let set: GeneratedSet = [
            icon(dir.path(), "a-home", Some("nav"), true),
            icon(dir.path(), "b-menu", Some("nav"), true),
            icon(dir.path(), "c-add", Some("action"), true),
            icon(dir.path(), "d-skip", Some("nav"), false),
        ]
        .into_iter()
        .collect();

        let root = dir.path().join("sprites");
        let mut report = DistributionReport::default();
        write(&set, &root, &DistributeOptions::default(), &mut report);
        assert!(report.is_success());

        let sprite = std::fs::read_to_string(root.join("icons.svg")).unwrap();
        assert!(sprite.starts_with(
            r#"<svg width="24px" height="390px" id="svg-source" xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" version="1.1">"#
        ));
        assert_eq!(sprite.matches("<defs").count(), 2);
        assert!(sprite.contains(r#"<defs id="nav">"#));
        assert!(sprite.contains(r#"<defs id="action">"#));
        assert!(sprite.contains(r#"id="a-home""#));
        assert!(sprite.contains(r#"id="b-menu""#));
        assert!(!sprite.contains("d-skip"));
        assert!(!sprite.contains("<?xml"));
        assert!(sprite.find("a-home").unwrap() < sprite.find("b-menu").unwrap());
        assert!(sprite.find("b-menu").unwrap() < sprite.find(r#"<defs id="action">"#).unwrap());
    }

    #[test]
    fn without_grouping_symbols_sit_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let set: GeneratedSet = [icon(dir.path(), "home", Some("nav"), true)].into_iter().collect();
        let options = DistributeOptions {
            group_by_category: false,
            ..DistributeOptions::default()
        };
        let mut report = DistributionReport::default();
        write(&set, dir.path(), &options, &mut report);

        let sprite = std::fs::read_to_string(dir.path().join("icons.svg")).unwrap();
        assert!(!sprite.contains("<defs"));
        assert!(sprite.contains(r#"id="home""#));
    }

    #[test]
    fn sprite_names_select_documents() {
        let dir = tempfile::tempdir().unwrap();
        let mut home = icon(dir.path(), "home", None, true);
        let mut config = home.config().clone();
        if let Some(svg) = config.distribute.as_mut().and_then(|d| d.svg.as_mut()) {
            svg.sprite_names = vec!["nav".into(), "all".into()];
        }
        let variants = home.variants().map(|v| (v.name.clone(), v.clone())).collect();
        home = Icon::from_parts(config, variants);

        let set: GeneratedSet = [home].into_iter().collect();
        let mut report = DistributionReport::default();
        write(&set, dir.path(), &DistributeOptions::default(), &mut report);
        write(&set, dir.path(), &DistributeOptions::default(), &mut report);

        assert!(dir.path().join("nav.svg").is_file());
        assert!(dir.path().join("all.svg").is_file());
        assert!(!dir.path().join("icons.svg").exists());
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.unchanged, 2);
    }
}
