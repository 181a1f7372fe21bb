//! Produces the optimized svg asset of a variant.

use resvg::usvg::{Options, Tree};
use serde_json::Value;

use crate::svg;

use super::{Params, Plugin, PluginError, PluginInput, SVG_GENERATE};

/// Document id of an icon's asset: `<icon>-<asset>`, unique across a set.
pub fn symbol_id(icon_name: &str, asset_name: &str) -> String {
    format!("{icon_name}-{asset_name}")
}

/// Validates the source markup and writes a minified copy whose root `id`
/// is [`symbol_id`] of the icon and asset.
///
/// Set the `keepId` parameter to leave the root `id` untouched.
pub struct SvgGenerate;

impl Plugin for SvgGenerate {
    fn name(&self) -> &str {
        SVG_GENERATE
    }

    fn output_extension(&self, _input_extension: &str) -> String {
        "svg".to_string()
    }

    fn transform(&self, input: &PluginInput<'_>, params: &Params) -> Result<Vec<u8>, PluginError> {
        let markup = input.text()?;
        // Parse once so invalid sources fail here instead of at render time.
        Tree::from_str(markup, &Options::default())?;

        let keep_id = params.get("keepId").and_then(Value::as_bool).unwrap_or(false);
        let root_id = (!keep_id).then(|| symbol_id(&input.icon.name(), input.name));
        Ok(svg::optimize(markup, root_id.as_deref())?.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColorScheme, IconConfig, VariantConfig};

    fn transform(markup: &str, params: Params) -> Result<String, PluginError> {
        let icon = IconConfig::new("icons/home", vec![VariantConfig::new("filled.svg")]);
        let input = PluginInput {
            bytes: markup.as_bytes(),
            name: "filled",
            extension: "svg",
            icon: &icon,
            color_scheme: ColorScheme::Light,
        };
        SvgGenerate
            .transform(&input, &params)
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn minifies_and_sets_root_id() {
        let out = transform(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" id=\"Layer_1\" viewBox=\"0 0 24 24\">\n  <!-- c -->\n  <path d=\"M1 1h2\"/>\n</svg>\n",
            Params::new(),
        )
        .unwrap();
        assert_eq!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24" id="home-filled"><path d="M1 1h2"/></svg>"#
        );
    }

    #[test]
    fn keep_id_leaves_root_alone() {
        let mut params = Params::new();
        params.insert("keepId".into(), true.into());
        let out = transform(r#"<svg xmlns="http://www.w3.org/2000/svg" id="Layer_1" viewBox="0 0 24 24"/>"#, params).unwrap();
        assert!(out.contains(r#"id="Layer_1""#));
    }

    #[test]
    fn rejects_invalid_svg() {
        assert!(matches!(transform("<svg", Params::new()), Err(PluginError::InvalidSvg(_))));
    }
}
