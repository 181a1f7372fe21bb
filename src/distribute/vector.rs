//! Plain svg copies grouped by icon.

use std::path::Path;

use crate::dispatch::GeneratedSet;

use super::{DistributeKind, DistributionReport, assets_for, copy_asset};

pub(super) fn write(set: &GeneratedSet, root: &Path, report: &mut DistributionReport) {
    for icon in set.iter() {
        let dir = root.join(icon.name());
        for (_, asset) in assets_for(icon, "svg", true) {
            let dest = dir.join(asset.file_name());
            report.record(DistributeKind::Svg, &dest, copy_asset(asset, &dest));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DistributeConfig, IconConfig, SvgDistributeConfig, VariantConfig};
    use crate::icon::{Asset, Icon};

    #[test]
    fn copies_verbatim_and_honours_svg_filter() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = IconConfig::new(
            "icons/home",
            vec![VariantConfig::new("filled.svg"), VariantConfig::new("outline.svg")],
        );
        config.distribute = Some(DistributeConfig {
            svg: Some(SvgDistributeConfig {
                variants_to_filter: vec!["outline".into()],
                ..SvgDistributeConfig::default()
            }),
            ..DistributeConfig::default()
        });

        let mut icon = Icon::from_config(&config);
        for name in ["filled", "outline"] {
            let template = icon.variant(name).unwrap().clone();
            let path = dir.path().join(format!("{name}.svg"));
            std::fs::write(&path, format!("<svg id=\"{name}\"/>")).unwrap();
            icon.register(&template, name, "svg", Asset::new(path, name));
        }

        let root = dir.path().join("web");
        let set: GeneratedSet = [icon].into_iter().collect();
        let mut report = DistributionReport::default();
        write(&set, &root, &mut report);
        write(&set, &root, &mut report);

        assert_eq!(report.written, vec![root.join("home/filled.svg")]);
        assert_eq!(report.unchanged, 1);
        assert_eq!(
            std::fs::read_to_string(root.join("home/filled.svg")).unwrap(),
            r#"<svg id="filled"/>"#
        );
        assert!(!root.join("home/outline.svg").exists());
    }
}
