//! Android density buckets (`drawable-*dpi`).

use std::path::Path;

use crate::dispatch::GeneratedSet;

use super::{DistributeKind, DistributionReport, Resolution, assets_for, copy_asset};

/// Raster types copied into buckets.
const TYPES: [&str; 2] = ["webp", "png"];

pub(super) fn write(set: &GeneratedSet, root: &Path, report: &mut DistributionReport) {
    for icon in set.iter() {
        let icon_name = icon.name();
        let prefix = icon
            .config()
            .distribute
            .as_ref()
            .and_then(|d| d.webp.as_ref())
            .and_then(|w| w.name_prefix.as_deref())
            .unwrap_or_default();

        for tag in TYPES {
            for (_, asset) in assets_for(icon, tag, false) {
                let bucket = Resolution::from_name(asset.name()).bucket();
                let dest = root
                    .join(bucket)
                    .join(format!("{prefix}{icon_name}_{}", asset.file_name()));
                report.record(DistributeKind::Resolution, &dest, copy_asset(asset, &dest));
            }
        }
    }
}
