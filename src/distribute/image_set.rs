//! iOS asset catalogs (`<key>.imageset/Contents.json`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ColorScheme;
use crate::dispatch::GeneratedSet;
use crate::error::{PipelineError, Result};
use crate::icon::{Asset, Icon};

use super::{DistributeKind, DistributionReport, Resolution, assets_for, copy_asset, write_if_changed};

pub const ASSET_CATALOG: &str = "Contents.json";

const SUPPORTED_SCALES: [f64; 3] = [1.0, 2.0, 3.0];

/// Contents of a `Contents.json` file. Keys this crate does not know about
/// are carried through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetCatalog {
    #[serde(default)]
    pub images: Vec<CatalogImage>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogImage {
    pub idiom: String,
    pub scale: String,
    pub filename: String,

    #[serde(rename = "language-direction", default, skip_serializing_if = "Option::is_none")]
    pub language_direction: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appearances: Option<Vec<Appearance>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    pub appearance: String,
    pub value: String,
}

impl Appearance {
    pub fn dark() -> Self {
        Self {
            appearance: "luminosity".to_string(),
            value: "dark".to_string(),
        }
    }
}

/// Whether the scale after the last `@` of an asset name is one iOS
/// catalogs accept. Names without a parsable scale are accepted.
pub fn is_supported_resolution(name: &str) -> bool {
    let Some((_, suffix)) = name.rsplit_once('@') else {
        return true;
    };
    let suffix = suffix.strip_suffix("-rtl").unwrap_or(suffix);
    match suffix.parse::<f64>() {
        Ok(scale) => SUPPORTED_SCALES.contains(&scale),
        Err(_) => true,
    }
}

/// Where one asset lands in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CatalogEntry {
    /// Folder containing the imageset.
    dir: PathBuf,
    /// Imageset name without the `.imageset` extension.
    key: String,
    /// File name inside the imageset.
    filename: String,
}

fn catalog_entry(icon: &Icon, asset: &Asset, root: &Path) -> CatalogEntry {
    let icon_name = icon.name();
    let mut filename = format!("{icon_name}_{}", asset.file_name()).replace('-', "_");
    let mut key = match asset.imageset_key() {
        Some(imageset) => format!("{icon_name}_{imageset}").replace('-', "_"),
        None => filename.split('@').next().unwrap_or_default().to_string(),
    };

    let mut dir = root.to_path_buf();
    if let Some(category) = icon.category() {
        filename = format!("{category}_{filename}");
        key = format!("{category}_{key}");
        dir.push(category);
    }
    CatalogEntry { dir, key, filename }
}

fn load_catalog(path: &Path) -> Result<AssetCatalog> {
    match std::fs::read_to_string(path) {
        Ok(json) => serde_json::from_str(&json).map_err(|source| PipelineError::Manifest {
            path: path.to_path_buf(),
            source,
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(AssetCatalog::default()),
        Err(err) => Err(PipelineError::io(path, err)),
    }
}

/// Copies the asset and adds its catalog entry unless an entry with the same
/// file name exists. Returns whether anything on disk changed.
fn add_asset(entry: &CatalogEntry, asset: &Asset, image: CatalogImage) -> Result<bool> {
    let set_dir = entry.dir.join(format!("{}.imageset", entry.key));
    std::fs::create_dir_all(&set_dir).map_err(|e| PipelineError::io(&set_dir, e))?;

    let catalog_path = set_dir.join(ASSET_CATALOG);
    let mut catalog = load_catalog(&catalog_path)?;

    let copied = copy_asset(asset, &set_dir.join(&entry.filename))?;
    if catalog.images.iter().any(|i| i.filename == image.filename) {
        return Ok(copied);
    }
    catalog.images.push(image);

    let json = serde_json::to_string_pretty(&catalog).map_err(|source| PipelineError::Manifest {
        path: catalog_path.clone(),
        source,
    })?;
    let updated = write_if_changed(&catalog_path, json.as_bytes())?;
    Ok(copied || updated)
}

pub(super) fn write(set: &GeneratedSet, root: &Path, report: &mut DistributionReport) {
    for icon in set.iter() {
        let rtl_flip = icon.config().rtl_flip();
        let flipped = assets_for(icon, "pngFlip", false).into_iter().map(|a| (a, true));
        let regular = assets_for(icon, "png", false).into_iter().map(|a| (a, false));

        for ((_, asset), is_flipped) in flipped.chain(regular) {
            if !is_supported_resolution(asset.name()) {
                tracing::debug!(asset = asset.name(), "resolution not used by asset catalogs");
                continue;
            }
            let entry = catalog_entry(icon, asset, root);
            let image = CatalogImage {
                idiom: "universal".to_string(),
                scale: Resolution::from_name(asset.name()).scale().to_string(),
                filename: entry.filename.clone(),
                language_direction: rtl_flip.then(|| {
                    if is_flipped { "right-to-left" } else { "left-to-right" }.to_string()
                }),
                appearances: (asset.scheme() == ColorScheme::Dark).then(|| vec![Appearance::dark()]),
                extra: Map::new(),
            };
            let path = entry.dir.join(format!("{}.imageset", entry.key)).join(&entry.filename);
            report.record(DistributeKind::ImageSet, &path, add_asset(&entry, asset, image));
        }
    }
}
