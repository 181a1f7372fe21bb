//! The generated manifest (`iconrc.json`).
//!
//! Each icon job writes one manifest to its generate output directory: the
//! icon's full configuration plus a `flavors` map recording every variant and
//! the asset generated for each output type. The next run reads it back to
//! decide what can be reused, and distribution can rebuild the generated
//! icon set from manifests alone.
//!
//! Maps are ordered and the JSON is pretty-printed, so generating an
//! unchanged icon twice produces byte-identical files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ColorScheme, IconConfig};
use crate::error::{PipelineError, Result};
use crate::icon::{Asset, Icon, Variant};

pub const MANIFEST_FILE: &str = "iconrc.json";

// ============================================================================
// Serializable records
// ============================================================================

/// Serializable form of an [`Asset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub path: PathBuf,
    pub name: String,
    #[serde(default)]
    pub color_scheme: ColorScheme,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imageset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl From<&Asset> for AssetRecord {
    fn from(asset: &Asset) -> Self {
        Self {
            path: asset.path().to_path_buf(),
            name: asset.name().to_string(),
            color_scheme: asset.scheme(),
            imageset: asset.imageset_key().map(str::to_string),
            signature: asset.content_signature().map(str::to_string),
        }
    }
}

impl From<&AssetRecord> for Asset {
    fn from(record: &AssetRecord) -> Self {
        Asset::new(record.path.clone(), record.name.clone())
            .color_scheme(record.color_scheme)
            .imageset(record.imageset.clone())
            .signature(record.signature.clone())
    }
}

/// Serializable form of a [`Variant`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlavorRecord {
    pub source_variant: String,
    pub source_path: PathBuf,
    #[serde(default)]
    pub color_scheme: ColorScheme,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imageset: Option<String>,
    #[serde(default)]
    pub types: BTreeMap<String, AssetRecord>,
}

impl From<&Variant> for FlavorRecord {
    fn from(variant: &Variant) -> Self {
        Self {
            source_variant: variant.source_variant.clone(),
            source_path: variant.source_path.clone(),
            color_scheme: variant.color_scheme,
            imageset: variant.imageset.clone(),
            types: variant
                .types()
                .map(|(tag, asset)| (tag.to_string(), AssetRecord::from(asset)))
                .collect(),
        }
    }
}

impl FlavorRecord {
    fn to_variant(&self, name: &str) -> Variant {
        let mut variant = Variant::new(name, self.source_path.clone());
        variant.color_scheme = self.color_scheme;
        variant.imageset = self.imageset.clone();
        variant.source_variant = self.source_variant.clone();
        for (tag, record) in &self.types {
            variant.set_asset(tag.clone(), Asset::from(record));
        }
        variant
    }
}

// ============================================================================
// GeneratedManifest
// ============================================================================

/// Persisted record of what has been generated for one icon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedManifest {
    #[serde(flatten)]
    pub config: IconConfig,

    #[serde(default)]
    pub flavors: BTreeMap<String, FlavorRecord>,
}

impl GeneratedManifest {
    pub fn from_icon(icon: &Icon) -> Self {
        Self {
            config: icon.config().clone(),
            flavors: icon
                .variants()
                .map(|v| (v.name.clone(), FlavorRecord::from(v)))
                .collect(),
        }
    }

    /// Rebuilds the icon, its variants and their assets.
    pub fn into_icon(self) -> Icon {
        let variants = self
            .flavors
            .iter()
            .map(|(name, flavor)| (name.clone(), flavor.to_variant(name)))
            .collect();
        Icon::from_parts(self.config, variants)
    }

    /// Location of the manifest for an icon.
    pub fn path_for(config: &IconConfig) -> PathBuf {
        config.generate_output_dir().join(MANIFEST_FILE)
    }

    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_json(&json).map_err(|source| PipelineError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads the manifest of `config`, or `None` when none has been written.
    pub fn read(config: &IconConfig) -> Result<Option<Self>> {
        let path = Self::path_for(config);
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Writes the manifest, creating its directory. The file is only touched
    /// when its contents change.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut json = self.to_json_pretty().map_err(|source| PipelineError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
        json.push('\n');

        if std::fs::read(path).is_ok_and(|existing| existing == json.as_bytes()) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        std::fs::write(path, json).map_err(|e| PipelineError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::VariantConfig;

    fn icon() -> Icon {
        let config = IconConfig::new(
            "icons/home",
            vec![VariantConfig::new("filled.svg").with_imageset("filled")],
        )
        .with_category("nav");
        let mut icon = Icon::from_config(&config);
        let template = icon.variant("filled").unwrap().clone();
        icon.register(
            &template,
            "filled",
            "svg",
            Asset::new("icons/home/out/filled.svg", "filled").signature(Some("abc".into())),
        );
        icon.register(
            &template,
            "filled-24x24@2",
            "png",
            Asset::new("icons/home/out/filled-24x24@2.png", "filled-24x24@2")
                .imageset(Some("filled".into())),
        );
        icon
    }

    #[test]
    fn manifest_layout() {
        let manifest = GeneratedManifest::from_icon(&icon());
        let value: serde_json::Value = serde_json::from_str(&manifest.to_json_pretty().unwrap()).unwrap();

        assert_eq!(value["iconPath"], "icons/home");
        assert_eq!(value["category"], "nav");
        let derived = &value["flavors"]["filled-24x24@2"];
        assert_eq!(derived["sourceVariant"], "filled");
        assert_eq!(derived["types"]["png"]["path"], "icons/home/out/filled-24x24@2.png");
        assert_eq!(value["flavors"]["filled"]["types"]["svg"]["signature"], "abc");
    }

    #[test]
    fn rebuilds_icon() {
        let original = icon();
        let json = GeneratedManifest::from_icon(&original).to_json_pretty().unwrap();
        let rebuilt = GeneratedManifest::from_json(&json).unwrap().into_icon();
        assert_eq!(rebuilt, original);
        assert!(rebuilt.variant("filled-24x24@2").unwrap().is_derived());
    }

    #[test]
    fn write_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(MANIFEST_FILE);
        let manifest = GeneratedManifest::from_icon(&icon());

        manifest.write(&path).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        manifest.write(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
        assert!(first.ends_with("}\n"));
        assert!(first.contains("\n  \"flavors\""));
    }

    #[test]
    fn corrupt_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(GeneratedManifest::load(&path), Err(PipelineError::Manifest { .. })));
    }
}
