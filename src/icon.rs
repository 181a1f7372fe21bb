//! Icon, variant and asset types.
//!
//! An [`Icon`] is rehydrated from its [`IconConfig`] inside each job and owns
//! its variants outright, so jobs never share mutable state. Generated output
//! is recorded as immutable [`Asset`]s on the variant's type map.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::config::{ColorScheme, IconConfig, VariantConfig};

// ============================================================================
// Asset
// ============================================================================

/// A concrete output artifact.
///
/// Assets are never mutated once created; regenerating produces a new asset
/// that replaces the old one on its variant. The file contents are read on
/// first access and shared by all clones.
#[derive(Debug, Clone)]
pub struct Asset {
    path: PathBuf,
    name: String,
    color_scheme: ColorScheme,
    imageset: Option<String>,
    signature: Option<String>,
    contents: Arc<OnceLock<Arc<[u8]>>>,
}

impl Asset {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            color_scheme: ColorScheme::Light,
            imageset: None,
            signature: None,
            contents: Arc::new(OnceLock::new()),
        }
    }

    /// Creates an asset whose contents are already in memory.
    pub fn with_contents(path: impl Into<PathBuf>, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let asset = Self::new(path, name);
        let _ = asset.contents.set(bytes.into());
        asset
    }

    pub fn color_scheme(mut self, color_scheme: ColorScheme) -> Self {
        self.color_scheme = color_scheme;
        self
    }

    pub fn imageset(mut self, imageset: Option<String>) -> Self {
        self.imageset = imageset;
        self
    }

    pub fn signature(mut self, signature: Option<String>) -> Self {
        self.signature = signature;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scheme(&self) -> ColorScheme {
        self.color_scheme
    }

    pub fn imageset_key(&self) -> Option<&str> {
        self.imageset.as_deref()
    }

    pub fn content_signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// File name of the asset on disk.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Returns the asset bytes, reading the file on first use.
    pub fn contents(&self) -> io::Result<Arc<[u8]>> {
        if let Some(bytes) = self.contents.get() {
            return Ok(Arc::clone(bytes));
        }
        let bytes: Arc<[u8]> = std::fs::read(&self.path)?.into();
        Ok(Arc::clone(self.contents.get_or_init(|| bytes)))
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.name == other.name
            && self.color_scheme == other.color_scheme
            && self.imageset == other.imageset
            && self.signature == other.signature
    }
}

// ============================================================================
// Variant
// ============================================================================

/// One rendition of an icon and the assets generated from it.
///
/// Iterant fan-out creates derived variants (for example `filled-24x24@2`)
/// that remember the source variant they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub name: String,
    pub source_path: PathBuf,
    pub color_scheme: ColorScheme,
    pub imageset: Option<String>,
    /// Name of the configured variant this one was derived from.
    pub source_variant: String,
    types: BTreeMap<String, Asset>,
}

impl Variant {
    pub fn new(name: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            source_variant: name.clone(),
            name,
            source_path: source_path.into(),
            color_scheme: ColorScheme::Light,
            imageset: None,
            types: BTreeMap::new(),
        }
    }

    fn from_config(icon: &IconConfig, config: &VariantConfig) -> Self {
        let mut variant = Self::new(config.resolved_name(), icon.resolve(&config.path));
        variant.color_scheme = config.color_scheme;
        variant.imageset = config.imageset.clone();
        variant
    }

    /// Creates a variant derived from this one by a fan-out plugin.
    pub fn derive(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_path: self.source_path.clone(),
            color_scheme: self.color_scheme,
            imageset: self.imageset.clone(),
            source_variant: self.source_variant.clone(),
            types: BTreeMap::new(),
        }
    }

    /// The source file as an asset.
    pub fn source_asset(&self) -> Asset {
        Asset::new(self.source_path.clone(), self.name.clone())
            .color_scheme(self.color_scheme)
            .imageset(self.imageset.clone())
    }

    /// Registers an asset for an output type, replacing any previous one.
    pub fn set_asset(&mut self, type_tag: impl Into<String>, asset: Asset) -> Option<Asset> {
        self.types.insert(type_tag.into(), asset)
    }

    pub fn asset(&self, type_tag: &str) -> Option<&Asset> {
        self.types.get(type_tag)
    }

    pub fn types(&self) -> impl Iterator<Item = (&str, &Asset)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn has_type(&self, type_tag: &str) -> bool {
        self.types.contains_key(type_tag)
    }

    pub fn is_derived(&self) -> bool {
        self.name != self.source_variant
    }
}

// ============================================================================
// Icon
// ============================================================================

/// A rehydrated icon: its configuration plus its variants by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Icon {
    config: IconConfig,
    variants: BTreeMap<String, Variant>,
}

impl Icon {
    /// Rehydrates an icon from a copy of its configuration.
    pub fn from_config(config: &IconConfig) -> Self {
        let config = config.clone();
        let variants = config
            .variants
            .iter()
            .map(|v| {
                let variant = Variant::from_config(&config, v);
                (variant.name.clone(), variant)
            })
            .collect();
        Self { config, variants }
    }

    pub(crate) fn from_parts(config: IconConfig, variants: BTreeMap<String, Variant>) -> Self {
        Self { config, variants }
    }

    pub fn config(&self) -> &IconConfig {
        &self.config
    }

    pub fn name(&self) -> String {
        self.config.name()
    }

    pub fn icon_path(&self) -> &Path {
        &self.config.icon_path
    }

    pub fn category(&self) -> Option<&str> {
        self.config.category()
    }

    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.variants.get(name)
    }

    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants.values()
    }

    /// The configured (non-derived) variants.
    pub fn source_variants(&self) -> Vec<Variant> {
        self.variants
            .values()
            .filter(|v| !v.is_derived())
            .cloned()
            .collect()
    }

    /// Records an asset on the named variant, creating a derived variant from
    /// `template` when the name is new.
    pub fn register(&mut self, template: &Variant, variant_name: &str, type_tag: &str, asset: Asset) {
        self.variants
            .entry(variant_name.to_string())
            .or_insert_with(|| template.derive(variant_name))
            .set_asset(type_tag, asset);
    }

    /// All assets of one output type, in variant name order.
    pub fn assets_of_type(&self, type_tag: &str) -> Vec<(&Variant, &Asset)> {
        self.variants
            .values()
            .filter_map(|v| v.asset(type_tag).map(|a| (v, a)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn home() -> IconConfig {
        IconConfig::new(
            "icons/home",
            vec![
                VariantConfig::new("filled.svg"),
                VariantConfig::new("filled-dark.svg").with_color_scheme(ColorScheme::Dark),
            ],
        )
    }

    #[test]
    fn rehydrates_variants_from_config() {
        let icon = Icon::from_config(&home());
        assert_eq!(icon.name(), "home");
        let dark = icon.variant("filled-dark").unwrap();
        assert_eq!(dark.color_scheme, ColorScheme::Dark);
        assert_eq!(dark.source_path, PathBuf::from("icons/home/filled-dark.svg"));
        assert!(!dark.is_derived());
    }

    #[test]
    fn one_asset_per_type() {
        let mut variant = Variant::new("filled", "filled.svg");
        assert!(variant.set_asset("svg", Asset::new("a.svg", "filled")).is_none());
        let previous = variant.set_asset("svg", Asset::new("b.svg", "filled"));
        assert_eq!(previous.unwrap().path(), Path::new("a.svg"));
        assert_eq!(variant.types().count(), 1);
        assert_eq!(variant.asset("svg").unwrap().path(), Path::new("b.svg"));
    }

    #[test]
    fn register_creates_derived_variant() {
        let mut icon = Icon::from_config(&home());
        let template = icon.variant("filled-dark").unwrap().clone();
        icon.register(&template, "filled-dark-24x24@2", "png", Asset::new("x.png", "filled-dark-24x24@2"));

        let derived = icon.variant("filled-dark-24x24@2").unwrap();
        assert!(derived.is_derived());
        assert_eq!(derived.source_variant, "filled-dark");
        assert_eq!(derived.color_scheme, ColorScheme::Dark);
        assert_eq!(icon.assets_of_type("png").len(), 1);
        assert_eq!(icon.source_variants().len(), 2);
    }

    #[test]
    fn in_memory_contents() {
        let asset = Asset::with_contents("nowhere.svg", "x", b"<svg/>".to_vec());
        assert_eq!(&*asset.contents().unwrap(), b"<svg/>");
    }
}
