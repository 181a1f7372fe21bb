//! Repackaging of generated assets into platform bundles.
//!
//! The [`DistributionFormatter`] reads a [`GeneratedSet`] and writes one
//! bundle per requested [`DistributeKind`] under a common output root:
//!
//! | Kind         | Layout                                                  |
//! |--------------|---------------------------------------------------------|
//! | `ImageSet`   | `<root>/<category?>/<key>.imageset/{Contents.json, …}`  |
//! | `Resolution` | `<root>/<drawable-bucket>/<prefix?><icon>_<asset>`      |
//! | `Svg`        | `<root>/<icon>/<asset>`                                 |
//! | `Sprite`     | `<root>/<sprite>.svg`                                   |
//! | `Template`   | `<root>/<name>.hbs`                                     |
//!
//! Every kind is idempotent: distributing the same set twice into the same
//! root leaves it unchanged.

pub mod by_resolution;
pub mod image_set;
pub mod sprite;
pub mod template;
pub mod vector;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::config::DistributeOptions;
use crate::dispatch::GeneratedSet;
use crate::error::{PipelineError, Result};
use crate::icon::{Asset, Icon, Variant};

// ============================================================================
// Kinds
// ============================================================================

/// A distribution bundle format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum DistributeKind {
    /// iOS asset catalog folders.
    ImageSet,
    /// Android density buckets.
    Resolution,
    /// Plain svg copies, one folder per icon.
    Svg,
    /// One merged svg document.
    Sprite,
    /// Handlebars component templates.
    Template,
}

impl DistributeKind {
    pub const ALL: [DistributeKind; 5] = [
        Self::ImageSet,
        Self::Resolution,
        Self::Svg,
        Self::Sprite,
        Self::Template,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageSet => "imageset",
            Self::Resolution => "resolution",
            Self::Svg => "svg",
            Self::Sprite => "sprite",
            Self::Template => "template",
        }
    }
}

impl fmt::Display for DistributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributeKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "imageset" | "image-set" | "ios" => Ok(Self::ImageSet),
            "resolution" | "android" => Ok(Self::Resolution),
            "svg" => Ok(Self::Svg),
            "sprite" => Ok(Self::Sprite),
            "template" | "hbs" => Ok(Self::Template),
            other => Err(PipelineError::InvalidConfig(format!("unknown distribution kind `{other}`"))),
        }
    }
}

// ============================================================================
// Resolution buckets
// ============================================================================

/// Density class of a raster asset, read from the `@<scale>` in its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Mdpi,
    Hdpi,
    Xhdpi,
    Xxhdpi,
    Xxxhdpi,
}

impl Resolution {
    /// Classifies an asset name. The checks run in order and the first
    /// substring match wins, so `@1.5` is tested before `@1`.
    pub fn from_name(name: &str) -> Self {
        if name.contains("@1.5") {
            Self::Mdpi
        } else if name.contains("@1") {
            Self::Hdpi
        } else if name.contains("@2") {
            Self::Xhdpi
        } else if name.contains("@3") {
            Self::Xxhdpi
        } else {
            Self::Xxxhdpi
        }
    }

    pub fn bucket(&self) -> &'static str {
        match self {
            Self::Mdpi => "drawable-mdpi",
            Self::Hdpi => "drawable-hdpi",
            Self::Xhdpi => "drawable-xhdpi",
            Self::Xxhdpi => "drawable-xxhdpi",
            Self::Xxxhdpi => "drawable-xxxhdpi",
        }
    }

    pub fn scale(&self) -> &'static str {
        match self {
            Self::Mdpi => "1.5x",
            Self::Hdpi => "1x",
            Self::Xhdpi => "2x",
            Self::Xxhdpi => "3x",
            Self::Xxxhdpi => "4x",
        }
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug)]
pub struct DistributionFailure {
    pub kind: DistributeKind,
    pub path: PathBuf,
    pub error: PipelineError,
}

/// Files written and per-asset failures of one distribution call.
#[derive(Debug, Default)]
pub struct DistributionReport {
    /// Files created or updated, in write order.
    pub written: Vec<PathBuf>,
    /// Files already up to date.
    pub unchanged: usize,
    pub failures: Vec<DistributionFailure>,
}

impl DistributionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, kind: DistributeKind, path: &Path, outcome: Result<bool>) {
        match outcome {
            Ok(true) => self.written.push(path.to_path_buf()),
            Ok(false) => self.unchanged += 1,
            Err(error) => {
                tracing::warn!(%kind, path = %path.display(), %error, "distribution failed for asset");
                self.failures.push(DistributionFailure {
                    kind,
                    path: path.to_path_buf(),
                    error,
                });
            }
        }
    }
}

// ============================================================================
// Formatter
// ============================================================================

pub struct DistributionFormatter {
    options: DistributeOptions,
    span: Span,
}

impl DistributionFormatter {
    pub fn new(options: DistributeOptions, span: Span) -> Self {
        Self { options, span }
    }

    pub fn options(&self) -> &DistributeOptions {
        &self.options
    }

    /// Writes one bundle per kind in `kinds` (duplicates are ignored).
    ///
    /// Only a failure to create `output_root` aborts the call; failures on
    /// individual assets are collected in the report.
    pub fn distribute(
        &self,
        set: &GeneratedSet,
        output_root: impl AsRef<Path>,
        kinds: &[DistributeKind],
    ) -> Result<DistributionReport> {
        let root = output_root.as_ref();
        std::fs::create_dir_all(root).map_err(|source| PipelineError::OutputRoot {
            path: root.to_path_buf(),
            source,
        })?;

        let mut report = DistributionReport::default();
        let mut done = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            if done.contains(&kind) {
                continue;
            }
            done.push(kind);

            let _span = tracing::info_span!(parent: &self.span, "distribute", %kind).entered();
            let before = report.written.len();
            match kind {
                DistributeKind::ImageSet => image_set::write(set, root, &mut report),
                DistributeKind::Resolution => by_resolution::write(set, root, &mut report),
                DistributeKind::Svg => vector::write(set, root, &mut report),
                DistributeKind::Sprite => sprite::write(set, root, &self.options, &mut report),
                DistributeKind::Template => template::write(set, root, &self.options, &mut report),
            }
            tracing::info!(written = report.written.len() - before, "bundle done");
        }
        Ok(report)
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Whether `variant` is excluded by a `variantsToFilter` list. Derived
/// variants are excluded along with the variant they came from.
fn is_filtered(variant: &Variant, filters: &[String]) -> bool {
    filters
        .iter()
        .any(|f| *f == variant.name || *f == variant.source_variant)
}

/// Assets of `type_tag` that survive the icon's variant filters.
/// `svg_filters` adds the `distribute.svg.variantsToFilter` list.
fn assets_for<'a>(icon: &'a Icon, type_tag: &str, svg_filters: bool) -> Vec<(&'a Variant, &'a Asset)> {
    let distribute = icon.config().distribute.as_ref();
    let general = distribute.map(|d| d.variants_to_filter.as_slice()).unwrap_or(&[]);
    let svg = if svg_filters {
        distribute
            .and_then(|d| d.svg.as_ref())
            .map(|s| s.variants_to_filter.as_slice())
            .unwrap_or(&[])
    } else {
        &[]
    };
    icon.assets_of_type(type_tag)
        .into_iter()
        .filter(|(variant, _)| !is_filtered(variant, general) && !is_filtered(variant, svg))
        .collect()
}

/// Writes `bytes` to `path` unless the file already holds exactly them.
/// Returns whether the file was written.
fn write_if_changed(path: &Path, bytes: &[u8]) -> Result<bool> {
    if std::fs::read(path).is_ok_and(|existing| existing == bytes) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    std::fs::write(path, bytes).map_err(|e| PipelineError::io(path, e))?;
    Ok(true)
}

/// Copies an asset's bytes to `dest`.
fn copy_asset(asset: &Asset, dest: &Path) -> Result<bool> {
    let bytes = asset.contents().map_err(|e| PipelineError::io(asset.path(), e))?;
    write_if_changed(dest, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_mapping() {
        let cases = [
            ("filled-24x24@1.5", "drawable-mdpi", "1.5x"),
            ("filled-24x24@1", "drawable-hdpi", "1x"),
            ("filled-24x24@2", "drawable-xhdpi", "2x"),
            ("filled-24x24@3-rtl", "drawable-xxhdpi", "3x"),
            ("filled-24x24@4", "drawable-xxxhdpi", "4x"),
            ("filled", "drawable-xxxhdpi", "4x"),
        ];
        for (name, bucket, scale) in cases {
            let resolution = Resolution::from_name(name);
            assert_eq!(resolution.bucket(), bucket, "{name}");
            assert_eq!(resolution.scale(), scale, "{name}");
        }
    }

    #[test]
    fn kinds_parse() {
        assert_eq!("imageset".parse::<DistributeKind>().unwrap(), DistributeKind::ImageSet);
        assert_eq!("HBS".parse::<DistributeKind>().unwrap(), DistributeKind::Template);
        assert!("png".parse::<DistributeKind>().is_err());
        for kind in DistributeKind::ALL {
            assert_eq!(kind.to_string().parse::<DistributeKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unwritable_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        let formatter = DistributionFormatter::new(DistributeOptions::default(), Span::none());
        let err = formatter
            .distribute(&GeneratedSet::default(), file.join("root"), &[DistributeKind::Svg])
            .unwrap_err();
        assert!(matches!(err, PipelineError::OutputRoot { .. }));
    }

    #[test]
    fn write_if_changed_skips_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b.txt");
        assert!(write_if_changed(&path, b"one").unwrap());
        assert!(!write_if_changed(&path, b"one").unwrap());
        assert!(write_if_changed(&path, b"two").unwrap());
    }
}
