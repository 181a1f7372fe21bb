//! Reuse of previously generated assets.
//!
//! The cache is a read-only view of the manifest written by the last run.
//! A lookup hits only when everything the manifest recorded for a
//! (variant, type) pair is still on disk and, with hashing enabled, was
//! produced from the same inputs.

use std::collections::BTreeMap;

use crate::config::IconConfig;
use crate::icon::Asset;
use crate::manifest::{FlavorRecord, GeneratedManifest};
use crate::plugin::Produced;

#[derive(Debug, Clone, Default)]
pub struct SkipCache {
    flavors: BTreeMap<String, FlavorRecord>,
    hashing: bool,
}

impl SkipCache {
    /// A cache that never hits.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_manifest(manifest: GeneratedManifest, hashing: bool) -> Self {
        Self {
            flavors: manifest.flavors,
            hashing,
        }
    }

    /// Loads the icon's manifest. A missing or unreadable manifest yields an
    /// empty cache.
    pub fn load(config: &IconConfig, hashing: bool) -> Self {
        match GeneratedManifest::read(config) {
            Ok(Some(manifest)) => Self::from_manifest(manifest, hashing),
            Ok(None) => Self::empty(),
            Err(err) => {
                tracing::warn!(icon = %config.name(), error = %err, "ignoring unreadable manifest");
                Self::empty()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flavors.is_empty()
    }

    /// Returns the recorded outputs of `type_tag` for every flavor derived
    /// from `variant`, or `None` if any of them cannot be reused.
    pub fn lookup(&self, variant: &str, type_tag: &str, signature: &str) -> Option<Vec<Produced>> {
        let mut reused = Vec::new();
        for (name, flavor) in &self.flavors {
            if flavor.source_variant != variant {
                continue;
            }
            let Some(record) = flavor.types.get(type_tag) else {
                continue;
            };
            if !record.path.is_file() {
                tracing::debug!(path = %record.path.display(), "cached asset missing");
                return None;
            }
            if self.hashing && record.signature.as_deref() != Some(signature) {
                return None;
            }
            reused.push(Produced {
                variant_name: name.clone(),
                type_tag: type_tag.to_string(),
                asset: Asset::from(record),
            });
        }
        (!reused.is_empty()).then_some(reused)
    }
}
