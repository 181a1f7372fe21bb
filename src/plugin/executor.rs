//! Runs plugin chains for one variant.

use std::path::{Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::{GenerateKind, IconConfig, PluginConfig};
use crate::error::{PipelineError, Result};
use crate::icon::{Asset, Variant};

use super::{
    CUSTOM_ELEMENT, PluginError, PluginInput, PluginRegistry, RESOLUTIONS, RTL_FLIP, SIZES, SVG_GENERATE,
    SVG_TO_RASTER,
};

/// Bumped whenever the signature layout changes.
const SIGNATURE_VERSION: &[u8] = b"iconsmith-signature-v1";

/// One resolved generation rule: the chain to run and the type tag its final
/// output is registered under.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTarget {
    pub kind: GenerateKind,
    pub type_tag: String,
    pub chain: Vec<PluginConfig>,
}

impl GenerationTarget {
    /// File name an output of this target is written under. Custom element
    /// outputs carry their type tag before the extension.
    pub fn file_name(&self, name: &str, extension: &str) -> String {
        match self.kind {
            GenerateKind::CustomElement => format!("{name}.{}.{extension}", self.type_tag),
            _ => format!("{name}.{extension}"),
        }
    }
}

/// An asset produced by a chain, ready to be registered on an icon.
#[derive(Debug, Clone, PartialEq)]
pub struct Produced {
    pub variant_name: String,
    pub type_tag: String,
    pub asset: Asset,
}

/// An asset buffer moving through a chain.
struct Working {
    name: String,
    extension: String,
    bytes: Vec<u8>,
}

type Combination = Vec<(String, Value)>;

pub struct PluginExecutor<'a> {
    registry: &'a PluginRegistry,
    output_dir: PathBuf,
}

impl<'a> PluginExecutor<'a> {
    pub fn new(registry: &'a PluginRegistry, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Resolves the icon's generation rules into runnable targets.
    ///
    /// Rules without plugins fall back to the built-in chain for their kind.
    /// `customElement` rules are tagged `customElement`; every other rule is
    /// tagged with the extension of its final output. Raster rules of icons
    /// flagged `rtlFlip` get a second, mirrored target whose type tag carries
    /// a `Flip` suffix. Two rules resolving to the same tag are rejected.
    pub fn targets(&self, icon: &IconConfig) -> Result<Vec<GenerationTarget>> {
        let mut targets: Vec<GenerationTarget> = Vec::new();
        for rule in icon.generate_types() {
            let chain = if rule.plugins.is_empty() {
                default_chain(rule.name)
            } else {
                rule.plugins.clone()
            };
            if chain.is_empty() {
                tracing::warn!(icon = %icon.name(), kind = ?rule.name, "no plugin chain for generation rule, skipping");
                continue;
            }

            let extension = self.final_extension(&chain)?;
            let type_tag = match rule.name {
                GenerateKind::CustomElement => CUSTOM_ELEMENT.to_string(),
                _ => extension,
            };

            let mut resolved = Vec::with_capacity(2);
            if rule.name == GenerateKind::Raster && icon.rtl_flip() {
                let flipped = chain
                    .iter()
                    .cloned()
                    .map(|step| step.with_param(RTL_FLIP, true))
                    .collect();
                resolved.push(GenerationTarget {
                    kind: rule.name,
                    type_tag: format!("{type_tag}Flip"),
                    chain: flipped,
                });
            }
            resolved.insert(0, GenerationTarget {
                kind: rule.name,
                type_tag,
                chain,
            });

            for target in resolved {
                if targets.iter().any(|t| t.type_tag == target.type_tag) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "{}: more than one generation rule produces `{}` assets",
                        icon.icon_path.display(),
                        target.type_tag
                    )));
                }
                targets.push(target);
            }
        }
        Ok(targets)
    }

    fn final_extension(&self, chain: &[PluginConfig]) -> Result<String> {
        let mut extension = String::from("svg");
        for step in chain {
            extension = self.registry.get(&step.name)?.output_extension(&extension);
        }
        Ok(extension)
    }

    /// Content signature of a target applied to one source.
    ///
    /// Covers the source bytes, the type tag and every step's name,
    /// parameters and resolved iterant values, so any change that would
    /// alter the output changes the signature.
    pub fn signature(&self, source: &[u8], target: &GenerationTarget, icon: &IconConfig) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(SIGNATURE_VERSION);
        hasher.update((source.len() as u64).to_le_bytes());
        hasher.update(source);
        hasher.update(target.type_tag.as_bytes());
        for step in &target.chain {
            hasher.update([0]);
            hasher.update(step.name.as_bytes());
            hasher.update(Value::Object(step.params.clone()).to_string().as_bytes());
            for name in &step.iterants {
                let values = iterant_values(name, step, icon)
                    .map_err(|e| PipelineError::from_plugin(&step.name, "", name, e))?;
                hasher.update(name.as_bytes());
                hasher.update(Value::Array(values).to_string().as_bytes());
            }
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Runs `target` over the variant's source file.
    ///
    /// Outputs of steps flagged `writeToOutput` and all outputs of the last
    /// step are written to the output directory under
    /// [`GenerationTarget::file_name`].
    pub fn execute(
        &self,
        icon: &IconConfig,
        variant: &Variant,
        target: &GenerationTarget,
        signature: Option<&str>,
    ) -> Result<Vec<Produced>> {
        let source = std::fs::read(&variant.source_path)
            .map_err(|e| PipelineError::io(&variant.source_path, e))?;
        let source_extension = variant
            .source_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "svg".to_string());

        std::fs::create_dir_all(&self.output_dir).map_err(|e| PipelineError::io(&self.output_dir, e))?;

        let mut current = vec![Working {
            name: variant.name.clone(),
            extension: source_extension,
            bytes: source,
        }];
        let mut written = Vec::new();

        for (index, step) in target.chain.iter().enumerate() {
            let plugin = self.registry.get(&step.name)?;
            let last = index + 1 == target.chain.len();
            let combinations = combinations(step, icon)
                .map_err(|e| PipelineError::from_plugin(&step.name, &variant.name, &variant.name, e))?;

            let mut next = Vec::with_capacity(current.len() * combinations.len());
            for work in &current {
                for combination in &combinations {
                    let mut params = step.params.clone();
                    for (key, value) in combination {
                        params.insert(key.clone(), value.clone());
                    }
                    let name = plugin.output_name(&work.name, combination, &params);
                    let extension = plugin.output_extension(&work.extension);

                    let input = PluginInput {
                        bytes: &work.bytes,
                        name: &name,
                        extension: &work.extension,
                        icon,
                        color_scheme: variant.color_scheme,
                    };
                    let bytes = plugin
                        .transform(&input, &params)
                        .and_then(|bytes| {
                            if bytes.is_empty() {
                                Err(PluginError::InvalidOutput("plugin produced no data".into()))
                            } else {
                                Ok(bytes)
                            }
                        })
                        .map_err(|e| PipelineError::from_plugin(plugin.name(), &variant.name, &name, e))?;

                    if step.write_to_output || last {
                        let path = self.output_dir.join(target.file_name(&name, &extension));
                        std::fs::write(&path, &bytes).map_err(|e| PipelineError::io(&path, e))?;
                        if last {
                            written.push((path, name.clone(), bytes.clone()));
                        }
                    }
                    next.push(Working { name, extension, bytes });
                }
            }
            tracing::debug!(plugin = plugin.name(), variant = %variant.name, outputs = next.len(), "plugin step done");
            current = next;
        }

        Ok(written
            .into_iter()
            .map(|(path, name, bytes)| Produced {
                variant_name: name.clone(),
                type_tag: target.type_tag.clone(),
                asset: Asset::with_contents(path, name, bytes)
                    .color_scheme(variant.color_scheme)
                    .imageset(variant.imageset.clone())
                    .signature(signature.map(str::to_string)),
            })
            .collect())
    }
}

/// Built-in chain for a rule that configures no plugins.
pub fn default_chain(kind: GenerateKind) -> Vec<PluginConfig> {
    match kind {
        GenerateKind::Svg => vec![PluginConfig::new(SVG_GENERATE)],
        GenerateKind::Raster => {
            vec![PluginConfig::new(SVG_TO_RASTER).with_iterants([SIZES, RESOLUTIONS])]
        }
        GenerateKind::CustomElement => Vec::new(),
    }
}

/// Values an iterant fans out over: an explicit list in `params`, or the
/// icon's sizes or resolutions.
fn iterant_values(name: &str, step: &PluginConfig, icon: &IconConfig) -> std::result::Result<Vec<Value>, PluginError> {
    let values = match step.params.get(name) {
        Some(Value::Array(values)) => values.clone(),
        Some(value) => vec![value.clone()],
        None if name == SIZES => icon
            .sizes()
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| PluginError::invalid_param(name, e.to_string()))?,
        None if name == RESOLUTIONS => icon.resolutions().into_iter().map(Value::from).collect(),
        None => return Err(PluginError::invalid_param(name, "no values to iterate over")),
    };
    if values.is_empty() {
        return Err(PluginError::invalid_param(name, "iterant list is empty"));
    }
    Ok(values)
}

/// Cartesian product of the step's iterants, in declaration order.
fn combinations(step: &PluginConfig, icon: &IconConfig) -> std::result::Result<Vec<Combination>, PluginError> {
    let mut product: Vec<Combination> = vec![Vec::new()];
    for name in &step.iterants {
        let values = iterant_values(name, step, icon)?;
        let mut expanded = Vec::with_capacity(product.len() * values.len());
        for prefix in &product {
            for value in &values {
                let mut combination = prefix.clone();
                combination.push((name.clone(), value.clone()));
                expanded.push(combination);
            }
        }
        product = expanded;
    }
    Ok(product)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{GenerateType, IconSize, RendererConfig, VariantConfig};
    use crate::plugin::{PNG_TO_WEBP, Params, Plugin};
    use crate::renderer::RendererPool;

    const SQUARE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><rect width="24" height="24" fill="#222"/></svg>"##;

    fn registry() -> PluginRegistry {
        PluginRegistry::with_defaults(Arc::new(RendererPool::new(RendererConfig {
            sessions: 1,
            load_system_fonts: false,
            ..RendererConfig::default()
        })))
    }

    fn icon(dir: &Path, kinds: &[GenerateKind]) -> IconConfig {
        std::fs::write(dir.join("filled.svg"), SQUARE).unwrap();
        IconConfig::new(dir, vec![VariantConfig::new("filled.svg")]).with_generate(
            kinds
                .iter()
                .map(|&name| GenerateType { name, plugins: Vec::new() })
                .collect(),
        )
    }

    #[test]
    fn default_targets_and_flip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = icon(dir.path(), &[GenerateKind::Svg, GenerateKind::Raster, GenerateKind::CustomElement]);
        config.metadata.insert("rtlFlip".into(), true.into());

        let registry = registry();
        let targets = PluginExecutor::new(&registry, dir.path().join("out")).targets(&config).unwrap();
        let tags: Vec<&str> = targets.iter().map(|t| t.type_tag.as_str()).collect();
        assert_eq!(tags, vec!["svg", "png", "pngFlip"]);
        assert_eq!(targets[2].chain[0].params.get(RTL_FLIP), Some(&Value::Bool(true)));
    }

    #[test]
    fn custom_elements_get_their_own_tag_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = icon(dir.path(), &[]).with_generate(vec![
            GenerateType {
                name: GenerateKind::Svg,
                plugins: Vec::new(),
            },
            GenerateType {
                name: GenerateKind::CustomElement,
                plugins: vec![PluginConfig::new(SVG_GENERATE).with_param("keepId", true)],
            },
        ]);

        let registry = registry();
        let executor = PluginExecutor::new(&registry, dir.path().join("out"));
        let targets = executor.targets(&config).unwrap();
        let tags: Vec<&str> = targets.iter().map(|t| t.type_tag.as_str()).collect();
        assert_eq!(tags, vec!["svg", CUSTOM_ELEMENT]);

        let variant = crate::icon::Icon::from_config(&config).variant("filled").unwrap().clone();
        let plain = executor.execute(&config, &variant, &targets[0], None).unwrap();
        let custom = executor.execute(&config, &variant, &targets[1], None).unwrap();
        assert_eq!(plain[0].asset.path(), dir.path().join("out/filled.svg"));
        assert_eq!(custom[0].asset.path(), dir.path().join("out/filled.customElement.svg"));
        assert_eq!(custom[0].type_tag, CUSTOM_ELEMENT);
        assert!(plain[0].asset.path().is_file());
        assert!(custom[0].asset.path().is_file());
    }

    #[test]
    fn rules_with_the_same_tag_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = icon(dir.path(), &[]).with_generate(vec![
            GenerateType {
                name: GenerateKind::Svg,
                plugins: Vec::new(),
            },
            GenerateType {
                name: GenerateKind::Raster,
                plugins: vec![PluginConfig::new(SVG_GENERATE)],
            },
        ]);

        let registry = registry();
        let err = PluginExecutor::new(&registry, dir.path().join("out"))
            .targets(&config)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(ref message) if message.contains("`svg`")));
    }

    #[test]
    fn raster_fans_out_over_sizes_and_resolutions() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = icon(dir.path(), &[GenerateKind::Raster]);
        config.sizes = vec![IconSize::Square(16), IconSize::Square(24)];
        config.resolutions = vec![1.0, 2.0];

        let registry = registry();
        let executor = PluginExecutor::new(&registry, dir.path().join("out"));
        let target = executor.targets(&config).unwrap().remove(0);
        let variant = crate::icon::Icon::from_config(&config).variant("filled").unwrap().clone();

        let produced = executor.execute(&config, &variant, &target, Some("sig")).unwrap();
        let names: Vec<&str> = produced.iter().map(|p| p.variant_name.as_str()).collect();
        assert_eq!(names, vec!["filled-16x16@1", "filled-16x16@2", "filled-24x24@1", "filled-24x24@2"]);
        for p in &produced {
            assert_eq!(p.type_tag, "png");
            assert!(p.asset.path().exists());
            assert_eq!(p.asset.content_signature(), Some("sig"));
        }
        let image = image::open(dir.path().join("out/filled-24x24@2.png")).unwrap();
        assert_eq!((image.width(), image.height()), (48, 48));
    }

    #[test]
    fn intermediate_output_is_kept_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = icon(dir.path(), &[]);
        config = config.with_generate(vec![GenerateType {
            name: GenerateKind::Raster,
            plugins: vec![
                PluginConfig {
                    write_to_output: true,
                    ..PluginConfig::new(SVG_TO_RASTER).with_param(SIZES, 24)
                },
                PluginConfig::new(PNG_TO_WEBP),
            ],
        }]);

        let registry = registry();
        let executor = PluginExecutor::new(&registry, dir.path().join("out"));
        let target = executor.targets(&config).unwrap().remove(0);
        assert_eq!(target.type_tag, "webp");

        let variant = crate::icon::Icon::from_config(&config).variant("filled").unwrap().clone();
        let produced = executor.execute(&config, &variant, &target, None).unwrap();
        assert_eq!(produced.len(), 1);
        assert!(dir.path().join("out/filled.png").exists());
        assert!(dir.path().join("out/filled.webp").exists());
    }

    #[test]
    fn signature_tracks_params_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = icon(dir.path(), &[GenerateKind::Raster]);
        let registry = registry();
        let executor = PluginExecutor::new(&registry, dir.path().join("out"));
        let target = executor.targets(&config).unwrap().remove(0);

        let a = executor.signature(b"<svg/>", &target, &config).unwrap();
        assert_eq!(a, executor.signature(b"<svg/>", &target, &config).unwrap());
        assert_eq!(a.len(), 64);
        assert_ne!(a, executor.signature(b"<svg />", &target, &config).unwrap());

        config.resolutions = vec![4.0];
        assert_ne!(a, executor.signature(b"<svg/>", &target, &config).unwrap());
    }

    struct Upper;

    impl Plugin for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn transform(&self, input: &PluginInput<'_>, _: &Params) -> std::result::Result<Vec<u8>, PluginError> {
            Ok(input.text()?.to_uppercase().into_bytes())
        }
    }

    struct Nothing;

    impl Plugin for Nothing {
        fn name(&self) -> &str {
            "nothing"
        }

        fn transform(&self, _: &PluginInput<'_>, _: &Params) -> std::result::Result<Vec<u8>, PluginError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn custom_plugins_and_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = icon(dir.path(), &[]);
        let mut registry = PluginRegistry::new();
        registry.register(Upper);
        registry.register(Nothing);
        let executor = PluginExecutor::new(&registry, dir.path().join("out"));
        let variant = crate::icon::Icon::from_config(&config).variant("filled").unwrap().clone();

        let upper = GenerationTarget {
            kind: GenerateKind::Svg,
            type_tag: "svg".into(),
            chain: vec![PluginConfig::new("upper")],
        };
        let produced = executor.execute(&config, &variant, &upper, None).unwrap();
        let written = std::fs::read_to_string(dir.path().join("out/filled.svg")).unwrap();
        assert!(written.starts_with("<SVG"));
        assert_eq!(produced[0].variant_name, "filled");

        let nothing = GenerationTarget {
            chain: vec![PluginConfig::new("nothing")],
            ..upper
        };
        let err = executor.execute(&config, &variant, &nothing, None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PluginFailure);
    }
}
