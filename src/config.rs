//! Serializable icon configuration and pipeline options.
//!
//! An [`IconConfig`] is plain data: it is cloned into every worker job and
//! written back out as part of the generated manifest. All types use the
//! camelCase JSON layout of `iconrc.json`:
//!
//! ```json
//! {
//!   "iconPath": "icons/home",
//!   "category": "nav",
//!   "variants": [
//!     { "path": "filled.svg", "colorScheme": "light", "imageset": "filled" },
//!     { "path": "filled-dark.svg", "colorScheme": "dark", "imageset": "filled" }
//!   ],
//!   "sizes": [24],
//!   "resolutions": [1, 2, 3],
//!   "generate": { "types": [{ "name": "svg" }, { "name": "raster" }] }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};

// ============================================================================
// Variants
// ============================================================================

/// Color scheme of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum ColorScheme {
    #[default]
    Light,
    Dark,
    Mixed,
}

/// One source rendition of an icon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct VariantConfig {
    /// Variant name. Defaults to the file stem of `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Source file, relative to the icon path unless absolute.
    pub path: PathBuf,

    #[serde(default)]
    pub color_scheme: ColorScheme,

    /// Grouping key shared by variants that belong in one asset catalog folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imageset: Option<String>,
}

impl VariantConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            name: None,
            path: path.into(),
            color_scheme: ColorScheme::Light,
            imageset: None,
        }
    }

    pub fn with_color_scheme(mut self, color_scheme: ColorScheme) -> Self {
        self.color_scheme = color_scheme;
        self
    }

    pub fn with_imageset(mut self, imageset: impl Into<String>) -> Self {
        self.imageset = Some(imageset.into());
        self
    }

    /// Returns the explicit name or the file stem of the source path.
    pub fn resolved_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }
}

// ============================================================================
// Sizes
// ============================================================================

/// A requested output size, either square or explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum IconSize {
    Square(u32),
    Rect { width: u32, height: u32 },
}

impl IconSize {
    pub fn width(&self) -> u32 {
        match *self {
            Self::Square(side) => side,
            Self::Rect { width, .. } => width,
        }
    }

    pub fn height(&self) -> u32 {
        match *self {
            Self::Square(side) => side,
            Self::Rect { height, .. } => height,
        }
    }
}

// ============================================================================
// Plugins and generation rules
// ============================================================================

/// A transform plugin reference as written in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct PluginConfig {
    /// Name the plugin is registered under.
    pub name: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,

    /// Parameter names to fan out over. Each name resolves to a list taken
    /// from `params` or, failing that, from the icon's `sizes`/`resolutions`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub iterants: Vec<String>,

    /// Persist this plugin's output even when it is not the last in the chain.
    #[serde(default)]
    pub write_to_output: bool,
}

impl PluginConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
            iterants: Vec::new(),
            write_to_output: false,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_iterants<I, S>(mut self, iterants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.iterants = iterants.into_iter().map(Into::into).collect();
        self
    }
}

/// The representation a generation rule asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum GenerateKind {
    Svg,
    Raster,
    CustomElement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct GenerateType {
    pub name: GenerateKind,

    /// Explicit chain. When empty the built-in default for `name` is used.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct GenerateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    #[serde(default)]
    pub types: Vec<GenerateType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct BuildConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginConfig>,
}

// ============================================================================
// Distribution rules
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct HbsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_href_helper: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_to_the_image_asset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct SvgDistributeConfig {
    /// Include this icon's svg assets in the merged sprite document.
    #[serde(default)]
    pub to_sprite: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sprite_names: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants_to_filter: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_as_hbs: Option<HbsConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct WebpDistributeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct DistributeConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants_to_filter: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svg: Option<SvgDistributeConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webp: Option<WebpDistributeConfig>,
}

// ============================================================================
// IconConfig
// ============================================================================

/// Declarative description of one icon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct IconConfig {
    pub icon_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    pub variants: Vec<VariantConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sizes: Vec<IconSize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolutions: Vec<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<GenerateConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribute: Option<DistributeConfig>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

const DEFAULT_SIZE: IconSize = IconSize::Square(24);
const DEFAULT_RESOLUTIONS: [f64; 3] = [1.0, 2.0, 3.0];

impl IconConfig {
    pub fn new(icon_path: impl Into<PathBuf>, variants: Vec<VariantConfig>) -> Self {
        Self {
            icon_path: icon_path.into(),
            icon_name: None,
            category: None,
            labels: Vec::new(),
            variants,
            sizes: Vec::new(),
            resolutions: Vec::new(),
            output_path: None,
            build: None,
            generate: None,
            distribute: None,
            metadata: Map::new(),
        }
    }

    /// Returns the icon name, defaulting to the last component of the icon path.
    pub fn name(&self) -> String {
        self.icon_name.clone().unwrap_or_else(|| {
            self.icon_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    /// Category, with empty strings treated as absent.
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref().filter(|c| !c.is_empty())
    }

    /// Directory generated assets and the manifest are written to.
    pub fn generate_output_dir(&self) -> PathBuf {
        self.generate
            .as_ref()
            .and_then(|g| g.output_path.clone())
            .or_else(|| self.output_path.clone())
            .map(|p| self.resolve(&p))
            .unwrap_or_else(|| self.icon_path.join("out"))
    }

    /// Directory the build step leaves behind; generation requires it.
    pub fn build_output_dir(&self) -> PathBuf {
        self.build
            .as_ref()
            .and_then(|b| b.output_path.clone())
            .map(|p| self.resolve(&p))
            .unwrap_or_else(|| self.icon_path.join("build"))
    }

    /// Resolves a path relative to the icon directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.icon_path.join(path)
        }
    }

    pub fn sizes(&self) -> Vec<IconSize> {
        if self.sizes.is_empty() {
            vec![DEFAULT_SIZE]
        } else {
            self.sizes.clone()
        }
    }

    pub fn resolutions(&self) -> Vec<f64> {
        if self.resolutions.is_empty() {
            DEFAULT_RESOLUTIONS.to_vec()
        } else {
            self.resolutions.clone()
        }
    }

    /// Whether the icon declares mirrored (right-to-left) variants.
    pub fn rtl_flip(&self) -> bool {
        self.metadata
            .get("rtlFlip")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn generate_types(&self) -> &[GenerateType] {
        self.generate.as_ref().map(|g| g.types.as_slice()).unwrap_or(&[])
    }

    /// Structural checks the configuration schema requires.
    pub fn validate(&self) -> Result<()> {
        if self.icon_path.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig("iconPath must not be empty".into()));
        }
        if self.variants.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "{}: at least one variant is required",
                self.icon_path.display()
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for variant in &self.variants {
            if variant.path.as_os_str().is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "{}: variant path must not be empty",
                    self.icon_path.display()
                )));
            }
            if !seen.insert(variant.resolved_name()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{}: duplicate variant `{}`",
                    self.icon_path.display(),
                    variant.resolved_name()
                )));
            }
        }
        Ok(())
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_generate(mut self, types: Vec<GenerateType>) -> Self {
        self.generate = Some(GenerateConfig {
            output_path: None,
            types,
        });
        self
    }
}

// ============================================================================
// IconSet
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum IconSetInput {
    One(IconConfig),
    Many(Vec<IconConfig>),
    Keyed(BTreeMap<String, IconConfig>),
}

/// The full collection of icon configurations keyed by icon path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IconSet {
    icons: BTreeMap<PathBuf, IconConfig>,
}

impl IconSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set, rejecting invalid configurations and duplicate paths.
    pub fn from_configs(configs: impl IntoIterator<Item = IconConfig>) -> Result<Self> {
        let mut set = Self::new();
        for config in configs {
            set.insert(config)?;
        }
        Ok(set)
    }

    /// Parses a single icon object, an array of icons, or a map keyed by
    /// icon path.
    pub fn from_json(json: &str) -> Result<Self> {
        let input: IconSetInput = serde_json::from_str(json)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        match input {
            IconSetInput::One(config) => Self::from_configs([config]),
            IconSetInput::Many(configs) => Self::from_configs(configs),
            IconSetInput::Keyed(map) => Self::from_configs(map.into_values()),
        }
    }

    /// Reads and parses a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_json(&json)
    }

    pub fn insert(&mut self, config: IconConfig) -> Result<()> {
        config.validate()?;
        if self.icons.contains_key(&config.icon_path) {
            return Err(PipelineError::InvalidConfig(format!(
                "duplicate icon path {}",
                config.icon_path.display()
            )));
        }
        self.icons.insert(config.icon_path.clone(), config);
        Ok(())
    }

    pub fn get(&self, icon_path: &Path) -> Option<&IconConfig> {
        self.icons.get(icon_path)
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IconConfig> {
        self.icons.values()
    }
}

// ============================================================================
// Pipeline options
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Options for the generation phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOptions {
    /// Number of concurrent icon jobs.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Consult the previous manifest before running plugin chains.
    #[serde(default = "default_true")]
    pub skip_cache: bool,

    /// Require matching content signatures for a cache hit.
    #[serde(default = "default_true")]
    pub hashing: bool,

    /// Treat any per-icon failure as a failed run.
    #[serde(default)]
    pub fail_on_icon_error: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            skip_cache: true,
            hashing: true,
            fail_on_icon_error: false,
        }
    }
}

fn default_sessions() -> usize {
    2
}

/// Options for the renderer pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererConfig {
    /// Number of long-lived rendering sessions.
    #[serde(default = "default_sessions")]
    pub sessions: usize,

    /// How long a caller waits for a free session before failing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire_timeout_ms: Option<u64>,

    /// Load the system font database when starting a session.
    #[serde(default = "default_true")]
    pub load_system_fonts: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            sessions: default_sessions(),
            acquire_timeout_ms: None,
            load_system_fonts: true,
        }
    }
}

/// Options for the distribution phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeOptions {
    /// Group sprite symbols under one container per category.
    #[serde(default = "default_true")]
    pub group_by_category: bool,

    /// Keep the `-mixed` suffix on component template names.
    #[serde(default)]
    pub keep_mixed_suffix: bool,
}

impl Default for DistributeOptions {
    fn default() -> Self {
        Self {
            group_by_category: true,
            keep_mixed_suffix: false,
        }
    }
}

/// All pipeline options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOptions {
    #[serde(default)]
    pub generate: GenerateOptions,

    #[serde(default)]
    pub renderer: RendererConfig,

    #[serde(default)]
    pub distribute: DistributeOptions,
}

impl PipelineOptions {
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// JSON schema of the icon configuration file.
#[cfg(feature = "jsonschema")]
pub fn config_schema_json() -> std::result::Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(IconConfig);
    serde_json::to_string_pretty(&schema)
}

// ============================================================================
// Tests
// ============================================================================
