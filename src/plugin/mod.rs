//! Transform plugins and the registry that resolves them by name.
//!
//! A generation rule is an ordered chain of
//! [`PluginConfig`](crate::config::PluginConfig)s. Each entry is
//! looked up in a [`PluginRegistry`] and applied to the output of the previous
//! one. Configured names are checked against the registry before any job
//! runs, so a typo fails the run up front instead of inside every worker.
//!
//! # Architecture
//!
//! Each plugin implements [`Plugin`], which defines:
//! - How it transforms one input buffer given its resolved parameters
//! - Which file extension its output carries
//! - How an iterant combination is reflected in the output name
//!
//! Fan-out over iterants, persistence and asset registration are handled by
//! [`executor::PluginExecutor`], not by the plugins themselves.

pub mod executor;
pub mod png_to_webp;
pub mod svg_generate;
pub mod svg_to_raster;

pub use executor::{GenerationTarget, PluginExecutor, Produced};
pub use png_to_webp::PngToWebp;
pub use svg_generate::{SvgGenerate, symbol_id};
pub use svg_to_raster::SvgToRaster;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{ColorScheme, IconConfig, IconSet};
use crate::error::{PipelineError, Result};
use crate::renderer::{RenderError, RendererPool};
use crate::svg::MarkupError;

/// Resolved parameters handed to a plugin: the configured `params` with the
/// current iterant values merged in.
pub type Params = Map<String, Value>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("malformed markup: {0}")]
    Markup(#[from] MarkupError),

    #[error("invalid svg: {0}")]
    InvalidSvg(#[from] resvg::usvg::Error),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("invalid output: {0}")]
    InvalidOutput(String),

    #[error("input is not UTF-8 text")]
    NotText,
}

impl PluginError {
    pub fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Plugin trait
// ============================================================================

/// One input to a plugin invocation.
#[derive(Debug, Clone, Copy)]
pub struct PluginInput<'a> {
    pub bytes: &'a [u8],
    /// Name the produced asset will carry.
    pub name: &'a str,
    /// Extension of `bytes` (`svg`, `png`, ...).
    pub extension: &'a str,
    pub icon: &'a IconConfig,
    pub color_scheme: ColorScheme,
}

impl<'a> PluginInput<'a> {
    /// Interprets the input as UTF-8 markup.
    pub fn text(&self) -> std::result::Result<&'a str, PluginError> {
        std::str::from_utf8(self.bytes).map_err(|_| PluginError::NotText)
    }
}

/// A named transform applied to one asset buffer.
///
/// Implementations hold no per-call state and are shared by every worker.
pub trait Plugin: Send + Sync {
    /// Name the plugin is registered under.
    fn name(&self) -> &str;

    /// Extension of the output given the extension of the input.
    fn output_extension(&self, input_extension: &str) -> String {
        input_extension.to_string()
    }

    /// Name of the output produced for one iterant combination.
    ///
    /// `iterant` holds only the fanned-out values; `params` holds everything.
    /// The default keeps the input name and appends each iterant value.
    fn output_name(&self, input_name: &str, iterant: &[(String, Value)], params: &Params) -> String {
        let _ = params;
        iterant.iter().fold(input_name.to_string(), |mut name, (_, value)| {
            name.push('-');
            match value {
                Value::String(s) => name.push_str(s),
                other => name.push_str(&other.to_string()),
            }
            name
        })
    }

    fn transform(&self, input: &PluginInput<'_>, params: &Params) -> std::result::Result<Vec<u8>, PluginError>;
}

// ============================================================================
// Default chains
// ============================================================================

pub const SVG_GENERATE: &str = "svg-generate";
pub const SVG_TO_RASTER: &str = "svg-to-raster";
pub const PNG_TO_WEBP: &str = "png-to-webp";

/// Iterant names resolved from the icon when `params` does not list values.
pub const SIZES: &str = "sizes";
pub const RESOLUTIONS: &str = "resolutions";

/// Type tag of custom element outputs.
pub const CUSTOM_ELEMENT: &str = "customElement";

/// Parameter that asks a plugin for a mirrored rendition.
pub const RTL_FLIP: &str = "rtlFlip";

// ============================================================================
// Registry
// ============================================================================

/// Plugins by name.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in plugins.
    pub fn with_defaults(renderer: Arc<RendererPool>) -> Self {
        let mut registry = Self::new();
        registry.register(SvgGenerate);
        registry.register(SvgToRaster::new(renderer));
        registry.register(PngToWebp);
        registry
    }

    /// Adds a plugin, returning the one it replaced.
    pub fn register(&mut self, plugin: impl Plugin + 'static) -> Option<Arc<dyn Plugin>> {
        self.plugins.insert(plugin.name().to_string(), Arc::new(plugin))
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        self.plugins
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownPlugin { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Checks that every plugin named by the set, including the defaults
    /// its rules fall back to, is registered.
    pub fn validate(&self, set: &IconSet) -> Result<()> {
        for icon in set.iter() {
            PluginExecutor::new(self, icon.generate_output_dir()).targets(icon)?;
        }
        Ok(())
    }
}
