//! iconsmith: icon asset generation and distribution
//!
//! This crate turns declarative icon descriptions into generated assets
//! (optimized svg, png at every size and resolution, webp) and repackages
//! them into platform bundles such as iOS asset catalogs, Android density
//! buckets, svg sprites and component templates.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use iconsmith::{
//!     CancellationToken, DistributeKind, DistributionFormatter, IconSet, JobDispatcher,
//!     PipelineOptions, PluginRegistry, RendererPool,
//! };
//!
//! let options = PipelineOptions::default();
//! let set = IconSet::load("icons.json")?;
//!
//! let renderer = Arc::new(RendererPool::new(options.renderer.clone()));
//! let registry = PluginRegistry::with_defaults(renderer);
//! registry.validate(&set)?;
//!
//! let span = tracing::info_span!("iconsmith");
//! let dispatcher = JobDispatcher::new(Arc::new(registry), options.generate.clone(), span.clone())?;
//! let generated = dispatcher
//!     .run(&set, &CancellationToken::new())
//!     .into_result(options.generate.fail_on_icon_error)?;
//!
//! let formatter = DistributionFormatter::new(options.distribute.clone(), span);
//! let report = formatter.distribute(&generated, "dist", &[DistributeKind::ImageSet, DistributeKind::Svg])?;
//! println!("{} files written", report.written.len());
//! # Ok::<(), iconsmith::PipelineError>(())
//! ```
//!
//! # Generation
//!
//! Each icon is one job on the [`JobDispatcher`]'s worker pool. A job runs
//! the plugin chain of every requested type over every variant, reusing
//! assets recorded in the previous `iconrc.json` when their signatures still
//! match, and writes a fresh manifest when it is done.
//!
//! # Distribution
//!
//! [`DistributionFormatter`] reads the generated set (from a [`RunReport`] or
//! from manifests via [`GeneratedSet::load`]) and writes one bundle per
//! requested [`DistributeKind`].

mod cache;
mod config;
mod dispatch;
mod error;
mod icon;
mod manifest;
mod renderer;
mod svg;

pub mod distribute;
pub mod plugin;

pub use cache::SkipCache;
pub use config::{
    BuildConfig, ColorScheme, DistributeConfig, DistributeOptions, GenerateConfig, GenerateKind,
    GenerateOptions, GenerateType, HbsConfig, IconConfig, IconSet, IconSize, PipelineOptions,
    PluginConfig, RendererConfig, SvgDistributeConfig, VariantConfig, WebpDistributeConfig,
};
#[cfg(feature = "jsonschema")]
pub use config::config_schema_json;
pub use dispatch::{
    CancellationToken, GeneratedSet, IconOutcome, IconReport, JobDispatcher, JobStats, RunReport,
};
pub use distribute::{
    DistributeKind, DistributionFailure, DistributionFormatter, DistributionReport, Resolution,
};
pub use error::{ErrorKind, PipelineError, Result};
pub use icon::{Asset, Icon, Variant};
pub use manifest::{AssetRecord, FlavorRecord, GeneratedManifest, MANIFEST_FILE};
pub use plugin::{Plugin, PluginError, PluginInput, PluginRegistry};
pub use renderer::{PoolStats, RenderError, RenderFlags, RendererPool};
pub use svg::MarkupError;
