//! Error types for the generation and distribution pipeline.
//!
//! Every failure that can happen inside an icon job is expressed as a
//! [`PipelineError`]. The dispatcher catches these at the job boundary and
//! records them against the icon, so none of them abort sibling jobs.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::plugin::PluginError;
use crate::renderer::RenderError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Coarse classification of a [`PipelineError`], used in run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PrerequisiteMissing,
    PluginFailure,
    RenderFailure,
    IoFailure,
    Config,
    Internal,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The build output an icon needs before generation is absent.
    #[error("{icon}: build output {} is missing, run the build step first", .path.display())]
    PrerequisiteMissing { icon: String, path: PathBuf },

    /// A transform plugin failed or produced unusable output.
    #[error("plugin `{plugin}` failed on variant `{variant}`: {source}")]
    PluginFailure {
        plugin: String,
        variant: String,
        #[source]
        source: PluginError,
    },

    /// The renderer could not rasterize an asset.
    #[error("rendering `{asset}` failed: {source}")]
    RenderFailure {
        asset: String,
        #[source]
        source: RenderError,
    },

    /// Reading, copying or writing a file failed.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A plugin name in the configuration has no registered implementation.
    #[error("unknown plugin `{name}`")]
    UnknownPlugin { name: String },

    /// A manifest or catalog file could not be parsed or serialized.
    #[error("invalid JSON in {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The distribution output root cannot be created or written.
    #[error("cannot write to output root {}: {source}", .path.display())]
    OutputRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("job for {icon} panicked: {message}")]
    JobPanicked { icon: String, message: String },
}

impl PipelineError {
    /// Wraps an I/O error with the path it happened at.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PrerequisiteMissing { .. } => ErrorKind::PrerequisiteMissing,
            Self::PluginFailure { .. } | Self::UnknownPlugin { .. } => ErrorKind::PluginFailure,
            Self::RenderFailure { .. } => ErrorKind::RenderFailure,
            Self::Io { .. } | Self::OutputRoot { .. } => ErrorKind::IoFailure,
            Self::Manifest { .. } | Self::InvalidConfig(_) => ErrorKind::Config,
            Self::JobPanicked { .. } => ErrorKind::Internal,
        }
    }

    /// Maps a plugin error onto the pipeline error kinds.
    ///
    /// Renderer failures keep their own kind and are tied to the asset being
    /// processed rather than to the plugin.
    pub(crate) fn from_plugin(
        plugin: &str,
        variant: &str,
        asset: &str,
        source: PluginError,
    ) -> Self {
        match source {
            PluginError::Render(source) => Self::RenderFailure {
                asset: asset.to_string(),
                source,
            },
            source => Self::PluginFailure {
                plugin: plugin.to_string(),
                variant: variant.to_string(),
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_errors_keep_their_kind() {
        let err = PipelineError::from_plugin(
            "svg-to-raster",
            "filled",
            "filled-24x24@2",
            PluginError::Render(RenderError::EmptyMarkup),
        );
        assert_eq!(err.kind(), ErrorKind::RenderFailure);
        assert!(err.to_string().contains("filled-24x24@2"));
    }

    #[test]
    fn plugin_errors_name_plugin_and_variant() {
        let err = PipelineError::from_plugin(
            "svg-generate",
            "outline",
            "outline",
            PluginError::InvalidOutput("empty document".into()),
        );
        assert_eq!(err.kind(), ErrorKind::PluginFailure);
        let message = err.to_string();
        assert!(message.contains("svg-generate"));
        assert!(message.contains("outline"));
    }
}
