//! Concurrent generation of an icon set.
//!
//! The [`JobDispatcher`] runs one job per icon on a fixed-size rayon pool.
//! Each job owns a rehydrated copy of its icon, so jobs share nothing but the
//! plugin registry (and through it the renderer pool). A job's error or
//! panic is caught at the job boundary and recorded in the [`RunReport`]
//! without affecting its siblings.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::Span;

use crate::cache::SkipCache;
use crate::config::{GenerateOptions, IconConfig, IconSet};
use crate::error::{ErrorKind, PipelineError, Result};
use crate::icon::Icon;
use crate::manifest::GeneratedManifest;
use crate::plugin::{PluginExecutor, PluginRegistry};

// ============================================================================
// Cancellation
// ============================================================================

/// Run-level cancellation flag shared between the caller and the dispatcher.
///
/// Cancelling stops jobs that have not started yet; running jobs finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug)]
pub enum IconOutcome {
    Generated(Icon),
    Failed(PipelineError),
    Cancelled,
}

/// Per-icon counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Assets produced by running plugin chains.
    pub generated: usize,
    /// Assets taken over from the previous manifest.
    pub reused: usize,
}

#[derive(Debug)]
pub struct IconReport {
    pub icon_path: PathBuf,
    pub outcome: IconOutcome,
    pub stats: JobStats,
}

/// Outcome of a generation run, one entry per icon in icon path order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub icons: Vec<IconReport>,
}

impl RunReport {
    pub fn generated(&self) -> impl Iterator<Item = &Icon> {
        self.icons.iter().filter_map(|r| match &r.outcome {
            IconOutcome::Generated(icon) => Some(icon),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &PipelineError)> {
        self.icons.iter().filter_map(|r| match &r.outcome {
            IconOutcome::Failed(err) => Some((r.icon_path.as_path(), err)),
            _ => None,
        })
    }

    pub fn cancelled(&self) -> usize {
        self.icons
            .iter()
            .filter(|r| matches!(r.outcome, IconOutcome::Cancelled))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Failure counts by kind, for the run summary.
    pub fn failure_kinds(&self) -> HashMap<ErrorKind, usize> {
        let mut kinds = HashMap::new();
        for (_, err) in self.failures() {
            *kinds.entry(err.kind()).or_insert(0) += 1;
        }
        kinds
    }

    /// Totals over all icons.
    pub fn stats(&self) -> JobStats {
        self.icons.iter().fold(JobStats::default(), |acc, r| JobStats {
            generated: acc.generated + r.stats.generated,
            reused: acc.reused + r.stats.reused,
        })
    }

    /// Converts the report into the generated icons. With
    /// `fail_on_icon_error`, the first failure becomes the run's error.
    pub fn into_result(self, fail_on_icon_error: bool) -> Result<GeneratedSet> {
        let mut set = GeneratedSet::default();
        for report in self.icons {
            match report.outcome {
                IconOutcome::Generated(icon) => set.insert(icon),
                IconOutcome::Failed(err) if fail_on_icon_error => return Err(err),
                IconOutcome::Failed(_) | IconOutcome::Cancelled => {}
            }
        }
        Ok(set)
    }
}

// ============================================================================
// GeneratedSet
// ============================================================================

/// Generated icons keyed by icon path; the input of distribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedSet {
    icons: BTreeMap<PathBuf, Icon>,
}

impl GeneratedSet {
    pub fn insert(&mut self, icon: Icon) {
        self.icons.insert(icon.icon_path().to_path_buf(), icon);
    }

    /// Rebuilds the set from the manifests on disk. Icons without a manifest
    /// are skipped.
    pub fn load(set: &IconSet) -> Result<Self> {
        let mut generated = Self::default();
        for config in set.iter() {
            match GeneratedManifest::read(config)? {
                Some(manifest) => generated.insert(manifest.into_icon()),
                None => tracing::warn!(icon = %config.name(), "no manifest, icon not generated yet"),
            }
        }
        Ok(generated)
    }

    pub fn get(&self, icon_path: &Path) -> Option<&Icon> {
        self.icons.get(icon_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Icon> {
        self.icons.values()
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }
}

impl FromIterator<Icon> for GeneratedSet {
    fn from_iter<T: IntoIterator<Item = Icon>>(iter: T) -> Self {
        let mut set = Self::default();
        for icon in iter {
            set.insert(icon);
        }
        set
    }
}

// ============================================================================
// JobDispatcher
// ============================================================================

pub struct JobDispatcher {
    registry: Arc<PluginRegistry>,
    options: GenerateOptions,
    pool: rayon::ThreadPool,
    span: Span,
}

impl JobDispatcher {
    /// Creates a dispatcher with `options.workers` worker threads. Job spans
    /// are children of `span`.
    pub fn new(registry: Arc<PluginRegistry>, options: GenerateOptions, span: Span) -> Result<Self> {
        let workers = options.workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("iconsmith-worker-{i}"))
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("cannot start {workers} workers: {e}")))?;
        Ok(Self {
            registry,
            options,
            pool,
            span,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Generates every icon in the set.
    pub fn run(&self, set: &IconSet, token: &CancellationToken) -> RunReport {
        let configs: Vec<&IconConfig> = set.iter().collect();
        tracing::info!(parent: &self.span, icons = configs.len(), workers = self.workers(), "generation started");

        let icons: Vec<IconReport> = self
            .pool
            .install(|| configs.par_iter().map(|config| self.run_job(config, token)).collect());
        let report = RunReport { icons };

        let stats = report.stats();
        tracing::info!(
            parent: &self.span,
            generated = stats.generated,
            reused = stats.reused,
            failed = report.failures().count(),
            cancelled = report.cancelled(),
            "generation finished"
        );
        report
    }

    fn run_job(&self, config: &IconConfig, token: &CancellationToken) -> IconReport {
        let icon_path = config.icon_path.clone();
        if token.is_cancelled() {
            return IconReport {
                icon_path,
                outcome: IconOutcome::Cancelled,
                stats: JobStats::default(),
            };
        }

        let span = tracing::info_span!(parent: &self.span, "icon", path = %icon_path.display());
        let _entered = span.enter();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.generate(config)))
            .unwrap_or_else(|payload| {
                Err(PipelineError::JobPanicked {
                    icon: config.name(),
                    message: panic_message(payload.as_ref()),
                })
            });

        match result {
            Ok((icon, stats)) => {
                tracing::debug!(generated = stats.generated, reused = stats.reused, "icon done");
                IconReport {
                    icon_path,
                    outcome: IconOutcome::Generated(icon),
                    stats,
                }
            }
            Err(err) => {
                tracing::error!(error = %err, kind = ?err.kind(), "icon failed");
                IconReport {
                    icon_path,
                    outcome: IconOutcome::Failed(err),
                    stats: JobStats::default(),
                }
            }
        }
    }

    fn generate(&self, config: &IconConfig) -> Result<(Icon, JobStats)> {
        let build_dir = config.build_output_dir();
        if !build_dir.is_dir() {
            return Err(PipelineError::PrerequisiteMissing {
                icon: config.name(),
                path: build_dir,
            });
        }

        let mut icon = Icon::from_config(config);
        let executor = PluginExecutor::new(&self.registry, config.generate_output_dir());
        let targets = executor.targets(config)?;
        let cache = if self.options.skip_cache {
            SkipCache::load(config, self.options.hashing)
        } else {
            SkipCache::empty()
        };

        let mut stats = JobStats::default();
        for variant in icon.source_variants() {
            let source = std::fs::read(&variant.source_path)
                .map_err(|e| PipelineError::io(&variant.source_path, e))?;

            for target in &targets {
                let _span = tracing::debug_span!("type", variant = %variant.name, tag = %target.type_tag).entered();
                let signature = executor.signature(&source, target, config)?;

                let produced = match cache.lookup(&variant.name, &target.type_tag, &signature) {
                    Some(reused) => {
                        tracing::debug!(assets = reused.len(), "reusing cached assets");
                        stats.reused += reused.len();
                        reused
                    }
                    None => {
                        let produced = executor.execute(config, &variant, target, Some(&signature))?;
                        stats.generated += produced.len();
                        produced
                    }
                };
                for output in produced {
                    icon.register(&variant, &output.variant_name, &output.type_tag, output.asset);
                }
            }
        }

        GeneratedManifest::from_icon(&icon).write(GeneratedManifest::path_for(config))?;
        Ok((icon, stats))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
