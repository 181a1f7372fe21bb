use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use iconsmith::{
    CancellationToken, DistributeKind, DistributionFormatter, GeneratedSet, IconSet, JobDispatcher,
    PipelineError, PipelineOptions, PluginRegistry, RendererPool, Result,
};

#[derive(Debug, Parser)]
#[command(name = "iconsmith")]
#[command(about = "Generate icon assets and package them for distribution")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every icon's generation rules and write its manifest.
    Generate(GenerateArgs),
    /// Package already generated icons into platform bundles.
    Distribute(DistributeArgs),
    /// Generate, then distribute the icons that succeeded.
    Run {
        #[command(flatten)]
        generate: GenerateArgs,
        #[command(flatten)]
        distribute: BundleArgs,
    },
    /// Print the JSON schema of the icon configuration.
    #[cfg(feature = "jsonschema")]
    Schema,
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// Icon configuration: one icon, an array, or a map keyed by icon path.
    #[arg(long, short)]
    config: PathBuf,

    /// Pipeline options file (JSON).
    #[arg(long)]
    options: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Number of concurrent icon jobs.
    #[arg(long)]
    workers: Option<usize>,

    /// Regenerate everything, ignoring previous manifests.
    #[arg(long)]
    no_cache: bool,

    /// Exit with an error if any icon fails.
    #[arg(long)]
    fail_on_icon_error: bool,
}

#[derive(Debug, Args)]
struct BundleArgs {
    /// Output root for the bundles.
    #[arg(long, short)]
    out: PathBuf,

    /// Bundle kinds to write.
    #[arg(long = "kind", short, value_enum, required = true)]
    kinds: Vec<DistributeKind>,
}

#[derive(Debug, Args)]
struct DistributeArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    bundle: BundleArgs,
}

fn load_options(common: &CommonArgs) -> Result<PipelineOptions> {
    match &common.options {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
            PipelineOptions::from_json(&json).map_err(|source| PipelineError::Manifest {
                path: path.clone(),
                source,
            })
        }
        None => Ok(PipelineOptions::default()),
    }
}

fn generate(args: &GenerateArgs, span: &tracing::Span) -> Result<GeneratedSet> {
    let mut options = load_options(&args.common)?;
    if let Some(workers) = args.workers {
        options.generate.workers = workers;
    }
    if args.no_cache {
        options.generate.skip_cache = false;
    }
    options.generate.fail_on_icon_error |= args.fail_on_icon_error;

    let set = IconSet::load(&args.common.config)?;
    let renderer = Arc::new(RendererPool::new(options.renderer.clone()));
    let registry = PluginRegistry::with_defaults(Arc::clone(&renderer));
    registry.validate(&set)?;

    let dispatcher = JobDispatcher::new(Arc::new(registry), options.generate.clone(), span.clone())?;
    let report = dispatcher.run(&set, &CancellationToken::new());
    for (path, err) in report.failures() {
        tracing::error!(icon = %path.display(), "{err}");
    }
    let stats = renderer.stats();
    tracing::info!(
        renders = stats.acquisitions,
        peak_sessions = stats.peak_in_flight,
        "renderer usage"
    );
    report.into_result(options.generate.fail_on_icon_error)
}

fn distribute(set: &GeneratedSet, options: &PipelineOptions, args: &BundleArgs, span: &tracing::Span) -> Result<bool> {
    let formatter = DistributionFormatter::new(options.distribute.clone(), span.clone());
    let report = formatter.distribute(set, &args.out, &args.kinds)?;
    for failure in &report.failures {
        tracing::error!(kind = %failure.kind, path = %failure.path.display(), "{}", failure.error);
    }
    tracing::info!(written = report.written.len(), unchanged = report.unchanged, "distribution done");
    Ok(report.is_success())
}

fn run(cli: Cli) -> Result<bool> {
    let span = tracing::info_span!("iconsmith");
    match cli.command {
        Command::Generate(args) => generate(&args, &span).map(|_| true),
        Command::Distribute(args) => {
            let options = load_options(&args.common)?;
            let set = IconSet::load(&args.common.config)?;
            let generated = GeneratedSet::load(&set)?;
            distribute(&generated, &options, &args.bundle, &span)
        }
        Command::Run { generate: args, distribute: bundle } => {
            let options = load_options(&args.common)?;
            let generated = generate(&args, &span)?;
            distribute(&generated, &options, &bundle, &span)
        }
        #[cfg(feature = "jsonschema")]
        Command::Schema => {
            let schema = iconsmith::config_schema_json().map_err(|source| PipelineError::Manifest {
                path: PathBuf::from("<schema>"),
                source,
            })?;
            println!("{schema}");
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
