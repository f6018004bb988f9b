//! reprs - representation cache inspector
//!
//! Lists device backends, prints the converter graph, resolves conversion
//! paths and runs a datum through every representation.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use reprs_backend::Backend;
use reprs_core::{DataFormat, Dimensions, ReprKind};
use reprs_engine::EngineConfig;

mod commands;

#[derive(Parser)]
#[command(name = "reprs")]
#[command(author, version, about = "Representation cache inspector")]
#[command(long_about = "
Keeps one datum in host memory, graphics, compute and interop form and
converts between them on demand. This tool exposes the converter graph and
runs the cache against a real or host-memory device.

Examples:
  reprs backends                         # Available devices
  reprs graph                            # Registered converters
  reprs path --from ram --to interop     # Cheapest conversion chain
  reprs path --from compute --from graphics --to ram
  reprs demo --dims 256x256 --format vec4f16 --holders 3 --resize 512x512
  reprs --config engine.yaml config      # Effective configuration
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Number of threads (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,

    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Device backend: auto, soft, wgpu
    #[arg(short, long, global = true, default_value = "auto")]
    backend: Backend,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List device backends and their capabilities
    Backends,

    /// Print the converter graph
    #[command(visible_alias = "g")]
    Graph(GraphArgs),

    /// Resolve the cheapest conversion path
    #[command(visible_alias = "p")]
    Path(PathArgs),

    /// Run a datum through every representation
    Demo(DemoArgs),

    /// Print the effective engine configuration
    Config,
}

/// Arguments for the `graph` command.
#[derive(Args)]
struct GraphArgs {
    /// Also print which kinds each kind can reach
    #[arg(short, long)]
    reach: bool,
}

/// Arguments for the `path` command.
#[derive(Args)]
struct PathArgs {
    /// Valid source kinds, in seeding order
    #[arg(short, long = "from", required = true)]
    from: Vec<ReprKind>,

    /// Target kind
    #[arg(short, long)]
    to: ReprKind,
}

/// Arguments for the `demo` command.
#[derive(Args)]
struct DemoArgs {
    /// Extent: N, WxH or XxYxZ
    #[arg(short, long, default_value = "64x64")]
    dims: Dimensions,

    /// Element format: u8, u16, u32, f16, f32, vec4u8, vec3f32, ...
    #[arg(short, long, default_value = "vec4u8")]
    format: DataFormat,

    /// Number of interop holders sharing one graphics object
    #[arg(long, default_value = "2")]
    holders: usize,

    /// Resize the shared object to this extent while it is held
    #[arg(long)]
    resize: Option<Dimensions>,
}

fn init_logging(
    verbose: bool,
    log: Option<&PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(path) = log else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(std::path::Path::new("."));
    let file = path.file_name().context("log path has no file name")?;
    let appender = tracing_appender::rolling::never(dir, file);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
    tracing_subscriber::registry().with(filter).with(stderr).with(file_layer).init();
    Ok(Some(guard))
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    Ok(config.apply_env())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log.as_ref())?;

    // Configure thread pool
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Backends => commands::backends::run(cli.verbose),
        Commands::Graph(args) => commands::graph::run(args, &config, cli.verbose),
        Commands::Path(args) => commands::path::run(args, &config, cli.verbose),
        Commands::Demo(args) => commands::demo::run(args, cli.backend, config, cli.verbose),
        Commands::Config => commands::print_config(&config),
    }
}
