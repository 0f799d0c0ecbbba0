//! refgate - run a media tool without handing it real paths
//!
//! Files are addressed through `{{id}}` references. Source files are scanned
//! from the source directory at startup; output files are allocated on demand.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use refgate_core::{Gateway, GatewayConfig, ReferenceKind, ReferenceRegistry, SystemExecutor};

mod server;

/// Modules that can be traced individually
#[derive(Debug, Clone, ValueEnum)]
enum TraceModule {
    Registry,
    Substitution,
    Gateway,
    Executor,
    All,
}

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "refgate",
    about = "Path-free gateway to command-line media tools",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// YAML configuration file
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON
    #[clap(long, global = true)]
    json_logs: bool,

    /// Enable tracing for specific modules (comma-separated: registry,substitution,gateway,executor,all)
    #[clap(long, value_delimiter = ',', global = true)]
    trace: Vec<TraceModule>,

    /// Override the source directory
    #[clap(long, global = true)]
    source_dir: Option<PathBuf>,

    /// Override the output directory
    #[clap(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Override the tool binary
    #[clap(long, global = true)]
    tool_path: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Command {
    /// List every registered reference id
    List {
        /// Output as JSON
        #[clap(long)]
        json: bool,
    },

    /// Allocate an output file and print its placeholder
    AddTarget {
        /// Reference id for the new file
        name: String,

        /// File extension (default from configuration)
        #[clap(long)]
        extension: Option<String>,
    },

    /// Run a command template such as `-i {{<id>}} -vf scale=640:360 {{out}}`
    Run {
        template: String,

        /// Allocate a target before running: `name` or `name=extension` (repeatable)
        #[clap(long = "target")]
        targets: Vec<String>,
    },

    /// Show the tool's information output for a reference
    Describe {
        id: String,
    },

    /// Serve tool calls as JSON-RPC over stdin/stdout
    Serve,
}

/// Initialize tracing with CLI flags
///
/// Logs always go to stderr; stdout is reserved for command output and the
/// JSON-RPC stream.
fn initialize_tracing(log_level: &LogLevel, json: bool, trace_modules: &[TraceModule]) {
    let mut filter = EnvFilter::new(log_level.to_filter_directive());

    for module in trace_modules {
        let directive = match module {
            TraceModule::Registry => "refgate_core::registry=trace",
            TraceModule::Substitution => "refgate_core::substitution=trace",
            TraceModule::Gateway => "refgate_core::gateway=trace",
            TraceModule::Executor => "refgate_core::executor=trace",
            TraceModule::All => "refgate_core=trace",
        };
        if let Ok(parsed) = directive.parse() {
            filter = filter.add_directive(parsed);
        }
    }

    if json || !trace_modules.is_empty() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();

        if !trace_modules.is_empty() {
            tracing::info!(trace_modules = ?trace_modules, "Module tracing enabled");
        }
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Defaults, then file, then environment, then flags
fn resolve_config(cli: &Cli) -> Result<GatewayConfig> {
    let mut config = GatewayConfig::load(cli.config.as_deref())?;
    if let Some(path) = &cli.source_dir {
        config.source_dir = path.clone();
    }
    if let Some(path) = &cli.output_dir {
        config.output_dir = path.clone();
    }
    if let Some(path) = &cli.tool_path {
        config.tool_path = path.clone();
    }
    config.validate().context("Invalid configuration")?;
    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Create both roots, scan sources and wire up the executor
fn build_gateway(config: &GatewayConfig) -> Result<Gateway> {
    for dir in [&config.source_dir, &config.output_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let registry = ReferenceRegistry::open(&config.source_dir, &config.output_dir)
        .context("Failed to build reference registry")?
        .with_default_extension(&config.default_extension)?;
    info!(
        "Registered {} source references from {}",
        registry.len(),
        config.source_dir.display()
    );

    let executor = SystemExecutor::new(&config.tool_path, config.timeout());
    Ok(Gateway::new(Arc::new(registry), Arc::new(executor)))
}

#[derive(Serialize)]
struct ReferenceRow {
    id: String,
    kind: &'static str,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.json_logs, &cli.trace);

    let config = resolve_config(&cli)?;
    let gateway = build_gateway(&config)?;

    match cli.command {
        Command::List { json } => list_command(&gateway, json),
        Command::AddTarget { name, extension } => {
            add_target_command(&gateway, &name, extension.as_deref())
        }
        Command::Run { template, targets } => run_command(&gateway, &template, &targets).await,
        Command::Describe { id } => describe_command(&gateway, &id).await,
        Command::Serve => server::serve(gateway).await,
    }
}

fn list_command(gateway: &Gateway, json: bool) -> Result<()> {
    let mut references = gateway.registry().snapshot();
    references.sort_by(|a, b| a.id().cmp(b.id()));

    if json {
        let rows: Vec<ReferenceRow> = references
            .iter()
            .map(|reference| ReferenceRow {
                id: reference.id().to_string(),
                kind: match reference.kind() {
                    ReferenceKind::Source => "source",
                    ReferenceKind::Target => "target",
                },
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if references.is_empty() {
        println!("No registered references");
    }
    for reference in references {
        println!("{}", reference.placeholder());
    }
    Ok(())
}

fn add_target_command(gateway: &Gateway, name: &str, extension: Option<&str>) -> Result<()> {
    match gateway.add_target(name, extension) {
        Ok(reference) => {
            println!("{}", reference.placeholder());
            Ok(())
        }
        Err(e) => anyhow::bail!(gateway.sanitize_error(&e)),
    }
}

async fn run_command(gateway: &Gateway, template: &str, targets: &[String]) -> Result<()> {
    // the registry lives only as long as this process, so targets are declared up front
    for target in targets {
        let (name, extension) = match target.split_once('=') {
            Some((name, extension)) => (name, Some(extension)),
            None => (target.as_str(), None),
        };
        if let Err(e) = gateway.add_target(name, extension) {
            anyhow::bail!(gateway.sanitize_error(&e));
        }
    }

    match gateway.run_command(template).await {
        Ok(text) => {
            print!("{text}");
            Ok(())
        }
        Err(e) => anyhow::bail!(gateway.sanitize_error(&e)),
    }
}

async fn describe_command(gateway: &Gateway, id: &str) -> Result<()> {
    match gateway.describe_reference(id).await {
        Ok(text) => {
            print!("{text}");
            Ok(())
        }
        Err(e) => anyhow::bail!(gateway.sanitize_error(&e)),
    }
}
