//! ApiMerge - fan-out HTTP aggregator
//!
//! Asks every registered source in parallel and merges whatever answers
//! arrive into one composite of tags and score. Sources are managed from
//! the command line and stored in a JSON file.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Invalid arguments or a failed registry/config operation

mod aggregate;
mod cli;
mod config;
mod error;
mod fetch;
mod mapper;
mod models;
mod registry;
mod server;

use aggregate::Aggregator;
use anyhow::{Context, Result};
use cli::{Args, Command};
use config::Config;
use fetch::Fetcher;
use models::{FetchOutcome, RequestContext};
use registry::SourceRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    init_logging(&args);

    debug!("ApiMerge v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle init-config: generate a default .apimerge.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  .apimerge.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .apimerge.toml")?;

    println!("✅ Created .apimerge.toml with default settings.");
    println!("   Edit it to set the store path, timeouts and bind address.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    let registry = Arc::new(SourceRegistry::load_or_empty(&config.general.store));

    match args.command {
        Command::Add { name, url } => {
            let stored = registry
                .add_source(&name, &url)
                .with_context(|| format!("Failed to add source '{}'", name.trim()))?;
            let source = registry.get(&stored)?;
            println!("✅ Added source '{}' with URL '{}'", stored, source.url);
        }
        Command::List => {
            let mut names = registry.list();
            names.sort();
            if names.is_empty() {
                println!("No sources configured");
            }
            for name in names {
                let source = registry.get(&name)?;
                println!("{:<24} {}", name, source.url);
            }
        }
        Command::Show { name } => {
            let source = registry.get(&name)?;
            println!("{}", serde_json::to_string_pretty(&source)?);
        }
        Command::Remove { name } => {
            registry
                .delete(&name)
                .with_context(|| format!("Failed to remove source '{}'", name))?;
            println!("🗑️  Deleted: {}", name);
        }
        Command::Remap { name, pairs } => {
            let remap: BTreeMap<String, String> = pairs.into_iter().collect();
            let cleared = remap.is_empty();
            registry
                .set_remap(&name, remap)
                .with_context(|| format!("Failed to update source '{}'", name))?;
            if cleared {
                println!("✅ Cleared remapping of '{}'", name);
            } else {
                println!("✅ Updated remapping of '{}'", name);
            }
        }
        Command::Query { params, caller } => {
            let aggregator = build_aggregator(registry, &config)?;
            let ctx = RequestContext::new(params.into_iter().collect(), caller);
            let report = aggregator.run(&ctx).await;

            for outcome in &report.outcomes {
                match outcome {
                    FetchOutcome::Success {
                        source, elapsed, ..
                    } => eprintln!("   ✅ {:<24} {}ms", source, elapsed.as_millis()),
                    FetchOutcome::Failure { source, cause } => {
                        eprintln!("   ❌ {:<24} {}", source, cause)
                    }
                }
            }
            eprintln!(
                "   {} succeeded, {} failed in {}ms\n",
                report.successes().count(),
                report.failures().count(),
                report.elapsed.as_millis()
            );
            println!("{}", serde_json::to_string_pretty(&report.composite)?);
        }
        Command::Serve { .. } => {
            let aggregator = build_aggregator(registry, &config)?;
            server::serve(server::AppState::new(aggregator), &config.server.bind).await?;
        }
        Command::InitConfig => handle_init_config()?,
    }

    Ok(())
}

fn build_aggregator(registry: Arc<SourceRegistry>, config: &Config) -> Result<Aggregator> {
    let fetcher = Fetcher::new(&config.fetch.caller_header)?;
    info!(
        "Aggregating {} sources (timeout {}s)",
        registry.len(),
        config.fetch.timeout_seconds
    );

    Ok(Aggregator::new(registry, fetcher)
        .with_timeout(config.fetch.timeout())
        .with_max_in_flight(config.fetch.max_in_flight))
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            debug!("Loaded default config from .apimerge.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
