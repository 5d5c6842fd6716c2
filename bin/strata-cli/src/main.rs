//! Strata CLI - operator tooling for the placement core
//!
//! Validates configuration, previews placement decisions against a cluster
//! topology, and runs in-memory end-to-end simulations.

mod config;
mod simulate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::CliConfig;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use strata_common::{ObjectType, StorageClass};
use strata_placement::{ClusterRegistry, PlacementRequest, PlacementSelector};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Strata placement core admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "STRATA_CONFIG", default_value = "/etc/strata/strata.toml")]
    config: PathBuf,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file and print the effective settings
    CheckConfig,
    /// Run placements against the configured clusters and print the spread
    Place {
        /// Storage class (STANDARD, STANDARD_IA, GLACIER)
        #[arg(long, default_value = "STANDARD")]
        class: StorageClass,

        /// Object type (normal, appendable)
        #[arg(long, default_value = "normal")]
        object_type: ObjectType,

        /// Object size in bytes
        #[arg(long, default_value = "4096")]
        size: u64,

        /// Number of placements to run
        #[arg(long, default_value = "10000")]
        count: u64,
    },
    /// Write, read, overwrite and recycle objects on in-memory backends
    Simulate {
        /// Objects to write
        #[arg(long, default_value = "1000")]
        objects: usize,

        /// Payload size in bytes
        #[arg(long, default_value = "4096")]
        size: usize,

        /// Full reads per object
        #[arg(long, default_value = "3")]
        reads: usize,

        /// Delete calls each backend fails before succeeding
        #[arg(long, default_value = "0")]
        failing_deletes: u32,
    },
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = CliConfig::load(&args.config)?;
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.core.logging.level.clone());
    init_tracing(&log_level, &config.core.logging.format);
    info!(config = %args.config.display(), "configuration loaded");

    match args.command {
        Commands::CheckConfig => check_config(&config, args.json)?,
        Commands::Place {
            class,
            object_type,
            size,
            count,
        } => {
            let request = PlacementRequest::new("cli", "preview", size)
                .with_storage_class(class)
                .with_object_type(object_type);
            place(&config, &request, count, args.json)?;
        }
        Commands::Simulate {
            objects,
            size,
            reads,
            failing_deletes,
        } => {
            let clusters = if config.clusters.is_empty() {
                warn!("no [[clusters]] configured, using the demo topology");
                simulate::demo_clusters()
            } else {
                config.clusters.clone()
            };
            let scenario = simulate::Scenario {
                objects,
                object_size: size,
                reads_per_object: reads,
                failing_deletes,
            };
            let report = simulate::run(&config.core, clusters, &scenario).await?;
            print_report(&report, args.json)?;
        }
    }

    Ok(())
}

fn check_config(config: &CliConfig, as_json: bool) -> Result<()> {
    let registry = ClusterRegistry::with_clusters(config.clusters.clone())?;
    let snapshot = registry.snapshot();

    if as_json {
        let output = json!({
            "config": &config.core,
            "clusters": &config.clusters,
            "live_clusters": snapshot.live_clusters().count(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Configuration OK");
    println!("================");
    println!("{}", toml::to_string_pretty(&config.core)?);
    println!("Clusters");
    println!("========");
    if snapshot.is_empty() {
        println!("(none)");
    }
    for cluster in snapshot.clusters() {
        let classes: Vec<&str> = cluster.storage_classes().map(|c| c.as_str()).collect();
        println!(
            "{:<16} weight={:<4} status={:?} classes={} pools={}",
            cluster.id().as_str(),
            cluster.weight(),
            cluster.status(),
            classes.join(","),
            cluster.pools().len()
        );
    }
    Ok(())
}

fn place(config: &CliConfig, request: &PlacementRequest, count: u64, as_json: bool) -> Result<()> {
    let registry = Arc::new(ClusterRegistry::with_clusters(config.clusters.clone())?);
    let selector = PlacementSelector::new(registry, config.core.placement.small_object_threshold);

    let mut spread: BTreeMap<String, u64> = BTreeMap::new();
    for _ in 0..count {
        let placement = selector.place(request)?;
        *spread
            .entry(format!("{}/{}", placement.cluster, placement.pool))
            .or_default() += 1;
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({ "placements": spread }))?);
        return Ok(());
    }

    println!(
        "Placements: {count} x {} {} object(s) of {} bytes",
        request.storage_class, request.object_type, request.size
    );
    println!("==========");
    for (target, hits) in &spread {
        #[allow(clippy::cast_precision_loss)]
        let share = *hits as f64 / count as f64 * 100.0;
        println!("{target:<32} {hits:>10} {share:>6.2}%");
    }
    Ok(())
}

fn print_report(report: &simulate::Report, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Simulation");
    println!("==========");
    println!("Writes:           {}", report.writes);
    println!("Overwrites:       {}", report.overwrites);
    println!("Reads:            {}", report.reads);
    println!(
        "Cache:            {} hits / {} misses ({:.1}% hit ratio, {} bytes held)",
        report.cache_hits,
        report.cache_misses,
        report.cache_hit_ratio * 100.0,
        report.cache_bytes
    );
    println!(
        "Recycled:         {} ({} failed attempts)",
        report.reclaimed, report.failed_attempts
    );
    println!("Dead letters:     {}", report.dead_letters.len());
    for letter in &report.dead_letters {
        println!("  {} after {} attempts: {}", letter.location, letter.attempts, letter.last_error);
    }
    println!("Placements by cluster:");
    for (cluster, count) in &report.placements {
        println!("  {cluster:<16} {count}");
    }
    println!("Objects left on backends:");
    for (cluster, count) in &report.stored_objects {
        println!("  {cluster:<16} {count}");
    }
    Ok(())
}
