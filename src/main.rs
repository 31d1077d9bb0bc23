// src/main.rs
// =============================================================================
// This is the entry point of the netcensus binary.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging
// 3. Build the store / probe engine handles the subcommand needs
// 4. Dispatch to the subcommand handler
// 5. Exit with proper code (0 = success, 2 = startup or configuration error)
//
// The store and HTTP client are created here and passed down explicitly;
// nothing in the library reaches for a global handle.
// =============================================================================

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use cli::{Cli, Commands, PoolArgs, ProbeArgs, StoreArgs};
use netcensus::{
    seeder, ElasticStore, HttpFetcher, ProbeEngine, Prober, ProberConfig, RecordStore, Seeder,
    SeederConfig, Snapshot,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = netcensus::logging::init(cli.log_format) {
        eprintln!("Error: failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Seed { root, store, pool } => handle_seed(&root, &store, &pool).await,
        Commands::Probe {
            interval,
            recheck_unavailable,
            unit_deadline_secs,
            store,
            probe,
            pool,
        } => {
            let config = ProberConfig {
                pool: pool.apply(ProberConfig::default().pool),
                recheck_unavailable,
                unit_deadline: Duration::from_secs(unit_deadline_secs),
            };
            handle_probe(interval, config, &store, &probe).await
        }
        Commands::Check {
            address,
            no_http,
            no_https,
            json,
            probe,
        } => handle_check(&address, !no_http, !no_https, json, &probe).await,
    }
}

async fn open_store(args: &StoreArgs) -> Result<Arc<dyn RecordStore>> {
    let store = ElasticStore::new(&args.to_config())
        .with_context(|| format!("invalid store endpoint {}", args.elastic_url))?;
    store
        .ensure_index()
        .await
        .with_context(|| format!("failed to prepare index {}", args.index))?;
    info!(url = %args.elastic_url, index = %args.index, "using Elasticsearch store");
    Ok(Arc::new(store))
}

fn build_engine(args: &ProbeArgs) -> Result<Arc<ProbeEngine>> {
    let config = args.to_config();
    let fetcher = HttpFetcher::new(&config).context("failed to build HTTP client")?;
    Ok(Arc::new(ProbeEngine::new(Arc::new(fetcher), config.timeout)))
}

// Handles the 'seed' subcommand
async fn handle_seed(root: &str, store: &StoreArgs, pool: &PoolArgs) -> Result<()> {
    // A bad root block is a configuration error: fail before touching the store
    let root = seeder::parse_root(root)?;
    let store = open_store(store).await?;

    let config = SeederConfig {
        pool: pool.apply(SeederConfig::default().pool),
    };
    let report = Seeder::new(store, config).run(root).await?;

    if report.failed_batches > 0 {
        warn!(
            failed_batches = report.failed_batches,
            "some subnets were not stored; rerun seed to fill them in"
        );
    }
    Ok(())
}

// Handles the 'probe' subcommand
async fn handle_probe(
    interval: Option<u64>,
    config: ProberConfig,
    store: &StoreArgs,
    probe: &ProbeArgs,
) -> Result<()> {
    let store = open_store(store).await?;
    let engine = build_engine(probe)?;
    let prober = Prober::new(store, engine, config);

    match interval {
        None => {
            prober.run_once().await;
        }
        Some(secs) => {
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

            // First Ctrl+C lets the current pass finish, second one quits
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("received Ctrl+C, stopping after the current pass");
                    let _ = shutdown_tx.send(true);

                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("force quit requested");
                        std::process::exit(1);
                    }
                }
            });

            prober
                .run_forever(Duration::from_secs(secs), shutdown_rx)
                .await;
        }
    }

    Ok(())
}

// Handles the 'check' subcommand
async fn handle_check(
    address: &str,
    http: bool,
    https: bool,
    json: bool,
    probe: &ProbeArgs,
) -> Result<()> {
    let address: Ipv4Addr = address
        .parse()
        .with_context(|| format!("'{}' is not an IPv4 address", address))?;
    if !netcensus::scope::is_global(address) {
        warn!(%address, "address is not globally routable");
    }

    let engine = build_engine(probe)?;
    let snapshot = engine.probe(address, http, https).await;

    print_snapshot(address, &snapshot, json)
}

// Prints a snapshot either as a table or JSON
fn print_snapshot(address: Ipv4Addr, snapshot: &Snapshot, json: bool) -> Result<()> {
    if json {
        let json_output = serde_json::to_string_pretty(snapshot)?;
        println!("{}", json_output);
        return Ok(());
    }

    println!("{:<10} {:<12} {:<8} {:<10}", "SCHEME", "AVAILABLE", "STATUS", "BYTES");
    println!("{}", "=".repeat(44));

    let rows = [
        ("http", snapshot.http_available, snapshot.http_status_code, &snapshot.http_content),
        ("https", snapshot.https_available, snapshot.https_status_code, &snapshot.https_content),
    ];
    for (scheme, available, status, content) in rows {
        match (available, status) {
            (Some(available), Some(status)) => println!(
                "{:<10} {:<12} {:<8} {:<10}",
                scheme,
                if available { "yes" } else { "no" },
                status,
                content.as_ref().map(|c| c.len()).unwrap_or(0)
            ),
            _ => println!("{:<10} {:<12}", scheme, "skipped"),
        }
    }

    println!();
    println!("Address:      {}", address);
    println!("Last checked: {}", snapshot.last_checked);
    match snapshot.last_online {
        Some(at) => println!("Last online:  {}", at),
        None => println!("Last online:  never"),
    }
    if let Some(robots) = &snapshot.robots {
        if !robots.is_empty() {
            println!("Robots:       {}", serde_json::to_string(robots)?);
        }
    }
    if let Some(headers) = &snapshot.headers {
        for (name, value) in headers {
            println!("  {}: {}", name, value);
        }
    }

    Ok(())
}
