// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Three subcommands:
// - seed:  create one record per global address of a root block
// - probe: refresh every record once, or forever on an interval
// - check: probe a single address and print the snapshot (no store needed)
//
// Store and probe options can also come from environment variables, which is
// how the long-running prober is usually configured.
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use netcensus::config::{DEFAULT_INDEX, DEFAULT_USER_AGENT};
use netcensus::logging::LogFormat;
use netcensus::{ElasticConfig, ProbeConfig, WorkerPool};

// This struct represents our entire CLI application
#[derive(Parser, Debug)]
#[command(
    name = "netcensus",
    version,
    about = "Seeds and refreshes liveness records for the public IPv4 space",
    long_about = "netcensus creates a record for every globally-routable IPv4 address and \
                  keeps each record's HTTP/HTTPS reachability, content, headers and \
                  robots.txt crawl policy up to date."
)]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a placeholder record for every global address in a block
    ///
    /// Example: netcensus seed --root 93.184.0.0/16
    Seed {
        /// Root block to enumerate, split into /24 subnets
        #[arg(long, default_value = "0.0.0.0/0")]
        root: String,

        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        pool: PoolArgs,
    },

    /// Re-probe every stored record and write the snapshots back
    ///
    /// Example: netcensus probe --interval 86400
    Probe {
        /// Seconds between passes; without it a single pass is run
        #[arg(long)]
        interval: Option<u64>,

        /// Probe both schemes even if a record marks one unavailable
        #[arg(long)]
        recheck_unavailable: bool,

        /// Seconds one record may take (probe + update) before it is skipped
        #[arg(long, default_value_t = 30)]
        unit_deadline_secs: u64,

        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        probe: ProbeArgs,

        #[command(flatten)]
        pool: PoolArgs,
    },

    /// Probe one address and print what was found
    ///
    /// Example: netcensus check 93.184.216.34 --json
    Check {
        /// IPv4 address to probe
        address: String,

        /// Skip the HTTP probe
        #[arg(long)]
        no_http: bool,

        /// Skip the HTTPS probe
        #[arg(long)]
        no_https: bool,

        /// Output the snapshot as JSON instead of a table
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        probe: ProbeArgs,
    },
}

/// Where the records live
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Elasticsearch endpoint
    #[arg(long, env = "ELASTICSEARCH_URL", default_value = "http://localhost:9200")]
    pub elastic_url: String,

    /// Index holding the address records
    #[arg(long, env = "NETCENSUS_INDEX", default_value = DEFAULT_INDEX)]
    pub index: String,

    /// Documents per scroll page when scanning
    #[arg(long, default_value_t = 1000)]
    pub scroll_size: usize,
}

impl StoreArgs {
    pub fn to_config(&self) -> ElasticConfig {
        ElasticConfig {
            url: self.elastic_url.clone(),
            index: self.index.clone(),
            scroll_size: self.scroll_size,
            ..Default::default()
        }
    }
}

/// How each address is probed
#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Timeout for every single request, in seconds
    #[arg(long, env = "NETCENSUS_TIMEOUT_SECS", default_value_t = 3)]
    pub timeout_secs: u64,

    /// Identification string sent with every request
    #[arg(long, env = "NETCENSUS_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Response bodies are truncated after this many bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    pub max_body_bytes: usize,

    /// Reject HTTPS answers whose certificate does not validate
    #[arg(long)]
    pub verify_certs: bool,
}

impl ProbeArgs {
    pub fn to_config(&self) -> ProbeConfig {
        ProbeConfig {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_body_bytes: self.max_body_bytes,
            accept_invalid_certs: !self.verify_certs,
            ..Default::default()
        }
    }
}

/// Size of the worker pool: cpus * workers_per_cpu + extra_workers
#[derive(Args, Debug, Clone)]
pub struct PoolArgs {
    /// Concurrent units of work per CPU
    #[arg(long)]
    pub workers_per_cpu: Option<usize>,

    /// Concurrent units of work on top of the per-CPU share
    #[arg(long)]
    pub extra_workers: Option<usize>,
}

impl PoolArgs {
    /// Overrides the parts of `default` that were given on the command line
    pub fn apply(&self, default: WorkerPool) -> WorkerPool {
        WorkerPool::new(
            self.workers_per_cpu.unwrap_or(default.per_cpu),
            self.extra_workers.unwrap_or(default.extra),
        )
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why #[command(flatten)]?
//    - StoreArgs/ProbeArgs/PoolArgs are shared between subcommands
//    - flatten pulls their fields in as if they were declared inline
//
// 2. Why Option<usize> for the pool flags?
//    - seed and probe have different default pool sizes
//    - None means "keep the subcommand's default"
//
// 3. What does env = "..." do?
//    - If the flag is missing, clap reads the environment variable
//    - Handy for containers where flags are awkward to change
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_seed_defaults() {
        let cli = Cli::parse_from(["netcensus", "seed"]);
        match cli.command {
            Commands::Seed { root, pool, .. } => {
                assert_eq!(root, "0.0.0.0/0");
                assert_eq!(pool.apply(WorkerPool::new(1, 2)), WorkerPool::new(1, 2));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_probe_flags() {
        let cli = Cli::parse_from([
            "netcensus",
            "--log-format",
            "json",
            "probe",
            "--interval",
            "60",
            "--recheck-unavailable",
            "--timeout-secs",
            "5",
            "--workers-per-cpu",
            "8",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Probe {
                interval,
                recheck_unavailable,
                probe,
                pool,
                ..
            } => {
                assert_eq!(interval, Some(60));
                assert!(recheck_unavailable);
                assert_eq!(probe.to_config().timeout, Duration::from_secs(5));
                assert!(probe.to_config().accept_invalid_certs);
                assert_eq!(pool.apply(WorkerPool::new(2, 0)), WorkerPool::new(8, 0));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_check_takes_an_address() {
        let cli = Cli::parse_from(["netcensus", "check", "1.1.1.1", "--no-http", "--json"]);
        assert!(matches!(
            cli.command,
            Commands::Check { ref address, no_http: true, no_https: false, json: true, .. }
                if address == "1.1.1.1"
        ));
    }
}
