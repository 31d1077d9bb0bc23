// src/seeder.rs
// =============================================================================
// The Seeder creates one placeholder record per globally-routable address.
//
// How it works:
// 1. Split the root block (normally 0.0.0.0/0) into /24 subnets
// 2. Drop subnets that are entirely multicast, private, loopback or link-local
// 3. For each remaining subnet, list its global host addresses
// 4. Bulk-insert one batch of seed records per subnet
//
// Everything is lazy: the /0 block is never materialized, only the batches
// currently in flight sit in memory. Subnets are processed concurrently with
// a bounded pool, and a batch that fails is logged and counted without
// stopping the others.
// =============================================================================

use chrono::Utc;
use futures::stream::{self, StreamExt};
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SeederConfig;
use crate::error::{Error, Result};
use crate::record::AddressRecord;
use crate::scope;
use crate::store::RecordStore;

const SUBNET_PREFIX: u8 = 24;

/// Parses the root block to enumerate.
///
/// Fails on malformed input, on host bits set below the prefix
/// (`10.0.0.1/8`) and on blocks smaller than a /24.
pub fn parse_root(block: &str) -> Result<Ipv4Network> {
    let network: Ipv4Network = block.trim().parse().map_err(|e| Error::InvalidRoot {
        block: block.to_string(),
        reason: format!("{}", e),
    })?;

    if network.ip() != network.network() {
        return Err(Error::InvalidRoot {
            block: block.to_string(),
            reason: "host bits set".to_string(),
        });
    }
    if network.prefix() > SUBNET_PREFIX {
        return Err(Error::PrefixTooLong(block.to_string()));
    }

    Ok(network)
}

/// Splits `root` into /24 subnets, in ascending order, keeping in-scope ones.
///
/// The iterator is a pure function of `root`: calling this twice yields the
/// same sequence.
pub fn enumerate_subnets(root: Ipv4Network) -> Result<impl Iterator<Item = Ipv4Network>> {
    if root.prefix() > SUBNET_PREFIX {
        return Err(Error::PrefixTooLong(root.to_string()));
    }

    let base = u32::from(root.network()) >> 8;
    let count = 1u32 << (SUBNET_PREFIX - root.prefix());

    Ok((0..count)
        .filter_map(move |i| {
            let network = Ipv4Addr::from((base + i) << 8);
            Ipv4Network::new(network, SUBNET_PREFIX).ok()
        })
        .filter(|subnet| scope::subnet_in_scope(*subnet)))
}

/// Global host addresses of a subnet; network and broadcast are never hosts.
pub fn expand_hosts(subnet: Ipv4Network) -> impl Iterator<Item = Ipv4Addr> {
    let network = u32::from(subnet.network());
    let broadcast = u32::from(subnet.broadcast());

    // A /31 or /32 has no separate network/broadcast address
    let (first, last) = if subnet.prefix() >= 31 {
        (network, broadcast)
    } else {
        (network + 1, broadcast - 1)
    };

    (first..=last)
        .map(Ipv4Addr::from)
        .filter(|addr| scope::is_global(*addr))
}

/// Placeholder record for a freshly seeded address.
pub fn seed_record(address: Ipv4Addr) -> AddressRecord {
    AddressRecord::seed(address, Utc::now())
}

/// Totals of one seeding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub subnets: usize,
    /// In-scope subnets that turned out to have no global hosts
    pub empty_subnets: usize,
    pub created: usize,
    pub already_present: usize,
    /// Items refused by the store inside otherwise successful batches
    pub rejected: usize,
    pub failed_batches: usize,
}

// What happened to one subnet's batch
enum BatchResult {
    Empty,
    Stored(crate::store::BulkOutcome),
    Failed,
}

pub struct Seeder {
    store: Arc<dyn RecordStore>,
    config: SeederConfig,
}

impl Seeder {
    pub fn new(store: Arc<dyn RecordStore>, config: SeederConfig) -> Self {
        Self { store, config }
    }

    /// Seeds every in-scope subnet of `root`.
    ///
    /// Store failures are per subnet: they are logged, counted in the report
    /// and never retried.
    pub async fn run(&self, root: Ipv4Network) -> Result<SeedReport> {
        let workers = self.config.pool.size();
        info!(%root, workers, "seeding started");

        let subnets = enumerate_subnets(root)?;
        let report = stream::iter(subnets)
            .map(|subnet| self.seed_subnet(subnet))
            .buffer_unordered(workers)
            .fold(SeedReport::default(), |mut report, result| async move {
                report.subnets += 1;
                match result {
                    BatchResult::Empty => report.empty_subnets += 1,
                    BatchResult::Stored(outcome) => {
                        report.created += outcome.created;
                        report.already_present += outcome.already_present;
                        report.rejected += outcome.failed;
                    }
                    BatchResult::Failed => report.failed_batches += 1,
                }
                if report.subnets % 10_000 == 0 {
                    info!(subnets = report.subnets, created = report.created, "seeding progress");
                }
                report
            })
            .await;

        info!(
            subnets = report.subnets,
            created = report.created,
            already_present = report.already_present,
            rejected = report.rejected,
            failed_batches = report.failed_batches,
            "seeding finished"
        );
        Ok(report)
    }

    async fn seed_subnet(&self, subnet: Ipv4Network) -> BatchResult {
        let batch: Vec<AddressRecord> = expand_hosts(subnet).map(seed_record).collect();
        if batch.is_empty() {
            debug!(%subnet, "no global hosts");
            return BatchResult::Empty;
        }

        let size = batch.len();
        match self.store.bulk_insert(batch).await {
            Ok(outcome) => {
                debug!(%subnet, size, created = outcome.created, "batch stored");
                BatchResult::Stored(outcome)
            }
            Err(e) => {
                warn!(%subnet, size, error = %e, "bulk insert failed");
                BatchResult::Failed
            }
        }
    }
}
