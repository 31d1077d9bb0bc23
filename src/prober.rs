// src/prober.rs
// =============================================================================
// The Prober keeps existing records fresh.
//
// One pass:
// 1. Scan every record in the store
// 2. Re-probe each address, only on the schemes its record still marks as
//    available (unless recheck_unavailable is set)
// 3. Write the snapshot back as a partial update under the record's id
//
// Records are processed concurrently with a bounded pool. Each record is one
// unit of work with its own deadline; a slow host, a failed update or a bad
// document only affects that record, which simply stays as it was until the
// next pass. The Prober never creates or deletes records.
// =============================================================================

use futures::stream::StreamExt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ProberConfig;
use crate::error::StoreError;
use crate::probe::ProbeEngine;
use crate::store::{RecordStore, StoredRecord};

/// Totals of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub scanned: usize,
    pub updated: usize,
    /// Updated records where at least one scheme answered 2xx
    pub online: usize,
    /// Records whose address could not be parsed
    pub skipped: usize,
    pub failed_updates: usize,
    pub timed_out: usize,
    pub scan_errors: usize,
}

impl ProbeReport {
    fn add(&mut self, result: UnitResult) {
        if !matches!(result, UnitResult::ScanError) {
            self.scanned += 1;
        }
        match result {
            UnitResult::Updated { online } => {
                self.updated += 1;
                if online {
                    self.online += 1;
                }
            }
            UnitResult::Skipped => self.skipped += 1,
            UnitResult::UpdateFailed => self.failed_updates += 1,
            UnitResult::TimedOut => self.timed_out += 1,
            UnitResult::ScanError => self.scan_errors += 1,
        }
    }
}

// What happened to one record
#[derive(Debug)]
enum UnitResult {
    Updated { online: bool },
    Skipped,
    UpdateFailed,
    TimedOut,
    ScanError,
}

pub struct Prober {
    store: Arc<dyn RecordStore>,
    engine: Arc<ProbeEngine>,
    config: ProberConfig,
}

impl Prober {
    pub fn new(store: Arc<dyn RecordStore>, engine: Arc<ProbeEngine>, config: ProberConfig) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }

    /// Runs a single pass over every record in the store.
    pub async fn run_once(&self) -> ProbeReport {
        let workers = self.config.pool.size();
        info!(workers, "probe pass started");

        let report = self
            .store
            .scan()
            .map(|item| self.process(item))
            .buffer_unordered(workers)
            .fold(ProbeReport::default(), |mut report, result| async move {
                report.add(result);
                report
            })
            .await;

        info!(
            scanned = report.scanned,
            updated = report.updated,
            online = report.online,
            skipped = report.skipped,
            failed_updates = report.failed_updates,
            timed_out = report.timed_out,
            scan_errors = report.scan_errors,
            "probe pass finished"
        );
        report
    }

    /// Runs passes back to back, sleeping `interval` in between, until the
    /// shutdown flag flips to true (or its sender goes away).
    pub async fn run_forever(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_once().await;

            info!(next_in_secs = interval.as_secs(), "waiting for next pass");
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("prober stopped");
    }

    async fn process(&self, item: Result<StoredRecord, StoreError>) -> UnitResult {
        let stored = match item {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "scan error");
                return UnitResult::ScanError;
            }
        };

        let address: Ipv4Addr = match stored.record.address.parse() {
            Ok(address) => address,
            Err(_) => {
                warn!(id = %stored.id, address = %stored.record.address, "record has no valid address");
                return UnitResult::Skipped;
            }
        };

        // The flags seen at scan time decide which schemes get re-checked
        let (check_http, check_https) = if self.config.recheck_unavailable {
            (true, true)
        } else {
            (stored.record.http_available, stored.record.https_available)
        };

        let unit = async {
            let snapshot = self.engine.probe(address, check_http, check_https).await;
            let online = snapshot.is_online();
            self.store
                .update(&stored.id, &snapshot)
                .await
                .map(|_| online)
        };

        match tokio::time::timeout(self.config.unit_deadline, unit).await {
            Ok(Ok(online)) => {
                debug!(%address, online, "record updated");
                UnitResult::Updated { online }
            }
            Ok(Err(e)) => {
                warn!(%address, id = %stored.id, error = %e, "update failed");
                UnitResult::UpdateFailed
            }
            Err(_) => {
                warn!(%address, deadline_secs = self.config.unit_deadline.as_secs_f64(), "record timed out");
                UnitResult::TimedOut
            }
        }
    }
}
