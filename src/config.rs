// src/config.rs
// =============================================================================
// Tunables for the probe engine, the worker pools and the store.
//
// These are plain structs with sensible defaults. The binary fills them in
// from command-line flags (see cli.rs); tests build them directly.
// =============================================================================

use std::time::Duration;

/// Identification string sent with every probe request.
pub const DEFAULT_USER_AGENT: &str = concat!("netcensus/", env!("CARGO_PKG_VERSION"));

/// Index the records live in.
pub const DEFAULT_INDEX: &str = "ipv4addresses";

/// Settings for a single probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub user_agent: String,
    /// Bound on every individual request (page or robots.txt)
    pub timeout: Duration,
    /// Bodies are cut off after this many bytes
    pub max_body_bytes: usize,
    pub accept_invalid_certs: bool,
    pub max_redirects: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(3),
            max_body_bytes: 1024 * 1024,
            accept_invalid_certs: true,
            max_redirects: 10,
        }
    }
}

/// Size of a bounded worker pool, relative to the machine's parallelism.
///
/// The pool holds `cpus * per_cpu + extra` units of work in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    pub per_cpu: usize,
    pub extra: usize,
}

impl WorkerPool {
    pub fn new(per_cpu: usize, extra: usize) -> Self {
        Self { per_cpu, extra }
    }

    /// Number of concurrent units of work, never less than one.
    pub fn size(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.size_for(cpus)
    }

    fn size_for(&self, cpus: usize) -> usize {
        cpus.saturating_mul(self.per_cpu)
            .saturating_add(self.extra)
            .max(1)
    }
}

#[derive(Debug, Clone)]
pub struct SeederConfig {
    pub pool: WorkerPool,
}

impl Default for SeederConfig {
    fn default() -> Self {
        Self {
            pool: WorkerPool::new(1, 2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProberConfig {
    pub pool: WorkerPool,
    /// Probe both schemes even when the record says one is unavailable
    pub recheck_unavailable: bool,
    /// Upper bound on one record's probe + update
    pub unit_deadline: Duration,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            pool: WorkerPool::new(2, 0),
            recheck_unavailable: false,
            unit_deadline: Duration::from_secs(30),
        }
    }
}

/// Connection settings for the Elasticsearch-backed store.
#[derive(Debug, Clone)]
pub struct ElasticConfig {
    pub url: String,
    pub index: String,
    /// Documents fetched per scroll page
    pub scroll_size: usize,
    /// How long the server keeps a scroll context alive between pages
    pub scroll_keep_alive: String,
    pub request_timeout: Duration,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: DEFAULT_INDEX.to_string(),
            scroll_size: 1000,
            scroll_keep_alive: "5m".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size() {
        assert_eq!(WorkerPool::new(1, 2).size_for(4), 6);
        assert_eq!(WorkerPool::new(2, 0).size_for(8), 16);
        assert_eq!(WorkerPool::new(0, 0).size_for(8), 1);
        assert!(WorkerPool::new(2, 0).size() >= 2);
    }

    #[test]
    fn test_huge_pool_saturates() {
        assert_eq!(WorkerPool::new(usize::MAX, 0).size_for(4), usize::MAX);
        assert_eq!(WorkerPool::new(1, usize::MAX).size_for(4), usize::MAX);
    }

    #[test]
    fn test_default_user_agent() {
        assert!(ProbeConfig::default().user_agent.starts_with("netcensus/"));
    }
}
