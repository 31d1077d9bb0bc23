//! Census of the public IPv4 space.
//!
//! - [`seeder`] creates a placeholder record for every globally-routable address
//! - [`prober`] refreshes those records with HTTP/HTTPS liveness snapshots
//! - [`probe`] is the shared engine that checks one address
//! - [`store`] is where records live between runs

pub mod config;
pub mod error;
pub mod logging;
pub mod probe;
pub mod prober;
pub mod record;
pub mod scope;
pub mod seeder;
pub mod store;

pub use config::{ElasticConfig, ProbeConfig, ProberConfig, SeederConfig, WorkerPool};
pub use error::{Error, Result, StoreError};
pub use probe::{HttpFetcher, ProbeEngine, RobotsPolicy};
pub use prober::{ProbeReport, Prober};
pub use record::{AddressRecord, Scheme, Snapshot};
pub use seeder::{SeedReport, Seeder};
pub use store::{ElasticStore, MemoryStore, RecordStore};
