// src/probe/mod.rs
// =============================================================================
// This module contains the probe primitive shared by the Prober and the
// one-off `check` command.
//
// Submodules:
// - fetch: makes the HTTP requests and classifies transport failures
// - robots: extracts crawl-delay / request-rate from robots.txt
// - engine: runs both schemes for one address and builds a Snapshot
// =============================================================================

mod engine;
mod fetch;
mod robots;

pub use engine::ProbeEngine;
pub use fetch::{Fetch, FetchFailure, FetchedPage, HttpFetcher};
pub use robots::{parse_policy, RobotsPolicy, WILDCARD_AGENT};

#[cfg(test)]
pub(crate) use engine::tests::{engine as scripted_engine, Script, ScriptedFetcher};
