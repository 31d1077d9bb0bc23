// src/error.rs
// =============================================================================
// Error types for the library.
//
// Only two kinds of failure ever leave the library as a Result:
// - configuration problems (a root block that does not parse), which are
//   fatal at startup
// - store problems, which callers log and count per unit of work
//
// Per-host network failures never show up here. The probe engine turns them
// into data (available = false, status code 0) instead.
// =============================================================================

use thiserror::Error;

/// Errors returned by the library.
#[derive(Debug, Error)]
pub enum Error {
    /// The root block could not be parsed as an IPv4 CIDR block.
    #[error("invalid root block '{block}': {reason}")]
    InvalidRoot { block: String, reason: String },

    /// The root block is smaller than a /24, so it cannot be split into /24s.
    #[error("root block {0} is longer than /24")]
    PrefixTooLong(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never got an answer from the store.
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A document or response body could not be (de)serialized.
    #[error("failed to decode store document: {0}")]
    Decode(#[from] serde_json::Error),

    /// An update targeted a record that does not exist.
    #[error("record {0} not found")]
    NotFound(String),

    /// The store accepted the request but rejected its content.
    #[error("store rejected request: {0}")]
    Rejected(String),

    /// The store endpoint is not a valid URL.
    #[error("invalid store url: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;
