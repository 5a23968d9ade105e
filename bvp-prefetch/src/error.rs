//! Error types for bvp-prefetch
//!
//! Only graph-level failures escape the scheduler as hard errors. Provisioning,
//! teardown and settings-propagation failures are logged and absorbed where they
//! happen.

use bvp_common::NodeId;
use thiserror::Error;

use crate::player::PlayerError;

/// Main error type for bvp-prefetch
#[derive(Error, Debug)]
pub enum Error {
    /// The active node does not resolve in the loaded graph
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Graph structure is malformed
    #[error("Invalid graph: {0}")]
    Graph(String),

    /// Player creation failed
    #[error("Provisioning error: {0}")]
    Provision(String),

    /// Operation on a live player failed
    #[error("Player error: {0}")]
    Player(#[from] PlayerError),

    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors from the shared library (I/O, JSON, TOML)
    #[error(transparent)]
    Common(#[from] bvp_common::Error),

    /// Scheduler task has exited and can no longer accept commands
    #[error("Prefetch service stopped")]
    ServiceStopped,

    /// A newer switch request replaced this one before it was applied
    #[error("Switch request superseded by a newer one")]
    Superseded,

    /// Entry is not part of the current buffer list
    #[error("Entry not buffered: {0}")]
    NotBuffered(String),
}

/// Convenience Result type using bvp-prefetch Error
pub type Result<T> = std::result::Result<T, Error>;
