//! # BVP Common Library
//!
//! Shared code for the branching video player crates:
//! - Identifier newtypes (node, media entry, player)
//! - Error types
//! - Prefetch event types and the EventBus
//! - Configuration file resolution

pub mod config;
pub mod error;
pub mod events;
pub mod ids;

pub use error::{Error, Result};
pub use ids::{EntryId, NodeId, PlayerId};
