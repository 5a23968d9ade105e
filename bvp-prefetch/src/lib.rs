//! # BVP Prefetch Library (bvp-prefetch)
//!
//! Prefetch/buffer scheduling for branching ("choose-your-own-path") video.
//!
//! **Purpose:** Given a graph of nodes and the node currently playing, keep an
//! ordered, bounded set of candidate next players, buffer them one at a time in
//! the order the viewer is likely to need them, release the ones that stop
//! being relevant, and keep viewer playback preferences consistent across all
//! of them.
//!
//! **Architecture:** graph accessor → buffer item state machine → buffer list
//! scheduler, driven by a single tokio task; players are opaque handles from a
//! pluggable provisioner.

pub mod config;
pub mod error;
pub mod graph;
pub mod player;
pub mod prefetch;
pub mod settings;

pub use config::{AppConfig, PrefetchConfig};
pub use error::{Error, Result};
pub use graph::NodeGraph;
pub use prefetch::{BufferListScheduler, PrefetchHandle, PrefetchService};
