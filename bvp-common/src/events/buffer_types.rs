//! Buffer-related type definitions
//!
//! Supporting types for the prefetch buffer item lifecycle.

use serde::{Deserialize, Serialize};

/// Buffer item state
///
/// Items move strictly forward: Queued → Buffering → Ready. Nothing leaves
/// Ready except destruction of the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum BufferState {
    /// Waiting for its turn, no player yet
    Queued,
    /// Player requested or created, buffered range still below target
    Buffering,
    /// Enough buffered, judged unnecessary to buffer, or timed out
    Ready,
}

impl std::fmt::Display for BufferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferState::Queued => write!(f, "Queued"),
            BufferState::Buffering => write!(f, "Buffering"),
            BufferState::Ready => write!(f, "Ready"),
        }
    }
}

/// How a buffering item reached Ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum BufferOutcome {
    /// Buffered range reached target minus safety margin
    Buffered,
    /// Entry shorter than the short-entry threshold, buffering skipped
    ShortEntry,
    /// Retry budget exhausted, forced ready (fail-open)
    TimedOut,
}

impl std::fmt::Display for BufferOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferOutcome::Buffered => write!(f, "Buffered"),
            BufferOutcome::ShortEntry => write!(f, "ShortEntry"),
            BufferOutcome::TimedOut => write!(f, "TimedOut"),
        }
    }
}
