//! Event types for the BVP event system
//!
//! Provides the prefetch event definitions and the EventBus used to publish them
//! to the surrounding player.

mod buffer_types;

pub use buffer_types::{BufferOutcome, BufferState};

use crate::ids::EntryId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Prefetch notifications published by the buffer scheduler
///
/// Events are observability signals for the surrounding player; the scheduler
/// never reads them back for control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PrefetchEvent {
    /// Candidate set for the new active node was computed
    ///
    /// Emitted before any buffer item is touched so the surrounding system can
    /// reflect upcoming buffering intent.
    PrefetchPlanComputed {
        /// Entry ids in buffering priority order (active node first)
        entry_ids: Vec<EntryId>,
        /// When the plan was computed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An item entered the buffering state for the first time
    BufferStarted {
        /// Entry being buffered
        entry_id: EntryId,
        /// When buffering started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A buffering item reached Ready
    BufferEnded {
        /// Entry that finished
        entry_id: EntryId,
        /// Why it finished
        outcome: BufferOutcome,
        /// When buffering ended
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Every item in the current buffer list is Ready
    AllBuffered {
        /// When the list became fully ready
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Discriminant of [`PrefetchEvent`], one broadcast channel each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefetchEventKind {
    PrefetchPlanComputed,
    BufferStarted,
    BufferEnded,
    AllBuffered,
}

impl PrefetchEvent {
    /// Kind of this event
    pub fn kind(&self) -> PrefetchEventKind {
        match self {
            PrefetchEvent::PrefetchPlanComputed { .. } => PrefetchEventKind::PrefetchPlanComputed,
            PrefetchEvent::BufferStarted { .. } => PrefetchEventKind::BufferStarted,
            PrefetchEvent::BufferEnded { .. } => PrefetchEventKind::BufferEnded,
            PrefetchEvent::AllBuffered { .. } => PrefetchEventKind::AllBuffered,
        }
    }

    /// Shorthand constructor stamping the current time
    pub fn plan_computed(entry_ids: Vec<EntryId>) -> Self {
        PrefetchEvent::PrefetchPlanComputed {
            entry_ids,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Shorthand constructor stamping the current time
    pub fn buffer_started(entry_id: EntryId) -> Self {
        PrefetchEvent::BufferStarted {
            entry_id,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Shorthand constructor stamping the current time
    pub fn buffer_ended(entry_id: EntryId, outcome: BufferOutcome) -> Self {
        PrefetchEvent::BufferEnded {
            entry_id,
            outcome,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Shorthand constructor stamping the current time
    pub fn all_buffered() -> Self {
        PrefetchEvent::AllBuffered {
            timestamp: chrono::Utc::now(),
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Distribution bus for prefetch events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the scheduler)
/// - One channel per event kind plus an "all events" channel
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use bvp_common::events::{EventBus, PrefetchEvent, PrefetchEventKind};
///
/// let event_bus = EventBus::new(64);
/// let mut ends = event_bus.subscribe(PrefetchEventKind::BufferEnded);
///
/// event_bus.emit_lossy(PrefetchEvent::all_buffered());
///
/// // AllBuffered is not delivered on the BufferEnded channel
/// assert!(ends.try_recv().is_err());
/// ```
#[derive(Clone)]
pub struct EventBus {
    all_tx: broadcast::Sender<PrefetchEvent>,
    plan_tx: broadcast::Sender<PrefetchEvent>,
    started_tx: broadcast::Sender<PrefetchEvent>,
    ended_tx: broadcast::Sender<PrefetchEvent>,
    all_buffered_tx: broadcast::Sender<PrefetchEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified per-channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events each channel buffers before lagging
    ///   receivers start losing the oldest ones
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            all_tx: broadcast::channel(capacity).0,
            plan_tx: broadcast::channel(capacity).0,
            started_tx: broadcast::channel(capacity).0,
            ended_tx: broadcast::channel(capacity).0,
            all_buffered_tx: broadcast::channel(capacity).0,
            capacity,
        }
    }

    fn sender(&self, kind: PrefetchEventKind) -> &broadcast::Sender<PrefetchEvent> {
        match kind {
            PrefetchEventKind::PrefetchPlanComputed => &self.plan_tx,
            PrefetchEventKind::BufferStarted => &self.started_tx,
            PrefetchEventKind::BufferEnded => &self.ended_tx,
            PrefetchEventKind::AllBuffered => &self.all_buffered_tx,
        }
    }

    /// Subscribe to future events of one kind
    pub fn subscribe(&self, kind: PrefetchEventKind) -> broadcast::Receiver<PrefetchEvent> {
        self.sender(kind).subscribe()
    }

    /// Subscribe to all future events, in emission order
    pub fn subscribe_all(&self) -> broadcast::Receiver<PrefetchEvent> {
        self.all_tx.subscribe()
    }

    /// Emit an event to all subscribers of its kind and of the "all" channel
    ///
    /// Returns `Ok(receiver_count)` if at least one receiver got the event.
    /// Returns `Err` carrying the event back if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PrefetchEvent,
    ) -> Result<usize, broadcast::error::SendError<PrefetchEvent>> {
        let by_kind = self.sender(event.kind()).send(event.clone()).unwrap_or(0);
        match self.all_tx.send(event) {
            Ok(n) => Ok(n + by_kind),
            Err(_) if by_kind > 0 => Ok(by_kind),
            Err(e) => Err(e),
        }
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PrefetchEvent) {
        let _ = self.emit(event);
    }

    /// Get the current number of active subscribers across all channels
    pub fn subscriber_count(&self) -> usize {
        self.all_tx.receiver_count()
            + self.plan_tx.receiver_count()
            + self.started_tx.receiver_count()
            + self.ended_tx.receiver_count()
            + self.all_buffered_tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_returns_err() {
        let bus = EventBus::new(8);
        assert!(bus.emit(PrefetchEvent::all_buffered()).is_err());
    }

    #[test]
    fn test_kind_channel_only_receives_its_kind() {
        let bus = EventBus::new(8);
        let mut started = bus.subscribe(PrefetchEventKind::BufferStarted);
        let mut all = bus.subscribe_all();

        bus.emit_lossy(PrefetchEvent::plan_computed(vec![EntryId::from("a")]));
        bus.emit_lossy(PrefetchEvent::buffer_started(EntryId::from("a")));

        match started.try_recv().unwrap() {
            PrefetchEvent::BufferStarted { entry_id, .. } => assert_eq!(entry_id.as_str(), "a"),
            other => panic!("unexpected event on BufferStarted channel: {:?}", other),
        }
        assert!(started.try_recv().is_err());

        assert_eq!(all.try_recv().unwrap().kind(), PrefetchEventKind::PrefetchPlanComputed);
        assert_eq!(all.try_recv().unwrap().kind(), PrefetchEventKind::BufferStarted);
    }

    #[test]
    fn test_emit_counts_kind_and_all_receivers() {
        let bus = EventBus::new(8);
        let _ended = bus.subscribe(PrefetchEventKind::BufferEnded);
        let _all = bus.subscribe_all();

        let delivered = bus
            .emit(PrefetchEvent::buffer_ended(EntryId::from("x"), BufferOutcome::Buffered))
            .unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PrefetchEvent::buffer_ended(EntryId::from("e1"), BufferOutcome::TimedOut);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BufferEnded");
        assert_eq!(json["entry_id"], "e1");
        assert_eq!(json["outcome"], "TimedOut");
    }
}
