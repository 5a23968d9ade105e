//! Poll timers
//!
//! Buffering progress is checked by re-armed one-shot timers. The scheduler
//! only sees the [`PollTimer`] seam: arming returns a [`PendingPoll`] that
//! cancels the timer when cancelled or dropped, so a destroyed item can never
//! receive a late tick.

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

use super::buffer_item::ItemId;

/// Arms one-shot poll ticks for buffer items
pub trait PollTimer: Send {
    /// Deliver a tick for `item` after `delay`
    fn arm(&mut self, item: ItemId, delay: Duration) -> PendingPoll;
}

/// Armed timer; cancels on [`cancel`](Self::cancel) or drop
pub struct PendingPoll {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl PendingPoll {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        self.fire_cancel();
    }

    fn fire_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for PendingPoll {
    fn drop(&mut self) {
        self.fire_cancel();
    }
}

impl fmt::Debug for PendingPoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingPoll")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// Timer backed by tokio tasks
///
/// Each arm spawns a task that sleeps and then sends the item id on the tick
/// channel; cancelling aborts the task. Must be used inside a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioPollTimer {
    tick_tx: mpsc::UnboundedSender<ItemId>,
}

impl TokioPollTimer {
    pub fn new(tick_tx: mpsc::UnboundedSender<ItemId>) -> Self {
        Self { tick_tx }
    }
}

impl PollTimer for TokioPollTimer {
    fn arm(&mut self, item: ItemId, delay: Duration) -> PendingPoll {
        let tx = self.tick_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the service stopped
            let _ = tx.send(item);
        });
        PendingPoll::new(move || task.abort())
    }
}
