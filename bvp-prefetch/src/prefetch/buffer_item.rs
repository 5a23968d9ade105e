//! Buffer Item State Machine
//!
//! One item per candidate entry. Lifecycle:
//!
//! ```text
//! Queued ──begin()──▶ Buffering ──tick()…──▶ Ready
//! ```
//!
//! While Buffering, each poll tick:
//! 1. forces Ready once the retry budget is spent (fail-open),
//! 2. creates the player if there is none yet,
//! 3. skips entries shorter than the short-entry threshold,
//! 4. otherwise compares the buffered range against target minus margin.

use bvp_common::events::{BufferOutcome, BufferState};
use bvp_common::{EntryId, NodeId, PlayerId};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use super::timer::PendingPoll;
use crate::config::PrefetchConfig;
use crate::player::{ManagedPlayer, PlayMode, PlayerError, PlayerProvisioner, PlayerRequest};
use crate::settings::PersistedSettings;

/// Scheduler-assigned identity of a buffer item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// Result of one poll tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// Still buffering, poll again
    Rearm,
    /// Transition to Ready
    Ready(BufferOutcome),
}

/// Diagnostic view of one buffer item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferItemInfo {
    pub item_id: ItemId,
    pub entry_id: EntryId,
    pub node_id: NodeId,
    pub state: BufferState,
    pub mode: PlayMode,
    pub player_id: Option<PlayerId>,
    pub poll_attempts: u32,
    pub start_offset_secs: Option<f64>,
    pub outcome: Option<BufferOutcome>,
    pub buffered_end_secs: Option<f64>,
    pub duration_secs: Option<f64>,
}

/// The scheduler's unit of work for one candidate entry
#[derive(Debug)]
pub struct BufferItem {
    id: ItemId,
    entry_id: EntryId,
    node_id: NodeId,
    mode: PlayMode,
    start_offset_secs: Option<f64>,
    state: BufferState,
    player: Option<ManagedPlayer>,
    pending: Option<PendingPoll>,
    poll_attempts: u32,
    outcome: Option<BufferOutcome>,
}

/// Finite, non-negative time values only; anything else is "unknown"
fn valid_secs(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

impl BufferItem {
    pub fn new(
        id: ItemId,
        entry_id: EntryId,
        node_id: NodeId,
        mode: PlayMode,
        start_offset_secs: Option<f64>,
    ) -> Self {
        Self {
            id,
            entry_id,
            node_id,
            mode,
            start_offset_secs,
            state: BufferState::Queued,
            player: None,
            pending: None,
            poll_attempts: 0,
            outcome: None,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn entry_id(&self) -> &EntryId {
        &self.entry_id
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn start_offset_secs(&self) -> Option<f64> {
        self.start_offset_secs
    }

    pub fn outcome(&self) -> Option<BufferOutcome> {
        self.outcome
    }

    pub fn poll_attempts(&self) -> u32 {
        self.poll_attempts
    }

    pub fn player(&self) -> Option<&ManagedPlayer> {
        self.player.as_ref()
    }

    pub fn player_mut(&mut self) -> Option<&mut ManagedPlayer> {
        self.player.as_mut()
    }

    pub fn has_pending_poll(&self) -> bool {
        self.pending.is_some()
    }

    /// Update how a not-yet-created player should start
    ///
    /// Has no effect once a player exists; a reused player is kept verbatim.
    pub fn retarget(&mut self, node_id: NodeId, mode: PlayMode, start_offset_secs: Option<f64>) {
        if self.player.is_some() {
            return;
        }
        self.node_id = node_id;
        self.mode = mode;
        self.start_offset_secs = start_offset_secs;
    }

    /// Queued → Buffering; returns false if the item was not Queued
    pub fn begin(&mut self) -> bool {
        if self.state != BufferState::Queued {
            return false;
        }
        debug!("{} ({}): Queued → Buffering", self.id, self.entry_id);
        self.state = BufferState::Buffering;
        self.poll_attempts = 0;
        true
    }

    /// Store the timer for the next tick, cancelling any previous one
    pub fn set_pending(&mut self, pending: PendingPoll) {
        if let Some(old) = self.pending.replace(pending) {
            old.cancel();
        }
    }

    /// Consume the armed timer because its tick arrived
    ///
    /// Returns false when nothing was armed, i.e. the tick is stale.
    pub fn take_pending(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
    }

    fn request(&self, settings: &PersistedSettings) -> PlayerRequest {
        PlayerRequest {
            entry_id: self.entry_id.clone(),
            mode: self.mode,
            show_poster: self.mode == PlayMode::Autoplay,
            start_offset_secs: self.start_offset_secs,
            settings: settings.clone(),
        }
    }

    /// Create the player now if it does not exist yet
    pub fn ensure_player(
        &mut self,
        provisioner: &mut dyn PlayerProvisioner,
        settings: &PersistedSettings,
    ) -> Result<&mut ManagedPlayer, PlayerError> {
        if self.player.is_none() {
            let handle = provisioner.create_player(&self.request(settings))?;
            debug!("{} ({}): created {}", self.id, self.entry_id, handle.id());
            self.player = Some(ManagedPlayer::new(handle));
        }
        match self.player.as_mut() {
            Some(player) => Ok(player),
            None => Err(PlayerError::Destroyed),
        }
    }

    /// Evaluate one poll tick while Buffering
    pub fn tick(
        &mut self,
        provisioner: &mut dyn PlayerProvisioner,
        settings: &PersistedSettings,
        config: &PrefetchConfig,
    ) -> TickResult {
        self.poll_attempts += 1;

        if self.poll_attempts > config.max_poll_attempts {
            warn!(
                "{} ({}): no buffering verdict after {} polls, forcing ready",
                self.id, self.entry_id, config.max_poll_attempts
            );
            return TickResult::Ready(BufferOutcome::TimedOut);
        }

        let Some(player) = self.player.as_ref() else {
            if let Err(e) = self.ensure_player(provisioner, settings) {
                warn!(
                    "{} ({}): player creation failed (attempt {}): {}",
                    self.id, self.entry_id, self.poll_attempts, e
                );
            }
            return TickResult::Rearm;
        };

        let handle = player.handle();
        let duration = valid_secs(handle.duration_secs());

        if let Some(duration) = duration {
            if duration < config.short_entry_threshold_secs {
                debug!(
                    "{} ({}): short entry ({:.1}s), skipping buffering",
                    self.id, self.entry_id, duration
                );
                return TickResult::Ready(BufferOutcome::ShortEntry);
            }
        }

        if let Some(end) = valid_secs(handle.buffered_end_secs()) {
            let ahead = end - self.start_offset_secs.unwrap_or(0.0);
            let fully_buffered = duration.is_some_and(|d| end >= d);
            if ahead > config.ready_threshold_secs() || fully_buffered {
                debug!(
                    "{} ({}): buffered to {:.2}s ({:.2}s ahead)",
                    self.id, self.entry_id, end, ahead
                );
                return TickResult::Ready(BufferOutcome::Buffered);
            }
        }

        TickResult::Rearm
    }

    /// Buffering → Ready
    pub fn mark_ready(&mut self, outcome: BufferOutcome) {
        self.cancel_pending();
        debug!("{} ({}): {} → Ready ({})", self.id, self.entry_id, self.state, outcome);
        self.state = BufferState::Ready;
        self.outcome = Some(outcome);
    }

    /// Cancel the timer and release the player
    pub fn destroy(&mut self) {
        self.cancel_pending();
        if let Some(mut player) = self.player.take() {
            player.destroy();
        }
    }

    pub fn info(&self) -> BufferItemInfo {
        let handle = self.player.as_ref().map(|p| p.handle());
        BufferItemInfo {
            item_id: self.id,
            entry_id: self.entry_id.clone(),
            node_id: self.node_id.clone(),
            state: self.state,
            mode: self.mode,
            player_id: self.player.as_ref().map(|p| p.id()),
            poll_attempts: self.poll_attempts,
            start_offset_secs: self.start_offset_secs,
            outcome: self.outcome,
            buffered_end_secs: handle.and_then(|h| valid_secs(h.buffered_end_secs())),
            duration_secs: handle.and_then(|h| valid_secs(h.duration_secs())),
        }
    }
}

impl Drop for BufferItem {
    fn drop(&mut self) {
        self.destroy();
    }
}
