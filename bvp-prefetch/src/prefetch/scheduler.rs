//! Buffer List Scheduler
//!
//! Owns the ordered list of buffer items for the current playback context and
//! decides which single item, if any, is buffering.
//!
//! On every switch the candidate list is recomputed from the graph, existing
//! items whose entry is still wanted are carried over with their state and
//! player, and the rest are destroyed. Buffering then proceeds strictly in list
//! order: when an item reaches Ready the first Queued item after it begins.
//!
//! The scheduler is not re-entrant. All calls come from one owner (see
//! [`super::service`]), which serializes switches, settings changes and ticks.

use bvp_common::events::{BufferState, EventBus, PrefetchEvent};
use bvp_common::{EntryId, NodeId, PlayerId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::buffer_item::{BufferItem, BufferItemInfo, ItemId, TickResult};
use super::timer::PollTimer;
use crate::config::PrefetchConfig;
use crate::error::{Error, Result};
use crate::graph::NodeGraph;
use crate::player::{PlayMode, PlayerHandle, PlayerProvisioner};
use crate::settings::{PersistedSettings, PlayerSetting, SettingsPropagator};

/// One deduplicated entry of a prefetch plan
#[derive(Debug, Clone, PartialEq)]
struct PlanEntry {
    entry_id: EntryId,
    node_id: NodeId,
    mode: PlayMode,
    start_offset_secs: Option<f64>,
}

/// Prefetch/buffer scheduler
pub struct BufferListScheduler {
    graph: Arc<NodeGraph>,
    config: PrefetchConfig,
    provisioner: Box<dyn PlayerProvisioner>,
    timer: Box<dyn PollTimer>,
    events: EventBus,
    settings: SettingsPropagator,
    items: Vec<BufferItem>,
    active: Option<NodeId>,
    next_item_id: u64,
}

impl BufferListScheduler {
    pub fn new(
        graph: Arc<NodeGraph>,
        config: PrefetchConfig,
        provisioner: Box<dyn PlayerProvisioner>,
        timer: Box<dyn PollTimer>,
        events: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            graph,
            config,
            provisioner,
            timer,
            events,
            settings: SettingsPropagator::new(),
            items: Vec::new(),
            active: None,
            next_item_id: 1,
        })
    }

    pub fn active_node(&self) -> Option<&NodeId> {
        self.active.as_ref()
    }

    pub fn items(&self) -> &[BufferItem] {
        &self.items
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    pub fn persisted_settings(&self) -> &PersistedSettings {
        self.settings.snapshot()
    }

    pub fn snapshot(&self) -> Vec<BufferItemInfo> {
        self.items.iter().map(BufferItem::info).collect()
    }

    pub fn buffering_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.state() == BufferState::Buffering)
            .count()
    }

    pub fn is_all_ready(&self) -> bool {
        self.items.iter().all(|i| i.state() == BufferState::Ready)
    }

    /// Make `node` the active node, or tear everything down with `None`
    ///
    /// Returns the deduplicated plan (entry ids in priority order). Fails only
    /// if `node` does not exist in the graph, in which case nothing changes.
    pub fn switch_to(&mut self, node: Option<&NodeId>) -> Result<Vec<EntryId>> {
        let plan = self.plan_for(node)?;
        let entry_ids: Vec<EntryId> = plan.iter().map(|p| p.entry_id.clone()).collect();

        info!(
            "Prefetch plan for {}: [{}]",
            node.map(|n| n.as_str()).unwrap_or("<none>"),
            entry_ids.iter().map(|e| e.as_str()).collect::<Vec<_>>().join(", ")
        );
        self.events
            .emit_lossy(PrefetchEvent::plan_computed(entry_ids.clone()));

        // Carry over every item whose entry is still planned; the rest are stale
        let mut existing: HashMap<EntryId, BufferItem> = self
            .items
            .drain(..)
            .map(|item| (item.entry_id().clone(), item))
            .collect();

        let mut items = Vec::with_capacity(plan.len());
        for entry in plan {
            let item = match existing.remove(&entry.entry_id) {
                Some(mut item) => {
                    debug!("Reusing {} ({}, {})", item.id(), entry.entry_id, item.state());
                    item.retarget(entry.node_id, entry.mode, entry.start_offset_secs);
                    item
                }
                None => {
                    let id = ItemId(self.next_item_id);
                    self.next_item_id += 1;
                    BufferItem::new(
                        id,
                        entry.entry_id,
                        entry.node_id,
                        entry.mode,
                        entry.start_offset_secs,
                    )
                }
            };
            items.push(item);
        }

        for (_, mut stale) in existing {
            debug!("Releasing {} ({}, {})", stale.id(), stale.entry_id(), stale.state());
            stale.destroy();
        }

        self.items = items;
        self.active = node.cloned();
        self.drive();

        Ok(entry_ids)
    }

    /// Release every item
    pub fn shutdown(&mut self) {
        for mut item in self.items.drain(..) {
            item.destroy();
        }
        self.active = None;
    }

    fn plan_for(&self, node: Option<&NodeId>) -> Result<Vec<PlanEntry>> {
        let Some(node_id) = node else {
            return Ok(Vec::new());
        };
        let active = self
            .graph
            .node(node_id)
            .ok_or_else(|| Error::NodeNotFound(node_id.clone()))?;

        let candidates = self.graph.next_candidates(active);
        let mut seen = HashSet::with_capacity(candidates.len() + 1);
        let mut plan = Vec::with_capacity(candidates.len() + 1);

        let ordered = std::iter::once(PlanEntry {
            entry_id: active.entry_id.clone(),
            node_id: active.id.clone(),
            mode: PlayMode::Autoplay,
            start_offset_secs: None,
        })
        .chain(candidates.into_iter().map(|c| PlanEntry {
            entry_id: c.node.entry_id.clone(),
            node_id: c.node.id.clone(),
            mode: PlayMode::Preload,
            start_offset_secs: c.start_offset_secs,
        }));

        // First occurrence of an entry wins
        for entry in ordered {
            if seen.insert(entry.entry_id.clone()) {
                plan.push(entry);
            }
        }

        Ok(plan)
    }

    /// Start the next Queued item unless one is already buffering
    fn drive(&mut self) {
        if self.is_all_ready() {
            info!("All {} buffer items ready", self.items.len());
            self.events.emit_lossy(PrefetchEvent::all_buffered());
            return;
        }

        if self.buffering_count() > 0 {
            return;
        }

        let delay = self.config.initial_poll_delay();
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|i| i.state() == BufferState::Queued)
        {
            if item.begin() {
                info!("Buffering {} (node {})", item.entry_id(), item.node_id());
                self.events
                    .emit_lossy(PrefetchEvent::buffer_started(item.entry_id().clone()));
                let pending = self.timer.arm(item.id(), delay);
                item.set_pending(pending);
            }
        }
    }

    /// Handle a poll tick for `item_id`
    ///
    /// Ticks for released items, or ticks whose timer was already cancelled,
    /// are ignored.
    pub fn on_poll(&mut self, item_id: ItemId) {
        let Some(item) = self.items.iter_mut().find(|i| i.id() == item_id) else {
            debug!("Ignoring tick for released {}", item_id);
            return;
        };
        if !item.take_pending() {
            debug!("Ignoring stale tick for {}", item_id);
            return;
        }
        if item.state() != BufferState::Buffering {
            return;
        }

        match item.tick(self.provisioner.as_mut(), self.settings.snapshot(), &self.config) {
            TickResult::Rearm => {
                let pending = self.timer.arm(item_id, self.config.poll_interval());
                item.set_pending(pending);
            }
            TickResult::Ready(outcome) => {
                item.mark_ready(outcome);
                info!("Buffer ready: {} ({})", item.entry_id(), outcome);
                self.events
                    .emit_lossy(PrefetchEvent::buffer_ended(item.entry_id().clone(), outcome));
                self.drive();
            }
        }
    }

    /// Record a viewer preference and replay it on every other buffered player
    pub fn apply_setting(&mut self, setting: PlayerSetting, origin: Option<PlayerId>) {
        let players = self.items.iter_mut().filter_map(|i| i.player_mut());
        let applied = self.settings.propagate(&setting, origin, players);
        debug!("Propagated {:?} to {} player(s)", setting, applied);
    }

    /// Start playback of a buffered entry the viewer just jumped to
    ///
    /// Creates the player on the spot if buffering had not reached it yet,
    /// seeks to the entry's start offset if one was requested, then plays.
    pub fn activate(&mut self, entry_id: &EntryId) -> Result<PlayerId> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.entry_id() == entry_id)
            .ok_or_else(|| Error::NotBuffered(entry_id.to_string()))?;

        let offset = item.start_offset_secs();
        let player = item
            .ensure_player(self.provisioner.as_mut(), self.settings.snapshot())
            .map_err(|e| Error::Provision(e.to_string()))?;

        let player_id = player.id();
        let handle = player.handle_mut();
        if let Some(offset) = offset {
            handle.seek(offset)?;
        }
        handle.play()?;

        info!("Activated {} on {}", entry_id, player_id);
        Ok(player_id)
    }

    /// Run `f` against the live player of `entry_id`, if there is one
    pub fn with_player<R>(
        &mut self,
        entry_id: &EntryId,
        f: impl FnOnce(&mut dyn PlayerHandle) -> R,
    ) -> Option<R> {
        self.items
            .iter_mut()
            .find(|i| i.entry_id() == entry_id)
            .and_then(|i| i.player_mut())
            .map(|p| f(p.handle_mut()))
    }
}

impl Drop for BufferListScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for BufferListScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferListScheduler")
            .field("active", &self.active)
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}
