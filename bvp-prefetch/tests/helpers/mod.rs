//! Shared test helpers
//!
//! - `FakeMedia`: provisioner whose buffered range and duration are set by the
//!   test per entry, with a record of every player it created
//! - `ManualTimer`: poll timer whose ticks the test fires explicitly
//! - graph builders and scheduler setup

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bvp_common::events::{EventBus, PrefetchEvent};
use bvp_common::{EntryId, NodeId, PlayerId};
use bvp_prefetch::graph::{Hotspot, HotspotAction, Node, NodeGraph};
use bvp_prefetch::player::{
    PlayerError, PlayerHandle, PlayerProvisioner, PlayerRequest, TrackId, TrackInfo,
};
use bvp_prefetch::prefetch::{BufferListScheduler, ItemId, PendingPoll, PollTimer};
use bvp_prefetch::PrefetchConfig;
use tokio::sync::broadcast;

// ============================================================================
// Fake player runtime
// ============================================================================

#[derive(Debug, Clone)]
pub struct FakePlayerRecord {
    pub id: PlayerId,
    pub request: PlayerRequest,
    pub muted: bool,
    pub volume: f32,
    pub playback_rate: f32,
    pub caption_track: Option<TrackId>,
    pub audio_track: Option<TrackId>,
    pub playing: bool,
    pub position_secs: Option<f64>,
    pub destroy_calls: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    durations: HashMap<EntryId, Option<f64>>,
    buffered: HashMap<EntryId, f64>,
    failing: HashSet<EntryId>,
    players: Vec<FakePlayerRecord>,
    caption_languages: Vec<String>,
    audio_languages: Vec<String>,
}

/// Controllable media runtime shared between the test and its players
#[derive(Debug, Clone)]
pub struct FakeMedia(Arc<Mutex<FakeState>>);

impl Default for FakeMedia {
    fn default() -> Self {
        let state = FakeState {
            caption_languages: vec!["en".into(), "es".into()],
            audio_languages: vec!["en".into(), "fr".into()],
            ..Default::default()
        };
        Self(Arc::new(Mutex::new(state)))
    }
}

impl FakeMedia {
    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.0.lock().unwrap()
    }

    pub fn provisioner(&self) -> Box<dyn PlayerProvisioner> {
        Box::new(FakeProvisioner { media: self.clone() })
    }

    /// Duration reported for an entry (default 60s)
    pub fn set_duration(&self, entry: &str, duration: Option<f64>) {
        self.lock().durations.insert(EntryId::from(entry), duration);
    }

    /// Buffered range end reported for an entry (default 0s)
    pub fn set_buffered(&self, entry: &str, end: f64) {
        self.lock().buffered.insert(EntryId::from(entry), end);
    }

    pub fn fail_creation(&self, entry: &str) {
        self.lock().failing.insert(EntryId::from(entry));
    }

    /// Entry ids in the order their players were created
    pub fn creation_order(&self) -> Vec<String> {
        self.lock()
            .players
            .iter()
            .map(|p| p.request.entry_id.to_string())
            .collect()
    }

    pub fn players_for(&self, entry: &str) -> Vec<FakePlayerRecord> {
        self.lock()
            .players
            .iter()
            .filter(|p| p.request.entry_id.as_str() == entry)
            .cloned()
            .collect()
    }

    pub fn player(&self, id: PlayerId) -> FakePlayerRecord {
        self.lock()
            .players
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .expect("unknown player id")
    }

    pub fn destroy_count(&self, entry: &str) -> u32 {
        self.players_for(entry).iter().map(|p| p.destroy_calls).sum()
    }

    fn update(&self, id: PlayerId, f: impl FnOnce(&mut FakePlayerRecord)) {
        if let Some(p) = self.lock().players.iter_mut().find(|p| p.id == id) {
            f(p);
        }
    }
}

struct FakeProvisioner {
    media: FakeMedia,
}

impl PlayerProvisioner for FakeProvisioner {
    fn create_player(
        &mut self,
        request: &PlayerRequest,
    ) -> Result<Box<dyn PlayerHandle>, PlayerError> {
        let (id, captions, audio) = {
            let mut state = self.media.lock();
            if state.failing.contains(&request.entry_id) {
                return Err(PlayerError::Creation {
                    entry_id: request.entry_id.clone(),
                    reason: "fake failure".into(),
                });
            }
            let id = PlayerId(state.players.len() as u64 + 1);
            state.players.push(FakePlayerRecord {
                id,
                request: request.clone(),
                muted: false,
                volume: 1.0,
                playback_rate: 1.0,
                caption_track: None,
                audio_track: None,
                playing: request.play_immediate(),
                position_secs: request.start_offset_secs,
                destroy_calls: 0,
            });
            (
                id,
                tracks(&state.caption_languages),
                tracks(&state.audio_languages),
            )
        };

        let mut player = FakePlayer {
            id,
            entry_id: request.entry_id.clone(),
            media: self.media.clone(),
            captions,
            audio,
        };
        request.settings.apply_to(&mut player);
        Ok(Box::new(player))
    }
}

fn tracks(languages: &[String]) -> Vec<TrackInfo> {
    languages
        .iter()
        .enumerate()
        .map(|(i, l)| TrackInfo {
            id: i as TrackId,
            language: l.clone(),
            label: None,
        })
        .collect()
}

struct FakePlayer {
    id: PlayerId,
    entry_id: EntryId,
    media: FakeMedia,
    captions: Vec<TrackInfo>,
    audio: Vec<TrackInfo>,
}

impl PlayerHandle for FakePlayer {
    fn id(&self) -> PlayerId {
        self.id
    }

    fn entry_id(&self) -> &EntryId {
        &self.entry_id
    }

    fn buffered_end_secs(&self) -> Option<f64> {
        Some(*self.media.lock().buffered.get(&self.entry_id).unwrap_or(&0.0))
    }

    fn duration_secs(&self) -> Option<f64> {
        *self
            .media
            .lock()
            .durations
            .get(&self.entry_id)
            .unwrap_or(&Some(60.0))
    }

    fn is_playing(&self) -> bool {
        self.media.player(self.id).playing
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.media.update(self.id, |p| p.playing = true);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        self.media.update(self.id, |p| p.playing = false);
        Ok(())
    }

    fn seek(&mut self, position_secs: f64) -> Result<(), PlayerError> {
        self.media.update(self.id, |p| p.position_secs = Some(position_secs));
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), PlayerError> {
        self.media.update(self.id, |p| p.muted = muted);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), PlayerError> {
        self.media.update(self.id, |p| p.volume = volume);
        Ok(())
    }

    fn set_playback_rate(&mut self, rate: f32) -> Result<(), PlayerError> {
        self.media.update(self.id, |p| p.playback_rate = rate);
        Ok(())
    }

    fn caption_tracks(&self) -> Vec<TrackInfo> {
        self.captions.clone()
    }

    fn select_caption_track(&mut self, track: Option<TrackId>) -> Result<(), PlayerError> {
        self.media.update(self.id, |p| p.caption_track = track);
        Ok(())
    }

    fn audio_tracks(&self) -> Vec<TrackInfo> {
        self.audio.clone()
    }

    fn select_audio_track(&mut self, track: TrackId) -> Result<(), PlayerError> {
        self.media.update(self.id, |p| p.audio_track = Some(track));
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), PlayerError> {
        self.media.update(self.id, |p| {
            p.destroy_calls += 1;
            p.playing = false;
        });
        Ok(())
    }
}

// ============================================================================
// Manual poll timer
// ============================================================================

#[derive(Debug)]
struct Armed {
    item: ItemId,
    delay: Duration,
    cancelled: Arc<AtomicBool>,
}

/// Poll timer that only fires when the test says so
#[derive(Debug, Clone, Default)]
pub struct ManualTimer(Arc<Mutex<Vec<Armed>>>);

impl PollTimer for ManualTimer {
    fn arm(&mut self, item: ItemId, delay: Duration) -> PendingPoll {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.0.lock().unwrap().push(Armed {
            item,
            delay,
            cancelled: Arc::clone(&cancelled),
        });
        PendingPoll::new(move || cancelled.store(true, Ordering::SeqCst))
    }
}

impl ManualTimer {
    /// Remove and return every armed, not-cancelled tick
    pub fn take_due(&self) -> Vec<ItemId> {
        self.0
            .lock()
            .unwrap()
            .drain(..)
            .filter(|a| !a.cancelled.load(Ordering::SeqCst))
            .map(|a| a.item)
            .collect()
    }

    /// Number of armed ticks still live
    pub fn armed(&self) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|a| !a.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Delays of live armed ticks
    pub fn armed_delays(&self) -> Vec<Duration> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|a| !a.cancelled.load(Ordering::SeqCst))
            .map(|a| a.delay)
            .collect()
    }
}

// ============================================================================
// Graph builders
// ============================================================================

/// Node whose entry id is `entry-<id>`
pub fn node(id: &str, candidates: &[&str], default: Option<&str>) -> Node {
    Node {
        id: NodeId::from(id),
        entry_id: EntryId::new(entry(id)),
        prefetch_candidates: candidates.iter().map(|c| NodeId::from(*c)).collect(),
        default_target: default.map(NodeId::from),
    }
}

pub fn entry(node_id: &str) -> String {
    format!("entry-{}", node_id)
}

pub fn jump(from: &str, to: &str, at: f64) -> Hotspot {
    Hotspot {
        node_id: NodeId::from(from),
        appear_at_secs: at,
        action: HotspotAction::JumpToNode {
            target: NodeId::from(to),
            start_offset_secs: None,
        },
    }
}

/// A → [B @2.0s, C @1.0s], default D; B → [E]; C, D, E are leaves
pub fn scenario_graph() -> NodeGraph {
    NodeGraph::new(
        vec![
            node("A", &["B", "C"], Some("D")),
            node("B", &["E"], None),
            node("C", &[], None),
            node("D", &[], None),
            node("E", &[], None),
        ],
        vec![jump("A", "B", 2.0), jump("A", "C", 1.0), jump("B", "E", 4.0)],
    )
    .unwrap()
}

// ============================================================================
// Scheduler setup
// ============================================================================

pub struct Harness {
    pub scheduler: BufferListScheduler,
    pub media: FakeMedia,
    pub timer: ManualTimer,
    pub events: broadcast::Receiver<PrefetchEvent>,
}

impl Harness {
    pub fn new(graph: NodeGraph) -> Self {
        Self::with_config(graph, PrefetchConfig::default())
    }

    pub fn with_config(graph: NodeGraph, config: PrefetchConfig) -> Self {
        let media = FakeMedia::default();
        let timer = ManualTimer::default();
        let bus = EventBus::new(256);
        let events = bus.subscribe_all();
        let scheduler = BufferListScheduler::new(
            Arc::new(graph),
            config,
            media.provisioner(),
            Box::new(timer.clone()),
            bus,
        )
        .unwrap();
        Self {
            scheduler,
            media,
            timer,
            events,
        }
    }

    pub fn switch(&mut self, node: &str) -> Vec<String> {
        self.scheduler
            .switch_to(Some(&NodeId::from(node)))
            .unwrap()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    /// Fire every due tick once; asserts the single-buffering invariant after each
    pub fn pump(&mut self) -> usize {
        let due = self.timer.take_due();
        for item in &due {
            self.scheduler.on_poll(*item);
            assert!(
                self.scheduler.buffering_count() <= 1,
                "more than one item buffering"
            );
        }
        due.len()
    }

    /// Pump until nothing is armed (or `max_rounds` is hit)
    pub fn pump_until_idle(&mut self, max_rounds: usize) {
        for _ in 0..max_rounds {
            if self.pump() == 0 {
                return;
            }
        }
        panic!("scheduler still busy after {} rounds", max_rounds);
    }

    pub fn drain_events(&mut self) -> Vec<PrefetchEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn item_entries(&self) -> Vec<String> {
        self.scheduler
            .items()
            .iter()
            .map(|i| i.entry_id().to_string())
            .collect()
    }
}

/// Entry ids of BufferStarted events, in order
pub fn started(events: &[PrefetchEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            PrefetchEvent::BufferStarted { entry_id, .. } => Some(entry_id.to_string()),
            _ => None,
        })
        .collect()
}

/// (entry id, outcome) of BufferEnded events, in order
pub fn ended(events: &[PrefetchEvent]) -> Vec<(String, bvp_common::events::BufferOutcome)> {
    events
        .iter()
        .filter_map(|e| match e {
            PrefetchEvent::BufferEnded {
                entry_id, outcome, ..
            } => Some((entry_id.to_string(), *outcome)),
            _ => None,
        })
        .collect()
}

pub fn all_buffered_count(events: &[PrefetchEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PrefetchEvent::AllBuffered { .. }))
        .count()
}
