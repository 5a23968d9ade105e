//! Simulated player runtime
//!
//! Players buffer at a fixed rate against the tokio clock, so tests running with
//! a paused clock get fully deterministic buffered ranges. Every player's
//! observable state is mirrored into a shared [`SimRegistry`] for inspection.

use bvp_common::{EntryId, PlayerId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

use super::{PlayMode, PlayerError, PlayerHandle, PlayerProvisioner, PlayerRequest, TrackId, TrackInfo};

/// Behaviour of simulated players
#[derive(Debug, Clone)]
pub struct SimProfile {
    /// Media seconds buffered per wall-clock second
    pub fill_rate: f64,
    /// Duration for entries not listed in `durations`
    pub default_duration_secs: f64,
    pub durations: HashMap<EntryId, f64>,
    pub caption_languages: Vec<String>,
    pub audio_languages: Vec<String>,
    /// Entries whose creation always fails
    pub failing_creation: Vec<EntryId>,
    /// Entries whose teardown always fails
    pub failing_teardown: Vec<EntryId>,
}

impl Default for SimProfile {
    fn default() -> Self {
        Self {
            fill_rate: 4.0,
            default_duration_secs: 60.0,
            durations: HashMap::new(),
            caption_languages: vec!["en".to_string(), "es".to_string()],
            audio_languages: vec!["en".to_string()],
            failing_creation: Vec::new(),
            failing_teardown: Vec::new(),
        }
    }
}

/// Observable state of one simulated player
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimPlayerState {
    pub id: PlayerId,
    pub entry_id: EntryId,
    pub mode: PlayMode,
    pub show_poster: bool,
    pub muted: bool,
    pub volume: f32,
    pub playback_rate: f32,
    pub caption_track: Option<TrackId>,
    pub audio_track: Option<TrackId>,
    pub playing: bool,
    pub position_secs: f64,
    pub destroy_calls: u32,
}

/// Shared view over all players a [`SimulatedProvisioner`] created
#[derive(Debug, Clone, Default)]
pub struct SimRegistry(Arc<Mutex<HashMap<PlayerId, SimPlayerState>>>);

impl SimRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<PlayerId, SimPlayerState>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, id: PlayerId) -> Option<SimPlayerState> {
        self.lock().get(&id).cloned()
    }

    /// Players ever created for an entry, oldest first
    pub fn players_for(&self, entry_id: &EntryId) -> Vec<SimPlayerState> {
        let mut players: Vec<_> = self
            .lock()
            .values()
            .filter(|p| &p.entry_id == entry_id)
            .cloned()
            .collect();
        players.sort_by_key(|p| p.id);
        players
    }

    /// Players not yet destroyed
    pub fn live_players(&self) -> Vec<SimPlayerState> {
        let mut players: Vec<_> = self
            .lock()
            .values()
            .filter(|p| p.destroy_calls == 0)
            .cloned()
            .collect();
        players.sort_by_key(|p| p.id);
        players
    }

    /// Total destroy calls across every player of an entry
    pub fn destroy_count(&self, entry_id: &EntryId) -> u32 {
        self.lock()
            .values()
            .filter(|p| &p.entry_id == entry_id)
            .map(|p| p.destroy_calls)
            .sum()
    }

    fn update<R>(&self, id: PlayerId, f: impl FnOnce(&mut SimPlayerState) -> R) -> Option<R> {
        self.lock().get_mut(&id).map(f)
    }
}

/// Provisioner producing simulated players
#[derive(Debug)]
pub struct SimulatedProvisioner {
    profile: SimProfile,
    next_id: u64,
    registry: SimRegistry,
}

impl SimulatedProvisioner {
    pub fn new(profile: SimProfile) -> Self {
        Self {
            profile,
            next_id: 1,
            registry: SimRegistry::default(),
        }
    }

    pub fn registry(&self) -> SimRegistry {
        self.registry.clone()
    }

    pub fn destroy_count(&self, entry_id: &EntryId) -> u32 {
        self.registry.destroy_count(entry_id)
    }

    fn tracks(languages: &[String]) -> Vec<TrackInfo> {
        languages
            .iter()
            .enumerate()
            .map(|(i, lang)| TrackInfo {
                id: i as TrackId,
                language: lang.clone(),
                label: None,
            })
            .collect()
    }
}

impl PlayerProvisioner for SimulatedProvisioner {
    fn create_player(
        &mut self,
        request: &PlayerRequest,
    ) -> Result<Box<dyn PlayerHandle>, PlayerError> {
        if self.profile.failing_creation.contains(&request.entry_id) {
            return Err(PlayerError::Creation {
                entry_id: request.entry_id.clone(),
                reason: "simulated creation failure".to_string(),
            });
        }

        let id = PlayerId(self.next_id);
        self.next_id += 1;

        let start = request.start_offset_secs.unwrap_or(0.0).max(0.0);
        let duration = self
            .profile
            .durations
            .get(&request.entry_id)
            .copied()
            .unwrap_or(self.profile.default_duration_secs);

        self.registry.lock().insert(
            id,
            SimPlayerState {
                id,
                entry_id: request.entry_id.clone(),
                mode: request.mode,
                show_poster: request.show_poster,
                muted: false,
                volume: 1.0,
                playback_rate: 1.0,
                caption_track: None,
                audio_track: None,
                playing: request.play_immediate(),
                position_secs: start,
                destroy_calls: 0,
            },
        );

        let mut player = SimPlayer {
            id,
            entry_id: request.entry_id.clone(),
            created_at: Instant::now(),
            duration_secs: duration,
            fill_rate: self.profile.fill_rate,
            start_secs: start,
            captions: Self::tracks(&self.profile.caption_languages),
            audio: Self::tracks(&self.profile.audio_languages),
            fail_teardown: self.profile.failing_teardown.contains(&request.entry_id),
            registry: self.registry.clone(),
        };
        request.settings.apply_to(&mut player);

        debug!("Simulated {} created for {} ({:?})", id, request.entry_id, request.mode);
        Ok(Box::new(player))
    }
}

struct SimPlayer {
    id: PlayerId,
    entry_id: EntryId,
    created_at: Instant,
    duration_secs: f64,
    fill_rate: f64,
    start_secs: f64,
    captions: Vec<TrackInfo>,
    audio: Vec<TrackInfo>,
    fail_teardown: bool,
    registry: SimRegistry,
}

impl SimPlayer {
    fn update<R>(&self, f: impl FnOnce(&mut SimPlayerState) -> R) -> Result<R, PlayerError> {
        match self.registry.update(self.id, |state| {
            if state.destroy_calls > 0 {
                None
            } else {
                Some(f(state))
            }
        }) {
            Some(Some(r)) => Ok(r),
            _ => Err(PlayerError::Destroyed),
        }
    }
}

impl PlayerHandle for SimPlayer {
    fn id(&self) -> PlayerId {
        self.id
    }

    fn entry_id(&self) -> &EntryId {
        &self.entry_id
    }

    fn buffered_end_secs(&self) -> Option<f64> {
        let elapsed = self.created_at.elapsed().as_secs_f64();
        Some((self.start_secs + elapsed * self.fill_rate).min(self.duration_secs))
    }

    fn duration_secs(&self) -> Option<f64> {
        Some(self.duration_secs)
    }

    fn is_playing(&self) -> bool {
        self.update(|s| s.playing).unwrap_or(false)
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.update(|s| s.playing = true)
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        self.update(|s| s.playing = false)
    }

    fn seek(&mut self, position_secs: f64) -> Result<(), PlayerError> {
        let clamped = position_secs.clamp(0.0, self.duration_secs);
        self.update(|s| s.position_secs = clamped)
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), PlayerError> {
        self.update(|s| s.muted = muted)
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), PlayerError> {
        self.update(|s| s.volume = volume)
    }

    fn set_playback_rate(&mut self, rate: f32) -> Result<(), PlayerError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(PlayerError::Unsupported(format!("playback rate {}", rate)));
        }
        self.update(|s| s.playback_rate = rate)
    }

    fn caption_tracks(&self) -> Vec<TrackInfo> {
        self.captions.clone()
    }

    fn select_caption_track(&mut self, track: Option<TrackId>) -> Result<(), PlayerError> {
        if let Some(id) = track {
            if !self.captions.iter().any(|t| t.id == id) {
                return Err(PlayerError::TrackNotFound(id.to_string()));
            }
        }
        self.update(|s| s.caption_track = track)
    }

    fn audio_tracks(&self) -> Vec<TrackInfo> {
        self.audio.clone()
    }

    fn select_audio_track(&mut self, track: TrackId) -> Result<(), PlayerError> {
        if !self.audio.iter().any(|t| t.id == track) {
            return Err(PlayerError::TrackNotFound(track.to_string()));
        }
        self.update(|s| s.audio_track = Some(track))
    }

    fn destroy(&mut self) -> Result<(), PlayerError> {
        self.registry.update(self.id, |s| {
            s.destroy_calls += 1;
            s.playing = false;
        });
        if self.fail_teardown {
            return Err(PlayerError::Backend("simulated teardown failure".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{PersistedSettings, PlayerSetting};
    use std::time::Duration;

    fn request(entry: &str, settings: PersistedSettings) -> PlayerRequest {
        PlayerRequest {
            entry_id: EntryId::from(entry),
            mode: PlayMode::Preload,
            show_poster: false,
            start_offset_secs: None,
            settings,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_fills_at_rate_and_caps_at_duration() {
        let mut provisioner = SimulatedProvisioner::new(SimProfile {
            fill_rate: 2.0,
            default_duration_secs: 5.0,
            ..Default::default()
        });
        let player = provisioner
            .create_player(&request("e", PersistedSettings::default()))
            .unwrap();

        assert_eq!(player.buffered_end_secs(), Some(0.0));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(player.buffered_end_secs(), Some(2.0));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(player.buffered_end_secs(), Some(5.0));
    }

    #[tokio::test]
    async fn test_settings_applied_at_creation() {
        let mut settings = PersistedSettings::default();
        settings.record(&PlayerSetting::Muted(true));
        settings.record(&PlayerSetting::PlaybackRate(1.5));

        let mut provisioner = SimulatedProvisioner::new(SimProfile::default());
        let registry = provisioner.registry();
        let player = provisioner.create_player(&request("e", settings)).unwrap();

        let state = registry.get(player.id()).unwrap();
        assert!(state.muted);
        assert_eq!(state.playback_rate, 1.5);
    }

    #[tokio::test]
    async fn test_creation_failure() {
        let mut provisioner = SimulatedProvisioner::new(SimProfile {
            failing_creation: vec![EntryId::from("broken")],
            ..Default::default()
        });
        let result = provisioner.create_player(&request("broken", PersistedSettings::default()));
        assert!(matches!(result, Err(PlayerError::Creation { .. })));
    }
}
