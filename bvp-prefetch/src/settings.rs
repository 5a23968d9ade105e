//! Settings Propagator
//!
//! Keeps the viewer's last-known playback preferences and fans each change
//! out to every buffered player except the one it came from, so switching to a
//! prefetched branch never resets mute, volume, captions, audio or rate.

use bvp_common::PlayerId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::player::{ManagedPlayer, PlayerError, PlayerHandle, TrackId, TrackInfo};

/// Caption preference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionPreference {
    Off,
    Language(String),
}

/// One viewer-driven playback preference change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PlayerSetting {
    Muted(bool),
    Volume(f32),
    Captions(CaptionPreference),
    AudioLanguage(String),
    PlaybackRate(f32),
}

/// Last-known viewer preferences; unset fields were never changed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSettings {
    pub muted: Option<bool>,
    pub volume: Option<f32>,
    pub captions: Option<CaptionPreference>,
    pub audio_language: Option<String>,
    pub playback_rate: Option<f32>,
}

impl PersistedSettings {
    /// Store a change (last write wins)
    pub fn record(&mut self, setting: &PlayerSetting) {
        match setting {
            PlayerSetting::Muted(muted) => self.muted = Some(*muted),
            PlayerSetting::Volume(volume) => self.volume = Some(volume.clamp(0.0, 1.0)),
            PlayerSetting::Captions(pref) => self.captions = Some(pref.clone()),
            PlayerSetting::AudioLanguage(lang) => self.audio_language = Some(lang.clone()),
            PlayerSetting::PlaybackRate(rate) => self.playback_rate = Some(*rate),
        }
    }

    /// Recorded preferences as settings, in a fixed replay order
    pub fn settings(&self) -> Vec<PlayerSetting> {
        let mut out = Vec::new();
        if let Some(muted) = self.muted {
            out.push(PlayerSetting::Muted(muted));
        }
        if let Some(volume) = self.volume {
            out.push(PlayerSetting::Volume(volume));
        }
        if let Some(rate) = self.playback_rate {
            out.push(PlayerSetting::PlaybackRate(rate));
        }
        if let Some(lang) = &self.audio_language {
            out.push(PlayerSetting::AudioLanguage(lang.clone()));
        }
        if let Some(pref) = &self.captions {
            out.push(PlayerSetting::Captions(pref.clone()));
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Replay every recorded preference onto a player, skipping failures
    pub fn apply_to(&self, player: &mut dyn PlayerHandle) {
        for setting in self.settings() {
            if let Err(e) = apply_setting(&setting, player) {
                debug!("Skipping {:?} on {}: {}", setting, player.id(), e);
            }
        }
    }
}

/// Apply one setting to one player
///
/// Captions fall back to "off" when no track matches the language; an
/// unmatched audio language is an error and leaves the player unchanged.
pub fn apply_setting(setting: &PlayerSetting, player: &mut dyn PlayerHandle) -> Result<(), PlayerError> {
    match setting {
        PlayerSetting::Muted(muted) => player.set_muted(*muted),
        PlayerSetting::Volume(volume) => player.set_volume(volume.clamp(0.0, 1.0)),
        PlayerSetting::PlaybackRate(rate) => player.set_playback_rate(*rate),
        PlayerSetting::Captions(CaptionPreference::Off) => player.select_caption_track(None),
        PlayerSetting::Captions(CaptionPreference::Language(lang)) => {
            let track = find_track(&player.caption_tracks(), lang);
            player.select_caption_track(track)
        }
        PlayerSetting::AudioLanguage(lang) => match find_track(&player.audio_tracks(), lang) {
            Some(track) => player.select_audio_track(track),
            None => Err(PlayerError::TrackNotFound(lang.clone())),
        },
    }
}

/// Find the track for a language tag
///
/// Exact (case-insensitive) match first, then primary subtag ("en" ~ "en-GB").
pub fn find_track(tracks: &[TrackInfo], language: &str) -> Option<TrackId> {
    fn primary(tag: &str) -> &str {
        tag.split(['-', '_']).next().unwrap_or(tag)
    }

    tracks
        .iter()
        .find(|t| t.language.eq_ignore_ascii_case(language))
        .or_else(|| {
            tracks
                .iter()
                .find(|t| primary(&t.language).eq_ignore_ascii_case(primary(language)))
        })
        .map(|t| t.id)
}

/// Process-lifetime settings snapshot plus fan-out
#[derive(Debug, Default)]
pub struct SettingsPropagator {
    snapshot: PersistedSettings,
}

impl SettingsPropagator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &PersistedSettings {
        &self.snapshot
    }

    /// Record `setting` and apply it to every live player except `origin`
    ///
    /// Returns how many players accepted the change. Players that cannot honour
    /// it are skipped; the rest still get it.
    pub fn propagate<'p>(
        &mut self,
        setting: &PlayerSetting,
        origin: Option<PlayerId>,
        players: impl IntoIterator<Item = &'p mut ManagedPlayer>,
    ) -> usize {
        self.snapshot.record(setting);

        let mut applied = 0;
        for player in players {
            if player.is_destroyed() || Some(player.id()) == origin {
                continue;
            }
            match apply_setting(setting, player.handle_mut()) {
                Ok(()) => applied += 1,
                Err(e) => debug!("Skipping {:?} on {}: {}", setting, player.id(), e),
            }
        }
        applied
    }
}
