//! Player Provisioner contract
//!
//! The scheduler never touches media elements directly. It asks a
//! [`PlayerProvisioner`] for player instances and talks to them through
//! [`PlayerHandle`]. Real playback lives behind these traits; [`sim`] provides a
//! deterministic adapter for the CLI and tests.

pub mod sim;

use bvp_common::{EntryId, PlayerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::settings::PersistedSettings;

/// Error type of every player operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    /// Player could not be created
    #[error("failed to create player for {entry_id}: {reason}")]
    Creation { entry_id: EntryId, reason: String },

    /// Requested caption/audio track does not exist on this player
    #[error("no track matching language {0}")]
    TrackNotFound(String),

    /// Player does not support the operation
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Player was already torn down
    #[error("player destroyed")]
    Destroyed,

    /// Failure reported by the underlying runtime
    #[error("player backend error: {0}")]
    Backend(String),
}

/// How a new player should start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PlayMode {
    /// Start playing as soon as possible (active node)
    Autoplay,
    /// Load silently without playing (prefetch candidate)
    Preload,
}

/// Parameters for creating one player instance
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRequest {
    pub entry_id: EntryId,
    pub mode: PlayMode,
    pub show_poster: bool,
    /// Playback start position in seconds
    pub start_offset_secs: Option<f64>,
    /// Viewer preferences to apply at creation time
    pub settings: PersistedSettings,
}

impl PlayerRequest {
    pub fn play_immediate(&self) -> bool {
        self.mode == PlayMode::Autoplay
    }
}

/// Track index within one player
pub type TrackId = u32;

/// Caption or audio track exposed by a player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: TrackId,
    /// BCP 47 language tag ("en", "en-US", "pt-BR")
    pub language: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// A live player instance
///
/// Time values are seconds of media time. `None` means the runtime cannot
/// report the value (yet); callers must treat it as unknown, not zero.
pub trait PlayerHandle: Send {
    fn id(&self) -> PlayerId;

    fn entry_id(&self) -> &EntryId;

    /// End of the buffered range containing the playback position
    fn buffered_end_secs(&self) -> Option<f64>;

    fn duration_secs(&self) -> Option<f64>;

    fn is_playing(&self) -> bool;

    fn play(&mut self) -> Result<(), PlayerError>;

    fn pause(&mut self) -> Result<(), PlayerError>;

    fn seek(&mut self, position_secs: f64) -> Result<(), PlayerError>;

    fn set_muted(&mut self, muted: bool) -> Result<(), PlayerError>;

    /// Volume in 0.0..=1.0
    fn set_volume(&mut self, volume: f32) -> Result<(), PlayerError>;

    fn set_playback_rate(&mut self, rate: f32) -> Result<(), PlayerError>;

    fn caption_tracks(&self) -> Vec<TrackInfo>;

    /// Select a caption track, or `None` to turn captions off
    fn select_caption_track(&mut self, track: Option<TrackId>) -> Result<(), PlayerError>;

    fn audio_tracks(&self) -> Vec<TrackInfo>;

    fn select_audio_track(&mut self, track: TrackId) -> Result<(), PlayerError>;

    /// Release the instance and its media resources
    fn destroy(&mut self) -> Result<(), PlayerError>;
}

/// Factory for player instances
///
/// Implementations assign each player a fresh [`PlayerId`] and must apply
/// `request.settings` before returning so a new player matches the viewer's
/// prior choices.
pub trait PlayerProvisioner: Send {
    fn create_player(
        &mut self,
        request: &PlayerRequest,
    ) -> Result<Box<dyn PlayerHandle>, PlayerError>;
}

/// Player owned by a buffer item
///
/// Destroy is idempotent and never fails outward: teardown errors are logged
/// and swallowed. Dropping a `ManagedPlayer` destroys it.
pub struct ManagedPlayer {
    handle: Box<dyn PlayerHandle>,
    destroyed: bool,
}

impl ManagedPlayer {
    pub fn new(handle: Box<dyn PlayerHandle>) -> Self {
        Self {
            handle,
            destroyed: false,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.handle.id()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn handle(&self) -> &dyn PlayerHandle {
        self.handle.as_ref()
    }

    pub fn handle_mut(&mut self) -> &mut dyn PlayerHandle {
        self.handle.as_mut()
    }

    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        let id = self.handle.id();
        match self.handle.destroy() {
            Ok(()) => debug!("Destroyed {} ({})", id, self.handle.entry_id()),
            Err(e) => warn!(
                "Teardown of {} ({}) failed, ignoring: {}",
                id,
                self.handle.entry_id(),
                e
            ),
        }
    }
}

impl Drop for ManagedPlayer {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for ManagedPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedPlayer")
            .field("id", &self.handle.id())
            .field("entry_id", self.handle.entry_id())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
