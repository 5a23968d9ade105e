//! bvp-prefetch configuration
//!
//! Buffering policy knobs live in the `[prefetch]` table of the TOML config
//! file; `[logging]` configures the binary's subscriber. Every field has a
//! built-in default so an absent file or table is valid.

use bvp_common::config::LoggingConfig;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};

/// Top-level config file layout
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Buffering policy
    #[serde(default)]
    pub prefetch: PrefetchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Buffering policy for the prefetch scheduler
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Interval between buffered-range checks while an item is buffering
    pub poll_interval_ms: u64,

    /// Delay before a freshly buffering item's first check
    pub initial_poll_delay_ms: u64,

    /// Poll ticks an item may spend buffering before it is forced Ready
    pub max_poll_attempts: u32,

    /// Entries shorter than this are marked Ready without buffering
    pub short_entry_threshold_secs: f64,

    /// Seconds of media to buffer ahead for each candidate
    pub target_buffer_secs: f64,

    /// Item is Ready once buffered end exceeds target minus this margin
    pub safety_margin_secs: f64,

    /// Margin used instead of `safety_margin_secs` when the legacy profile is on
    pub legacy_safety_margin_secs: f64,

    /// Use the legacy margin (hosts with unreliable buffered-range reporting)
    pub use_legacy_safety_margin: bool,

    /// Capacity of each event bus channel
    pub event_bus_capacity: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            initial_poll_delay_ms: 200,
            max_poll_attempts: 60,
            short_entry_threshold_secs: 6.0,
            target_buffer_secs: 10.0,
            safety_margin_secs: 2.5,
            legacy_safety_margin_secs: 0.8,
            use_legacy_safety_margin: false,
            event_bus_capacity: 256,
        }
    }
}

impl PrefetchConfig {
    /// Check that the policy is usable
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.max_poll_attempts == 0 {
            return Err(Error::Config("max_poll_attempts must be positive".to_string()));
        }
        if !self.short_entry_threshold_secs.is_finite() || self.short_entry_threshold_secs < 0.0 {
            return Err(Error::Config(format!(
                "short_entry_threshold_secs must be a non-negative number, got {}",
                self.short_entry_threshold_secs
            )));
        }
        if !self.target_buffer_secs.is_finite() || self.target_buffer_secs <= 0.0 {
            return Err(Error::Config(format!(
                "target_buffer_secs must be positive, got {}",
                self.target_buffer_secs
            )));
        }
        for (name, margin) in [
            ("safety_margin_secs", self.safety_margin_secs),
            ("legacy_safety_margin_secs", self.legacy_safety_margin_secs),
        ] {
            if !margin.is_finite() || margin < 0.0 || margin >= self.target_buffer_secs {
                return Err(Error::Config(format!(
                    "{} must be in [0, target_buffer_secs), got {}",
                    name, margin
                )));
            }
        }
        Ok(())
    }

    /// Margin in effect for the current profile
    pub fn effective_safety_margin(&self) -> f64 {
        if self.use_legacy_safety_margin {
            self.legacy_safety_margin_secs
        } else {
            self.safety_margin_secs
        }
    }

    /// Buffered end (seconds) at which an item counts as Ready
    pub fn ready_threshold_secs(&self) -> f64 {
        self.target_buffer_secs - self.effective_safety_margin()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn initial_poll_delay(&self) -> Duration {
        Duration::from_millis(self.initial_poll_delay_ms)
    }
}
