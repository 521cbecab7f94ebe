//! Generation settings
//!
//! Operational knobs for the background scheduler: provider selection,
//! concurrency, sweep cadence, retry delays, and the image failure gate.
//! Settings are serializable because they cross infrastructure boundaries
//! (persisted preferences, env overrides).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which image provider card/suggestion images go to first.
/// Deck icons always use the remote provider regardless.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageProviderPreference {
    OnDevice,
    Remote,
}

impl std::fmt::Display for ImageProviderPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnDevice => write!(f, "on_device"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

impl std::str::FromStr for ImageProviderPreference {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_device" | "ondevice" | "local" => Ok(Self::OnDevice),
            "remote" => Ok(Self::Remote),
            _ => Err(()),
        }
    }
}

fn default_worker_capacity() -> usize {
    2
}

fn default_sweep_ticks() -> u32 {
    30
}

fn default_tick_secs() -> u64 {
    1
}

fn default_retry_delays_secs() -> Vec<u64> {
    vec![60, 300, 900]
}

fn default_image_failure_threshold() -> u32 {
    3
}

fn default_image_size() -> u32 {
    512
}

fn default_style_suffix() -> String {
    "flat illustration, soft colors".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// First-choice provider for card/suggestion images
    pub provider_preference: ImageProviderPreference,
    /// Fall back to the remote provider when an on-device attempt fails.
    /// Opt-in policy flag; also requires a valid remote credential.
    pub allow_remote_fallback: bool,
    /// Style suffix appended to remote prompts
    #[serde(default = "default_style_suffix")]
    pub style_suffix: String,
    /// Max simultaneously in-flight generation calls
    #[serde(default = "default_worker_capacity")]
    pub worker_capacity: usize,
    /// Idle sleep length, in ticks
    #[serde(default = "default_sweep_ticks")]
    pub sweep_ticks: u32,
    /// Length of one sleep tick, seconds
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Escalating retry delays, seconds; ordinals past the end are terminal
    #[serde(default = "default_retry_delays_secs")]
    pub retry_delays_secs: Vec<u64>,
    /// Consecutive image failures after which a card is excluded from scans
    #[serde(default = "default_image_failure_threshold")]
    pub image_failure_threshold: u32,
    #[serde(default = "default_image_size")]
    pub image_width: u32,
    #[serde(default = "default_image_size")]
    pub image_height: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider_preference: ImageProviderPreference::Remote,
            allow_remote_fallback: false,
            style_suffix: default_style_suffix(),
            worker_capacity: default_worker_capacity(),
            sweep_ticks: default_sweep_ticks(),
            tick_secs: default_tick_secs(),
            retry_delays_secs: default_retry_delays_secs(),
            image_failure_threshold: default_image_failure_threshold(),
            image_width: default_image_size(),
            image_height: default_image_size(),
        }
    }
}

impl GenerationSettings {
    /// Build settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(value) = std::env::var("RECALL_IMAGE_PROVIDER") {
            if let Ok(pref) = value.parse() {
                settings.provider_preference = pref;
            }
        }
        if let Ok(value) = std::env::var("RECALL_REMOTE_FALLBACK") {
            settings.allow_remote_fallback = matches!(value.as_str(), "1" | "true" | "yes");
        }
        if let Ok(value) = std::env::var("RECALL_IMAGE_STYLE") {
            settings.style_suffix = value;
        }
        if let Ok(value) = std::env::var("RECALL_WORKER_CAPACITY") {
            if let Ok(capacity) = value.parse() {
                settings.worker_capacity = capacity;
            }
        }
        if let Ok(value) = std::env::var("RECALL_SWEEP_TICKS") {
            if let Ok(ticks) = value.parse() {
                settings.sweep_ticks = ticks;
            }
        }
        if let Ok(value) = std::env::var("RECALL_IMAGE_FAILURE_THRESHOLD") {
            if let Ok(threshold) = value.parse() {
                settings.image_failure_threshold = threshold;
            }
        }

        settings
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_secs
            .iter()
            .map(|secs| Duration::from_secs(*secs))
            .collect()
    }
}
