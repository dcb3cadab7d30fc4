//! Configuration types for the companion controller.
//!
//! All sections are strongly typed with explicit defaults and load with
//! `#[serde(default)]`, so a partial config file is always valid. Live
//! reconfiguration happens through [`ConfigStore`], which wraps a `watch`
//! channel: components re-read the current value on each decision point and
//! the event loop pushes a `config_update` envelope when the value changes.

use crate::protocol::{Character, VoicePack};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Top-level configuration for the companion controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    /// Overlay channel settings.
    pub channel: ChannelConfig,
    /// Overlay-visible appearance and voice settings.
    pub overlay: OverlaySettings,
    /// Proactive interaction scheduling.
    pub proactive: ProactiveConfig,
    /// Code change debouncing.
    pub watcher: WatcherConfig,
    /// External news feed.
    pub news: NewsConfig,
    /// Conversation history retention.
    pub history: HistoryConfig,
}

/// Overlay channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Loopback port to bind. `0` picks an ephemeral port.
    pub port: u16,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { port: 0 }
    }
}

/// The slice of configuration the overlay renderer needs; this is the
/// payload of the `config_update` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Character sprite.
    pub character: Character,
    /// Voice pack for synthesized speech.
    pub voice_pack: VoicePack,
    /// Whether spoken output is enabled at all.
    pub enable_voice_output: bool,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            character: Character::default(),
            voice_pack: VoicePack::default(),
            enable_voice_output: true,
        }
    }
}

/// Proactive interaction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProactiveConfig {
    /// Generate tips for significant code edits.
    pub enable_code_tips: bool,
    /// Periodically share news from the external feed.
    pub enable_news: bool,
    /// Generic proactive chatter (mood / reflection / amusement).
    pub enable_chat: bool,
    /// Continuous-engagement minutes before a health reminder fires.
    ///
    /// Re-read on every check, so runtime changes take effect without a
    /// restart.
    pub health_reminder_minutes: u64,
    /// Scheduler scan interval in seconds.
    pub tick_secs: u64,
    /// Upper bound of the randomized delay between a scan match and the
    /// actual trigger.
    pub max_jitter_secs: u64,
    /// Delay before the first scheduler scan after startup.
    pub startup_grace_secs: u64,
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            enable_code_tips: true,
            enable_news: true,
            enable_chat: true,
            health_reminder_minutes: 45,
            tick_secs: 5 * 60,
            max_jitter_secs: 5 * 60,
            startup_grace_secs: 10 * 60,
        }
    }
}

/// Code change debouncing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Quiet period after the last edit before a batch is evaluated.
    pub quiet_period_secs: u64,
    /// Minimum spacing between two code tips.
    pub min_tip_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            quiet_period_secs: 5,
            min_tip_interval_secs: 60,
        }
    }
}

/// External news feed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    /// RSS feed URL for the primary fetch.
    pub feed_url: String,
    /// Cache refresh interval in minutes.
    pub refresh_minutes: u64,
    /// Bounded timeout for the remote fetch.
    pub fetch_timeout_secs: u64,
    /// Maximum cached items.
    pub max_items: usize,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            feed_url: "https://hnrss.org/frontpage?count=8".to_owned(),
            refresh_minutes: 30,
            fetch_timeout_secs: 10,
            max_items: 10,
        }
    }
}

/// Conversation history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Most recent turns retained (FIFO eviction).
    pub max_turns: usize,
    /// Override for the history file location. `None` = default data dir.
    pub path: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            path: None,
        }
    }
}

impl CompanionConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::CompanionError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::CompanionError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/cricket/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("cricket")
            .join("config.toml")
    }
}

/// Shared live configuration.
///
/// One instance is constructed at startup and handed by reference to every
/// component that needs it; there is no ambient global. `get` returns a
/// snapshot, `update` replaces the value and wakes all subscribers.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    tx: Arc<watch::Sender<CompanionConfig>>,
}

impl ConfigStore {
    /// Create a store holding the given initial configuration.
    #[must_use]
    pub fn new(config: CompanionConfig) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self { tx: Arc::new(tx) }
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn get(&self) -> CompanionConfig {
        self.tx.borrow().clone()
    }

    /// Replace the configuration and notify subscribers.
    pub fn update(&self, config: CompanionConfig) {
        self.tx.send_replace(config);
    }

    /// Subscribe to configuration changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CompanionConfig> {
        self.tx.subscribe()
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(CompanionConfig::default())
    }
}
