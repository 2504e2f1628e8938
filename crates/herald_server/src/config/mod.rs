#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use herald_emotes::EmoteToggles;
use serde::Deserialize;
use tracing::{info, warn};

/// Default config path: `~/.herald/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".herald").join("config.toml"))
}

/// Load the relay config from TOML and env overrides.
#[allow(dead_code)]
pub fn load_relay_config() -> anyhow::Result<RelayConfig> {
	let path = default_config_path()?;
	load_relay_config_from_path(&path)
}

/// Same as `load_relay_config` but with an explicit config path.
pub fn load_relay_config_from_path(path: &Path) -> anyhow::Result<RelayConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = RelayConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg);
	validate(&mut cfg);

	Ok(cfg)
}

/// Relay config (v1). Bounds and intervals are inputs, not constants.
#[derive(Debug, Clone)]
pub struct RelayConfig {
	pub relay: RelaySettings,
	pub emotes: EmoteConfig,
}

/// Core relay settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
	/// Sliding-window bound per subject.
	pub cache_size: usize,
	/// Presence coalescing window.
	pub presence_debounce: Duration,
	/// Per-subscriber delivery queue capacity.
	pub subscriber_queue_capacity: usize,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Log each dispatched event at debug level.
	pub debug_log_events: bool,
}

impl Default for RelaySettings {
	fn default() -> Self {
		Self {
			cache_size: 150,
			presence_debounce: Duration::from_millis(150),
			subscriber_queue_capacity: 1024,
			metrics_bind: None,
			debug_log_events: false,
		}
	}
}

/// External emoticon provider settings.
#[derive(Debug, Clone)]
pub struct EmoteConfig {
	pub toggles: EmoteToggles,
	/// Fixed catalog refresh period.
	pub refresh_interval: Duration,
	/// Trailing-edge delay for config-change triggered refreshes.
	pub config_debounce: Duration,
}

impl Default for EmoteConfig {
	fn default() -> Self {
		Self {
			toggles: EmoteToggles::default(),
			refresh_interval: Duration::from_secs(3600),
			config_debounce: Duration::from_secs(10),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	relay: FileRelaySettings,

	#[serde(default)]
	emotes: FileEmoteSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileRelaySettings {
	cache_size: Option<usize>,
	presence_debounce_ms: Option<u64>,
	subscriber_queue_capacity: Option<usize>,
	metrics_bind: Option<String>,
	debug_log_events: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileEmoteSettings {
	enable_ffz: Option<bool>,
	enable_ffz_global: Option<bool>,
	enable_ffz_channel: Option<bool>,
	enable_bttv: Option<bool>,
	enable_bttv_global: Option<bool>,
	enable_bttv_channel: Option<bool>,
	enable_animated: Option<bool>,
	refresh_secs: Option<u64>,
	config_debounce_secs: Option<u64>,
}

impl RelayConfig {
	fn from_file(file: FileConfig) -> Self {
		let relay_defaults = RelaySettings::default();
		let emote_defaults = EmoteConfig::default();
		let toggle_defaults = EmoteToggles::default();

		Self {
			relay: RelaySettings {
				cache_size: file.relay.cache_size.unwrap_or(relay_defaults.cache_size),
				presence_debounce: file
					.relay
					.presence_debounce_ms
					.map(Duration::from_millis)
					.unwrap_or(relay_defaults.presence_debounce),
				subscriber_queue_capacity: file
					.relay
					.subscriber_queue_capacity
					.unwrap_or(relay_defaults.subscriber_queue_capacity),
				metrics_bind: file.relay.metrics_bind.filter(|s| !s.trim().is_empty()),
				debug_log_events: file.relay.debug_log_events.unwrap_or(false),
			},
			emotes: EmoteConfig {
				toggles: EmoteToggles {
					ffz: file.emotes.enable_ffz.unwrap_or(toggle_defaults.ffz),
					ffz_global: file.emotes.enable_ffz_global.unwrap_or(toggle_defaults.ffz_global),
					ffz_channel: file.emotes.enable_ffz_channel.unwrap_or(toggle_defaults.ffz_channel),
					bttv: file.emotes.enable_bttv.unwrap_or(toggle_defaults.bttv),
					bttv_global: file.emotes.enable_bttv_global.unwrap_or(toggle_defaults.bttv_global),
					bttv_channel: file.emotes.enable_bttv_channel.unwrap_or(toggle_defaults.bttv_channel),
					animated: file.emotes.enable_animated.unwrap_or(toggle_defaults.animated),
				},
				refresh_interval: file
					.emotes
					.refresh_secs
					.map(Duration::from_secs)
					.unwrap_or(emote_defaults.refresh_interval),
				config_debounce: file
					.emotes
					.config_debounce_secs
					.map(Duration::from_secs)
					.unwrap_or(emote_defaults.config_debounce),
			},
		}
	}
}

fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut RelayConfig) {
	if let Ok(v) = std::env::var("HERALD_CACHE_SIZE")
		&& let Ok(size) = v.trim().parse::<usize>()
	{
		cfg.relay.cache_size = size;
		info!(size, "relay config: cache_size overridden by env");
	}

	if let Ok(v) = std::env::var("HERALD_PRESENCE_DEBOUNCE_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.relay.presence_debounce = Duration::from_millis(ms);
		info!(ms, "relay config: presence_debounce overridden by env");
	}

	if let Ok(v) = std::env::var("HERALD_SUBSCRIBER_QUEUE_CAPACITY")
		&& let Ok(capacity) = v.trim().parse::<usize>()
	{
		cfg.relay.subscriber_queue_capacity = capacity;
		info!(capacity, "relay config: subscriber_queue_capacity overridden by env");
	}

	if let Ok(v) = std::env::var("HERALD_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.relay.metrics_bind = Some(v);
			info!("relay config: metrics_bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HERALD_DEBUG_LOG_EVENTS")
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.relay.debug_log_events = enabled;
		info!(enabled, "relay config: debug_log_events overridden by env");
	}

	if let Ok(v) = std::env::var("HERALD_ENABLE_FFZ")
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.emotes.toggles.ffz = enabled;
		info!(enabled, "emote config: enable_ffz overridden by env");
	}

	if let Ok(v) = std::env::var("HERALD_ENABLE_BTTV")
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.emotes.toggles.bttv = enabled;
		info!(enabled, "emote config: enable_bttv overridden by env");
	}

	if let Ok(v) = std::env::var("HERALD_ENABLE_ANIMATED_EMOTES")
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.emotes.toggles.animated = enabled;
		info!(enabled, "emote config: enable_animated overridden by env");
	}

	if let Ok(v) = std::env::var("HERALD_EMOTE_REFRESH_SECS")
		&& let Ok(secs) = v.trim().parse::<u64>()
	{
		cfg.emotes.refresh_interval = Duration::from_secs(secs);
		info!(secs, "emote config: refresh interval overridden by env");
	}

	if let Ok(v) = std::env::var("HERALD_EMOTE_CONFIG_DEBOUNCE_SECS")
		&& let Ok(secs) = v.trim().parse::<u64>()
	{
		cfg.emotes.config_debounce = Duration::from_secs(secs);
		info!(secs, "emote config: config debounce overridden by env");
	}
}

fn validate(cfg: &mut RelayConfig) {
	if cfg.relay.cache_size == 0 {
		let fallback = RelaySettings::default().cache_size;
		warn!(fallback, "relay config: cache_size must be positive; using default");
		cfg.relay.cache_size = fallback;
	}

	if cfg.relay.subscriber_queue_capacity == 0 {
		let fallback = RelaySettings::default().subscriber_queue_capacity;
		warn!(
			fallback,
			"relay config: subscriber_queue_capacity must be positive; using default"
		);
		cfg.relay.subscriber_queue_capacity = fallback;
	}

	if cfg.emotes.refresh_interval < cfg.emotes.config_debounce {
		warn!(
			refresh_secs = cfg.emotes.refresh_interval.as_secs(),
			debounce_secs = cfg.emotes.config_debounce.as_secs(),
			"emote config: refresh interval shorter than config debounce; swapping"
		);
		std::mem::swap(&mut cfg.emotes.refresh_interval, &mut cfg.emotes.config_debounce);
	}
}
