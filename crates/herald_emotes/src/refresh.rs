#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use herald_domain::ChannelKey;
use herald_util::watch::ConfigWatcher;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{EmoteDef, EmoteFetcher, EmoteStore, ProviderKind};

/// Config keys whose changes trigger a catalog refresh.
pub const EMOTE_CONFIG_KEYS: [&str; 7] = [
	"enable_ffz",
	"enable_ffz_global",
	"enable_ffz_channel",
	"enable_bttv",
	"enable_bttv_global",
	"enable_bttv_channel",
	"enable_animated",
];

/// Compose the enabled external provider type list in priority order.
pub fn enabled_provider_types(ffz: bool, bttv: bool) -> Vec<ProviderKind> {
	let mut types = Vec::new();

	if ffz {
		types.push(ProviderKind::Ffz);
	}

	if bttv {
		types.push(ProviderKind::Bttv);
	}

	types
}

/// Emoticon-related configuration toggles.
#[derive(Debug, Clone, Copy)]
pub struct EmoteToggles {
	pub ffz: bool,
	pub ffz_global: bool,
	pub ffz_channel: bool,
	pub bttv: bool,
	pub bttv_global: bool,
	pub bttv_channel: bool,
	pub animated: bool,
}

impl Default for EmoteToggles {
	fn default() -> Self {
		Self {
			ffz: true,
			ffz_global: true,
			ffz_channel: true,
			bttv: true,
			bttv_global: true,
			bttv_channel: true,
			animated: true,
		}
	}
}

impl EmoteToggles {
	/// Provider types enabled for the global scope.
	pub fn enabled_global_types(&self) -> Vec<ProviderKind> {
		enabled_provider_types(self.ffz && self.ffz_global, self.bttv && self.bttv_global)
	}

	/// Provider types enabled for the channel scope.
	pub fn enabled_channel_types(&self) -> Vec<ProviderKind> {
		enabled_provider_types(self.ffz && self.ffz_channel, self.bttv && self.bttv_channel)
	}
}

/// Shared, updatable view of the emoticon toggles.
#[derive(Clone, Default)]
pub struct EmoteSettings {
	inner: Arc<RwLock<EmoteToggles>>,
}

impl EmoteSettings {
	pub fn new(toggles: EmoteToggles) -> Self {
		Self {
			inner: Arc::new(RwLock::new(toggles)),
		}
	}

	pub fn get(&self) -> EmoteToggles {
		*self.inner.read()
	}

	pub fn set(&self, toggles: EmoteToggles) {
		*self.inner.write() = toggles;
	}
}

/// Scheduling knobs for the refresher; both are configuration inputs.
#[derive(Debug, Clone)]
pub struct RefresherConfig {
	/// Fixed background refresh period.
	pub refresh_interval: Duration,

	/// Trailing-edge delay applied to config-change triggered refreshes.
	pub config_debounce: Duration,
}

impl Default for RefresherConfig {
	fn default() -> Self {
		Self {
			refresh_interval: Duration::from_secs(3600),
			config_debounce: Duration::from_secs(10),
		}
	}
}

/// Keeps the `EmoteStore` catalogs fresh.
///
/// Refreshes run per provider type; one type's fetch failure is logged and
/// leaves that type's stale catalog in place while the other types replace
/// theirs. Errors never reach the caller.
pub struct EmoteRefresher {
	store: Arc<EmoteStore>,
	fetcher: Arc<dyn EmoteFetcher>,
	settings: EmoteSettings,
	tracked: Mutex<HashSet<ChannelKey>>,
	cfg: RefresherConfig,
}

impl EmoteRefresher {
	pub fn new(
		store: Arc<EmoteStore>,
		fetcher: Arc<dyn EmoteFetcher>,
		settings: EmoteSettings,
		cfg: RefresherConfig,
	) -> Self {
		Self {
			store,
			fetcher,
			settings,
			tracked: Mutex::new(HashSet::new()),
			cfg,
		}
	}

	/// Refresh the global catalogs for the currently enabled types.
	pub async fn refresh_global(&self) {
		for kind in self.settings.get().enabled_global_types() {
			match self.fetcher.fetch_global(kind).await {
				Ok(defs) => self.store.set_global(kind, defs),
				Err(e) => {
					metrics::counter!("herald_emote_refresh_failures_total", "provider" => kind.as_str()).increment(1);
					warn!(provider = %kind, error = %e, "global emoticon refresh failed; serving stale catalog");
				}
			}
		}
	}

	/// Refresh one channel's catalogs and track it for scheduled refreshes.
	pub async fn refresh_channel(&self, channel: &ChannelKey) {
		self.tracked.lock().insert(channel.clone());

		for kind in self.settings.get().enabled_channel_types() {
			match self.fetcher.fetch_channel(kind, channel).await {
				Ok(defs) => self.store.set_channel(channel, kind, defs),
				Err(e) => {
					metrics::counter!("herald_emote_refresh_failures_total", "provider" => kind.as_str()).increment(1);
					warn!(
						provider = %kind,
						channel = %channel,
						error = %e,
						"channel emoticon refresh failed; serving stale catalog"
					);
				}
			}
		}
	}

	/// Drop a channel's catalogs when membership there ends.
	pub fn clear_channel(&self, channel: &ChannelKey) {
		self.tracked.lock().remove(channel);
		self.store.clear_channel(channel);
		debug!(channel = %channel, "cleared channel emoticon catalogs");
	}

	/// Refresh the global scope plus every tracked channel.
	pub async fn refresh_all(&self) {
		self.refresh_global().await;

		let channels: Vec<ChannelKey> = self.tracked.lock().iter().cloned().collect();
		for channel in channels {
			self.refresh_channel(&channel).await;
		}
	}

	/// Spawn the fixed-interval background refresh. The first tick fires
	/// immediately, so catalogs load at startup.
	pub fn spawn_interval(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
		let refresher = self.clone();

		tokio::spawn(async move {
			let mut interval = tokio::time::interval(refresher.cfg.refresh_interval);
			interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

			info!(
				interval_secs = refresher.cfg.refresh_interval.as_secs(),
				"emoticon refresh schedule started"
			);

			loop {
				interval.tick().await;
				refresher.refresh_all().await;
			}
		})
	}

	/// Subscribe to emoticon config keys and refresh after a trailing-edge
	/// debounce, so rapid toggling causes one refresh rather than a storm.
	pub fn spawn_config_listener(self: &Arc<Self>, watcher: &ConfigWatcher) -> tokio::task::JoinHandle<()> {
		let (tx, mut rx) = mpsc::channel::<()>(1);

		watcher.subscribe(EMOTE_CONFIG_KEYS, move |_| {
			let _ = tx.try_send(());
		});

		let refresher = self.clone();

		tokio::spawn(async move {
			while rx.recv().await.is_some() {
				tokio::time::sleep(refresher.cfg.config_debounce).await;

				// Coalesce anything that arrived during the delay.
				while rx.try_recv().is_ok() {}

				debug!("emoticon configuration changed; refreshing provider catalogs");
				refresher.refresh_all().await;
			}
		})
	}
}

/// Snapshot the definitions applicable to a message in `channel`, applying
/// the current toggles for scope enablement and the animated filter.
pub fn snapshot_for_channel(
	store: &EmoteStore,
	settings: &EmoteSettings,
	channel: Option<&ChannelKey>,
) -> Vec<EmoteDef> {
	let toggles = settings.get();

	store.snapshot(
		channel,
		&toggles.enabled_global_types(),
		&toggles.enabled_channel_types(),
		toggles.animated,
	)
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use async_trait::async_trait;

	use super::*;

	struct FakeFetcher {
		fail: Mutex<HashSet<ProviderKind>>,
		global_calls: AtomicUsize,
		channel_calls: AtomicUsize,
	}

	impl FakeFetcher {
		fn new() -> Self {
			Self {
				fail: Mutex::new(HashSet::new()),
				global_calls: AtomicUsize::new(0),
				channel_calls: AtomicUsize::new(0),
			}
		}

		fn failing(kinds: impl IntoIterator<Item = ProviderKind>) -> Self {
			let fetcher = Self::new();
			fetcher.fail.lock().extend(kinds);
			fetcher
		}

		fn def(kind: ProviderKind, code: &str) -> EmoteDef {
			EmoteDef {
				provider: kind,
				id: format!("{kind}:{code}"),
				code: code.to_string(),
				image_url: String::new(),
				animated: false,
			}
		}
	}

	#[async_trait]
	impl EmoteFetcher for FakeFetcher {
		async fn fetch_global(&self, kind: ProviderKind) -> anyhow::Result<Vec<EmoteDef>> {
			self.global_calls.fetch_add(1, Ordering::SeqCst);

			if self.fail.lock().contains(&kind) {
				anyhow::bail!("simulated {kind} outage");
			}

			Ok(vec![Self::def(kind, "fresh_global")])
		}

		async fn fetch_channel(&self, kind: ProviderKind, _channel: &ChannelKey) -> anyhow::Result<Vec<EmoteDef>> {
			self.channel_calls.fetch_add(1, Ordering::SeqCst);

			if self.fail.lock().contains(&kind) {
				anyhow::bail!("simulated {kind} outage");
			}

			Ok(vec![Self::def(kind, "fresh_channel")])
		}
	}

	fn refresher_with(fetcher: Arc<FakeFetcher>, store: Arc<EmoteStore>, cfg: RefresherConfig) -> Arc<EmoteRefresher> {
		Arc::new(EmoteRefresher::new(
			store,
			fetcher,
			EmoteSettings::new(EmoteToggles::default()),
			cfg,
		))
	}

	#[tokio::test]
	async fn failed_type_keeps_stale_catalog_while_others_replace() {
		let store = Arc::new(EmoteStore::new());
		store.set_global(
			ProviderKind::Bttv,
			vec![FakeFetcher::def(ProviderKind::Bttv, "stale_bttv")],
		);

		let fetcher = Arc::new(FakeFetcher::failing([ProviderKind::Bttv]));
		let refresher = refresher_with(fetcher, store.clone(), RefresherConfig::default());

		refresher.refresh_global().await;

		let snap = store.snapshot(None, &ProviderKind::PRIORITY, &[], true);
		let codes: Vec<&str> = snap.iter().map(|d| d.code.as_str()).collect();
		assert_eq!(codes, vec!["fresh_global", "stale_bttv"]);
	}

	#[tokio::test]
	async fn refresh_all_covers_tracked_channels() {
		let store = Arc::new(EmoteStore::new());
		let fetcher = Arc::new(FakeFetcher::new());
		let refresher = refresher_with(fetcher.clone(), store, RefresherConfig::default());

		let chan = ChannelKey::new("twitch", "somechannel").expect("valid channel key");
		refresher.refresh_channel(&chan).await;
		let after_join = fetcher.channel_calls.load(Ordering::SeqCst);

		refresher.refresh_all().await;
		assert_eq!(fetcher.channel_calls.load(Ordering::SeqCst), after_join * 2);

		refresher.clear_channel(&chan);
		refresher.refresh_all().await;
		assert_eq!(fetcher.channel_calls.load(Ordering::SeqCst), after_join * 2);
	}

	#[tokio::test]
	async fn config_changes_coalesce_into_one_refresh() {
		let store = Arc::new(EmoteStore::new());
		let fetcher = Arc::new(FakeFetcher::new());
		let refresher = refresher_with(
			fetcher.clone(),
			store,
			RefresherConfig {
				refresh_interval: Duration::from_secs(3600),
				config_debounce: Duration::from_millis(50),
			},
		);

		let watcher = ConfigWatcher::new();
		let _listener = refresher.spawn_config_listener(&watcher);

		watcher.notify("enable_bttv");
		watcher.notify("enable_ffz");
		watcher.notify("enable_animated");

		tokio::time::sleep(Duration::from_millis(300)).await;

		// One refresh for the burst: one global fetch per enabled type.
		assert_eq!(fetcher.global_calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn unrelated_config_keys_do_not_refresh() {
		let store = Arc::new(EmoteStore::new());
		let fetcher = Arc::new(FakeFetcher::new());
		let refresher = refresher_with(
			fetcher.clone(),
			store,
			RefresherConfig {
				refresh_interval: Duration::from_secs(3600),
				config_debounce: Duration::from_millis(20),
			},
		);

		let watcher = ConfigWatcher::new();
		let _listener = refresher.spawn_config_listener(&watcher);

		watcher.notify("cache_size");
		tokio::time::sleep(Duration::from_millis(150)).await;

		assert_eq!(fetcher.global_calls.load(Ordering::SeqCst), 0);
	}
}
