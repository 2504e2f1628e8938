#![forbid(unsafe_code)]

mod adapters;
mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use herald_domain::ChannelKey;
use herald_emotes::{EmoteRefresher, EmoteSettings, EmoteStore, HttpEmoteFetcher, RefresherConfig};
use herald_util::watch::ConfigWatcher;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::adapters::DemoSource;
use crate::server::cache::SubjectCache;
use crate::server::dispatch::{DispatcherConfig, EventDispatcher};
use crate::server::presence::{PresenceTracker, TracingPresenceSink};
use crate::server::recipients::{Delivery, Recipient, RecipientRegistry, RegistryConfig};

/// Dev-only synthetic event source enable flag.
const HERALD_ENABLE_DEMO_SOURCE_ENV: &str = "HERALD_ENABLE_DEMO_SOURCE";

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: herald_server [--config path]\n\
\n\
Options:\n\
\t--config  Config file path (default: ~/.herald/config.toml)\n\
\t--help    Show this help\n\
"
	);
	std::process::exit(2)
}

fn parse_args() -> Option<PathBuf> {
	let mut config_path = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				config_path = Some(PathBuf::from(v));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	config_path
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,herald_server=debug".to_string());

	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false))
		.init();
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

fn demo_source_enabled() -> bool {
	cfg!(debug_assertions)
		&& std::env::var(HERALD_ENABLE_DEMO_SOURCE_ENV)
			.map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
			.unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let config_path = match parse_args() {
		Some(path) => path,
		None => crate::config::default_config_path()?,
	};
	let relay_cfg = crate::config::load_relay_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded relay config (toml + env overrides)");

	init_metrics(relay_cfg.relay.metrics_bind.as_deref());

	let emote_store = Arc::new(EmoteStore::new());
	let emote_settings = EmoteSettings::new(relay_cfg.emotes.toggles);
	let config_watcher = ConfigWatcher::new();

	let refresher = Arc::new(EmoteRefresher::new(
		emote_store.clone(),
		Arc::new(HttpEmoteFetcher::new()),
		emote_settings.clone(),
		RefresherConfig {
			refresh_interval: relay_cfg.emotes.refresh_interval,
			config_debounce: relay_cfg.emotes.config_debounce,
		},
	));
	let _refresh_schedule = refresher.spawn_interval();
	let _config_listener = refresher.spawn_config_listener(&config_watcher);

	let registry = RecipientRegistry::new(RegistryConfig {
		debug_logs: relay_cfg.relay.debug_log_events,
	});
	let cache = Arc::new(SubjectCache::new(relay_cfg.relay.cache_size));
	let presence = PresenceTracker::new(Arc::new(TracingPresenceSink), relay_cfg.relay.presence_debounce);

	let dispatcher = Arc::new(EventDispatcher::new(
		registry.clone(),
		cache,
		presence,
		emote_store,
		emote_settings,
		DispatcherConfig {
			debug_log_events: relay_cfg.relay.debug_log_events,
		},
	));

	info!(
		cache_size = relay_cfg.relay.cache_size,
		presence_debounce_ms = relay_cfg.relay.presence_debounce.as_millis(),
		"herald relay core ready"
	);

	if demo_source_enabled() {
		info!(
			env = HERALD_ENABLE_DEMO_SOURCE_ENV,
			"starting dev-only demo source (enabled by env)"
		);

		let channel = ChannelKey::new("demo", "lobby")?;
		refresher.refresh_channel(&channel).await;

		// A draining subscriber so the demo fan-out is observable end to end.
		let (recipient, mut rx) = Recipient::channel(1, relay_cfg.relay.subscriber_queue_capacity);
		registry
			.subscribe(herald_domain::SubjectKey::Channel(channel.clone()), recipient)
			.await;

		tokio::spawn(async move {
			while let Some(item) = rx.recv().await {
				match item {
					Delivery::Event { subject, event } => {
						debug!(
							subject = %subject,
							kind = ?event.kind,
							text = event.text.as_deref().unwrap_or_default(),
							annotations = event.annotations.len(),
							"demo subscriber received event"
						);
					}
					Delivery::Lagged { dropped } => {
						warn!(dropped, "demo subscriber lagged");
					}
				}
			}
		});

		DemoSource::new(vec![channel]).spawn(dispatcher.clone());
	}

	tokio::signal::ctrl_c().await?;
	info!("shutdown signal received; exiting");

	Ok(())
}
