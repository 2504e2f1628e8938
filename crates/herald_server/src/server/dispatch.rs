#![forbid(unsafe_code)]

use std::sync::Arc;

use herald_domain::{ChatEvent, EventKind, validate_event};
use herald_emotes::{EmoteSettings, EmoteStore, generate_annotations, snapshot_for_channel};
use tracing::{debug, warn};

use crate::server::cache::SubjectCache;
use crate::server::presence::PresenceTracker;
use crate::server::recipients::{DeliveryStats, RecipientRegistry};

/// Settings for the event dispatcher.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
	pub debug_log_events: bool,
}

/// Orchestrates the per-event pipeline: validate, annotate when textual,
/// cache, record presence, fan out.
pub struct EventDispatcher {
	registry: RecipientRegistry,
	cache: Arc<SubjectCache>,
	presence: PresenceTracker,
	emotes: Arc<EmoteStore>,
	emote_settings: EmoteSettings,
	cfg: DispatcherConfig,
}

impl EventDispatcher {
	pub fn new(
		registry: RecipientRegistry,
		cache: Arc<SubjectCache>,
		presence: PresenceTracker,
		emotes: Arc<EmoteStore>,
		emote_settings: EmoteSettings,
		cfg: DispatcherConfig,
	) -> Self {
		Self {
			registry,
			cache,
			presence,
			emotes,
			emote_settings,
			cfg,
		}
	}

	/// Process one inbound event. Fire-and-forget: errors degrade to a
	/// dropped event or skipped deliveries, never to a failure the ingest
	/// caller sees.
	pub async fn dispatch(&self, mut event: ChatEvent) -> DeliveryStats {
		if let Err(e) = validate_event(&event) {
			metrics::counter!("herald_events_rejected_total").increment(1);
			warn!(subject = %event.subject, error = %e, "dropping malformed inbound event");
			return DeliveryStats::default();
		}

		// Annotation runs before the cache append so the cached window
		// holds the same immutable event subscribers receive. Text-less
		// events skip only this stage.
		if event.text.is_some() {
			let native = std::mem::take(&mut event.annotations);
			let defs = snapshot_for_channel(&self.emotes, &self.emote_settings, event.subject.as_channel());

			let merged = {
				let text = event.text.as_deref().unwrap_or_default();
				generate_annotations(text, &defs, native)
			};
			event.annotations = merged;
		}

		let subject = event.subject.clone();
		let username = event.username.clone();
		let time_ms = event.time_ms;
		let records_presence = matches!(event.kind, EventKind::Message | EventKind::Action | EventKind::Join);

		let event = Arc::new(event);

		self.cache.append(&subject, event.clone()).await;

		if records_presence
			&& let Some(username) = username
		{
			self.presence.record(&username, &subject, time_ms);
		}

		let stats = self.registry.deliver(&subject, event).await;

		metrics::counter!("herald_events_dispatched_total").increment(1);
		if stats.dropped > 0 {
			metrics::counter!("herald_deliveries_dropped_total").increment(stats.dropped);
		}

		if self.cfg.debug_log_events {
			debug!(
				subject = %subject,
				delivered = stats.delivered,
				dropped = stats.dropped,
				"event dispatched"
			);
		}

		stats
	}

	#[allow(dead_code)]
	pub fn registry(&self) -> &RecipientRegistry {
		&self.registry
	}

	#[allow(dead_code)]
	pub fn cache(&self) -> &SubjectCache {
		&self.cache
	}
}
