#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use herald_domain::{ChannelKey, ChatEvent, EventKind, SubjectKey};
use tracing::{debug, info};

use crate::server::dispatch::EventDispatcher;

/// Stub event source used for end-to-end runs without an upstream network.
pub struct DemoSource {
	channels: Vec<ChannelKey>,
	emit_interval: Duration,
}

impl DemoSource {
	pub fn new(channels: Vec<ChannelKey>) -> Self {
		Self {
			channels,
			emit_interval: Duration::from_millis(250),
		}
	}

	/// Customize emit interval (useful for tests).
	#[allow(dead_code)]
	pub fn with_emit_interval(mut self, interval: Duration) -> Self {
		self.emit_interval = interval;
		self
	}

	fn make_event(channel: &ChannelKey, n: u64) -> ChatEvent {
		let subject = SubjectKey::Channel(channel.clone());
		let text = format!("demo message #{n} in {channel}");

		ChatEvent::new(EventKind::Message, subject, unix_ms_now())
			.with_username("demo_user")
			.with_text(text)
	}

	/// Emit synthetic chat messages into the dispatcher until aborted.
	pub fn spawn(self, dispatcher: Arc<EventDispatcher>) -> tokio::task::JoinHandle<()> {
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(self.emit_interval);
			interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

			let mut tick: u64 = 0;

			info!(channels = self.channels.len(), "demo source started");
			debug!(interval_ms = self.emit_interval.as_millis(), "demo source tick interval configured");

			loop {
				interval.tick().await;

				for channel in &self.channels {
					tick += 1;
					dispatcher.dispatch(Self::make_event(channel, tick)).await;
				}
			}
		})
	}
}

/// Current Unix time in milliseconds.
#[inline]
fn unix_ms_now() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or(Duration::from_secs(0))
		.as_millis() as i64
}
