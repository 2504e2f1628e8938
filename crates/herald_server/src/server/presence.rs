#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herald_domain::SubjectKey;
use parking_lot::Mutex;
use tracing::debug;

/// Downstream consumer of settled presence facts (the storage layer).
#[async_trait]
pub trait PresenceSink: Send + Sync {
	async fn write(&self, entity: &str, subject: &SubjectKey, time_ms: i64);
}

/// Sink that only logs; stands in where no storage layer is wired.
pub struct TracingPresenceSink;

#[async_trait]
impl PresenceSink for TracingPresenceSink {
	async fn write(&self, entity: &str, subject: &SubjectKey, time_ms: i64) {
		debug!(entity, subject = %subject, time_ms, "presence settled");
	}
}

#[derive(Debug, Clone)]
struct PendingFact {
	subject: SubjectKey,
	time_ms: i64,
}

/// Rate-limited recorder of last-seen facts.
///
/// Each entity key runs an explicit trailing-edge debounce: the first
/// `record` in a window schedules one timer; later calls in the same window
/// overwrite the pending payload. When the timer fires, the latest payload
/// is taken and exactly one sink write happens. The tracker holds no truth
/// beyond the pending map.
#[derive(Clone)]
pub struct PresenceTracker {
	inner: Arc<TrackerInner>,
}

struct TrackerInner {
	pending: Mutex<HashMap<String, PendingFact>>,
	sink: Arc<dyn PresenceSink>,
	window: Duration,
}

impl PresenceTracker {
	pub fn new(sink: Arc<dyn PresenceSink>, window: Duration) -> Self {
		Self {
			inner: Arc::new(TrackerInner {
				pending: Mutex::new(HashMap::new()),
				sink,
				window,
			}),
		}
	}

	/// Schedule a coalesced last-seen update. Never blocks the caller;
	/// timer scheduling is fire-and-forget. Must be called from within a
	/// tokio runtime.
	pub fn record(&self, entity: &str, subject: &SubjectKey, time_ms: i64) {
		let fact = PendingFact {
			subject: subject.clone(),
			time_ms,
		};

		let mut pending = self.inner.pending.lock();
		match pending.entry(entity.to_string()) {
			Entry::Occupied(mut slot) => {
				// Timer already scheduled for this window; the later call
				// wins.
				slot.insert(fact);
			}
			Entry::Vacant(slot) => {
				slot.insert(fact);

				let inner = self.inner.clone();
				let entity = entity.to_string();

				tokio::spawn(async move {
					tokio::time::sleep(inner.window).await;

					// Take the latest payload; the lock is released before
					// the sink write.
					let settled = inner.pending.lock().remove(&entity);

					if let Some(fact) = settled {
						inner.sink.write(&entity, &fact.subject, fact.time_ms).await;
					}
				});
			}
		}
	}

	/// Number of entities with a timer currently pending.
	#[allow(dead_code)]
	pub fn pending_len(&self) -> usize {
		self.inner.pending.lock().len()
	}
}
