#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use herald_domain::{Category, ChatEvent, SubjectKey};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// Items emitted on a subscriber's delivery queue.
#[derive(Debug, Clone)]
pub enum Delivery {
	/// An annotated event for a subject the subscriber follows.
	Event { subject: SubjectKey, event: Arc<ChatEvent> },

	/// Indicates the subscriber lagged and items were dropped.
	Lagged { dropped: u64 },
}

/// Handle to one live client connection.
///
/// The registry holds clones of the sender half only; connection lifecycle
/// belongs to the connection layer, which registers on connect and calls
/// `unsubscribe_everywhere` exactly once on disconnect. A dispatch racing a
/// disconnect reaches a cloned sender or a closed one, never a freed handle.
#[derive(Debug, Clone)]
pub struct Recipient {
	conn_id: u64,
	tx: mpsc::Sender<Delivery>,
}

impl Recipient {
	#[allow(dead_code)]
	pub fn new(conn_id: u64, tx: mpsc::Sender<Delivery>) -> Self {
		Self { conn_id, tx }
	}

	/// Build a recipient plus the receiver its connection drains.
	pub fn channel(conn_id: u64, queue_capacity: usize) -> (Self, mpsc::Receiver<Delivery>) {
		let (tx, rx) = mpsc::channel(queue_capacity);
		(Self { conn_id, tx }, rx)
	}

	#[allow(dead_code)]
	pub fn conn_id(&self) -> u64 {
		self.conn_id
	}

	fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}

/// Configuration for `RecipientRegistry`.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
	pub debug_logs: bool,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self { debug_logs: false }
	}
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryStats {
	pub delivered: usize,
	pub dropped: u64,
}

/// Tracks which live connections are interested in which subjects and fans
/// events out to them.
#[derive(Debug, Clone)]
pub struct RecipientRegistry {
	inner: Arc<Mutex<Inner>>,
	cfg: RegistryConfig,
}

#[derive(Debug, Default)]
struct Inner {
	subjects: HashMap<SubjectKey, SubjectEntry>,

	/// Reverse index so disconnect cleanup touches only the subjects the
	/// connection is actually in.
	subjects_by_conn: HashMap<u64, HashSet<SubjectKey>>,
}

#[derive(Debug, Default)]
struct SubjectEntry {
	recipients: Vec<Recipient>,

	/// Pending lag markers per recipient.
	pending_lag_by_recipient: Vec<u64>,
}

impl RecipientRegistry {
	pub fn new(cfg: RegistryConfig) -> Self {
		Self {
			inner: Arc::new(Mutex::new(Inner::default())),
			cfg,
		}
	}

	/// Subscribe a recipient to a subject. Idempotent by connection id.
	pub async fn subscribe(&self, subject: SubjectKey, recipient: Recipient) {
		let mut inner = self.inner.lock().await;
		let entry = inner.subjects.entry(subject.clone()).or_default();

		prune_closed_recipients(entry);

		if entry.recipients.iter().any(|r| r.conn_id == recipient.conn_id) {
			return;
		}

		entry.recipients.push(recipient.clone());
		entry.pending_lag_by_recipient.push(0);

		inner
			.subjects_by_conn
			.entry(recipient.conn_id)
			.or_default()
			.insert(subject.clone());

		if self.cfg.debug_logs {
			debug!(subject = %subject, conn_id = recipient.conn_id, "registry: subscribed");
		}
	}

	/// Subscribe by category name. Only the fixed supported categories are
	/// accepted; anything else is silently ignored.
	#[allow(dead_code)]
	pub async fn subscribe_category(&self, name: &str, recipient: Recipient) {
		match name.parse::<Category>() {
			Ok(category) => self.subscribe(SubjectKey::Category(category), recipient).await,
			Err(_) => {
				debug!(category = %name, "registry: ignoring subscription to unrecognized category");
			}
		}
	}

	/// Remove one connection from one subject. Removing an absent
	/// subscriber is a no-op.
	#[allow(dead_code)]
	pub async fn unsubscribe(&self, subject: &SubjectKey, conn_id: u64) {
		let mut inner = self.inner.lock().await;

		if let Some(entry) = inner.subjects.get_mut(subject) {
			remove_recipient(entry, conn_id);

			if entry.recipients.is_empty() {
				inner.subjects.remove(subject);
			}
		}

		if let Some(set) = inner.subjects_by_conn.get_mut(&conn_id) {
			set.remove(subject);

			if set.is_empty() {
				inner.subjects_by_conn.remove(&conn_id);
			}
		}
	}

	/// Unsubscribe by category name; unrecognized names are ignored.
	#[allow(dead_code)]
	pub async fn unsubscribe_category(&self, name: &str, conn_id: u64) {
		if let Ok(category) = name.parse::<Category>() {
			self.unsubscribe(&SubjectKey::Category(category), conn_id).await;
		}
	}

	/// Remove a connection from every subject it is in. Called once per
	/// disconnect; a no-op for unknown connections.
	#[allow(dead_code)]
	pub async fn unsubscribe_everywhere(&self, conn_id: u64) {
		let mut inner = self.inner.lock().await;

		let Some(subjects) = inner.subjects_by_conn.remove(&conn_id) else {
			return;
		};

		for subject in subjects {
			if let Some(entry) = inner.subjects.get_mut(&subject) {
				remove_recipient(entry, conn_id);

				if entry.recipients.is_empty() {
					inner.subjects.remove(&subject);
				}
			}
		}

		if self.cfg.debug_logs {
			debug!(conn_id, "registry: removed connection everywhere");
		}
	}

	/// Snapshot of the open recipients for a subject. Callers get clones;
	/// registry state cannot be corrupted through the returned value.
	#[allow(dead_code)]
	pub async fn recipients_for(&self, subject: &SubjectKey) -> Vec<Recipient> {
		let inner = self.inner.lock().await;

		inner
			.subjects
			.get(subject)
			.map(|entry| entry.recipients.iter().filter(|r| !r.is_closed()).cloned().collect())
			.unwrap_or_default()
	}

	/// Snapshot by category name; unknown names yield an empty set.
	#[allow(dead_code)]
	pub async fn recipients_for_category(&self, name: &str) -> Vec<Recipient> {
		match name.parse::<Category>() {
			Ok(category) => self.recipients_for(&SubjectKey::Category(category)).await,
			Err(_) => Vec::new(),
		}
	}

	/// Fan one event out to a subject's recipients.
	///
	/// Each recipient gets a non-blocking send; a full or closed queue
	/// affects only that recipient. Full queues accumulate a pending lag
	/// count that is flushed as a `Lagged` marker on the next successful
	/// send.
	pub async fn deliver(&self, subject: &SubjectKey, event: Arc<ChatEvent>) -> DeliveryStats {
		let mut inner = self.inner.lock().await;
		let Some(entry) = inner.subjects.get_mut(subject) else {
			return DeliveryStats::default();
		};

		prune_closed_recipients(entry);

		if entry.recipients.is_empty() {
			inner.subjects.remove(subject);
			return DeliveryStats::default();
		}

		let item = Delivery::Event {
			subject: subject.clone(),
			event,
		};

		let mut stats = DeliveryStats::default();

		for (idx, recipient) in entry.recipients.iter().enumerate() {
			match recipient.tx.try_send(item.clone()) {
				Ok(()) => {
					stats.delivered += 1;

					if let Some(pending) = entry.pending_lag_by_recipient.get_mut(idx)
						&& *pending > 0 && recipient.tx.try_send(Delivery::Lagged { dropped: *pending }).is_ok()
					{
						*pending = 0;
					}
				}
				Err(mpsc::error::TrySendError::Full(_)) => {
					stats.dropped += 1;

					if let Some(pending) = entry.pending_lag_by_recipient.get_mut(idx) {
						*pending = pending.saturating_add(1);
					}
				}
				Err(mpsc::error::TrySendError::Closed(_)) => {}
			}
		}

		prune_closed_recipients(entry);

		if entry.recipients.is_empty() {
			inner.subjects.remove(subject);
		}

		if self.cfg.debug_logs && stats.dropped > 0 {
			debug!(
				subject = %subject,
				dropped = stats.dropped,
				"registry: dropped deliveries due to full subscriber queues"
			);
		}

		stats
	}

	/// Snapshot of open-subscriber counts per subject.
	#[allow(dead_code)]
	pub async fn subject_counts(&self) -> HashMap<SubjectKey, usize> {
		let inner = self.inner.lock().await;
		inner
			.subjects
			.iter()
			.map(|(k, v)| (k.clone(), v.recipients.iter().filter(|r| !r.is_closed()).count()))
			.collect()
	}
}

fn remove_recipient(entry: &mut SubjectEntry, conn_id: u64) {
	if let Some(idx) = entry.recipients.iter().position(|r| r.conn_id == conn_id) {
		entry.recipients.remove(idx);

		if idx < entry.pending_lag_by_recipient.len() {
			entry.pending_lag_by_recipient.remove(idx);
		}
	}
}

fn prune_closed_recipients(entry: &mut SubjectEntry) {
	if entry.recipients.len() != entry.pending_lag_by_recipient.len() {
		entry.pending_lag_by_recipient.resize(entry.recipients.len(), 0);
	}

	let mut kept = Vec::with_capacity(entry.recipients.len());
	let mut kept_lag = Vec::with_capacity(entry.recipients.len());

	for (idx, recipient) in entry.recipients.drain(..).enumerate() {
		if !recipient.is_closed() {
			kept.push(recipient);
			kept_lag.push(*entry.pending_lag_by_recipient.get(idx).unwrap_or(&0));
		}
	}

	entry.recipients = kept;
	entry.pending_lag_by_recipient = kept_lag;
}
