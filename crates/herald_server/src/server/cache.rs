#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use herald_domain::{ChatEvent, SubjectKey};
use tokio::sync::Mutex;

/// Bounded sliding-window history of recent events per subject.
///
/// Subjects are created lazily on first append. Evicted events are simply
/// discarded; persistent history belongs to the storage layer.
#[derive(Debug)]
pub struct SubjectCache {
	inner: Mutex<HashMap<SubjectKey, VecDeque<Arc<ChatEvent>>>>,
	bound: usize,
}

impl SubjectCache {
	/// Create a cache holding at most `bound` events per subject.
	pub fn new(bound: usize) -> Self {
		Self {
			inner: Mutex::new(HashMap::new()),
			bound,
		}
	}

	#[allow(dead_code)]
	pub fn bound(&self) -> usize {
		self.bound
	}

	/// Append one event, evicting the single oldest entry when the window
	/// runs over.
	pub async fn append(&self, subject: &SubjectKey, event: Arc<ChatEvent>) {
		let mut inner = self.inner.lock().await;
		let window = inner.entry(subject.clone()).or_default();

		window.push_back(event);
		enforce_bound(window, self.bound);
	}

	/// Append a batch of events (bulk hydration), slicing down to the last
	/// `bound` afterwards. Final content matches repeated single appends.
	#[allow(dead_code)]
	pub async fn append_bulk(&self, subject: &SubjectKey, events: Vec<Arc<ChatEvent>>) {
		if events.is_empty() {
			return;
		}

		let mut inner = self.inner.lock().await;
		let window = inner.entry(subject.clone()).or_default();

		window.extend(events);
		enforce_bound(window, self.bound);
	}

	/// Snapshot the current window, oldest first. Absent subjects yield an
	/// empty sequence.
	#[allow(dead_code)]
	pub async fn get(&self, subject: &SubjectKey) -> Vec<Arc<ChatEvent>> {
		let inner = self.inner.lock().await;
		inner.get(subject).map(|window| window.iter().cloned().collect()).unwrap_or_default()
	}

	/// Current window length for a subject.
	#[allow(dead_code)]
	pub async fn len(&self, subject: &SubjectKey) -> usize {
		let inner = self.inner.lock().await;
		inner.get(subject).map(VecDeque::len).unwrap_or(0)
	}
}

fn enforce_bound(window: &mut VecDeque<Arc<ChatEvent>>, bound: usize) {
	if window.len() == bound + 1 {
		// One over: drop exactly the oldest.
		window.pop_front();
	} else if window.len() > bound {
		// Bulk overflow: slice to the last `bound`.
		let excess = window.len() - bound;
		window.drain(..excess);
	}
}
