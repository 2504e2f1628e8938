#![forbid(unsafe_code)]

pub mod watch {
	use std::sync::Arc;

	use parking_lot::Mutex;

	type ChangeCallback = Arc<dyn Fn(&str) + Send + Sync>;

	struct Registration {
		keys: Vec<String>,
		callback: ChangeCallback,
	}

	/// Named-key configuration change notifier.
	///
	/// Components register interest in config keys; whoever applies a config
	/// change calls `notify` and every interested callback runs with the key
	/// that changed. Callbacks must be cheap; slow work belongs on a task the
	/// callback signals.
	#[derive(Clone, Default)]
	pub struct ConfigWatcher {
		inner: Arc<Mutex<Vec<Registration>>>,
	}

	impl ConfigWatcher {
		pub fn new() -> Self {
			Self::default()
		}

		/// Register a callback for a set of config keys.
		pub fn subscribe<I, K>(&self, keys: I, callback: impl Fn(&str) + Send + Sync + 'static)
		where
			I: IntoIterator<Item = K>,
			K: Into<String>,
		{
			let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
			if keys.is_empty() {
				return;
			}

			let mut inner = self.inner.lock();
			inner.push(Registration {
				keys,
				callback: Arc::new(callback),
			});
		}

		/// Notify every callback registered for `key`.
		pub fn notify(&self, key: &str) {
			let callbacks: Vec<ChangeCallback> = {
				let inner = self.inner.lock();
				inner
					.iter()
					.filter(|r| r.keys.iter().any(|k| k == key))
					.map(|r| r.callback.clone())
					.collect()
			};

			for callback in callbacks {
				callback(key);
			}
		}
	}

}
