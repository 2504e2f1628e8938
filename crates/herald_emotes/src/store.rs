#![forbid(unsafe_code)]

use std::collections::HashMap;

use herald_domain::ChannelKey;
use parking_lot::Mutex;

use crate::{EmoteDef, ProviderKind};

/// Per-scope catalogs of external emoticon definitions.
///
/// One slice per `(scope, provider type)`; refreshes replace exactly one
/// slice, so a failed fetch for one type never disturbs the others. Reads
/// return clones; the merge engine works on a snapshot and never waits on
/// an in-flight refresh.
#[derive(Default)]
pub struct EmoteStore {
	inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
	global: HashMap<ProviderKind, Vec<EmoteDef>>,
	channels: HashMap<ChannelKey, HashMap<ProviderKind, Vec<EmoteDef>>>,
}

impl EmoteStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replace the global catalog slice for one provider type.
	pub fn set_global(&self, kind: ProviderKind, emotes: Vec<EmoteDef>) {
		let mut inner = self.inner.lock();
		inner.global.insert(kind, emotes);
	}

	/// Replace one channel's catalog slice for one provider type.
	pub fn set_channel(&self, channel: &ChannelKey, kind: ProviderKind, emotes: Vec<EmoteDef>) {
		let mut inner = self.inner.lock();
		inner.channels.entry(channel.clone()).or_default().insert(kind, emotes);
	}

	/// Drop one channel's catalogs. The global catalog and other channels
	/// are untouched.
	pub fn clear_channel(&self, channel: &ChannelKey) {
		let mut inner = self.inner.lock();
		inner.channels.remove(channel);
	}

	/// Snapshot the definitions applicable to one message.
	///
	/// Output order is provider priority first, global scope before channel
	/// scope within a type; the scan feeds candidates to the merge in this
	/// order, so it doubles as the conflict-priority order. When
	/// `include_animated` is false, animated entries are filtered here at
	/// read time, independent of what was fetched.
	pub fn snapshot(
		&self,
		channel: Option<&ChannelKey>,
		global_enabled: &[ProviderKind],
		channel_enabled: &[ProviderKind],
		include_animated: bool,
	) -> Vec<EmoteDef> {
		let inner = self.inner.lock();
		let mut out = Vec::new();

		for kind in ProviderKind::PRIORITY {
			if global_enabled.contains(&kind)
				&& let Some(defs) = inner.global.get(&kind)
			{
				out.extend(defs.iter().cloned());
			}

			if channel_enabled.contains(&kind)
				&& let Some(per_kind) = channel.and_then(|c| inner.channels.get(c))
				&& let Some(defs) = per_kind.get(&kind)
			{
				out.extend(defs.iter().cloned());
			}
		}

		if !include_animated {
			out.retain(|def| !def.animated);
		}

		out
	}
}
