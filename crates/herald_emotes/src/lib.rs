#![forbid(unsafe_code)]

mod fetch;
mod indices;
mod native;
mod refresh;
mod store;

use core::fmt;

use serde::{Deserialize, Serialize};

pub use fetch::{EmoteFetcher, HttpEmoteFetcher};
pub use indices::{generate_annotations, merge_annotations, scan_triggers};
pub use native::parse_native_emote_tag;
pub use refresh::{
	EMOTE_CONFIG_KEYS, EmoteRefresher, EmoteSettings, EmoteToggles, RefresherConfig, enabled_provider_types,
	snapshot_for_channel,
};
pub use store::EmoteStore;

/// External annotation provider kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
	Ffz,
	Bttv,
}

impl ProviderKind {
	/// Fixed conflict-priority order between providers. Earlier entries win
	/// overlap conflicts against later ones; never derived from map
	/// iteration order.
	pub const PRIORITY: [ProviderKind; 2] = [ProviderKind::Ffz, ProviderKind::Bttv];

	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProviderKind::Ffz => "ffz",
			ProviderKind::Bttv => "bttv",
		}
	}
}

impl fmt::Display for ProviderKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One provider emoticon definition: the trigger text scanned for in
/// messages plus the image payload delivered with matching annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmoteDef {
	pub provider: ProviderKind,
	pub id: String,
	pub code: String,
	pub image_url: String,
	pub animated: bool,
}
