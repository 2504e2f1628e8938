#![forbid(unsafe_code)]

use std::collections::HashMap;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use herald_domain::ChannelKey;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{EmoteDef, ProviderKind};

const BTTV_BASE_URL: &str = "https://api.betterttv.net/3";
const BTTV_CDN_URL: &str = "https://cdn.betterttv.net";
const FFZ_BASE_URL: &str = "https://api.frankerfacez.com";

/// Injected network collaborator; the catalog layer performs no raw I/O.
#[async_trait]
pub trait EmoteFetcher: Send + Sync {
	/// Fetch one provider's global emoticon catalog.
	async fn fetch_global(&self, kind: ProviderKind) -> anyhow::Result<Vec<EmoteDef>>;

	/// Fetch one provider's catalog for a channel.
	async fn fetch_channel(&self, kind: ProviderKind, channel: &ChannelKey) -> anyhow::Result<Vec<EmoteDef>>;
}

/// `EmoteFetcher` against the real provider HTTP APIs.
pub struct HttpEmoteFetcher {
	bttv_base_url: String,
	ffz_base_url: String,
}

impl Default for HttpEmoteFetcher {
	fn default() -> Self {
		Self {
			bttv_base_url: BTTV_BASE_URL.to_string(),
			ffz_base_url: FFZ_BASE_URL.to_string(),
		}
	}
}

impl HttpEmoteFetcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Override the provider base URLs (used by tests against a local stub).
	#[allow(dead_code)]
	pub fn with_base_urls(bttv_base_url: impl Into<String>, ffz_base_url: impl Into<String>) -> Self {
		Self {
			bttv_base_url: bttv_base_url.into(),
			ffz_base_url: ffz_base_url.into(),
		}
	}

	async fn fetch_bttv_global(&self) -> anyhow::Result<Vec<EmoteDef>> {
		let url = format!("{}/cached/emotes/global", self.bttv_base_url);
		let resp = reqwest::Client::new()
			.get(url)
			.send()
			.await
			.context("bttv global emotes request")?
			.error_for_status()
			.context("bttv global emotes status")?;

		let body: Vec<BttvEmote> = resp.json().await.context("bttv global emotes json")?;
		Ok(body.iter().map(bttv_emote_to_def).collect())
	}

	async fn fetch_bttv_channel(&self, channel: &ChannelKey) -> anyhow::Result<Vec<EmoteDef>> {
		let url = format!("{}/cached/users/twitch/{}", self.bttv_base_url, channel.channel);
		let resp = reqwest::Client::new()
			.get(url)
			.send()
			.await
			.context("bttv channel request")?
			.error_for_status()
			.context("bttv channel status")?;

		let body: BttvUserResponse = resp.json().await.context("bttv channel json")?;

		// A shared emote re-listed as a channel emote keeps the first entry.
		let mut dedupe: HashMap<String, EmoteDef> = HashMap::new();
		for emote in body.channel_emotes.iter().chain(body.shared_emotes.iter()) {
			let def = bttv_emote_to_def(emote);
			dedupe.entry(def.id.clone()).or_insert(def);
		}

		Ok(dedupe.into_values().collect())
	}

	async fn fetch_ffz_global(&self) -> anyhow::Result<Vec<EmoteDef>> {
		let url = format!("{}/v1/set/global", self.ffz_base_url);
		let resp = reqwest::Client::new()
			.get(url)
			.send()
			.await
			.context("ffz global set request")?
			.error_for_status()
			.context("ffz global set status")?;

		let body: FfzGlobalResponse = resp.json().await.context("ffz global set json")?;

		let mut defs = Vec::new();
		for set_id in &body.default_sets {
			if let Some(set) = body.sets.get(&set_id.to_string()) {
				defs.extend(set.emoticons.iter().filter_map(ffz_emote_to_def));
			}
		}

		Ok(defs)
	}

	async fn fetch_ffz_channel(&self, channel: &ChannelKey) -> anyhow::Result<Vec<EmoteDef>> {
		let url = format!("{}/v1/room/{}", self.ffz_base_url, channel.channel);
		let resp = reqwest::Client::new()
			.get(url)
			.send()
			.await
			.context("ffz room request")?
			.error_for_status()
			.context("ffz room status")?;

		let body: FfzRoomResponse = resp.json().await.context("ffz room json")?;
		let set_id = body.room.set;
		let set = body
			.sets
			.get(&set_id.to_string())
			.ok_or_else(|| anyhow!("ffz set {set_id} not found in room response"))?;

		Ok(set.emoticons.iter().filter_map(ffz_emote_to_def).collect())
	}
}

#[async_trait]
impl EmoteFetcher for HttpEmoteFetcher {
	async fn fetch_global(&self, kind: ProviderKind) -> anyhow::Result<Vec<EmoteDef>> {
		let defs = match kind {
			ProviderKind::Bttv => self.fetch_bttv_global().await?,
			ProviderKind::Ffz => self.fetch_ffz_global().await?,
		};

		if defs.is_empty() {
			warn!(provider = %kind, "global emoticon catalog empty");
		} else {
			info!(provider = %kind, emote_count = defs.len(), "global emoticon catalog fetched");
		}

		Ok(defs)
	}

	async fn fetch_channel(&self, kind: ProviderKind, channel: &ChannelKey) -> anyhow::Result<Vec<EmoteDef>> {
		let defs = match kind {
			ProviderKind::Bttv => self.fetch_bttv_channel(channel).await?,
			ProviderKind::Ffz => self.fetch_ffz_channel(channel).await?,
		};

		if defs.is_empty() {
			warn!(provider = %kind, channel = %channel, "channel emoticon catalog empty");
		} else {
			info!(provider = %kind, channel = %channel, emote_count = defs.len(), "channel emoticon catalog fetched");
		}

		Ok(defs)
	}
}

fn bttv_emote_to_def(emote: &BttvEmote) -> EmoteDef {
	let animated = emote.animated || emote.image_type.as_deref() == Some("gif");

	EmoteDef {
		provider: ProviderKind::Bttv,
		id: emote.id.clone(),
		code: emote.code.clone(),
		image_url: format!("{BTTV_CDN_URL}/emote/{}/1x", emote.id),
		animated,
	}
}

fn ffz_emote_to_def(emote: &FfzEmote) -> Option<EmoteDef> {
	let animated = emote.animated.as_ref().is_some_and(|urls| !urls.is_empty());
	let urls = if animated {
		emote.animated.as_ref()
	} else {
		Some(&emote.urls)
	}?;

	let image_url = urls.get("1").or_else(|| urls.values().next())?.clone();

	Some(EmoteDef {
		provider: ProviderKind::Ffz,
		id: emote.id.to_string(),
		code: emote.name.clone(),
		image_url,
		animated,
	})
}

#[derive(Debug, Deserialize)]
struct BttvUserResponse {
	#[serde(default, rename = "channelEmotes")]
	channel_emotes: Vec<BttvEmote>,
	#[serde(default, rename = "sharedEmotes")]
	shared_emotes: Vec<BttvEmote>,
}

#[derive(Debug, Deserialize)]
struct BttvEmote {
	id: String,
	code: String,
	#[serde(default, rename = "imageType")]
	image_type: Option<String>,
	#[serde(default)]
	animated: bool,
}

#[derive(Debug, Deserialize)]
struct FfzGlobalResponse {
	#[serde(default)]
	default_sets: Vec<i64>,
	#[serde(default)]
	sets: HashMap<String, FfzSet>,
}

#[derive(Debug, Deserialize)]
struct FfzRoomResponse {
	room: FfzRoom,
	#[serde(default)]
	sets: HashMap<String, FfzSet>,
}

#[derive(Debug, Deserialize)]
struct FfzRoom {
	set: i64,
}

#[derive(Debug, Deserialize)]
struct FfzSet {
	#[serde(default)]
	emoticons: Vec<FfzEmote>,
}

#[derive(Debug, Deserialize)]
struct FfzEmote {
	id: i64,
	name: String,
	#[serde(default)]
	urls: HashMap<String, String>,
	#[serde(default)]
	animated: Option<HashMap<String, String>>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bttv_gif_image_type_marks_animated() {
		let emote = BttvEmote {
			id: "abc123".to_string(),
			code: "Dance".to_string(),
			image_type: Some("gif".to_string()),
			animated: false,
		};

		let def = bttv_emote_to_def(&emote);
		assert!(def.animated);
		assert_eq!(def.image_url, "https://cdn.betterttv.net/emote/abc123/1x");
	}

	#[test]
	fn ffz_prefers_animated_urls_when_present() {
		let emote = FfzEmote {
			id: 42,
			name: "Wiggle".to_string(),
			urls: HashMap::from([("1".to_string(), "https://example.invalid/static".to_string())]),
			animated: Some(HashMap::from([(
				"1".to_string(),
				"https://example.invalid/animated".to_string(),
			)])),
		};

		let def = ffz_emote_to_def(&emote).expect("def");
		assert!(def.animated);
		assert_eq!(def.image_url, "https://example.invalid/animated");
	}

	#[test]
	fn ffz_emote_without_urls_is_skipped() {
		let emote = FfzEmote {
			id: 7,
			name: "Ghost".to_string(),
			urls: HashMap::new(),
			animated: None,
		};

		assert!(ffz_emote_to_def(&emote).is_none());
	}
}
