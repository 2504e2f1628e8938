#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors for parsing subject keys from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseKeyError {
	#[error("empty value")]
	Empty,
	#[error("unknown category: {0}")]
	UnknownCategory(String),
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Fixed category subjects clients may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
	Highlights,
	AllFriends,
	System,
}

impl Category {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			Category::Highlights => "highlights",
			Category::AllFriends => "allfriends",
			Category::System => "system",
		}
	}
}

impl fmt::Display for Category {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Category {
	type Err = ParseKeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseKeyError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"highlights" => Ok(Category::Highlights),
			"allfriends" => Ok(Category::AllFriends),
			"system" => Ok(Category::System),
			other => Err(ParseKeyError::UnknownCategory(other.to_string())),
		}
	}
}

/// Channel key: `(server name, channel name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
	pub server: String,
	pub channel: String,
}

impl ChannelKey {
	/// Create a non-empty channel key.
	pub fn new(server: impl Into<String>, channel: impl Into<String>) -> Result<Self, ParseKeyError> {
		let server = server.into();
		let channel = channel.into();
		if server.trim().is_empty() || channel.trim().is_empty() {
			return Err(ParseKeyError::Empty);
		}
		Ok(Self { server, channel })
	}

	/// Parse a `server/channel` string.
	pub fn parse(s: &str) -> Result<Self, ParseKeyError> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseKeyError::Empty);
		}

		let (server, channel) = s
			.split_once('/')
			.ok_or_else(|| ParseKeyError::InvalidFormat("expected server/channel".into()))?;

		ChannelKey::new(server, channel)
	}
}

impl fmt::Display for ChannelKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.server, self.channel)
	}
}

impl FromStr for ChannelKey {
	type Err = ParseKeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ChannelKey::parse(s)
	}
}

/// Addressable conversation scope an event targets and clients subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum SubjectKey {
	Channel(ChannelKey),
	User(String),
	Category(Category),
	Server(String),
}

impl SubjectKey {
	/// Create a user subject from a non-empty username.
	pub fn user(name: impl Into<String>) -> Result<Self, ParseKeyError> {
		let name = name.into();
		if name.trim().is_empty() {
			return Err(ParseKeyError::Empty);
		}
		Ok(SubjectKey::User(name))
	}

	/// Create a server subject from a non-empty server name.
	pub fn server(name: impl Into<String>) -> Result<Self, ParseKeyError> {
		let name = name.into();
		if name.trim().is_empty() {
			return Err(ParseKeyError::Empty);
		}
		Ok(SubjectKey::Server(name))
	}

	/// The channel key, when this subject is a channel.
	pub fn as_channel(&self) -> Option<&ChannelKey> {
		match self {
			SubjectKey::Channel(c) => Some(c),
			_ => None,
		}
	}
}

impl fmt::Display for SubjectKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SubjectKey::Channel(c) => write!(f, "channel:{c}"),
			SubjectKey::User(u) => write!(f, "user:{u}"),
			SubjectKey::Category(c) => write!(f, "category:{c}"),
			SubjectKey::Server(s) => write!(f, "server:{s}"),
		}
	}
}

impl FromStr for SubjectKey {
	type Err = ParseKeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseKeyError::Empty);
		}

		let (kind, name) = s
			.split_once(':')
			.ok_or_else(|| ParseKeyError::InvalidFormat("expected kind:name".into()))?;

		match kind {
			"channel" => Ok(SubjectKey::Channel(ChannelKey::parse(name)?)),
			"user" => SubjectKey::user(name),
			"category" => Ok(SubjectKey::Category(name.parse()?)),
			"server" => SubjectKey::server(name),
			other => Err(ParseKeyError::InvalidFormat(format!("unknown subject kind: {other}"))),
		}
	}
}

/// Chat occurrence kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum EventKind {
	Message,
	Action,
	Notice,
	Join,
	Part,
	Quit,
	Kick,
	Mode,

	/// Provider-specific notices (e.g. `usernotice`, `clearchat`).
	Custom(String),
}

impl EventKind {
	/// Whether events of this kind are expected to carry message text.
	pub fn is_textual(&self) -> bool {
		matches!(
			self,
			EventKind::Message | EventKind::Action | EventKind::Notice | EventKind::Custom(_)
		)
	}
}

/// Half-open `[start, end)` span over code-point indices of message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
	pub start: u32,
	pub end: u32,
}

impl Span {
	pub fn new(start: u32, end: u32) -> Self {
		Self { start, end }
	}

	pub fn is_empty(self) -> bool {
		self.start >= self.end
	}

	/// Overlap test on the ordered bounds of the two spans.
	///
	/// Spans are ordered by lower bound first; touching bounds count as a
	/// conflict, so annotations accepted through this test never share an
	/// index and never abut ambiguously.
	pub fn overlaps(self, other: Span) -> bool {
		let (first, second) = if self.start <= other.start { (self, other) } else { (other, self) };

		first.start <= second.end && second.start <= first.end
	}
}

/// A provider-tagged annotation over a message's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAnnotation {
	pub span: Span,
	pub source: AnnotationSource,
}

/// Where an annotation range came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum AnnotationSource {
	/// Supplied by the originating protocol (trusted).
	Native { emote_id: String },

	/// Computed from an external provider catalog.
	External {
		provider: String,
		emote_id: String,
		code: String,
		image_url: String,
		animated: bool,
	},
}

impl AnnotationSource {
	pub fn is_native(&self) -> bool {
		matches!(self, AnnotationSource::Native { .. })
	}
}

/// One immutable chat occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
	/// Server-assigned event id.
	pub event_id: Uuid,

	pub kind: EventKind,

	pub subject: SubjectKey,

	/// Unix milliseconds.
	pub time_ms: i64,

	pub username: Option<String>,

	pub text: Option<String>,

	/// Protocol tag mapping, when the origin supplied one.
	pub tags: Option<BTreeMap<String, serde_json::Value>>,

	/// Annotation ranges; native on ingest, merged before caching.
	pub annotations: Vec<TextAnnotation>,
}

impl ChatEvent {
	/// Construct an event with the required fields.
	pub fn new(kind: EventKind, subject: SubjectKey, time_ms: i64) -> Self {
		Self {
			event_id: Uuid::new_v4(),
			kind,
			subject,
			time_ms,
			username: None,
			text: None,
			tags: None,
			annotations: Vec::new(),
		}
	}

	pub fn with_username(mut self, username: impl Into<String>) -> Self {
		self.username = Some(username.into());
		self
	}

	pub fn with_text(mut self, text: impl Into<String>) -> Self {
		self.text = Some(text.into());
		self
	}

	pub fn with_tags(mut self, tags: BTreeMap<String, serde_json::Value>) -> Self {
		self.tags = Some(tags);
		self
	}

	pub fn with_annotations(mut self, annotations: Vec<TextAnnotation>) -> Self {
		self.annotations = annotations;
		self
	}
}

/// Errors raised when an inbound event fails validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventValidationError {
	#[error("timestamp must be positive")]
	BadTimestamp,
	#[error("textual event carries empty text")]
	EmptyText,
	#[error("custom event kind must be named")]
	UnnamedCustomKind,
}

/// Validate basic inbound-event invariants; malformed events are dropped
/// before they reach the cache or dispatch.
pub fn validate_event(ev: &ChatEvent) -> Result<(), EventValidationError> {
	if ev.time_ms <= 0 {
		return Err(EventValidationError::BadTimestamp);
	}

	if let EventKind::Custom(name) = &ev.kind
		&& name.trim().is_empty()
	{
		return Err(EventValidationError::UnnamedCustomKind);
	}

	if let Some(text) = &ev.text
		&& text.is_empty()
	{
		return Err(EventValidationError::EmptyText);
	}

	Ok(())
}
