use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identity of a bot persona. Each bot owns exactly one wall, so the same
/// identifier names both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotId(String);

/// Walls are keyed by the bot that owns them.
pub type WallId = BotId;

impl BotId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BotId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BotId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Author of a wall message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "bot", rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot(BotId),
}

impl Sender {
    pub fn bot(&self) -> Option<&BotId> {
        match self {
            Self::User => None,
            Self::Bot(bot) => Some(bot),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User)
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("User"),
            Self::Bot(bot) => write!(f, "{bot}"),
        }
    }
}

/// Why a message was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostTag {
    /// Typed by the human user.
    User,
    /// Fired by a wall's inactivity timer.
    Auto,
    /// Follow-up stage of a chain cascade.
    Chain,
    /// Primary responder picked by the dispatcher.
    Reply,
    /// Secondary responder picked by the dispatcher.
    Echo,
    /// Global ambient tick.
    Ambient,
}

impl PostTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Auto => "auto",
            Self::Chain => "chain",
            Self::Reply => "reply",
            Self::Echo => "echo",
            Self::Ambient => "ambient",
        }
    }
}

impl fmt::Display for PostTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a wall's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallMessage {
    /// Arrival order across all walls of one scheduler.
    pub seq: u64,
    pub sender: Sender,
    pub text: String,
    pub tag: PostTag,
    /// Virtual time since scheduler start.
    #[serde(with = "duration_ms")]
    pub at: Duration,
}

/// A bot post the scheduler wants made. The host resolves its text and hands
/// it back through [`crate::scheduler::Scheduler::commit_post`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    pub wall: WallId,
    pub bot: BotId,
    pub tag: PostTag,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
