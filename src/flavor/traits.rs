use crate::scheduler::BotId;
use async_trait::async_trait;

/// Produces the text of one bot post.
///
/// Failures are expected (network, empty payloads) and are absorbed by the
/// resolver, which substitutes the bot's fallback line.
#[async_trait]
pub trait FlavorSource: Send + Sync {
    /// Source kind, used in logs
    fn name(&self) -> &str;

    /// `context` holds the wall's recent messages, oldest first.
    async fn fetch(&self, bot: &BotId, context: &[String]) -> anyhow::Result<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum FlavorError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("nothing at JSON pointer {0:?}")]
    Missing(String),
    #[error("payload is not {0}")]
    Malformed(&'static str),
    #[error("payload is empty")]
    Empty,
}
