use super::traits::FlavorSource;
use crate::observability::{NoopObserver, Observer, ObserverEvent, ObserverMetric};
use crate::scheduler::BotId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

const UNCONFIGURED_BOT_LINE: &str = "Default response.";

struct BotFlavor {
    source: Arc<dyn FlavorSource>,
    fallback: String,
}

/// Maps each bot to its source and fallback line. Never fails.
pub struct FlavorResolver {
    bots: HashMap<BotId, BotFlavor>,
    timeout: Duration,
    observer: Arc<dyn Observer>,
}

impl FlavorResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            bots: HashMap::new(),
            timeout,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn register(
        &mut self,
        bot: BotId,
        source: Arc<dyn FlavorSource>,
        fallback: impl Into<String>,
    ) {
        self.bots.insert(
            bot,
            BotFlavor {
                source,
                fallback: fallback.into(),
            },
        );
    }

    pub fn fallback(&self, bot: &BotId) -> &str {
        self.bots
            .get(bot)
            .map_or(UNCONFIGURED_BOT_LINE, |flavor| flavor.fallback.as_str())
    }

    /// Text for the next post by `bot`. Errors and timeouts yield the
    /// configured fallback.
    pub async fn resolve(&self, bot: &BotId, context: &[String]) -> String {
        let Some(flavor) = self.bots.get(bot) else {
            return UNCONFIGURED_BOT_LINE.to_string();
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, flavor.source.fetch(bot, context)).await;
        self.observer
            .record_metric(&ObserverMetric::FetchLatency(started.elapsed()));

        let reason = match outcome {
            Ok(Ok(text)) if !text.trim().is_empty() => return text,
            Ok(Ok(_)) => "empty text".to_string(),
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("timed out after {}s", self.timeout.as_secs_f64()),
        };

        warn!(
            bot = %bot,
            source = flavor.source.name(),
            "Flavor fetch failed, using fallback: {reason}"
        );
        self.observer.record_event(&ObserverEvent::FlavorFallback {
            bot: bot.to_string(),
            reason,
        });
        flavor.fallback.clone()
    }
}
