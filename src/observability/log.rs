use super::traits::{Observer, ObserverEvent, ObserverMetric};
use std::time::Duration;
use tracing::{info, warn};

/// Log-based observer backed by `tracing`.
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(duration: &Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Observer for LogObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::RunStart { walls, seed } => {
                info!(walls = walls, seed = ?seed, "run.start");
            }
            ObserverEvent::RunEnd { duration, posts } => {
                info!(duration_ms = millis(duration), posts = posts, "run.end");
            }
            ObserverEvent::PostScheduled {
                wall,
                bot,
                tag,
                delay,
            } => {
                info!(wall = %wall, bot = %bot, tag = %tag, delay_ms = millis(delay), "post.scheduled");
            }
            ObserverEvent::PostCommitted { wall, sender, tag } => {
                info!(wall = %wall, sender = %sender, tag = %tag, "post.committed");
            }
            ObserverEvent::ChainEnded { wall, stage } => {
                info!(wall = %wall, stage = stage, "chain.ended");
            }
            ObserverEvent::RewardGranted {
                wall,
                bot,
                amount,
                score,
            } => {
                info!(wall = %wall, bot = %bot, amount = amount, score = score, "reward.granted");
            }
            ObserverEvent::ScoresReset => {
                info!("scores.reset");
            }
            ObserverEvent::DripTick { value } => {
                info!(value = value, "drip.tick");
            }
            ObserverEvent::FlavorFallback { bot, reason } => {
                warn!(bot = %bot, reason = %reason, "flavor.fallback");
            }
            ObserverEvent::PaymentStep {
                payment_id,
                step,
                success,
            } => {
                info!(payment_id = %payment_id, step = %step, success = success, "payment.step");
            }
            ObserverEvent::Error { component, message } => {
                info!(component = %component, error = %message, "error");
            }
        }
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        match metric {
            ObserverMetric::FetchLatency(d) => {
                info!(latency_ms = millis(d), "metric.fetch_latency");
            }
            ObserverMetric::PendingTimers(n) => {
                info!(timers = n, "metric.pending_timers");
            }
            ObserverMetric::DripValue(v) => {
                info!(value = v, "metric.drip_value");
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}
