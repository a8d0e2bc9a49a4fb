use std::time::Duration;

/// Discrete events emitted by the wall scheduler and its host runtime.
///
/// Events carry identifiers and outcomes only. Message text and payment
/// credentials never appear here.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// The runtime loop started with the given walls.
    RunStart { walls: usize, seed: Option<u64> },
    /// The runtime loop stopped.
    RunEnd { duration: Duration, posts: u64 },
    /// A delayed bot post was queued.
    PostScheduled {
        wall: String,
        bot: String,
        tag: String,
        delay: Duration,
    },
    /// A post was appended to a wall.
    PostCommitted {
        wall: String,
        sender: String,
        tag: String,
    },
    /// A chain cascade ended before or at exhaustion.
    ChainEnded { wall: String, stage: usize },
    /// A bot earned a streak bonus.
    RewardGranted {
        wall: String,
        bot: String,
        amount: f64,
        score: u64,
    },
    /// All bot scores were reset to zero.
    ScoresReset,
    /// The drip accumulator advanced by one interval.
    DripTick { value: f64 },
    /// A flavor fetch failed and the fallback line was used.
    FlavorFallback { bot: String, reason: String },
    /// One server-side payment step finished.
    PaymentStep {
        payment_id: String,
        step: String,
        success: bool,
    },
    /// An error occurred in a named component.
    Error {
        /// Subsystem where the error originated (e.g., `"store"`, `"flavor"`).
        component: String,
        /// Human-readable error description. Must not contain secrets.
        message: String,
    },
}

/// Numeric metrics emitted by the runtime.
#[derive(Debug, Clone)]
pub enum ObserverMetric {
    /// Time spent resolving flavor text for one post.
    FetchLatency(Duration),
    /// Number of live timers after a scheduler step.
    PendingTimers(u64),
    /// Current drip value.
    DripValue(f64),
}

/// Core observability trait for recording runtime telemetry.
///
/// The scheduler and runtime hold one `Arc<dyn Observer>` and call
/// [`record_event`](Observer::record_event) and
/// [`record_metric`](Observer::record_metric) at key points.
///
/// Implementations must be `Send + Sync + 'static` because the observer is
/// shared across spawned fetch tasks.
pub trait Observer: Send + Sync + 'static {
    /// Record a discrete event. Called synchronously on the hot path.
    fn record_event(&self, event: &ObserverEvent);

    /// Record a numeric metric sample.
    fn record_metric(&self, metric: &ObserverMetric);

    /// Flush any buffered telemetry. Called on graceful shutdown.
    fn flush(&self) {}

    /// Human-readable name of this backend (e.g., `"log"`, `"noop"`).
    fn name(&self) -> &str;
}
