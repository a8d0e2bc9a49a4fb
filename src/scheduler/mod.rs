//! Timer-driven conversation scheduler.
//!
//! The scheduler is a pure state machine over virtual time: callers pass
//! "now" into [`Scheduler::advance`] and get back the posts that became due.
//! Resolving post text and committing it is the host's job.

pub mod chain;
pub mod dispatch;
pub mod engine;
pub mod timer;
pub mod types;
pub mod wall;

pub use chain::{ChainCascade, DEFAULT_CHAIN_PROBABILITIES};
pub use dispatch::{DispatchPlan, plan_dispatch};
pub use engine::{Commit, Scheduler, SchedulerEvent};
pub use timer::{TimerHandle, TimerQueue};
pub use types::{BotId, PostRequest, PostTag, Sender, WallId, WallMessage};
pub use wall::{Wall, WallRegistry};

use crate::ledger::LedgerSettings;
use std::sync::Arc;
use std::time::Duration;

/// Base timings in milliseconds, before the speed factor is applied.
pub const BASE_INACTIVITY_MS: u64 = 13_000;
pub const BASE_CHAIN_DELAY_MS: u64 = 11_000;
pub const BASE_PRIMARY_DELAY_MS: u64 = 11_000;
pub const BASE_SECONDARY_MIN_MS: u64 = 12_000;
pub const BASE_SECONDARY_MAX_MS: u64 = 15_000;
pub const BASE_AMBIENT_MS: u64 = 20_000;
pub const DEFAULT_SPEED_FACTOR: f64 = 0.4;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("wall '{0}' already exists")]
    DuplicateWall(String),
    #[error("unknown wall '{0}'")]
    UnknownWall(String),
    #[error("unknown bot '{0}'")]
    UnknownBot(String),
    #[error("scheduler needs at least one bot")]
    NoBots,
    #[error("invalid scheduler settings: {0}")]
    InvalidSettings(String),
}

/// Effective timings and probabilities, already scaled by the speed factor.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub inactivity_timeout: Duration,
    pub chain_delay: Duration,
    pub chain_probabilities: Arc<[f64]>,
    pub primary_delay: Duration,
    pub secondary_probability: f64,
    pub secondary_delay_min: Duration,
    pub secondary_delay_max: Duration,
    /// `None` disables the global ambient tick.
    pub ambient_interval: Option<Duration>,
    pub dispatch_on_bot_posts: bool,
    pub drip_amount: f64,
    pub drip_interval: Duration,
    pub ledger: LedgerSettings,
}

/// Scale a base delay by the speed factor, rounded to whole milliseconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scaled(base_ms: u64, speed: f64) -> Duration {
    let ms = (base_ms as f64 * speed).round();
    if ms.is_finite() && ms > 0.0 {
        Duration::from_millis(ms as u64)
    } else {
        Duration::ZERO
    }
}

impl SchedulerSettings {
    /// Default timings at the given speed factor. The drip interval is not
    /// scaled.
    pub fn with_speed(speed: f64) -> Self {
        Self {
            inactivity_timeout: scaled(BASE_INACTIVITY_MS, speed),
            chain_delay: scaled(BASE_CHAIN_DELAY_MS, speed),
            chain_probabilities: Arc::from(DEFAULT_CHAIN_PROBABILITIES),
            primary_delay: scaled(BASE_PRIMARY_DELAY_MS, speed),
            secondary_probability: 0.5,
            secondary_delay_min: scaled(BASE_SECONDARY_MIN_MS, speed),
            secondary_delay_max: scaled(BASE_SECONDARY_MAX_MS, speed),
            ambient_interval: Some(scaled(BASE_AMBIENT_MS, speed)),
            dispatch_on_bot_posts: false,
            drip_amount: 0.05,
            drip_interval: Duration::from_secs(10),
            ledger: LedgerSettings::default(),
        }
    }

    /// Reject settings that would stall the timer loop or break sampling.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let repeating = [
            ("inactivity_timeout", Some(self.inactivity_timeout)),
            ("drip_interval", Some(self.drip_interval)),
            ("ambient_interval", self.ambient_interval),
        ];
        for (name, value) in repeating {
            if value.is_some_and(|d| d.is_zero()) {
                return Err(SchedulerError::InvalidSettings(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.secondary_delay_min > self.secondary_delay_max {
            return Err(SchedulerError::InvalidSettings(
                "secondary_delay_min exceeds secondary_delay_max".into(),
            ));
        }
        let probabilities = self
            .chain_probabilities
            .iter()
            .chain(std::iter::once(&self.secondary_probability));
        for p in probabilities {
            if !(0.0..=1.0).contains(p) {
                return Err(SchedulerError::InvalidSettings(format!(
                    "probability {p} is outside [0, 1]"
                )));
            }
        }
        if !self.drip_amount.is_finite() || self.drip_amount < 0.0 {
            return Err(SchedulerError::InvalidSettings(
                "drip_amount must be a non-negative number".into(),
            ));
        }
        if self.ledger.streak_threshold == 0 {
            return Err(SchedulerError::InvalidSettings(
                "streak_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::with_speed(DEFAULT_SPEED_FACTOR)
    }
}
