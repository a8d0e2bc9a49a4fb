//! Free-running drip counter.
//!
//! The accumulator itself is plain state; the scheduler owns the timer that
//! calls [`DripAccumulator::tick`] and the runtime mirrors the value into the
//! key-value store.

use crate::config::Config;
use crate::storage::{KeyValueStore, create_store};
use anyhow::Context;
use serde_json::Value;
use std::time::Duration;

pub const DRIP_KEY: &str = "drip.accumulated";

#[derive(Debug, Clone, PartialEq)]
pub struct DripAccumulator {
    value: f64,
    amount: f64,
    interval: Duration,
}

impl DripAccumulator {
    pub fn new(amount: f64, interval: Duration) -> Self {
        Self {
            value: 0.0,
            amount,
            interval,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Add one interval's worth and return the new value.
    pub fn tick(&mut self) -> f64 {
        self.value += self.amount;
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }

    /// Restore a persisted value. Negative and non-finite input clamps to 0.
    pub fn set(&mut self, value: f64) {
        self.value = if value.is_finite() { value.max(0.0) } else { 0.0 };
    }

    /// Take up to `amount` from the pool and return what was actually taken.
    pub fn withdraw(&mut self, amount: f64) -> f64 {
        if !amount.is_finite() || amount <= 0.0 {
            return 0.0;
        }
        let taken = amount.min(self.value);
        self.value -= taken;
        if self.value < 0.0 {
            self.value = 0.0;
        }
        taken
    }
}

impl Default for DripAccumulator {
    fn default() -> Self {
        Self::new(0.05, Duration::from_secs(10))
    }
}

/// Read the persisted drip value. A missing key reads as zero.
pub async fn load_drip(store: &dyn KeyValueStore) -> anyhow::Result<f64> {
    match store.get(DRIP_KEY).await? {
        None => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .context("Stored drip value is not representable as f64"),
        // Older writers stored the value as a string.
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("Stored drip value is not numeric: {s:?}")),
        Some(other) => anyhow::bail!("Stored drip value has unexpected type: {other}"),
    }
}

pub async fn persist_drip(store: &dyn KeyValueStore, value: f64) -> anyhow::Result<()> {
    store.set(DRIP_KEY, serde_json::json!(value)).await
}

pub async fn handle_command(command: crate::DripCommands, config: &Config) -> anyhow::Result<()> {
    let store = create_store(&config.storage, &config.workspace_dir);
    match command {
        crate::DripCommands::Status => {
            let value = load_drip(store.as_ref()).await?;
            println!("💧 Drip accumulated: {value:.4}");
            println!(
                "   +{} every {}s while walls are running",
                config.drip.amount, config.drip.interval_secs
            );
        }
        crate::DripCommands::Reset => {
            persist_drip(store.as_ref(), 0.0).await?;
            println!("✅ Drip reset to 0");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn n_ticks_accumulate_linearly() {
        let mut drip = DripAccumulator::default();
        for _ in 0..40 {
            drip.tick();
        }
        assert!((drip.value() - 0.05 * 40.0).abs() < 1e-9);
    }

    #[test]
    fn reset_is_exactly_zero() {
        let mut drip = DripAccumulator::default();
        drip.tick();
        drip.tick();
        drip.reset();
        assert_eq!(drip.value(), 0.0);
    }

    #[test]
    fn withdraw_never_goes_negative() {
        let mut drip = DripAccumulator::default();
        drip.set(0.1);
        assert!((drip.withdraw(0.04) - 0.04).abs() < 1e-12);
        assert!((drip.withdraw(5.0) - 0.06).abs() < 1e-12);
        assert_eq!(drip.value(), 0.0);
        assert_eq!(drip.withdraw(-1.0), 0.0);
        assert_eq!(drip.withdraw(f64::NAN), 0.0);
    }

    #[test]
    fn set_clamps_bad_values() {
        let mut drip = DripAccumulator::default();
        drip.set(-3.0);
        assert_eq!(drip.value(), 0.0);
        drip.set(f64::INFINITY);
        assert_eq!(drip.value(), 0.0);
        drip.set(2.5);
        assert_eq!(drip.value(), 2.5);
    }

    #[tokio::test]
    async fn load_and_persist_round_trip_through_store() {
        let store = MemoryStore::new();
        assert_eq!(load_drip(&store).await.unwrap(), 0.0);

        persist_drip(&store, 0.35).await.unwrap();
        assert!((load_drip(&store).await.unwrap() - 0.35).abs() < 1e-12);

        store.set(DRIP_KEY, json!("1.5")).await.unwrap();
        assert_eq!(load_drip(&store).await.unwrap(), 1.5);

        store.set(DRIP_KEY, json!("abc")).await.unwrap();
        assert!(load_drip(&store).await.is_err());
    }
}
