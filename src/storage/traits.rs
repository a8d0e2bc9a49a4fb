use async_trait::async_trait;
use serde_json::Value;

/// Durable key-value store. Values are JSON documents.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;

    /// Returns whether the key existed.
    async fn remove(&self, key: &str) -> anyhow::Result<bool>;
}
