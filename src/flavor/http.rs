use super::extract;
use super::traits::{FlavorError, FlavorSource};
use crate::scheduler::BotId;
use crate::util::truncate_with_ellipsis;
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// How a fetched body turns into post text.
#[derive(Debug, Clone)]
pub enum Extract {
    /// String at a JSON pointer
    Field { pointer: String },
    /// Random string from the array at a JSON pointer ("" = root)
    List { pointer: String },
    /// Trimmed plain-text body
    Text,
}

pub fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("aiwalls/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Public HTTP API source (joke, quote, fact endpoints and the like).
pub struct HttpSource {
    client: Client,
    url: String,
    extract: Extract,
    prefix: Option<String>,
    rng: Mutex<StdRng>,
}

impl HttpSource {
    pub fn new(
        client: Client,
        url: impl Into<String>,
        extract: Extract,
        prefix: Option<String>,
        rng: StdRng,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            extract,
            prefix,
            rng: Mutex::new(rng),
        }
    }

    async fn get_body(&self) -> anyhow::Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FlavorError::Status(status.as_u16()).into());
        }
        response
            .text()
            .await
            .with_context(|| format!("Failed to read body from {}", self.url))
    }
}

#[async_trait]
impl FlavorSource for HttpSource {
    fn name(&self) -> &str {
        match self.extract {
            Extract::Field { .. } => "json_field",
            Extract::List { .. } => "json_list",
            Extract::Text => "text",
        }
    }

    async fn fetch(&self, _bot: &BotId, _context: &[String]) -> anyhow::Result<String> {
        let body = self.get_body().await?;
        let text = match &self.extract {
            Extract::Text => extract::text_body(&body)?,
            Extract::Field { pointer } => {
                let value = parse_json(&body)?;
                extract::field(&value, pointer)?
            }
            Extract::List { pointer } => {
                let value = parse_json(&body)?;
                extract::random_element(&value, pointer, &mut *self.rng.lock())?
            }
        };
        Ok(extract::with_prefix(text, self.prefix.as_deref()))
    }
}

fn parse_json(body: &str) -> anyhow::Result<Value> {
    serde_json::from_str(body).with_context(|| {
        format!(
            "Response is not JSON: {}",
            truncate_with_ellipsis(body.trim(), 80)
        )
    })
}

/// Local JSON array file, re-read on every fetch so edits apply live.
pub struct JsonFileSource {
    path: PathBuf,
    prefix: Option<String>,
    rng: Mutex<StdRng>,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>, prefix: Option<String>, rng: StdRng) -> Self {
        Self {
            path: path.into(),
            prefix,
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl FlavorSource for JsonFileSource {
    fn name(&self) -> &str {
        "json_file"
    }

    async fn fetch(&self, _bot: &BotId, _context: &[String]) -> anyhow::Result<String> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let value = parse_json(&raw)?;
        let text = extract::random_element(&value, "", &mut *self.rng.lock())?;
        Ok(extract::with_prefix(text, self.prefix.as_deref()))
    }
}

/// Random line from a configured list.
pub struct StaticSource {
    lines: Vec<String>,
    rng: Mutex<StdRng>,
}

impl StaticSource {
    pub fn new(lines: Vec<String>, rng: StdRng) -> Self {
        Self {
            lines,
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl FlavorSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, _bot: &BotId, _context: &[String]) -> anyhow::Result<String> {
        Ok(extract::random_line(&self.lines, &mut *self.rng.lock())?)
    }
}
