use crate::ledger::{LedgerSettings, RewardPolicy};
use crate::scheduler::{BotId, SchedulerSettings, scaled};
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory; computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml; computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub drip: DripConfig,

    /// Bot personas, in wall order. Each bot owns one wall.
    #[serde(default = "default_bots")]
    pub bots: Vec<BotConfig>,

    #[serde(default)]
    pub flavor: FlavorConfig,

    #[serde(default)]
    pub payments: PaymentsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ── Scheduler ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Multiplier applied to every conversation delay below. 1.0 = real pace.
    #[serde(default = "default_speed_factor")]
    pub speed_factor: f64,
    /// Fixed RNG seed for reproducible runs. Unset = OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_inactivity_ms")]
    pub inactivity_ms: u64,
    #[serde(default = "default_chain_delay_ms")]
    pub chain_delay_ms: u64,
    /// Per-stage success probabilities of the follow-up cascade
    #[serde(default = "default_chain_probabilities")]
    pub chain_probabilities: Vec<f64>,
    #[serde(default = "default_primary_delay_ms")]
    pub primary_delay_ms: u64,
    #[serde(default = "default_secondary_probability")]
    pub secondary_probability: f64,
    #[serde(default = "default_secondary_delay_min_ms")]
    pub secondary_delay_min_ms: u64,
    #[serde(default = "default_secondary_delay_max_ms")]
    pub secondary_delay_max_ms: u64,
    #[serde(default = "default_true")]
    pub ambient_enabled: bool,
    #[serde(default = "default_ambient_interval_ms")]
    pub ambient_interval_ms: u64,
    /// Whether bot posts also trigger responders (user posts always do)
    #[serde(default)]
    pub dispatch_on_bot_posts: bool,
    /// Messages of wall history handed to context-composing sources
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
}

fn default_speed_factor() -> f64 {
    crate::scheduler::DEFAULT_SPEED_FACTOR
}

fn default_inactivity_ms() -> u64 {
    crate::scheduler::BASE_INACTIVITY_MS
}

fn default_chain_delay_ms() -> u64 {
    crate::scheduler::BASE_CHAIN_DELAY_MS
}

fn default_chain_probabilities() -> Vec<f64> {
    crate::scheduler::DEFAULT_CHAIN_PROBABILITIES.to_vec()
}

fn default_primary_delay_ms() -> u64 {
    crate::scheduler::BASE_PRIMARY_DELAY_MS
}

fn default_secondary_probability() -> f64 {
    0.5
}

fn default_secondary_delay_min_ms() -> u64 {
    crate::scheduler::BASE_SECONDARY_MIN_MS
}

fn default_secondary_delay_max_ms() -> u64 {
    crate::scheduler::BASE_SECONDARY_MAX_MS
}

fn default_ambient_interval_ms() -> u64 {
    crate::scheduler::BASE_AMBIENT_MS
}

fn default_context_limit() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            speed_factor: default_speed_factor(),
            seed: None,
            inactivity_ms: default_inactivity_ms(),
            chain_delay_ms: default_chain_delay_ms(),
            chain_probabilities: default_chain_probabilities(),
            primary_delay_ms: default_primary_delay_ms(),
            secondary_probability: default_secondary_probability(),
            secondary_delay_min_ms: default_secondary_delay_min_ms(),
            secondary_delay_max_ms: default_secondary_delay_max_ms(),
            ambient_enabled: true,
            ambient_interval_ms: default_ambient_interval_ms(),
            dispatch_on_bot_posts: false,
            context_limit: default_context_limit(),
        }
    }
}

// ── Ledger ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Consecutive posts by one bot on one wall that earn a bonus
    #[serde(default = "default_streak_threshold")]
    pub streak_threshold: u32,
    #[serde(default)]
    pub reward: RewardPolicy,
    /// Reset every score once any bot reaches this many awards
    #[serde(default)]
    pub score_reset_at: Option<u64>,
}

fn default_streak_threshold() -> u32 {
    2
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            streak_threshold: default_streak_threshold(),
            reward: RewardPolicy::default(),
            score_reset_at: None,
        }
    }
}

// ── Drip ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DripConfig {
    #[serde(default = "default_drip_amount")]
    pub amount: f64,
    /// Seconds between increments. Not affected by the speed factor.
    #[serde(default = "default_drip_interval_secs")]
    pub interval_secs: u64,
}

fn default_drip_amount() -> f64 {
    0.05
}

fn default_drip_interval_secs() -> u64 {
    10
}

impl Default for DripConfig {
    fn default() -> Self {
        Self {
            amount: default_drip_amount(),
            interval_secs: default_drip_interval_secs(),
        }
    }
}

// ── Bots & flavor sources ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub name: String,
    pub source: FlavorSourceConfig,
    /// Line posted when the source fails
    pub fallback: String,
}

/// Where a bot's post text comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlavorSourceConfig {
    /// GET `url`, take the string at JSON `pointer` (e.g. "/joke")
    JsonField {
        url: String,
        pointer: String,
        #[serde(default)]
        prefix: Option<String>,
    },
    /// GET `url`, pick a random string from the array at `pointer` (or root)
    JsonList {
        url: String,
        #[serde(default)]
        pointer: Option<String>,
        #[serde(default)]
        prefix: Option<String>,
    },
    /// Random string from a local JSON array file; relative paths resolve
    /// against the workspace
    JsonFile {
        path: PathBuf,
        #[serde(default)]
        prefix: Option<String>,
    },
    /// GET `url`, use the trimmed body
    Text { url: String },
    /// Compose a sentence from the wall's recent messages
    Context,
    /// Random line from a fixed list
    Static { lines: Vec<String> },
}

fn default_bots() -> Vec<BotConfig> {
    vec![
        BotConfig {
            name: "Pi".into(),
            source: FlavorSourceConfig::JsonField {
                url: "https://v2.jokeapi.dev/joke/Any?type=single".into(),
                pointer: "/joke".into(),
                prefix: None,
            },
            fallback: "Oops, couldn't fetch a joke.".into(),
        },
        BotConfig {
            name: "Moti".into(),
            source: FlavorSourceConfig::JsonFile {
                path: PathBuf::from("data/story.json"),
                prefix: None,
            },
            fallback: "Stay inspired!".into(),
        },
        BotConfig {
            name: "Sol".into(),
            source: FlavorSourceConfig::JsonFile {
                path: PathBuf::from("data/funfacts.json"),
                prefix: Some("Fun Fact: ".into()),
            },
            fallback: "No fun facts available.".into(),
        },
        BotConfig {
            name: "Math".into(),
            source: FlavorSourceConfig::Context,
            fallback: "I'm here to join the conversation!".into(),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavorConfig {
    /// Upper bound on one flavor fetch before the fallback is used
    #[serde(default = "default_flavor_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_flavor_timeout_secs() -> u64 {
    10
}

impl Default for FlavorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_flavor_timeout_secs(),
        }
    }
}

// ── Payments ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentsConfig {
    /// Payment processor base URL; `/v2/payments/...` is appended
    #[serde(default = "default_payments_api_base")]
    pub api_base: String,
    /// Server API key. Prefer `AIWALLS_PAYMENTS_API_KEY` over storing it here.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_payments_timeout_secs")]
    pub timeout_secs: u64,
    /// Smallest balance a withdrawal may leave behind
    #[serde(default = "default_min_balance")]
    pub min_balance: f64,
}

fn default_payments_api_base() -> String {
    "https://api.minepi.com".into()
}

fn default_payments_timeout_secs() -> u64 {
    30
}

fn default_min_balance() -> f64 {
    1.0
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            api_base: default_payments_api_base(),
            api_key: None,
            timeout_secs: default_payments_timeout_secs(),
            min_balance: default_min_balance(),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "file" | "memory"
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// File name inside the workspace for the "file" backend
    #[serde(default = "default_storage_file_name")]
    pub file_name: String,
}

fn default_storage_backend() -> String {
    "file".into()
}

fn default_storage_file_name() -> String {
    "store.json".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            file_name: default_storage_file_name(),
        }
    }
}

// ── Observability ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// "none" | "log"
    #[serde(default = "default_observability_backend")]
    pub backend: String,
}

fn default_observability_backend() -> String {
    "none".into()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            backend: default_observability_backend(),
        }
    }
}

// ── Config impl ───────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let aiwalls_dir = home.join(".aiwalls");

        Self {
            workspace_dir: aiwalls_dir.join("workspace"),
            config_path: aiwalls_dir.join("config.toml"),
            scheduler: SchedulerConfig::default(),
            ledger: LedgerConfig::default(),
            drip: DripConfig::default(),
            bots: default_bots(),
            flavor: FlavorConfig::default(),
            payments: PaymentsConfig::default(),
            storage: StorageConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let mut config = Self::load_or_init_in(&home.join(".aiwalls"))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load `config.toml` from `dir`, writing defaults on first run.
    /// Environment overrides are not applied.
    pub fn load_or_init_in(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.toml");
        let workspace_dir = dir.join("workspace");

        if !workspace_dir.exists() {
            fs::create_dir_all(&workspace_dir)
                .context("Failed to create workspace directory")?;
        }

        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            config.workspace_dir = workspace_dir;
            config
        } else {
            let mut config = Config::default();
            config.config_path = config_path;
            config.workspace_dir = workspace_dir;
            config.save()?;
            config
        };
        if config.bots.is_empty() {
            config.bots = default_bots();
        }
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Workspace directory: AIWALLS_WORKSPACE
        if let Some(workspace) = get("AIWALLS_WORKSPACE") {
            self.workspace_dir = PathBuf::from(workspace);
        }

        // Speed factor: AIWALLS_SPEED_FACTOR
        if let Some(raw) = get("AIWALLS_SPEED_FACTOR") {
            match raw.trim().parse::<f64>() {
                Ok(speed) if speed.is_finite() && speed > 0.0 => {
                    self.scheduler.speed_factor = speed;
                }
                _ => tracing::warn!("Ignoring invalid AIWALLS_SPEED_FACTOR={raw:?}"),
            }
        }

        // RNG seed: AIWALLS_SEED
        if let Some(raw) = get("AIWALLS_SEED") {
            match raw.trim().parse::<u64>() {
                Ok(seed) => self.scheduler.seed = Some(seed),
                Err(_) => tracing::warn!("Ignoring invalid AIWALLS_SEED={raw:?}"),
            }
        }

        // Payment processor key: AIWALLS_PAYMENTS_API_KEY
        if let Some(key) = get("AIWALLS_PAYMENTS_API_KEY") {
            self.payments.api_key = Some(key);
        }

        // Payment processor base URL: AIWALLS_PAYMENTS_API_BASE
        if let Some(base) = get("AIWALLS_PAYMENTS_API_BASE") {
            self.payments.api_base = base;
        }

        // Observer backend: AIWALLS_OBSERVABILITY
        if let Some(backend) = get("AIWALLS_OBSERVABILITY") {
            self.observability.backend = backend;
        }
    }

    pub fn bot_ids(&self) -> Vec<BotId> {
        self.bots.iter().map(|bot| BotId::new(bot.name.clone())).collect()
    }

    pub fn bot(&self, name: &str) -> Option<&BotConfig> {
        self.bots.iter().find(|bot| bot.name == name)
    }

    /// Effective scheduler timings with the speed factor applied.
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        let s = &self.scheduler;
        let speed = s.speed_factor;
        SchedulerSettings {
            inactivity_timeout: scaled(s.inactivity_ms, speed),
            chain_delay: scaled(s.chain_delay_ms, speed),
            chain_probabilities: Arc::from(s.chain_probabilities.as_slice()),
            primary_delay: scaled(s.primary_delay_ms, speed),
            secondary_probability: s.secondary_probability,
            secondary_delay_min: scaled(s.secondary_delay_min_ms, speed),
            secondary_delay_max: scaled(s.secondary_delay_max_ms, speed),
            ambient_interval: s
                .ambient_enabled
                .then(|| scaled(s.ambient_interval_ms, speed)),
            dispatch_on_bot_posts: s.dispatch_on_bot_posts,
            drip_amount: self.drip.amount,
            drip_interval: Duration::from_secs(self.drip.interval_secs),
            ledger: LedgerSettings {
                streak_threshold: self.ledger.streak_threshold,
                policy: self.ledger.reward.clone(),
                score_reset_at: self.ledger.score_reset_at,
            },
        }
    }

    pub fn flavor_timeout(&self) -> Duration {
        Duration::from_secs(self.flavor.timeout_secs)
    }

    /// Resolve a possibly relative source path against the workspace.
    pub fn resolve_workspace_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_dir.join(path)
        }
    }

    pub fn validate(&self) -> Result<()> {
        let speed = self.scheduler.speed_factor;
        if !speed.is_finite() || speed <= 0.0 {
            anyhow::bail!("scheduler.speed_factor must be a positive number, got {speed}");
        }
        if self.bots.is_empty() {
            anyhow::bail!("at least one bot must be configured");
        }
        let mut seen = std::collections::HashSet::new();
        for bot in &self.bots {
            let name = bot.name.trim();
            if name.is_empty() || name.contains(':') {
                anyhow::bail!("bot name {:?} must be non-empty and contain no ':'", bot.name);
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                anyhow::bail!("duplicate bot name {:?}", bot.name);
            }
            validate_source(&bot.name, &bot.source)?;
        }
        match &self.ledger.reward {
            RewardPolicy::Fixed { amount } if !amount.is_finite() || *amount < 0.0 => {
                anyhow::bail!("ledger.reward.amount must be a non-negative number");
            }
            RewardPolicy::DripShare { fraction, .. } if !(0.0..=1.0).contains(fraction) => {
                anyhow::bail!("ledger.reward.fraction must be within [0, 1]");
            }
            _ => {}
        }
        if self.ledger.score_reset_at == Some(0) {
            anyhow::bail!("ledger.score_reset_at must be at least 1 when set");
        }
        if self.flavor.timeout_secs == 0 {
            anyhow::bail!("flavor.timeout_secs must be greater than zero");
        }
        if self.payments.timeout_secs == 0 {
            anyhow::bail!("payments.timeout_secs must be greater than zero");
        }
        let base = self.payments.api_base.trim();
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            anyhow::bail!("payments.api_base must be an http(s) URL");
        }
        if !self.payments.min_balance.is_finite() || self.payments.min_balance < 0.0 {
            anyhow::bail!("payments.min_balance must be a non-negative number");
        }
        self.scheduler_settings()
            .validate()
            .context("Invalid scheduler configuration")?;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        crate::util::atomic_write(&self.config_path, toml_str.as_bytes())
            .context("Failed to write config file")
    }
}

fn validate_source(bot: &str, source: &FlavorSourceConfig) -> Result<()> {
    let check_url = |url: &str| -> Result<()> {
        if url.starts_with("https://") || url.starts_with("http://") {
            Ok(())
        } else {
            anyhow::bail!("bot {bot}: source url {url:?} must be http(s)")
        }
    };
    let check_pointer = |pointer: &str| -> Result<()> {
        if pointer.is_empty() || pointer.starts_with('/') {
            Ok(())
        } else {
            anyhow::bail!("bot {bot}: JSON pointer {pointer:?} must start with '/'")
        }
    };
    match source {
        FlavorSourceConfig::JsonField { url, pointer, .. } => {
            check_url(url)?;
            check_pointer(pointer)
        }
        FlavorSourceConfig::JsonList { url, pointer, .. } => {
            check_url(url)?;
            pointer.as_deref().map_or(Ok(()), check_pointer)
        }
        FlavorSourceConfig::Text { url } => check_url(url),
        FlavorSourceConfig::Static { lines } if lines.iter().all(|l| l.trim().is_empty()) => {
            anyhow::bail!("bot {bot}: static source needs at least one non-empty line")
        }
        FlavorSourceConfig::JsonFile { .. }
        | FlavorSourceConfig::Context
        | FlavorSourceConfig::Static { .. } => Ok(()),
    }
}
