//! Post text for bots: HTTP APIs, local files, fixed lists and a context
//! composer, all behind [`FlavorSource`] with per-bot fallbacks.

pub mod compose;
pub mod extract;
pub mod http;
pub mod resolver;
pub mod traits;

pub use compose::{ContextSource, SentenceComposer};
pub use http::{Extract, HttpSource, JsonFileSource, StaticSource};
pub use resolver::FlavorResolver;
pub use traits::{FlavorError, FlavorSource};

use crate::config::{Config, FlavorSourceConfig};
use crate::observability::Observer;
use crate::scheduler::BotId;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;

/// Factory: build one source from its config entry.
pub fn create_source(
    config: &Config,
    source: &FlavorSourceConfig,
    client: &reqwest::Client,
    rng: StdRng,
) -> anyhow::Result<Arc<dyn FlavorSource>> {
    let source: Arc<dyn FlavorSource> = match source {
        FlavorSourceConfig::JsonField {
            url,
            pointer,
            prefix,
        } => Arc::new(HttpSource::new(
            client.clone(),
            url,
            Extract::Field {
                pointer: pointer.clone(),
            },
            prefix.clone(),
            rng,
        )),
        FlavorSourceConfig::JsonList {
            url,
            pointer,
            prefix,
        } => Arc::new(HttpSource::new(
            client.clone(),
            url,
            Extract::List {
                pointer: pointer.clone().unwrap_or_default(),
            },
            prefix.clone(),
            rng,
        )),
        FlavorSourceConfig::Text { url } => Arc::new(HttpSource::new(
            client.clone(),
            url,
            Extract::Text,
            None,
            rng,
        )),
        FlavorSourceConfig::JsonFile { path, prefix } => Arc::new(JsonFileSource::new(
            config.resolve_workspace_path(path),
            prefix.clone(),
            rng,
        )),
        FlavorSourceConfig::Context => {
            let speakers: Vec<String> = config.bots.iter().map(|bot| bot.name.clone()).collect();
            Arc::new(ContextSource::new(&speakers, rng)?)
        }
        FlavorSourceConfig::Static { lines } => Arc::new(StaticSource::new(lines.clone(), rng)),
    };
    Ok(source)
}

/// Factory: resolver with every configured bot registered.
///
/// Each source gets its own RNG stream derived from the configured seed.
pub fn create_resolver(
    config: &Config,
    observer: Arc<dyn Observer>,
) -> anyhow::Result<FlavorResolver> {
    let client = http::build_client(config.flavor_timeout());
    let mut resolver = FlavorResolver::new(config.flavor_timeout()).with_observer(observer);
    for (index, bot) in config.bots.iter().enumerate() {
        let rng = match config.scheduler.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1 + index as u64)),
            None => StdRng::from_os_rng(),
        };
        let source = create_source(config, &bot.source, &client, rng)?;
        resolver.register(BotId::new(bot.name.clone()), source, bot.fallback.clone());
    }
    Ok(resolver)
}
