pub mod schema;

pub use schema::{
    BotConfig, Config, DripConfig, FlavorConfig, FlavorSourceConfig, LedgerConfig,
    ObservabilityConfig, PaymentsConfig, SchedulerConfig, StorageConfig,
};
