#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unnecessary_wraps,
    dead_code
)]

use aiwalls::runtime::{ConsoleSink, WallRuntime, spawn_stdin_reader};
use aiwalls::{ConfigCommands, Config, DripCommands, PaymentCommands, TransactionCommands};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// `aiwalls` - bot chat walls on a timer, with a drip counter and streak rewards.
#[derive(Parser, Debug)]
#[command(name = "aiwalls")]
#[command(version)]
#[command(about = "Timer-driven bot chat walls.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the walls and read "<Wall>: <message>" lines from stdin
    Run {
        /// Seed for reproducible bot choices and delays
        #[arg(long)]
        seed: Option<u64>,

        /// Multiplier applied to every conversation delay (e.g. 0.4)
        #[arg(long)]
        speed: Option<f64>,
    },

    /// Inspect or reset the drip accumulator
    Drip {
        #[command(subcommand)]
        drip_command: DripCommands,
    },

    /// Inspect the local payment transaction log
    Transactions {
        #[command(subcommand)]
        transaction_command: TransactionCommands,
    },

    /// Run a server-side payment step against the processor
    Payment {
        #[command(subcommand)]
        payment_command: PaymentCommands,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let mut config = Config::load_or_init()?;

    match cli.command {
        Commands::Run { seed, speed } => {
            if let Some(seed) = seed {
                config.scheduler.seed = Some(seed);
            }
            if let Some(speed) = speed {
                config.scheduler.speed_factor = speed;
            }
            config.validate()?;
            run_walls(&config).await
        }
        Commands::Drip { drip_command } => aiwalls::drip::handle_command(drip_command, &config).await,
        Commands::Transactions {
            transaction_command,
        } => aiwalls::storage::transactions::handle_command(transaction_command, &config).await,
        Commands::Payment { payment_command } => {
            aiwalls::payments::handle_command(payment_command, &config).await
        }
        Commands::Config { config_command } => match config_command {
            ConfigCommands::Show => {
                let mut shown = config.clone();
                if shown.payments.api_key.is_some() {
                    shown.payments.api_key = Some("***".into());
                }
                let rendered =
                    toml::to_string_pretty(&shown).context("Failed to render configuration")?;
                println!("{rendered}");
                Ok(())
            }
            ConfigCommands::Path => {
                println!("{}", config.config_path.display());
                Ok(())
            }
        },
    }
}

async fn run_walls(config: &Config) -> Result<()> {
    let runtime = WallRuntime::from_config(config, Arc::new(ConsoleSink::new()))?;
    let walls: Vec<&str> = config.bots.iter().map(|bot| bot.name.as_str()).collect();
    println!("🧱 Walls: {}", walls.join(", "));
    println!("   Speed factor: {}", config.scheduler.speed_factor);
    if let Some(seed) = config.scheduler.seed {
        println!("   Seed: {seed}");
    }
    println!("   Press Ctrl-C to stop.");
    println!();

    let input = spawn_stdin_reader(32);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let summary = runtime.run(input, shutdown).await?;
    info!(
        posts = summary.posts,
        seconds = summary.duration.as_secs_f64(),
        "Run finished"
    );
    println!();
    println!("💧 Drip accumulated: {:.4}", summary.drip);
    Ok(())
}
