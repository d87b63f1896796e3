//! CallVita command-line driver
//!
//! Runs scripted call scenarios against the session coordinator using the
//! simulated provider and console devices, logging every transition and
//! device effect.

mod scenarios;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use callvita_infra_common::{log_welcome, parse_log_level, setup_logging, LoggingConfig};
use callvita_session_core::prelude::*;

#[derive(Parser, Debug)]
#[command(
    name = "callvita",
    version,
    about = "Play call scenarios against the session coordinator"
)]
struct Cli {
    /// Coordinator config file (.toml or .json)
    #[arg(short, long, env = "CALLVITA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Include source locations and span open/close in logs
    #[arg(long)]
    verbose_logs: bool,

    /// How long the simulated provider takes to confirm requests
    #[arg(long, default_value = "500")]
    confirm_delay_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Place a call, talk, hang up
    Outgoing {
        #[arg(short, long, default_value = "Bob")]
        peer: String,

        /// Seconds to stay connected
        #[arg(short, long, default_value = "5")]
        talk_secs: u64,
    },
    /// Receive a call and accept or decline it
    Incoming {
        #[arg(short, long, default_value = "Family")]
        peer: String,

        /// Seconds to let it ring
        #[arg(short, long, default_value = "2")]
        ring_secs: u64,

        #[arg(short, long, default_value = "5")]
        talk_secs: u64,

        /// Decline instead of accepting
        #[arg(long)]
        decline: bool,

        /// Answer from the system call UI rather than the app
        #[arg(long, conflicts_with = "decline")]
        answer_from_system: bool,
    },
    /// Connect a call, then have the provider reset it repeatedly
    ResetStorm {
        #[arg(short, long, default_value = "Bob")]
        peer: String,

        /// Number of resets to fire at once
        #[arg(short, long, default_value = "3")]
        count: usize,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<CoordinatorConfig> {
    let config = match path {
        Some(path) => CoordinatorConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?
            .apply_env_overrides()?,
        None => CoordinatorConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&cli.log_level)?, "callvita");
    if cli.json_logs {
        logging = logging.with_json();
    }
    if cli.verbose_logs {
        logging = logging.with_file_info().with_spans();
    }
    setup_logging(logging)?;
    log_welcome("CallVita", callvita_session_core::VERSION);

    let config = load_config(cli.config.as_ref())?;
    info!(
        "Config: establish timeout {:?}, auto reset {:?}, provider '{}'",
        config.establish_timeout(),
        config.auto_reset_delay(),
        config.provider.localized_name
    );

    let settle_limit = config.auto_reset_delay() + Duration::from_secs(5);
    let behavior = SimulatedBehavior {
        confirm_delay: Duration::from_millis(cli.confirm_delay_ms),
        ..SimulatedBehavior::default()
    };
    let provider = Arc::new(SimulatedProvider::with_behavior(config.provider.clone(), behavior));
    let (devices, recorder) = EffectDevices::recording();
    let coordinator = CallSessionCoordinator::start(config, provider.clone(), devices)?;
    coordinator.subscribe_observer(Arc::new(scenarios::ConsoleObserver));

    let outcome = match cli.command {
        Command::Outgoing { peer, talk_secs } => {
            scenarios::outgoing(&coordinator, &peer, Duration::from_secs(talk_secs)).await
        }
        Command::Incoming {
            peer,
            ring_secs,
            talk_secs,
            decline,
            answer_from_system,
        } => {
            let answer = if decline {
                scenarios::Answer::Decline
            } else if answer_from_system {
                scenarios::Answer::FromSystem
            } else {
                scenarios::Answer::InApp
            };
            scenarios::incoming(
                &coordinator,
                &provider,
                &peer,
                Duration::from_secs(ring_secs),
                Duration::from_secs(talk_secs),
                answer,
            )
            .await
        }
        Command::ResetStorm { peer, count } => {
            scenarios::reset_storm(&coordinator, &provider, &peer, count, settle_limit).await
        }
    };

    coordinator.shutdown().await;
    scenarios::print_summary(&recorder, &provider);
    outcome
}
