//! Mixtape server binary.
//!
//! Wires the in-memory store and the signed token codec into the server
//! and runs it. Every tunable is a flag with an environment fallback;
//! durations are humantime strings (`90s`, `15m`, `1h`).

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mixtape::prelude::*;
use mixtape::session::{SessionLimits, SystemClock};

#[derive(Debug, Parser)]
#[command(name = "mixtape-server", version, about = "Real-time party-quiz session server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "MIXTAPE_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Digits in a freshly minted join code.
    #[arg(long, env = "MIXTAPE_CODE_LENGTH", default_value_t = 6)]
    code_length: usize,

    /// How long a session may go untouched before the reaper finishes it.
    #[arg(
        long,
        env = "MIXTAPE_INACTIVE_TIMEOUT",
        value_parser = humantime::parse_duration,
        default_value = "1h"
    )]
    inactive_timeout: Duration,

    /// How often the reaper sweeps.
    #[arg(
        long,
        env = "MIXTAPE_SWEEP_INTERVAL",
        value_parser = humantime::parse_duration,
        default_value = "15m"
    )]
    sweep_interval: Duration,

    /// How long a started game counts down before going active.
    #[arg(
        long,
        env = "MIXTAPE_COUNTDOWN",
        value_parser = humantime::parse_duration,
        default_value = "15s"
    )]
    countdown: Duration,

    /// Secret used to sign invite and player tokens.
    #[arg(long, env = "MIXTAPE_TOKEN_SECRET", hide_env_values = true)]
    token_secret: String,

    /// Token time-to-live.
    #[arg(
        long,
        env = "MIXTAPE_TOKEN_TTL",
        value_parser = humantime::parse_duration,
        default_value = "12h"
    )]
    token_ttl: Duration,

    /// Largest roster a session may hold.
    #[arg(long, env = "MIXTAPE_MAX_PLAYERS", default_value_t = 10)]
    max_players: usize,

    /// Longest allowed player name, in characters.
    #[arg(long, env = "MIXTAPE_MAX_NAME_LEN", default_value_t = 16)]
    max_name_len: usize,

    /// Forbid non-authors from leaving a game already in progress.
    #[arg(long, env = "MIXTAPE_LOCK_IN_PROGRESS")]
    lock_in_progress: bool,

    /// Answer diagnostic ECHO events. Never enable in production.
    #[arg(long, env = "MIXTAPE_ECHO")]
    echo: bool,
}

#[tokio::main]
async fn main() -> Result<(), MixtapeError> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let limits = SessionLimits {
        min_players: 1,
        max_players: args.max_players,
        max_name_len: args.max_name_len,
    };
    let store = MemoryStore::with(limits, Arc::new(SystemClock));
    let tokens =
        SignedTokenCodec::new(args.token_secret.as_bytes(), args.token_ttl);

    let config = MixtapeConfig {
        code_length: args.code_length,
        inactive_timeout: args.inactive_timeout,
        sweep_interval: args.sweep_interval,
        countdown: args.countdown,
        allow_leave_in_progress: !args.lock_in_progress,
        echo_enabled: args.echo,
    };

    let server = MixtapeServerBuilder::new()
        .bind(&args.bind)
        .config(config)
        .build(store, tokens)
        .await?;

    tracing::info!(addr = %server.local_addr()?, "mixtape listening");
    server.run().await
}
