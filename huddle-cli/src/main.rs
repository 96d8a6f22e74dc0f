use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use huddle_core::CodeStyle;
use huddle_server::{AppState, RegistryConfig, RelayConfig, router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CodeStyleArg {
    /// 6-character alphanumeric codes.
    Short,
    /// adjective-color-animal codes.
    Words,
}

impl From<CodeStyleArg> for CodeStyle {
    fn from(style: CodeStyleArg) -> Self {
        match style {
            CodeStyleArg::Short => CodeStyle::Short,
            CodeStyleArg::Words => CodeStyle::Words,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "huddle-relay")]
#[command(about = "Room registry and signaling relay for huddle")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// Maximum number of live rooms.
    #[arg(long, default_value_t = 1024)]
    max_rooms: usize,

    /// Seconds an empty room lingers before the sweep removes it.
    #[arg(long, default_value_t = 300)]
    idle_secs: u64,

    /// Seconds between expiry sweeps.
    #[arg(long, default_value_t = 30)]
    sweep_secs: u64,

    /// Which room-code form create hands out (both are accepted on join).
    #[arg(long, value_enum, default_value = "short")]
    code_style: CodeStyleArg,

    /// Per-connection signaling messages allowed per second.
    #[arg(long, default_value_t = 64)]
    max_message_rate: u32,

    /// Ceiling on a single envelope, in bytes.
    #[arg(long, default_value_t = 64 * 1024)]
    max_envelope_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    println!("{}", "huddle relay".green().bold());
    println!("   {} {}", "bind:".cyan(), args.bind);
    println!(
        "   {} {} rooms, {}s idle expiry",
        "limits:".cyan(),
        args.max_rooms,
        args.idle_secs
    );

    let state = Arc::new(AppState::new(
        RegistryConfig {
            max_rooms: args.max_rooms,
            idle_threshold: Duration::from_secs(args.idle_secs),
            code_style: args.code_style.into(),
        },
        RelayConfig {
            max_envelope_bytes: args.max_envelope_bytes,
            max_messages_per_window: args.max_message_rate,
            rate_window: Duration::from_secs(1),
        },
    ));

    state
        .registry
        .spawn_sweeper(Duration::from_secs(args.sweep_secs));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    info!("Signaling relay listening on http://{}", args.bind);
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .context("Failed to bind listen address")?;
    axum::serve(listener, app)
        .await
        .context("Server terminated")?;

    Ok(())
}
