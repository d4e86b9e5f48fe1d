//! # A TCP Server for Streaming overt-flake ID Generation
//!
//! `overtflake-server` mints monotonically ordered 128-bit overt-flake IDs
//! (or 64-bit Twitter-style IDs) and serves them over a small framed TCP
//! protocol: a client optionally authenticates with a shared token, then
//! sends 4-byte counts and reads back `count * id_size` bytes of raw ID
//! payload per request.
//!
//! Nodes with distinct hardware ids coexist without coordination; a
//! restarted node can be handed a `--wait-for` watermark so it refuses to
//! mint IDs until its clock passes the last persisted allocation time.
//!
//! ## Running the server
//!
//! ```bash
//! overtflake-server --listen-addr 0.0.0.0:4444 --auth-token secret
//! ```
//!
//! Every flag can also be supplied through the environment (see `--help`);
//! a `.env` file is loaded when present, and `RUST_LOG` controls log
//! verbosity.

mod config;
mod connection;
mod server;
mod telemetry;

use clap::Parser;
use config::{CliArgs, GenType, ServerConfig};
use overtflake::{Generator, MonotonicClock};
use server::OvertFlakeServer;
use tokio::signal;
use tracing::info;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    telemetry::init_telemetry()?;

    let generator = build_generator(&config)?;
    let server = OvertFlakeServer::new(
        config.listen_addr.clone(),
        config.auth_token.clone(),
        generator,
    );

    server.serve(shutdown_signal()).await
}

fn build_generator(config: &ServerConfig) -> anyhow::Result<Generator<MonotonicClock>> {
    let clock = MonotonicClock::new();

    match config.gen_type {
        GenType::Twitter => Ok(Generator::twitter(
            config.machine_id,
            config.data_center_id,
            config.wait_for,
            clock,
        )),
        GenType::Default | GenType::Flake53 => {
            let hardware_id = config.hid_provider.hardware_id()?;
            let process_id = (std::process::id() & 0xFFFF) as u16;
            info!(%hardware_id, process_id, "resolved node identity");

            if config.gen_type == GenType::Flake53 {
                Ok(Generator::overt_flake_53(
                    hardware_id,
                    process_id,
                    config.wait_for,
                    clock,
                ))
            } else {
                Ok(Generator::overt_flake(
                    config.epoch,
                    config.sequence_bits,
                    hardware_id,
                    process_id,
                    config.wait_for,
                    clock,
                )?)
            }
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C signal"),
        () = terminate => info!("received SIGTERM signal"),
    }
}
