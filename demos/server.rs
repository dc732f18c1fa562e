// ABOUTME: Demo server binary: accepts packetforward client connections and
// ABOUTME: runs an echo NAT engine per logical client (stand-in for a real one)

//! # Packet Forwarding Server
//!
//! Listens for packetforward client connections, attaches each to a logical
//! client keyed by its Client ID, and runs a NAT engine per logical client.
//! This demo wires in `EchoNatEngine`, which bounces every packet back to
//! its sender -- swap in a real NAT engine for production use.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example server -- --listen 0.0.0.0:9000
//! cargo run --example server -- --listen 0.0.0.0:9000 --idle-timeout 30 --mtu 1500
//! ```

use argh::FromArgs;
use packetforward::config::Config;
use packetforward::{EchoNatEngine, Server};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

/// packetforward server demo
#[derive(FromArgs)]
struct CliArgs {
    /// whether to enable debug logging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// address to listen on (host:port)
    #[argh(option)]
    listen: String,

    /// maximum IP packet size (default: 65535)
    #[argh(option)]
    mtu: Option<usize>,

    /// idle timeout in seconds before a logical client is forgotten (default: 70)
    #[argh(option)]
    idle_timeout: Option<u64>,

    /// stats reporter interval in seconds (default: 5)
    #[argh(option)]
    stats_interval: Option<u64>,

    /// use the 4-byte big-frames header instead of the default 2-byte one
    #[argh(switch)]
    big_frames: bool,
}

#[tokio::main]
async fn main() -> packetforward::Result<()> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = Config::new().with_big_frames(cli_args.big_frames);
    if let Some(mtu) = cli_args.mtu {
        config = config.with_mtu(mtu);
    }
    if let Some(secs) = cli_args.idle_timeout {
        config = config.with_idle_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = cli_args.stats_interval {
        config = config.with_stats_interval(Duration::from_secs(secs));
    }

    info!(listen = %cli_args.listen, "starting packetforward server");

    let nat = Arc::new(EchoNatEngine::new(config.mtu));
    let server = Server::bind(cli_args.listen.as_str(), config, nat).await?;

    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c, shutting down");
    server.close().await;

    Ok(())
}
