// ABOUTME: Demo client binary: relays packets between a local TUN-like source
// ABOUTME: and a packetforward server over a reconnecting framed TCP transport

//! # Packet Forwarding Client
//!
//! Connects to a packetforward server and relays IP packets in both
//! directions. The demo uses stdin/stdout in place of a real TUN device, so
//! it can be exercised without elevated privileges; swap in your own
//! `Dialer`/downstream sink to use this against a real interface.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example client -- --connect 127.0.0.1:9000
//! cargo run --example client -- --connect 127.0.0.1:9000 --mtu 1500 --idle-timeout 30
//! ```

use argh::FromArgs;
use packetforward::client::{ClientSession, TcpDialer};
use packetforward::config::Config;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// packetforward client demo
#[derive(FromArgs)]
struct CliArgs {
    /// whether to enable debug logging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// address of the packetforward server (host:port)
    #[argh(option)]
    connect: String,

    /// maximum IP packet size (default: 65535)
    #[argh(option)]
    mtu: Option<usize>,

    /// idle timeout in seconds before a transport is considered dead (default: 70)
    #[argh(option)]
    idle_timeout: Option<u64>,

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

    info!(connect = %cli_args.connect, "starting packetforward client");

    let dialer = TcpDialer::new(cli_args.connect.clone());
    let downstream = tokio::io::stdout();
    let mut session = ClientSession::new(dialer, downstream, config);
    info!(client_id = %session.client_id(), "assigned client id");

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut buf = vec![0u8; 65535];

    let result = tokio::select! {
        res = forward_stdin(&mut stdin, &mut buf, &mut session) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
            Ok(())
        }
    };

    session.close().await;

    if let Err(e) = &result {
        error!(error = %e, "client exited with an error");
    }
    result
}

async fn forward_stdin<R, D, W>(
    stdin: &mut R,
    buf: &mut [u8],
    session: &mut ClientSession<D, W>,
) -> packetforward::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    D: packetforward::Dialer,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    use tokio::io::AsyncReadExt;
    loop {
        let n = stdin.read(buf).await?;
        if n == 0 {
            return Ok(());
        }
        session.write(&buf[..n]).await?;
    }
}
