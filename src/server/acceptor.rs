// ABOUTME: Accept loop with temporary-error backoff (component D)
// ABOUTME: Offloads the handshake to a freshly spawned task per connection immediately

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::server::error::ServerError;
use crate::server::registry::ClientRegistry;

/// Runs `accept` in a loop, handing each connection's handshake to a
/// spawned task immediately so one slow peer can never stall subsequent
/// accepts. Temporary accept errors (anything other than the listener being
/// gone) back off from 5ms, doubling to a 1s cap, resetting on success.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<ClientRegistry<TcpStream>>,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let mut backoff = Backoff::new(Duration::from_millis(5), Duration::from_secs(1));

    loop {
        let accepted = tokio::select! {
            res = listener.accept() => res,
            _ = cancel.cancelled() => {
                debug!("acceptor cancelled");
                return Ok(());
            }
        };

        match accepted {
            Ok((stream, peer)) => {
                backoff.reset();
                debug!(%peer, "accepted connection");
                let registry = registry.clone();
                tokio::spawn(async move {
                    if let Err(e) = registry.handshake(stream).await {
                        warn!(%peer, error = %e, "handshake failed");
                    }
                });
            }
            Err(e) if is_temporary(&e) => {
                let delay = backoff.next_delay().unwrap_or(Duration::from_millis(5));
                warn!(error = %e, delay = ?delay, "temporary accept error, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Ok(()),
                }
            }
            Err(e) => return Err(ServerError::Listener(e)),
        }
    }
}

fn is_temporary(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
    )
}
