// ABOUTME: Periodic stats reporter (component G): logs registry size, reaps idle clients
// ABOUTME: Shuts down via a CancellationToken; Server::close() awaits its JoinHandle

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::server::registry::ClientRegistry;

/// Spawns the stats reporter loop. Mirrors the close-handshake used
/// throughout this crate: the returned handle is awaited by the caller on
/// shutdown rather than detached.
pub fn spawn<T>(
    registry: Arc<ClientRegistry<T>>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    registry.reap_idle();
                    debug!(active_clients = registry.len(), "stats tick");
                }
                _ = cancel.cancelled() => {
                    debug!("stats reporter stopping");
                    return;
                }
            }
        }
    })
}
