// ABOUTME: Server-side module: accept loop, client registry, and stats reporter
// ABOUTME: wired together behind a single `Server` handle with a close-handshake

//! Server-side NAT adapter (components D, E, G).
//!
//! [`Server::bind`] starts an accept loop over a `TcpListener`, handshaking
//! each connection into the [`registry::ClientRegistry`] and running the
//! configured [`crate::nat::NatEngine`] once per logical client. A periodic
//! stats reporter logs the registry size and reaps idle clients as a
//! backstop to the lazy idle checks in the registry's own retry loops.

pub mod acceptor;
pub mod error;
pub mod registry;
pub mod stats;

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::nat::NatEngine;

pub use error::{HandshakeError, ServerError};
pub use registry::{ClientRegistry, LogicalClient};

/// Owns the accept loop and stats reporter tasks for one listener.
pub struct Server {
    registry: Arc<ClientRegistry<TcpStream>>,
    cancel: CancellationToken,
    acceptor: JoinHandle<Result<(), ServerError>>,
    stats: JoinHandle<()>,
}

impl Server {
    /// Binds `addr`, starting the accept loop and stats reporter
    /// immediately.
    pub async fn bind(
        addr: impl tokio::net::ToSocketAddrs,
        config: Config,
        nat: Arc<dyn NatEngine>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, config, nat))
    }

    /// Wraps an already-bound listener (useful in tests, or when the
    /// listening socket is inherited from elsewhere).
    pub fn from_listener(listener: TcpListener, config: Config, nat: Arc<dyn NatEngine>) -> Self {
        let registry = ClientRegistry::new(config.clone(), nat);
        let cancel = CancellationToken::new();

        let acceptor = tokio::spawn(acceptor::serve(
            listener,
            registry.clone(),
            cancel.clone(),
        ));
        let stats = stats::spawn(registry.clone(), config.stats_interval, cancel.clone());

        Self {
            registry,
            cancel,
            acceptor,
            stats,
        }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry<TcpStream>> {
        &self.registry
    }

    /// Cancels the accept loop and stats reporter and awaits both before
    /// returning -- the same close-handshake the stats reporter itself uses
    /// internally.
    pub async fn close(self) {
        self.cancel.cancel();
        let _ = self.acceptor.await;
        let _ = self.stats.await;
    }
}
