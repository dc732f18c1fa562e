// ABOUTME: Trait boundary between a logical client's packet stream and the
// ABOUTME: (out of scope) NAT engine that does TCP/UDP tracking and egress dialing

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use crate::buffer_pool::PooledBuffer;

#[derive(Debug, Error)]
pub enum NatError {
    #[error("packet io error: {0}")]
    Io(#[from] io::Error),

    #[error("logical client forgotten")]
    Forgotten,

    /// No endpoint is attached and the client has gone idle; distinct from a
    /// transient `Io` failure so a NAT engine can tell "give up on this
    /// client" apart from "retry me".
    #[error("no connection available for client")]
    NoConnection,

    /// An endpoint was attached but writes to it kept failing until the
    /// client idled out.
    #[error("client idled out")]
    Idled,
}

/// The bidirectional packet endpoint a NAT engine is handed for one logical
/// client. Implemented by `server::registry::LogicalClient`.
///
/// Boxed futures rather than native async-fn-in-trait: this trait is stored
/// as `Arc<dyn PacketIo>` so the registry can hand it to a `dyn NatEngine`
/// without naming the concrete logical-client type, and async fns in traits
/// are not object-safe.
pub trait PacketIo: Send + Sync {
    /// Checks out an MTU-sized scratch buffer from the registry's shared
    /// pool, for a NAT engine to read a packet into instead of allocating
    /// its own per-packet buffer.
    fn checkout_buffer(&self) -> PooledBuffer;

    fn read_packet<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, NatError>> + Send + 'a>>;

    fn write_packet<'a>(
        &'a self,
        buf: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, NatError>> + Send + 'a>>;
}

/// External collaborator that performs NAT (TCP/UDP connection tracking,
/// checksum rewriting, egress dialing) for one logical client's packet
/// stream. Out of scope for this crate beyond this boundary: `serve` is
/// expected to run until the client is forgotten or a fatal error occurs.
pub trait NatEngine: Send + Sync {
    fn serve(
        &self,
        io: Arc<dyn PacketIo>,
    ) -> Pin<Box<dyn Future<Output = Result<(), NatError>> + Send>>;
}

/// A trivial engine that echoes every packet back to its sender, used by
/// this crate's own end-to-end tests in place of a real NAT engine.
#[derive(Debug, Default)]
pub struct EchoNatEngine {
    /// Kept for parity with the `Config` it's paired with; scratch buffers
    /// themselves come from the registry's pool via `checkout_buffer`.
    pub mtu: usize,
}

impl EchoNatEngine {
    pub fn new(mtu: usize) -> Self {
        Self { mtu }
    }
}

impl NatEngine for EchoNatEngine {
    fn serve(
        &self,
        io: Arc<dyn PacketIo>,
    ) -> Pin<Box<dyn Future<Output = Result<(), NatError>> + Send>> {
        Box::pin(async move {
            loop {
                let mut buf = io.checkout_buffer();
                let n = io.read_packet(&mut buf).await?;
                if n == 0 {
                    return Ok(());
                }
                io.write_packet(&buf[..n]).await?;
            }
        })
    }
}
