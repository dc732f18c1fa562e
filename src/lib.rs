pub mod backoff;
pub mod buffer_pool;
pub mod client;
pub mod config;
pub mod eventual;
pub mod frame;
pub mod idle;
pub mod nat;
pub mod server;


pub use client::{ClientError, ClientSession, Dialer, TcpDialer};
pub use config::Config;
pub use nat::{EchoNatEngine, NatEngine, NatError, PacketIo};
pub use server::{Server, ServerError};

/// Error returned by the demo binaries' `main`.
///
/// Library code always returns its own typed error (`ClientError`,
/// `ServerError`, `HandshakeError`, ...); this boxed alias exists only for
/// the CLI entry points under `demos/`.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
