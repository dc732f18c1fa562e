// ABOUTME: Client-side session engine module: dial/reconnect state machine, errors
// ABOUTME: Exports the session type, its error type, and a convenience TCP dialer

//! Client-side packet forwarding session (component C).
//!
//! A [`session::ClientSession`] relays IP packets read from a local source
//! (e.g. a TUN device) to a server over a reconnecting, framed TCP
//! transport, and writes replies back to a downstream sink. Construction is
//! generic over a [`session::Dialer`] so the transport and the downstream
//! sink can be swapped independently of the reconnect/backoff logic.
//!
//! ```rust,no_run
//! use packetforward::client::{ClientSession, TcpDialer};
//! use packetforward::config::Config;
//!
//! # async fn example() -> std::io::Result<()> {
//! let dialer = TcpDialer::new("127.0.0.1:9000");
//! let downstream = tokio::io::sink(); // stand-in for a TUN device
//! let mut session = ClientSession::new(dialer, downstream, Config::default());
//! session.write(b"an ip packet").await.unwrap();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod session;

pub use error::{ClientError, ClientResult};
pub use session::{ClientSession, Dialer};

use tokio::net::{TcpStream, ToSocketAddrs};

/// Dials a fixed TCP address on every reconnect attempt. The common case;
/// implement [`Dialer`] directly for anything fancier (TLS, multiple
/// candidate addresses, a mock transport in tests).
#[derive(Debug, Clone)]
pub struct TcpDialer<A> {
    addr: A,
}

impl<A> TcpDialer<A> {
    pub fn new(addr: A) -> Self {
        Self { addr }
    }
}

impl<A: ToSocketAddrs + Send + Sync + Clone> Dialer for TcpDialer<A> {
    type Transport = TcpStream;

    async fn dial(&self) -> std::io::Result<TcpStream> {
        TcpStream::connect(self.addr.clone()).await
    }
}
