// ABOUTME: Client-side session engine: dial/reconnect/backoff state machine that
// ABOUTME: tolerates transport failures transparently while forwarding IP packets

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backoff::Backoff;
use crate::client::error::{ClientError, ClientResult};
use crate::config::Config;
use crate::frame::{Framed, FramedWriter};
use crate::idle::{ActivityClock, IdleTransport};

/// Produces a fresh transport connection on demand. Native async-fn-in-trait,
/// matching the rest of this crate's client-side trait boundaries -- this
/// type is never stored behind `dyn`, so it doesn't need the boxed-future
/// treatment the NAT engine boundary does.
pub trait Dialer: Send + Sync {
    type Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn dial(&self) -> impl Future<Output = io::Result<Self::Transport>> + Send;
}

type Downstream<W> = Arc<Mutex<W>>;

struct ReaderHandle {
    stop: Arc<Notify>,
    done: oneshot::Receiver<ClientResult<()>>,
}

/// Client-side session engine (component C). Holds at most one active
/// transport at a time; `write()` serializes the caller (it takes `&mut
/// self`), and internally coordinates reconnects with the downstream reader
/// task per the ordering invariant: a new transport is never dialed until
/// the prior downstream reader has confirmed it stopped.
pub struct ClientSession<D: Dialer, W> {
    id: String,
    dialer: D,
    downstream: Downstream<W>,
    config: Config,
    writer: Option<FramedWriter<tokio::io::WriteHalf<IdleTransport<D::Transport>>>>,
    active_reader: Option<ReaderHandle>,
    backoff: Backoff,
    cancel: CancellationToken,
    closed: bool,
    terminal: Option<Arc<ClientError>>,
}

impl<D: Dialer, W: AsyncWrite + Unpin + Send + 'static> ClientSession<D, W> {
    pub fn new(dialer: D, downstream: W, config: Config) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            dialer,
            downstream: Arc::new(Mutex::new(downstream)),
            backoff: Backoff::new(
                std::time::Duration::from_millis(50),
                config.idle_timeout,
            ),
            config,
            writer: None,
            active_reader: None,
            cancel: CancellationToken::new(),
            closed: false,
            terminal: None,
        }
    }

    /// The 36-byte ASCII Client ID sent as the first frame on every dial.
    pub fn client_id(&self) -> &str {
        &self.id
    }

    /// Enqueues one IP packet for transmission upstream, dialing and
    /// reconnecting as many times as necessary. Returns only once the packet
    /// has been handed to a live transport, or once the session is
    /// permanently dead.
    pub async fn write(&mut self, packet: &[u8]) -> ClientResult<()> {
        if let Some(e) = &self.terminal {
            return Err(clone_terminal(e));
        }
        if self.closed {
            return Err(ClientError::Closed);
        }
        if packet.len() > self.config.mtu {
            return Err(ClientError::PacketTooLarge {
                mtu: self.config.mtu,
                actual: packet.len(),
            });
        }

        loop {
            self.ensure_connected().await?;
            let writer = self.writer.as_mut().expect("connected above");
            match writer.write_frame(packet).await {
                Ok(()) => {
                    self.backoff.reset();
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "write failed, entering recovery");
                    self.recover(ClientError::Frame(e)).await?;
                }
            }
        }
    }

    /// Terminates the session: cancels any in-flight dial, stops the
    /// downstream reader, and closes the current transport.
    pub async fn close(&mut self) {
        self.closed = true;
        self.cancel.cancel();
        if let Some(handle) = self.active_reader.take() {
            handle.stop.notify_one();
            let _ = handle.done.await;
        }
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
    }

    /// Drops the dead transport and waits for the downstream reader's
    /// termination signal before returning -- the ordering invariant that
    /// prevents two readers from ever holding two transports at once.
    async fn recover(&mut self, cause: ClientError) -> ClientResult<()> {
        self.writer = None;
        if let Some(handle) = self.active_reader.take() {
            handle.stop.notify_one();
            match handle.done.await {
                Ok(Ok(())) => {}
                Ok(Err(ClientError::Downstream(e))) => {
                    let err = Arc::new(ClientError::Downstream(e));
                    self.terminal = Some(err.clone());
                    return Err(clone_terminal(&err));
                }
                Ok(Err(_)) | Err(_) => {}
            }
        }
        debug!(cause = %cause, "transport recovered, will redial");
        Ok(())
    }

    async fn ensure_connected(&mut self) -> ClientResult<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        if let Some(e) = &self.terminal {
            return Err(clone_terminal(e));
        }

        loop {
            if self.closed {
                return Err(ClientError::Closed);
            }

            if let Some(delay) = self.backoff.next_delay() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.cancel.cancelled() => return Err(ClientError::Closed),
                }
            }

            let transport = tokio::select! {
                res = self.dialer.dial() => res,
                _ = self.cancel.cancelled() => return Err(ClientError::Closed),
            };

            let transport = match transport {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "dial failed, backing off");
                    continue;
                }
            };

            let idle = IdleTransport::new(transport, ActivityClock::new(), self.config.idle_timeout);
            let framed = Framed::new(idle, self.config.framed_config());
            let (reader, mut writer) = framed.into_split();

            if let Err(e) = writer.write_frame(self.id.as_bytes()).await {
                warn!(error = %e, "client id handshake failed, backing off");
                continue;
            }

            let stop = Arc::new(Notify::new());
            let (done_tx, done_rx) = oneshot::channel();
            let downstream = self.downstream.clone();
            tokio::spawn(run_downstream_reader(reader, downstream, stop.clone(), done_tx));

            self.active_reader = Some(ReaderHandle { stop, done: done_rx });
            self.writer = Some(writer);
            return Ok(());
        }
    }
}

fn clone_terminal(e: &Arc<ClientError>) -> ClientError {
    match e.as_ref() {
        ClientError::Downstream(io_err) => {
            ClientError::Downstream(io::Error::new(io_err.kind(), io_err.to_string()))
        }
        _ => ClientError::Closed,
    }
}

async fn run_downstream_reader<R, W>(
    mut reader: crate::frame::FramedReader<R>,
    downstream: Downstream<W>,
    stop: Arc<Notify>,
    done: oneshot::Sender<ClientResult<()>>,
) where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let outcome = loop {
        tokio::select! {
            _ = stop.notified() => break Ok(()),
            res = reader.read_frame() => {
                match res {
                    Ok(Some(payload)) => {
                        let mut sink = downstream.lock().await;
                        if let Err(e) = sink.write_all(&payload).await {
                            break Err(ClientError::Downstream(e));
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(ClientError::Frame(e)),
                }
            }
        }
    };
    let _ = done.send(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;

    struct ScriptedDialer {
        attempts: Arc<AtomicUsize>,
        fail_first_n: usize,
        pair: Arc<Mutex<Option<DuplexStream>>>,
    }

    impl Dialer for ScriptedDialer {
        type Transport = DuplexStream;

        async fn dial(&self) -> io::Result<DuplexStream> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            self.pair
                .lock()
                .await
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no more pairs"))
        }
    }

    #[tokio::test]
    async fn handshake_sends_client_id_as_first_frame() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let dialer = ScriptedDialer {
            attempts: Arc::new(AtomicUsize::new(0)),
            fail_first_n: 0,
            pair: Arc::new(Mutex::new(Some(client_side))),
        };
        let downstream = tokio::io::sink();
        let mut session = ClientSession::new(dialer, downstream, Config::default());

        session.write(b"packet one").await.unwrap();

        let config = crate::frame::FramedConfig::default();
        let mut server_reader = crate::frame::FramedReader::new(server_side, &config);
        let id_frame = server_reader.read_frame().await.unwrap().unwrap();
        assert_eq!(id_frame.len(), 36);
        assert_eq!(&id_frame[..], session.client_id().as_bytes());

        let packet_frame = server_reader.read_frame().await.unwrap().unwrap();
        assert_eq!(&packet_frame[..], b"packet one");
    }

    #[tokio::test]
    async fn oversized_packet_never_touches_the_transport() {
        let (client_side, _server_side) = tokio::io::duplex(4096);
        let dialer = ScriptedDialer {
            attempts: Arc::new(AtomicUsize::new(0)),
            fail_first_n: 0,
            pair: Arc::new(Mutex::new(Some(client_side))),
        };
        let mut session =
            ClientSession::new(dialer, tokio::io::sink(), Config::default().with_mtu(10));

        let err = session.write(&[0u8; 11]).await.unwrap_err();
        assert!(matches!(err, ClientError::PacketTooLarge { .. }));
    }

    #[tokio::test]
    async fn close_makes_further_writes_return_closed() {
        let (client_side, _server_side) = tokio::io::duplex(4096);
        let dialer = ScriptedDialer {
            attempts: Arc::new(AtomicUsize::new(0)),
            fail_first_n: 0,
            pair: Arc::new(Mutex::new(Some(client_side))),
        };
        let mut session = ClientSession::new(dialer, tokio::io::sink(), Config::default());
        session.close().await;
        let err = session.write(b"x").await.unwrap_err();
        assert!(matches!(err, ClientError::Closed));
    }
}
