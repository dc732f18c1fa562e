// ABOUTME: UUID-keyed logical client registry: attach/detach/forget and idle GC
// ABOUTME: Each logical client survives transport reconnects, bound once to a NAT session

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::buffer_pool::{BufferPool, PooledBuffer};
use crate::config::Config;
use crate::frame::{Framed, FramedReader, FramedWriter};
use crate::idle::ActivityClock;
use crate::nat::{NatEngine, NatError, PacketIo};
use crate::server::error::HandshakeError;

struct Endpoint<T> {
    reader: Mutex<FramedReader<ReadHalf<T>>>,
    writer: Mutex<FramedWriter<WriteHalf<T>>>,
}

/// A client bound to a Client ID, surviving transport reconnects. Created on
/// first handshake, destroyed exactly once via [`ClientRegistry::forget`].
pub struct LogicalClient<T> {
    id: String,
    endpoint: crate::eventual::Eventual<Arc<Endpoint<T>>>,
    last_active: ActivityClock,
    idle_timeout: Duration,
    buffer_pool: BufferPool,
    forgotten: std::sync::atomic::AtomicBool,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> LogicalClient<T> {
    fn new(id: String, idle_timeout: Duration, buffer_pool: BufferPool) -> Self {
        Self {
            id,
            endpoint: crate::eventual::Eventual::new(),
            last_active: ActivityClock::new(),
            idle_timeout,
            buffer_pool,
            forgotten: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn is_idle(&self) -> bool {
        self.last_active.idle_for() > self.idle_timeout
    }

    fn is_forgotten(&self) -> bool {
        self.forgotten.load(std::sync::atomic::Ordering::Acquire)
    }

    async fn attach(&self, reader: FramedReader<ReadHalf<T>>, writer: FramedWriter<WriteHalf<T>>) {
        let endpoint = Arc::new(Endpoint {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        });
        self.last_active.mark_now();
        self.endpoint.set(endpoint).await;
    }

    async fn drop_if_current(&self, stale: &Arc<Endpoint<T>>) {
        if let Some(current) = self.endpoint.peek().await {
            if Arc::ptr_eq(&current, stale) {
                self.endpoint.clear().await;
            }
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> PacketIo for LogicalClient<T> {
    fn checkout_buffer(&self) -> PooledBuffer {
        self.buffer_pool.checkout()
    }

    fn read_packet<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, NatError>> + Send + 'a>> {
        Box::pin(async move {
            let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(1));
            loop {
                if self.is_forgotten() {
                    return Err(NatError::Forgotten);
                }

                let endpoint = self.endpoint.get(self.idle_timeout).await;
                let Some(endpoint) = endpoint else {
                    if self.is_idle() {
                        return Ok(0);
                    }
                    continue;
                };

                let frame = {
                    let mut reader = endpoint.reader.lock().await;
                    reader.read_frame().await
                };

                match frame {
                    Ok(Some(payload)) => {
                        self.last_active.mark_now();
                        let n = payload.len().min(buf.len());
                        buf[..n].copy_from_slice(&payload[..n]);
                        return Ok(n);
                    }
                    Ok(None) | Err(_) => {
                        self.drop_if_current(&endpoint).await;
                        if self.is_idle() {
                            return Ok(0);
                        }
                        if let Some(delay) = backoff.next_delay() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        })
    }

    fn write_packet<'a>(
        &'a self,
        buf: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, NatError>> + Send + 'a>> {
        Box::pin(async move {
            let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(1));
            loop {
                if self.is_forgotten() {
                    return Err(NatError::Forgotten);
                }

                let endpoint = self.endpoint.get(self.idle_timeout).await;
                let Some(endpoint) = endpoint else {
                    return Err(NatError::NoConnection);
                };

                let result = {
                    let mut writer = endpoint.writer.lock().await;
                    writer.write_frame(buf).await
                };

                match result {
                    Ok(()) => {
                        self.last_active.mark_now();
                        return Ok(buf.len());
                    }
                    Err(e) => {
                        self.drop_if_current(&endpoint).await;
                        if self.is_idle() {
                            return Err(NatError::Idled);
                        }
                        warn!(client = %self.id, error = %e, "write_packet retrying");
                        if let Some(delay) = backoff.next_delay() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        })
    }
}

/// UUID-keyed map from Client ID to [`LogicalClient`] (component E).
pub struct ClientRegistry<T> {
    clients: StdMutex<HashMap<String, Arc<LogicalClient<T>>>>,
    config: Config,
    nat: Arc<dyn NatEngine>,
    buffer_pool: BufferPool,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> ClientRegistry<T> {
    pub fn new(config: Config, nat: Arc<dyn NatEngine>) -> Arc<Self> {
        let buffer_pool = BufferPool::new(config.mtu, config.buffer_pool_size);
        Arc::new(Self {
            clients: StdMutex::new(HashMap::new()),
            config,
            nat,
            buffer_pool,
        })
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the 36-byte Client ID off a freshly accepted transport's first
    /// frame, then creates-or-attaches the corresponding logical client.
    pub async fn handshake(self: &Arc<Self>, transport: T) -> Result<(), HandshakeError> {
        let framed = Framed::new(transport, self.config.framed_config());
        let (mut reader, writer) = framed.into_split();

        let id_frame = reader
            .read_frame()
            .await?
            .ok_or(HandshakeError::NoClientId)?;
        if id_frame.len() != 36 {
            return Err(HandshakeError::InvalidClientId(id_frame.len()));
        }
        let id = String::from_utf8_lossy(&id_frame).into_owned();

        let client = self.get_or_create(id.clone());
        client.attach(reader, writer).await;
        debug!(client = %id, "attached transport");
        Ok(())
    }

    fn get_or_create(self: &Arc<Self>, id: String) -> Arc<LogicalClient<T>> {
        let mut clients = self.clients.lock().unwrap();
        if let Some(existing) = clients.get(&id) {
            return existing.clone();
        }

        let client = Arc::new(LogicalClient::new(
            id.clone(),
            self.config.idle_timeout,
            self.buffer_pool.clone(),
        ));
        clients.insert(id.clone(), client.clone());

        let nat = self.nat.clone();
        let io: Arc<dyn PacketIo> = client.clone();
        let registry = self.clone();
        tokio::spawn(async move {
            if let Err(e) = nat.serve(io).await {
                warn!(client = %id, error = %e, "nat engine terminated");
            }
            registry.forget(&id);
        });

        client
    }

    /// Removes a logical client and tears down its NAT session association.
    /// Idempotent.
    pub fn forget(&self, id: &str) {
        if let Some(client) = self.clients.lock().unwrap().remove(id) {
            client
                .forgotten
                .store(true, std::sync::atomic::Ordering::Release);
            info!(client = %id, "forgot logical client");
        }
    }

    /// Scans for and forgets every idle logical client. Called by the stats
    /// reporter on each tick as a backstop to the lazy idle checks inside
    /// read/write retry loops.
    pub fn reap_idle(&self) {
        let idle_ids: Vec<String> = self
            .clients
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.is_idle())
            .map(|c| c.id().to_string())
            .collect();
        for id in idle_ids {
            self.forget(&id);
        }
    }
}
