// ABOUTME: Idle-timing wrapper that closes a transport after a period with no
// ABOUTME: successful I/O, backed by per-operation deadlines and a background watcher

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::sync::CancellationToken;

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

fn now_nanos() -> u64 {
    process_epoch().elapsed().as_nanos() as u64
}

fn idle_timeout_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "transport idle timeout elapsed")
}

/// Shared last-activity timestamp (nanoseconds since process start) for one
/// transport. Cheap to clone; every clone observes the same clock.
#[derive(Debug, Clone)]
pub struct ActivityClock(Arc<AtomicU64>);

impl ActivityClock {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(now_nanos())))
    }

    fn mark(&self) {
        self.0.store(now_nanos(), Ordering::Relaxed);
    }

    /// Stamps "now" as the last-activity time. Used by the server registry,
    /// which tracks `lastActive` independently of any wrapped transport.
    pub fn mark_now(&self) {
        self.mark();
    }

    pub fn last_active_nanos(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Time elapsed since the last marked activity.
    pub fn idle_for(&self) -> Duration {
        Duration::from_nanos(now_nanos().saturating_sub(self.last_active_nanos()))
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

struct IdleState {
    clock: ActivityClock,
    timeout: Duration,
    timed_out: AtomicBool,
    read_waker: StdMutex<Option<Waker>>,
    write_waker: StdMutex<Option<Waker>>,
}

impl IdleState {
    fn trip(&self) {
        self.timed_out.store(true, Ordering::Release);
        if let Some(waker) = self.read_waker.lock().unwrap().take() {
            waker.wake();
        }
        if let Some(waker) = self.write_waker.lock().unwrap().take() {
            waker.wake();
        }
    }
}

/// Runs until `state`'s clock has gone untouched for `state.timeout`, then
/// trips the timed-out flag and wakes whichever read/write is parked --
/// the same "close the connection out from under the blocked caller"
/// behavior `idletiming.Conn`'s background goroutine provides.
async fn watch_idle(state: Arc<IdleState>, cancel: CancellationToken) {
    loop {
        let remaining = state.timeout.saturating_sub(state.clock.idle_for());
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(remaining) => {}
        }
        if state.clock.idle_for() >= state.timeout {
            state.trip();
            return;
        }
    }
}

/// Wraps a transport so every successful read or write refreshes a shared
/// [`ActivityClock`], and a background watcher closes the transport -- every
/// subsequent read/write fails with [`io::ErrorKind::TimedOut`] -- once that
/// clock has gone untouched for longer than `idle_timeout`.
#[derive(Debug)]
pub struct IdleTransport<T> {
    inner: T,
    state: Arc<IdleState>,
    watcher: CancellationToken,
}

impl<T> IdleTransport<T> {
    pub fn new(inner: T, clock: ActivityClock, idle_timeout: Duration) -> Self {
        let state = Arc::new(IdleState {
            clock,
            timeout: idle_timeout,
            timed_out: AtomicBool::new(false),
            read_waker: StdMutex::new(None),
            write_waker: StdMutex::new(None),
        });
        let watcher = CancellationToken::new();
        tokio::spawn(watch_idle(state.clone(), watcher.clone()));
        Self {
            inner,
            state,
            watcher,
        }
    }

    pub fn clock(&self) -> ActivityClock {
        self.state.clock.clone()
    }
}

impl<T> Drop for IdleTransport<T> {
    fn drop(&mut self) {
        self.watcher.cancel();
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for IdleTransport<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.state.timed_out.load(Ordering::Acquire) {
            return Poll::Ready(Err(idle_timeout_error()));
        }

        let before = buf.filled().len();
        let res = Pin::new(&mut self.inner).poll_read(cx, buf);
        match res {
            Poll::Ready(Ok(())) if buf.filled().len() > before => {
                self.state.clock.mark();
            }
            Poll::Pending => {
                *self.state.read_waker.lock().unwrap() = Some(cx.waker().clone());
            }
            _ => {}
        }
        res
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for IdleTransport<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.state.timed_out.load(Ordering::Acquire) {
            return Poll::Ready(Err(idle_timeout_error()));
        }

        let res = Pin::new(&mut self.inner).poll_write(cx, buf);
        match res {
            Poll::Ready(Ok(n)) if n > 0 => self.state.clock.mark(),
            Poll::Pending => {
                *self.state.write_waker.lock().unwrap() = Some(cx.waker().clone());
            }
            _ => {}
        }
        res
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.state.timed_out.load(Ordering::Acquire) {
            return Poll::Ready(Err(idle_timeout_error()));
        }
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn marks_activity_on_write() {
        let (a, mut b) = tokio::io::duplex(64);
        let clock = ActivityClock::new();
        let before = clock.last_active_nanos();
        let mut wrapped = IdleTransport::new(a, clock.clone(), Duration::from_secs(70));
        tokio::time::sleep(Duration::from_millis(5)).await;
        wrapped.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        b.read_exact(&mut buf).await.unwrap();
        assert!(clock.last_active_nanos() > before);
    }

    #[tokio::test]
    async fn marks_activity_on_read() {
        let (mut a, b) = tokio::io::duplex(64);
        let clock = ActivityClock::new();
        let before = clock.last_active_nanos();
        let mut wrapped = IdleTransport::new(b, clock.clone(), Duration::from_secs(70));
        tokio::time::sleep(Duration::from_millis(5)).await;
        a.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        wrapped.read_exact(&mut buf).await.unwrap();
        assert!(clock.last_active_nanos() > before);
    }

    #[tokio::test]
    async fn read_fails_once_the_idle_timeout_elapses() {
        let (_a, b) = tokio::io::duplex(64);
        let mut wrapped = IdleTransport::new(b, ActivityClock::new(), Duration::from_millis(20));

        let mut buf = [0u8; 1];
        let err = wrapped.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn write_fails_once_the_idle_timeout_elapses() {
        let (a, _b) = tokio::io::duplex(64);
        let mut wrapped = IdleTransport::new(a, ActivityClock::new(), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(40)).await;
        let err = wrapped.write(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn activity_before_the_deadline_keeps_the_transport_alive() {
        let (mut a, b) = tokio::io::duplex(64);
        let mut wrapped = IdleTransport::new(b, ActivityClock::new(), Duration::from_millis(30));

        tokio::time::sleep(Duration::from_millis(15)).await;
        a.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        wrapped.read_exact(&mut buf).await.unwrap();

        tokio::time::sleep(Duration::from_millis(15)).await;
        a.write_all(b"yo").await.unwrap();
        wrapped.read_exact(&mut buf).await.unwrap();
    }
}
