// ABOUTME: Shared free-list of MTU-sized scratch buffers handed to NAT engines
// ABOUTME: through PacketIo::checkout_buffer, avoiding a fresh allocation per packet

use std::sync::{Arc, Mutex};

struct Inner {
    mtu: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

/// A bounded pool of `mtu`-sized byte buffers.
///
/// Sized from `Config::buffer_pool_size / mtu` slots. Checking out more
/// buffers than the pool holds just allocates fresh ones -- the pool is an
/// optimization, not a hard cap on concurrency.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl BufferPool {
    pub fn new(mtu: usize, pool_size_bytes: usize) -> Self {
        let slots = (pool_size_bytes / mtu.max(1)).max(1);
        let free = (0..slots).map(|_| vec![0u8; mtu]).collect();
        Self {
            inner: Arc::new(Inner {
                mtu,
                free: Mutex::new(free),
            }),
        }
    }

    /// Checks out a buffer, cleared to `mtu` zeroed bytes.
    pub fn checkout(&self) -> PooledBuffer {
        let buf = self
            .inner
            .free
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.inner.mtu]);
        PooledBuffer {
            buf: Some(buf),
            pool: self.inner.clone(),
        }
    }
}

/// A buffer checked out of a [`BufferPool`]. Returned to the pool on drop.
pub struct PooledBuffer {
    buf: Option<Vec<u8>>,
    pool: Arc<Inner>,
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().expect("buffer taken before drop")
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().expect("buffer taken before drop")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.free.lock().unwrap().push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_yields_mtu_sized_buffers() {
        let pool = BufferPool::new(1500, 1500 * 4);
        let buf = pool.checkout();
        assert_eq!(buf.len(), 1500);
    }

    #[test]
    fn buffers_are_reused_after_drop() {
        let pool = BufferPool::new(1500, 1500);
        {
            let _buf = pool.checkout();
        }
        assert_eq!(pool.inner.free.lock().unwrap().len(), 1);
    }

    #[test]
    fn exceeding_pool_size_still_yields_a_buffer() {
        let pool = BufferPool::new(1500, 1500);
        let _a = pool.checkout();
        let b = pool.checkout();
        assert_eq!(b.len(), 1500);
    }
}
