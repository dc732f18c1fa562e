// ABOUTME: Single-slot eventual value used to hand a logical client's current
// ABOUTME: transport endpoint between readers/writers without holding the registry lock

use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

/// A value that may not exist yet, and may be replaced later.
///
/// Readers call [`Eventual::get`] with a timeout; writers call
/// [`Eventual::set`] to install a new value and wake every waiter. Only one
/// value is ever held at a time -- setting a new one discards the old.
#[derive(Debug)]
pub struct Eventual<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
}

impl<T: Clone> Eventual<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Installs `value`, replacing whatever was there, and wakes all waiters.
    pub async fn set(&self, value: T) {
        *self.slot.lock().await = Some(value);
        self.notify.notify_waiters();
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }

    /// Non-blocking read of the current value, if any.
    pub async fn peek(&self) -> Option<T> {
        self.slot.lock().await.clone()
    }

    /// Waits up to `wait` for a value to become available.
    ///
    /// The `notified()` future is created before the first check so a
    /// `set()` racing with this call is never missed (see the tokio `Notify`
    /// docs for why the ordering matters).
    pub async fn get(&self, wait: Duration) -> Option<T> {
        let wait_for_value = async {
            loop {
                let notified = self.notify.notified();
                if let Some(v) = self.peek().await {
                    return v;
                }
                notified.await;
            }
        };
        timeout(wait, wait_for_value).await.ok()
    }
}

impl<T: Clone> Default for Eventual<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn get_returns_none_on_timeout_when_unset() {
        let e: Eventual<u32> = Eventual::new();
        assert_eq!(e.get(Duration::from_millis(20)).await, None);
    }

    #[tokio::test]
    async fn get_returns_immediately_once_set() {
        let e: Eventual<u32> = Eventual::new();
        e.set(7).await;
        assert_eq!(e.get(Duration::from_millis(20)).await, Some(7));
    }

    #[tokio::test]
    async fn get_wakes_on_late_set() {
        let e = Arc::new(Eventual::<u32>::new());
        let writer = e.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.set(42).await;
        });
        assert_eq!(e.get(Duration::from_millis(200)).await, Some(42));
    }

    #[tokio::test]
    async fn set_replaces_previous_value() {
        let e = Eventual::new();
        e.set(1).await;
        e.set(2).await;
        assert_eq!(e.peek().await, Some(2));
    }
}
