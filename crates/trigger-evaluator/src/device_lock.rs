//! Per-device mutual exclusion
//!
//! Event log ingestion is a read-modify-write on one document, so two
//! evaluations for the same device running at once can lose an event. Within
//! one process, holding the device's lock for the whole evaluation prevents
//! that. Nothing is coordinated across processes.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Lazily created async mutex per device
///
/// An entry lives only while some evaluation holds or waits for it.
#[derive(Debug, Default)]
pub struct DeviceLocks {
    locks: LockMap,
}

/// Exclusive access to one device, released on drop
pub struct DeviceGuard<'a> {
    locks: &'a LockMap,
    device: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DeviceGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Waiters hold their own clone, so a count of one means nobody else
        self.locks
            .remove_if(&self.device, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `device`
    pub async fn acquire(&self, device: &str) -> DeviceGuard<'_> {
        // Clone the Arc out so the shard lock is not held across the await
        let lock = self
            .locks
            .entry(device.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        DeviceGuard {
            locks: &self.locks,
            device: device.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of devices currently locked or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_device_is_exclusive() {
        let locks = Arc::new(DeviceLocks::new());
        let guard = locks.acquire("g88_pi").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("g88_pi").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_devices_do_not_block() {
        let locks = DeviceLocks::new();
        let _a = locks.acquire("g88_pi").await;

        let _b = tokio::time::timeout(Duration::from_secs(1), locks.acquire("g29_pi"))
            .await
            .unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_entry_evicted_after_release() {
        let locks = DeviceLocks::new();

        drop(locks.acquire("g88_pi").await);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_contended() {
        let locks = Arc::new(DeviceLocks::new());
        let guard = locks.acquire("g88_pi").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("g88_pi").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.len(), 1);

        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
        assert!(locks.is_empty());
    }
}
