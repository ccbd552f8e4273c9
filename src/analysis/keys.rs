// src/analysis/keys.rs - Credential pool with index-based lease, release and cooldown
use std::time::Duration;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// State of one credential slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Available,
    Leased,
    CoolingDown { until: Instant },
}

/// Pool slot for one analysis-service credential
#[derive(Debug, Clone)]
pub struct KeyLease {
    pub index: usize,
    pub state: KeyState,
}

/// A leased credential; hand the index back through `release` or `cooldown`
#[derive(Debug, Clone)]
pub struct LeasedKey {
    pub index: usize,
    pub key: String,
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub available: usize,
    pub leased: usize,
    pub cooling_down: usize,
}

pub struct KeyPool {
    keys: Vec<String>,
    cooldown: Duration,
    slots: Mutex<Slots>,
}

struct Slots {
    leases: Vec<KeyLease>,
    next: usize,
}

impl Slots {
    /// Expired cooldowns become available again
    fn refresh(&mut self, now: Instant) {
        for lease in &mut self.leases {
            if let KeyState::CoolingDown { until } = lease.state {
                if until <= now {
                    debug!("Key #{} cooldown elapsed", lease.index);
                    lease.state = KeyState::Available;
                }
            }
        }
    }
}

impl KeyPool {
    pub fn new(keys: Vec<String>, cooldown: Duration) -> Self {
        let leases = (0..keys.len())
            .map(|index| KeyLease { index, state: KeyState::Available })
            .collect();

        Self {
            keys,
            cooldown,
            slots: Mutex::new(Slots { leases, next: 0 }),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Lease the next available key, rotating through the pool
    pub fn lease(&self) -> Option<LeasedKey> {
        let mut slots = self.slots.lock();
        slots.refresh(Instant::now());

        let count = slots.leases.len();
        for offset in 0..count {
            let index = (slots.next + offset) % count;
            if slots.leases[index].state == KeyState::Available {
                slots.leases[index].state = KeyState::Leased;
                slots.next = (index + 1) % count;
                debug!("Leased key #{}", index);
                return Some(LeasedKey { index, key: self.keys[index].clone() });
            }
        }

        None
    }

    /// Return a leased key to the pool
    pub fn release(&self, index: usize) {
        let mut slots = self.slots.lock();
        if let Some(lease) = slots.leases.get_mut(index) {
            if lease.state == KeyState::Leased {
                lease.state = KeyState::Available;
            }
        }
    }

    /// Park a key after a rate-limit error; it stays out until the cooldown elapses
    pub fn cooldown(&self, index: usize) {
        let mut slots = self.slots.lock();
        if let Some(lease) = slots.leases.get_mut(index) {
            warn!("Key #{} rate limited, cooling down for {}s", index, self.cooldown.as_secs());
            lease.state = KeyState::CoolingDown { until: Instant::now() + self.cooldown };
        }
    }

    pub fn status(&self) -> PoolStatus {
        let mut slots = self.slots.lock();
        slots.refresh(Instant::now());

        let mut status = PoolStatus { available: 0, leased: 0, cooling_down: 0 };
        for lease in &slots.leases {
            match lease.state {
                KeyState::Available => status.available += 1,
                KeyState::Leased => status.leased += 1,
                KeyState::CoolingDown { .. } => status.cooling_down += 1,
            }
        }
        status
    }

    pub fn available_count(&self) -> usize {
        self.status().available
    }

    /// True when every key is cooling down
    pub fn exhausted(&self) -> bool {
        let status = self.status();
        status.cooling_down == self.keys.len()
    }

    pub fn snapshot(&self) -> Vec<KeyLease> {
        self.slots.lock().leases.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> KeyPool {
        KeyPool::new((0..n).map(|i| format!("key-{}", i)).collect(), Duration::from_secs(60))
    }

    #[test]
    fn test_lease_rotates_and_release_returns() {
        let pool = pool(2);

        let first = pool.lease().unwrap();
        let second = pool.lease().unwrap();
        assert_eq!((first.index, second.index), (0, 1));
        assert!(pool.lease().is_none());

        pool.release(first.index);
        assert_eq!(pool.lease().unwrap().key, "key-0");
    }

    #[test]
    fn test_cooling_key_is_skipped() {
        let pool = pool(3);

        let leased = pool.lease().unwrap();
        pool.cooldown(leased.index);

        for _ in 0..6 {
            let key = pool.lease().unwrap();
            assert_ne!(key.index, leased.index);
            pool.release(key.index);
        }

        let status = pool.status();
        assert_eq!(status.cooling_down, 1);
        assert_eq!(status.available, 2);
        assert!(!pool.exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_expires() {
        let pool = pool(1);
        pool.cooldown(pool.lease().unwrap().index);

        assert!(pool.exhausted());
        assert!(pool.lease().is_none());

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(!pool.exhausted());
        assert_eq!(pool.lease().unwrap().index, 0);
    }

    #[test]
    fn test_release_does_not_revive_cooling_key() {
        let pool = pool(1);
        let key = pool.lease().unwrap();
        pool.cooldown(key.index);
        pool.release(key.index);

        assert!(matches!(pool.snapshot()[0].state, KeyState::CoolingDown { .. }));
    }
}
