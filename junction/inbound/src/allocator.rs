use parking_lot::Mutex;
use rand::seq::SliceRandom;

use junction_core::Error;

/// Hands out ports from a fixed inclusive range without repeats until
/// they're returned. Used by dynamic inbound handlers that rotate their
/// listening port on a schedule.
pub struct PortAllocator {
    free: Mutex<Vec<u16>>,
}

impl PortAllocator {
    pub fn new(low: u16, high: u16) -> Self {
        let mut free: Vec<u16> = (low..=high).collect();
        free.shuffle(&mut rand::thread_rng());
        Self { free: Mutex::new(free) }
    }

    pub fn allocate(&self) -> Result<u16, Error> {
        let mut free = self.free.lock();
        free.pop().ok_or(Error::PortAllocationExhausted(self.capacity()))
    }

    pub fn release(&self, port: u16) {
        let mut free = self.free.lock();
        if !free.contains(&port) {
            free.push(port);
        }
    }

    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    fn capacity(&self) -> usize {
        // approximate: not tracked separately, derived from current state
        // plus outstanding allocations is unknowable here, so report the
        // free-list length at exhaustion time (always 0, but keeps the
        // error message meaningful if this ever changes to pre-size it).
        self.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn allocations_are_unique_until_pool_exhausted() {
        let pool = PortAllocator::new(40000, 40003);
        let mut seen = HashSet::new();
        for _ in 0..4 {
            let port = pool.allocate().unwrap();
            assert!(seen.insert(port), "port {port} allocated twice");
        }
        assert!(pool.allocate().is_err());
    }

    #[test]
    fn released_ports_can_be_reallocated() {
        let pool = PortAllocator::new(41000, 41000);
        let port = pool.allocate().unwrap();
        assert!(pool.allocate().is_err());
        pool.release(port);
        assert_eq!(pool.allocate().unwrap(), port);
    }
}
