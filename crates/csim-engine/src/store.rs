use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::engine::GameState;

/// Keyed storage for concurrent simulations. The engine itself is
/// single-writer per simulation; the store only routes by id.
pub trait SimStore {
    /// Insert or replace the simulation under `id`.
    fn save(&mut self, id: u64, state: GameState);
    /// Look up a simulation, refreshing its liveness.
    fn get(&mut self, id: u64) -> Option<&GameState>;
    /// Mutable lookup, refreshing liveness.
    fn get_mut(&mut self, id: u64) -> Option<&mut GameState>;
    /// Remove a simulation. Returns whether it existed.
    fn delete(&mut self, id: u64) -> bool;
    fn ids(&self) -> Vec<u64>;
}

struct Entry {
    state: GameState,
    last_access: Instant,
}

/// Process-local store with idle-timeout eviction. Eviction is explicit:
/// the owner calls `evict_expired` on whatever cadence it likes rather
/// than the store running a background sweeper.
pub struct InMemoryStore {
    entries: HashMap<u64, Entry>,
    ttl: Duration,
    next_id: u64,
}

impl InMemoryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            next_id: 1,
        }
    }

    /// Store a new simulation and return its assigned id.
    pub fn create(&mut self, state: GameState) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.save(id, state);
        id
    }

    /// Drop every simulation idle for longer than the ttl. Returns how
    /// many were removed.
    pub fn evict_expired(&mut self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.last_access.elapsed() < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SimStore for InMemoryStore {
    fn save(&mut self, id: u64, state: GameState) {
        self.entries.insert(
            id,
            Entry {
                state,
                last_access: Instant::now(),
            },
        );
    }

    fn get(&mut self, id: u64) -> Option<&GameState> {
        let entry = self.entries.get_mut(&id)?;
        entry.last_access = Instant::now();
        Some(&entry.state)
    }

    fn get_mut(&mut self, id: u64) -> Option<&mut GameState> {
        let entry = self.entries.get_mut(&id)?;
        entry.last_access = Instant::now();
        Some(&mut entry.state)
    }

    fn delete(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use csim_core::{Candle, CandleSeries};

    fn state() -> GameState {
        let candles: Vec<Candle> = (0..120)
            .map(|i| Candle {
                time: 1_700_000_000 + i as i64 * 60,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1.0,
            })
            .collect();
        let series = Arc::new(CandleSeries::from_candles(candles).unwrap());
        GameState::new(series, 10_000.0, Vec::new()).unwrap()
    }

    #[test]
    fn create_assigns_distinct_ids() {
        let mut store = InMemoryStore::new(Duration::from_secs(60));
        let a = store.create(state());
        let b = store.create(state());
        assert_ne!(a, b);
        assert_eq!(store.ids(), vec![a, b]);
        assert!(store.get(a).is_some());
    }

    #[test]
    fn delete_removes_and_reports() {
        let mut store = InMemoryStore::new(Duration::from_secs(60));
        let id = store.create(state());
        assert!(store.delete(id));
        assert!(!store.delete(id));
        assert!(store.get(id).is_none());
    }

    #[test]
    fn zero_ttl_evicts_everything() {
        let mut store = InMemoryStore::new(Duration::ZERO);
        store.create(state());
        store.create(state());
        assert_eq!(store.evict_expired(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn long_ttl_keeps_entries() {
        let mut store = InMemoryStore::new(Duration::from_secs(3600));
        let id = store.create(state());
        assert_eq!(store.evict_expired(), 0);
        assert!(store.get_mut(id).is_some());
    }
}
