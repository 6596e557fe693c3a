//! Price Tracker: the shared `(venue, symbol) -> Ticker` map (spec §4.5).
//!
//! Writes are unconditional replacements from whichever source (REST poll or
//! WS push) observed the tick last; there is no merge logic. Reads and writes
//! are sharded across several `parking_lot::RwLock`s (spec §5) so one hot
//! symbol's writer never blocks a reader of an unrelated symbol.

use arb_engine_core::model::Ticker;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

const SHARD_COUNT: usize = 16;

pub struct PriceTracker {
    shards: Vec<RwLock<HashMap<(String, String), Ticker>>>,
}

impl Default for PriceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceTracker {
    #[must_use]
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self { shards }
    }

    fn shard_for(&self, venue: &str, symbol: &str) -> &RwLock<HashMap<(String, String), Ticker>> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        venue.hash(&mut hasher);
        symbol.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Unconditionally replaces the last-seen tick for `(venue, symbol)`.
    pub fn update(&self, venue: &str, symbol: &str, ticker: Ticker) {
        self.shard_for(venue, symbol)
            .write()
            .insert((venue.to_string(), symbol.to_string()), ticker);
    }

    #[must_use]
    pub fn get(&self, venue: &str, symbol: &str) -> Option<Ticker> {
        self.shard_for(venue, symbol)
            .read()
            .get(&(venue.to_string(), symbol.to_string()))
            .copied()
    }

    /// Returns the ticker only if it is fresher than `threshold` as of `now`
    /// (spec §5 stale-tick policy: evaluation is skipped on stale ticks).
    #[must_use]
    pub fn get_fresh(
        &self,
        venue: &str,
        symbol: &str,
        now: DateTime<Utc>,
        threshold: chrono::Duration,
    ) -> Option<Ticker> {
        let ticker = self.get(venue, symbol)?;
        if ticker.is_stale(now, threshold) {
            None
        } else {
            Some(ticker)
        }
    }

    /// Removes every tick recorded for `venue`, called on disconnect so
    /// stale prices from a torn-down adapter are never read as live.
    pub fn clear_venue(&self, venue: &str) {
        for shard in &self.shards {
            shard.write().retain(|(v, _), _| v != venue);
        }
    }
}
