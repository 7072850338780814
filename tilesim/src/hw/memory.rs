// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Time-indexed memory occupancy ledger.
//!
//! The ledger is an append-only series of `(timestamp, occupied bytes)`
//! samples. `can_put`/`can_remove` are pure checks against the newest
//! sample; `put`/`remove` append and assert the occupancy invariants.
//! Writes must carry non-decreasing timestamps. Reads may not: read
//! completions are ordered per processor, not globally, so a slower
//! processor can retire a read that started before the last write landed.

use std::fmt;

use crate::SimTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryId(pub(crate) usize);

impl MemoryId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LedgerEntry {
    pub at: SimTime,
    pub occupied: u64,
}

#[derive(Clone, Debug)]
pub struct Memory {
    id: MemoryId,
    name: String,
    /// `None` models an unbounded (global) memory.
    capacity: Option<u64>,
    ledger: Vec<LedgerEntry>,
}

impl Memory {
    pub(crate) fn new(id: MemoryId, name: &str, capacity: Option<u64>) -> Self {
        Self {
            id,
            name: String::from(name),
            capacity,
            ledger: Vec::new(),
        }
    }

    pub fn id(&self) -> MemoryId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    pub fn occupied(&self) -> u64 {
        self.ledger.last().map_or(0, |entry| entry.occupied)
    }

    pub fn can_put(&self, bytes: u64) -> bool {
        match self.capacity {
            Some(capacity) => self.occupied() + bytes <= capacity,
            None => true,
        }
    }

    pub fn can_remove(&self, bytes: u64) -> bool {
        self.occupied() >= bytes
    }

    pub fn put(&mut self, at: SimTime, bytes: u64) {
        if let Some(last) = self.ledger.last() {
            assert!(
                at >= last.at,
                "Memory {}: write timestamps must be non-decreasing ({} < {})",
                self.id,
                at,
                last.at
            );
        }
        let occupied = self.occupied() + bytes;
        if let Some(capacity) = self.capacity {
            assert!(
                occupied <= capacity,
                "Memory {}: occupancy {} exceeds capacity {}",
                self.id,
                occupied,
                capacity
            );
        }
        log::trace!("{}: put {}B at {} -> {}B", self.id, bytes, at, occupied);
        self.ledger.push(LedgerEntry { at, occupied });
    }

    pub fn remove(&mut self, at: SimTime, bytes: u64) {
        let current = self.occupied();
        assert!(
            current >= bytes,
            "Memory {}: removing {}B from {}B would go negative",
            self.id,
            bytes,
            current
        );
        let occupied = current - bytes;
        log::trace!("{}: remove {}B at {} -> {}B", self.id, bytes, at, occupied);
        self.ledger.push(LedgerEntry { at, occupied });
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    /// Time-integral of occupancy over `[0, horizon]` divided by
    /// `capacity * horizon`. Unbounded memories report zero. Samples are
    /// sorted by timestamp first so the relaxed read ordering cannot
    /// contribute negative area.
    pub fn utilization(&self, horizon: SimTime) -> f64 {
        let capacity = match self.capacity {
            Some(capacity) if capacity > 0 && horizon > 0.0 => capacity,
            _ => return 0.0,
        };
        let mut samples = self.ledger.clone();
        samples.sort_by(|a, b| a.at.partial_cmp(&b.at).unwrap_or(std::cmp::Ordering::Equal));
        let mut integral = 0.0;
        let mut level = 0u64;
        let mut since = 0.0;
        for sample in samples.iter() {
            let until = sample.at.min(horizon);
            if until > since {
                integral += level as f64 * (until - since);
                since = until;
            }
            level = sample.occupied;
        }
        if horizon > since {
            integral += level as f64 * (horizon - since);
        }
        integral / (capacity as f64 * horizon)
    }

    pub fn reset(&mut self) {
        self.ledger.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(capacity: u64) -> Memory {
        Memory::new(MemoryId(0), "m", Some(capacity))
    }

    #[test]
    fn checks_are_pure() {
        let mem = memory(10);
        assert!(mem.can_put(10));
        assert!(!mem.can_put(11));
        assert!(!mem.can_remove(1));
        assert!(mem.ledger().is_empty());
    }

    #[test]
    fn occupancy_stays_within_bounds_under_guarded_interleaving() {
        let mut mem = memory(64);
        let mut t = 0.0;
        for step in 0..32 {
            let bytes = 8 + 8 * (step % 3) as u64;
            if mem.can_put(bytes) {
                mem.put(t, bytes);
            } else if mem.can_remove(bytes) {
                mem.remove(t, bytes);
            }
            t += 1.0;
            assert!(mem.occupied() <= 64);
        }
        while mem.can_remove(8) {
            mem.remove(t, 8);
            assert!(mem.occupied() <= 64);
        }
    }

    #[test]
    #[should_panic(expected = "non-decreasing")]
    fn writes_must_not_regress_in_time() {
        let mut mem = memory(64);
        mem.put(5.0, 8);
        mem.put(3.0, 8);
    }

    #[test]
    fn reads_may_regress_in_time() {
        let mut mem = memory(64);
        mem.put(5.0, 16);
        mem.remove(3.0, 8);
        assert_eq!(mem.occupied(), 8);
    }

    #[test]
    #[should_panic(expected = "negative")]
    fn removing_more_than_occupied_is_fatal() {
        let mut mem = memory(64);
        mem.put(0.0, 8);
        mem.remove(1.0, 16);
    }

    #[test]
    fn utilization_is_the_occupancy_integral() {
        let mut mem = memory(100);
        mem.put(0.0, 50);
        mem.remove(5.0, 50);
        // 50 bytes held for 5 of 10 time units over a 100-byte capacity
        assert_eq!(mem.utilization(10.0), 0.25);
    }

    #[test]
    fn unbounded_memory_reports_zero_utilization() {
        let mut mem = Memory::new(MemoryId(1), "global", None);
        mem.put(0.0, 1 << 40);
        assert_eq!(mem.utilization(10.0), 0.0);
    }
}
