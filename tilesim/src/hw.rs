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

//! The hardware model: tiles of processors around a local memory and
//! crossbar, a global memory, and a NoC connecting the tiles.
//!
//! The architecture is pure structure plus the two timing models (memory
//! ledger, interconnect channels); it knows nothing about dataflow.

use itertools::Itertools;
use std::collections::HashMap;
use std::fmt;

pub(super) mod config;
pub(super) mod interconnect;
pub(super) mod memory;
pub mod topologies;

pub use config::{
    ArchitectureConfig, InterconnectConfiguration, MemoryConfiguration, TileConfiguration,
};
pub use interconnect::{Assignment, CommittedTransfer, Interconnect, InterconnectId, InterconnectKind};
pub use memory::{LedgerEntry, Memory, MemoryId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub(crate) usize);

impl TileId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(pub(crate) usize);

impl ProcessorId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct Processor {
    id: ProcessorId,
    name: String,
    tile: TileId,
}

impl Processor {
    pub fn id(&self) -> ProcessorId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn tile(&self) -> TileId {
        self.tile
    }
}

/// A cluster of processors sharing a local memory through a crossbar.
#[derive(Clone, Debug)]
pub struct Tile {
    id: TileId,
    name: String,
    processors: Vec<ProcessorId>,
    memory: MemoryId,
    crossbar: InterconnectId,
}

impl Tile {
    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn processors(&self) -> &[ProcessorId] {
        &self.processors
    }

    pub fn memory(&self) -> MemoryId {
        self.memory
    }

    pub fn crossbar(&self) -> InterconnectId {
        self.crossbar
    }
}

/// Id-indexed arenas for the hardware graph, with the id counters owned by
/// the aggregate. Cloned wholesale per design point.
#[derive(Clone, Debug)]
pub struct Architecture {
    name: String,
    tiles: HashMap<TileId, Tile>,
    processors: HashMap<ProcessorId, Processor>,
    memories: HashMap<MemoryId, Memory>,
    interconnects: HashMap<InterconnectId, Interconnect>,
    global_memory: MemoryId,
    noc: InterconnectId,
    next_tile: usize,
    next_processor: usize,
    next_memory: usize,
    next_interconnect: usize,
}

impl Architecture {
    pub fn new(
        name: &str,
        global_memory: &MemoryConfiguration,
        noc: &InterconnectConfiguration,
    ) -> Self {
        let mut arch = Self {
            name: String::from(name),
            tiles: HashMap::new(),
            processors: HashMap::new(),
            memories: HashMap::new(),
            interconnects: HashMap::new(),
            global_memory: MemoryId(0),
            noc: InterconnectId(0),
            next_tile: 0,
            next_processor: 0,
            next_memory: 0,
            next_interconnect: 0,
        };
        arch.global_memory = arch.new_memory("global", global_memory.capacity);
        arch.noc = arch.new_interconnect("noc", InterconnectKind::NetworkOnChip, noc);
        arch
    }

    fn new_memory(&mut self, name: &str, capacity: Option<u64>) -> MemoryId {
        let id = MemoryId(self.next_memory);
        self.next_memory += 1;
        self.memories.insert(id, Memory::new(id, name, capacity));
        id
    }

    fn new_interconnect(
        &mut self,
        name: &str,
        kind: InterconnectKind,
        config: &InterconnectConfiguration,
    ) -> InterconnectId {
        let id = InterconnectId(self.next_interconnect);
        self.next_interconnect += 1;
        self.interconnects.insert(
            id,
            Interconnect::new(id, name, kind, config.channels, config.bandwidth),
        );
        id
    }

    /// Add a tile: `processors` cores, one local memory, one crossbar.
    pub fn add_tile(&mut self, config: &TileConfiguration) -> TileId {
        assert!(config.processors > 0, "A tile needs at least one processor");
        let id = TileId(self.next_tile);
        self.next_tile += 1;
        let name = format!("tile{}", id.index());
        let memory = self.new_memory(&format!("{}.mem", name), config.memory.capacity);
        let crossbar = self.new_interconnect(
            &format!("{}.xbar", name),
            InterconnectKind::Crossbar,
            &config.crossbar,
        );
        let mut processors = Vec::with_capacity(config.processors);
        for core in 0..config.processors {
            let pid = ProcessorId(self.next_processor);
            self.next_processor += 1;
            self.processors.insert(
                pid,
                Processor {
                    id: pid,
                    name: format!("{}.p{}", name, core),
                    tile: id,
                },
            );
            processors.push(pid);
        }
        self.tiles.insert(
            id,
            Tile {
                id,
                name,
                processors,
                memory,
                crossbar,
            },
        );
        id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    pub fn tile(&self, id: TileId) -> &Tile {
        self.tiles
            .get(&id)
            .unwrap_or_else(|| panic!("No such tile {}", id))
    }

    pub fn get_processor(&self, id: ProcessorId) -> Option<&Processor> {
        self.processors.get(&id)
    }

    pub fn processor(&self, id: ProcessorId) -> &Processor {
        self.processors
            .get(&id)
            .unwrap_or_else(|| panic!("No such processor {}", id))
    }

    pub fn get_memory(&self, id: MemoryId) -> Option<&Memory> {
        self.memories.get(&id)
    }

    pub fn memory(&self, id: MemoryId) -> &Memory {
        self.memories
            .get(&id)
            .unwrap_or_else(|| panic!("No such memory {}", id))
    }

    pub fn memory_mut(&mut self, id: MemoryId) -> &mut Memory {
        self.memories
            .get_mut(&id)
            .unwrap_or_else(|| panic!("No such memory {}", id))
    }

    pub fn interconnect(&self, id: InterconnectId) -> &Interconnect {
        self.interconnects
            .get(&id)
            .unwrap_or_else(|| panic!("No such interconnect {}", id))
    }

    pub fn interconnect_mut(&mut self, id: InterconnectId) -> &mut Interconnect {
        self.interconnects
            .get_mut(&id)
            .unwrap_or_else(|| panic!("No such interconnect {}", id))
    }

    pub fn global_memory(&self) -> MemoryId {
        self.global_memory
    }

    pub fn noc(&self) -> InterconnectId {
        self.noc
    }

    pub fn is_global(&self, id: MemoryId) -> bool {
        id == self.global_memory
    }

    /// The tile owning `id`, or `None` for the global memory.
    pub fn tile_of_memory(&self, id: MemoryId) -> Option<TileId> {
        self.tile_ids()
            .into_iter()
            .find(|tile| self.tile(*tile).memory() == id)
    }

    pub fn tile_ids(&self) -> Vec<TileId> {
        self.tiles.keys().copied().sorted().collect()
    }

    pub fn processor_ids(&self) -> Vec<ProcessorId> {
        self.processors.keys().copied().sorted().collect()
    }

    pub fn memory_ids(&self) -> Vec<MemoryId> {
        self.memories.keys().copied().sorted().collect()
    }

    pub fn interconnect_ids(&self) -> Vec<InterconnectId> {
        self.interconnects.keys().copied().sorted().collect()
    }

    /// Clear all run state (ledgers, channel watermarks) while keeping the
    /// structure.
    pub fn reset(&mut self) {
        for memory in self.memories.values_mut() {
            memory.reset();
        }
        for interconnect in self.interconnects.values_mut() {
            interconnect.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_own_disjoint_resources() {
        let mut arch = Architecture::new(
            "arch",
            &MemoryConfiguration { capacity: None },
            &InterconnectConfiguration::noc_default(),
        );
        let t0 = arch.add_tile(&TileConfiguration::default());
        let t1 = arch.add_tile(&TileConfiguration::default());
        assert_eq!(arch.tile_count(), 2);
        assert_eq!(arch.processor_count(), 4);
        assert_ne!(arch.tile(t0).memory(), arch.tile(t1).memory());
        assert_ne!(arch.tile(t0).crossbar(), arch.tile(t1).crossbar());
        for pid in arch.tile(t0).processors() {
            assert_eq!(arch.processor(*pid).tile(), t0);
        }
        assert!(arch.is_global(arch.global_memory()));
        assert_eq!(arch.tile_of_memory(arch.global_memory()), None);
        assert_eq!(arch.tile_of_memory(arch.tile(t1).memory()), Some(t1));
    }

    #[test]
    fn global_memory_is_unbounded_by_default() {
        let arch = Architecture::new(
            "arch",
            &MemoryConfiguration { capacity: None },
            &InterconnectConfiguration::noc_default(),
        );
        assert_eq!(arch.memory(arch.global_memory()).capacity(), None);
        assert_eq!(
            arch.interconnect(arch.noc()).kind(),
            InterconnectKind::NetworkOnChip
        );
    }
}
