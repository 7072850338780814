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

//! Mapping decisions: actor→processor, actor→tile, channel→memory.
//!
//! Bindings are plain id→id relations with an attached property bag, and
//! every relation may be rebound at any point — the simulator reads them
//! fresh on each scheduling decision.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use std::collections::HashMap;

use crate::app::{ActorId, Application, ChannelId, MappingKind};
use crate::hw::{Architecture, MemoryId, ProcessorId, TileId};
use crate::Error;

/// One relation entry: the target resource plus an arbitrary property bag
/// (annotations from mapping tools, cost estimates, and the like).
#[derive(Clone, Debug)]
pub struct Binding<T> {
    pub target: T,
    pub properties: HashMap<String, String>,
}

impl<T> Binding<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            properties: HashMap::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Bindings {
    actor_processor: HashMap<ActorId, Binding<ProcessorId>>,
    actor_tile: HashMap<ActorId, Binding<TileId>>,
    channel_memory: HashMap<ChannelId, Binding<MemoryId>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_processor(&mut self, actor: ActorId, processor: ProcessorId) {
        if let Some(old) = self.actor_processor.insert(actor, Binding::new(processor)) {
            log::debug!("rebound {}: {} -> {}", actor, old.target, processor);
        }
    }

    pub fn bind_tile(&mut self, actor: ActorId, tile: TileId) {
        if let Some(old) = self.actor_tile.insert(actor, Binding::new(tile)) {
            log::debug!("rebound {}: {} -> {}", actor, old.target, tile);
        }
    }

    pub fn bind_memory(&mut self, channel: ChannelId, memory: MemoryId) {
        if let Some(old) = self.channel_memory.insert(channel, Binding::new(memory)) {
            log::debug!("rebound {}: {} -> {}", channel, old.target, memory);
        }
    }

    pub fn processor_of(&self, actor: ActorId) -> Result<ProcessorId, Error> {
        self.actor_processor
            .get(&actor)
            .map(|b| b.target)
            .ok_or(Error::UnboundActor(actor))
    }

    pub fn tile_of(&self, actor: ActorId) -> Result<TileId, Error> {
        self.actor_tile
            .get(&actor)
            .map(|b| b.target)
            .ok_or(Error::UnboundActor(actor))
    }

    pub fn memory_of(&self, channel: ChannelId) -> Result<MemoryId, Error> {
        self.channel_memory
            .get(&channel)
            .map(|b| b.target)
            .ok_or(Error::UnboundChannel(channel))
    }

    pub fn processor_binding_mut(&mut self, actor: ActorId) -> Option<&mut Binding<ProcessorId>> {
        self.actor_processor.get_mut(&actor)
    }

    pub fn memory_binding_mut(&mut self, channel: ChannelId) -> Option<&mut Binding<MemoryId>> {
        self.channel_memory.get_mut(&channel)
    }
}

#[derive(Clone, Debug)]
pub enum BindingPolicy {
    /// Actor i runs on processor i, in ascending id order. Fails when the
    /// architecture has fewer processors than the application has actors.
    /// Mostly useful to make tests and small studies prescriptive.
    OneToOne,
    /// Each actor lands on a uniformly random processor; any number of
    /// actors per processor. Deterministic for a fixed seed.
    Random { seed: u64 },
}

/// Compute actor→processor and actor→tile bindings under `policy`.
pub fn assign(
    app: &Application,
    arch: &Architecture,
    policy: &BindingPolicy,
) -> Result<Bindings, Error> {
    let mut bindings = Bindings::new();
    let actors = app.actor_ids();
    let processors = arch.processor_ids();
    match policy {
        BindingPolicy::OneToOne => {
            if actors.len() > processors.len() {
                log::error!(
                    "one-to-one binding needs {} processors, architecture has {}",
                    actors.len(),
                    processors.len()
                );
                return Err(Error::InvalidBinding);
            }
            for (actor, processor) in actors.iter().zip(processors.iter()) {
                bindings.bind_processor(*actor, *processor);
                bindings.bind_tile(*actor, arch.processor(*processor).tile());
            }
        }
        BindingPolicy::Random { seed } => {
            let mut rng = Xoshiro256StarStar::seed_from_u64(*seed);
            for actor in actors.iter() {
                let processor = processors[rng.gen_range(0..processors.len())];
                bindings.bind_processor(*actor, processor);
                bindings.bind_tile(*actor, arch.processor(processor).tile());
            }
        }
    }
    Ok(bindings)
}

/// Derive each channel's mapping tag and backing memory from the tile
/// bindings of its endpoints.
///
/// Channels pinned `Source`/`Destination` keep their pin and land in the
/// corresponding tile's local memory (degrading to the `TileLocal` tags
/// when both endpoints share that tile). Unpinned channels are placed
/// tile-locally when all endpoints share a tile and in the global memory
/// otherwise.
pub fn assign_channel_memories(
    app: &mut Application,
    arch: &Architecture,
    bindings: &mut Bindings,
) -> Result<(), Error> {
    for id in app.channel_ids() {
        let (src, dsts, pinned) = {
            let ch = app.channel(id);
            (ch.source(), ch.destinations(), ch.mapping())
        };
        let src_tile = bindings.tile_of(src)?;
        let mut dst_tiles = Vec::with_capacity(dsts.len());
        for dst in dsts.iter() {
            dst_tiles.push(bindings.tile_of(*dst)?);
        }
        let tile_local = dst_tiles.iter().all(|t| *t == src_tile);
        let (tag, memory) = match pinned {
            MappingKind::Source => {
                let tag = if tile_local {
                    MappingKind::TileLocalSource
                } else {
                    MappingKind::Source
                };
                (tag, arch.tile(src_tile).memory())
            }
            MappingKind::Destination => {
                let dst_tile = dst_tiles[0];
                if !dst_tiles.iter().all(|t| *t == dst_tile) {
                    // readers disagree on a destination tile; nowhere to pin
                    return Err(Error::InvalidMapping(id));
                }
                let tag = if tile_local {
                    MappingKind::TileLocalDestination
                } else {
                    MappingKind::Destination
                };
                (tag, arch.tile(dst_tile).memory())
            }
            MappingKind::TileLocalSource | MappingKind::TileLocalDestination | MappingKind::Global => {
                if tile_local {
                    (MappingKind::TileLocalSource, arch.tile(src_tile).memory())
                } else {
                    (MappingKind::Global, arch.global_memory())
                }
            }
        };
        app.channel_mut(id).set_mapping(tag);
        bindings.bind_memory(id, memory);
        log::debug!("{} mapped {:?} onto {}", id, tag, memory);
    }
    Ok(())
}
