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

mod app;
mod error;
mod hw;
mod kernel;
mod scheduler;
mod sim;

pub mod analysis;
pub mod bindings;

// Public types
// simulated time, in nanoseconds
pub type SimTime = f64;
// kernel step index
pub type Step = usize;

pub use crate::app::{Actor, ActorId, ActorKind, ActorProperties, Application};
pub use crate::app::{Channel, ChannelConfiguration, ChannelId, CompositeFifo, Fifo, MappingKind};
pub use crate::bindings::{Binding, BindingPolicy, Bindings};
pub use crate::error::Error;
pub use crate::hw::topologies;
pub use crate::hw::{Architecture, Processor, ProcessorId, Tile, TileId};
pub use crate::hw::{
    ArchitectureConfig, InterconnectConfiguration, MemoryConfiguration, TileConfiguration,
};
pub use crate::hw::{Assignment, CommittedTransfer, Interconnect, InterconnectId, InterconnectKind};
pub use crate::hw::{LedgerEntry, Memory, MemoryId};
pub use crate::kernel::Kernel;
pub use crate::scheduler::{Action, ProcessorSchedule, Transfer, TransferKind};
pub use crate::sim::{ChannelBusy, MemorySample, ScheduledAction, SimulationReport};
pub use crate::sim::{TimingSimulation, MAX_MEMORY_RELOCATIONS};
