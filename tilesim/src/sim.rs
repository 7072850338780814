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

//! The simulation driver.
//!
//! A run walks the kernel's steady-state window once per iteration. At each
//! step the actors the kernel assigns become candidates on their bound
//! processors; each processor then commits every candidate whose firing
//! guard holds. Hardware concurrency is modeled purely through timestamps
//! and watermarks — nothing here blocks the host thread.
//!
//! Memory-ledger traffic recorded by the schedulers is applied after the
//! last commit, sorted by timestamp, so each ledger reads as a time-ordered
//! occupancy series regardless of the order processors committed in.

use itertools::Itertools;
use std::collections::BTreeMap;

use crate::app::{ActorId, ActorKind, Application};
use crate::bindings::Bindings;
use crate::hw::{Architecture, InterconnectId, MemoryId, ProcessorId};
use crate::kernel::Kernel;
use crate::scheduler::{Action, LedgerOp, LedgerOpKind, ProcessorSchedule};
use crate::{Error, SimTime, Step};

/// Bound on the channel-reset relocation loop (tile-local ↔ global). The
/// loop in the original design had no exit; exhausting the bound surfaces
/// as `Error::MemoryRelocation`.
pub const MAX_MEMORY_RELOCATIONS: usize = 4;

/// A committed firing, with its owning processor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledAction {
    pub actor: ActorId,
    pub processor: ProcessorId,
    pub step: Step,
    pub start: SimTime,
    pub due: SimTime,
}

/// One memory-occupancy sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemorySample {
    pub memory: MemoryId,
    pub at: SimTime,
    pub occupied: u64,
}

/// Accumulated busy time of one interconnect channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelBusy {
    pub interconnect: InterconnectId,
    pub channel: usize,
    pub busy: SimTime,
}

/// Everything a run exposes: the committed schedule and the per-resource
/// utilization series, consumable by external report writers.
#[derive(Clone, Debug)]
pub struct SimulationReport {
    /// committed actions ordered by start time; ties keep processor order
    pub actions: Vec<ScheduledAction>,
    pub memory_samples: Vec<MemorySample>,
    pub interconnect_busy: Vec<ChannelBusy>,
    pub memory_utilization: Vec<(MemoryId, f64)>,
    pub interconnect_utilization: Vec<(InterconnectId, f64)>,
    pub makespan: SimTime,
}

#[derive(Clone, Debug)]
pub struct TimingSimulation {
    schedules: BTreeMap<ProcessorId, ProcessorSchedule>,
}

impl TimingSimulation {
    pub fn new(arch: &Architecture) -> Self {
        Self {
            schedules: arch
                .processor_ids()
                .into_iter()
                .map(|pid| (pid, ProcessorSchedule::new(pid)))
                .collect(),
        }
    }

    pub fn schedule(&self, processor: ProcessorId) -> &ProcessorSchedule {
        self.schedules
            .get(&processor)
            .unwrap_or_else(|| panic!("No such processor {}", processor))
    }

    /// Reset all run state and place every channel's initial tokens into
    /// its backing memory. A memory that cannot host them triggers the
    /// bounded relocation loop: tile-local placements fall back to the
    /// global memory and vice versa.
    pub fn reset(
        &mut self,
        app: &mut Application,
        arch: &mut Architecture,
        bindings: &mut Bindings,
    ) -> Result<(), Error> {
        arch.reset();
        app.reset_channels();
        for sched in self.schedules.values_mut() {
            sched.reset();
        }
        for ch_id in app.channel_ids() {
            let bytes = app.channel(ch_id).initial_bytes();
            let mut memory = bindings.memory_of(ch_id)?;
            if bytes == 0 {
                continue;
            }
            let mut placed = false;
            for _attempt in 0..MAX_MEMORY_RELOCATIONS {
                if arch.memory(memory).can_put(bytes) {
                    arch.memory_mut(memory).put(0.0, bytes);
                    placed = true;
                    break;
                }
                // relocate tile-local <-> global and retry
                let relocated = if arch.is_global(memory) {
                    let tile = bindings.tile_of(app.channel(ch_id).source())?;
                    app.channel_mut(ch_id)
                        .set_mapping(crate::app::MappingKind::Source);
                    arch.tile(tile).memory()
                } else {
                    app.channel_mut(ch_id)
                        .set_mapping(crate::app::MappingKind::Global);
                    arch.global_memory()
                };
                log::warn!(
                    "{}: {} cannot host {}B of initial tokens, relocating to {}",
                    ch_id,
                    memory,
                    bytes,
                    relocated
                );
                bindings.bind_memory(ch_id, relocated);
                memory = relocated;
            }
            if !placed {
                return Err(Error::MemoryRelocation {
                    channel: ch_id,
                    attempts: MAX_MEMORY_RELOCATIONS,
                });
            }
        }
        Ok(())
    }

    /// Simulate `iterations` repetitions of the kernel window and return
    /// the committed schedule and utilization series.
    pub fn run(
        &mut self,
        app: &mut Application,
        arch: &mut Architecture,
        bindings: &mut Bindings,
        kernel: &Kernel,
        iterations: usize,
    ) -> Result<SimulationReport, Error> {
        app.validate()?;
        kernel.validate(app)?;
        self.reset(app, arch, bindings)?;

        for iteration in 0..iterations {
            for step in kernel.steps() {
                // higher priority first; ties in ascending id order
                let assigned = kernel
                    .actors_at(step)
                    .iter()
                    .copied()
                    .sorted_by_key(|a| (std::cmp::Reverse(app.actor(*a).priority()), *a))
                    .collect::<Vec<_>>();
                for actor in assigned {
                    let processor = bindings.processor_of(actor)?;
                    let tile = bindings.tile_of(actor)?;
                    let owner = arch
                        .get_processor(processor)
                        .ok_or(Error::UnknownProcessor(processor))?;
                    if owner.tile() != tile {
                        log::error!(
                            "{}: bound to {} on {}, but the tile binding says {}",
                            actor,
                            processor,
                            owner.tile(),
                            tile
                        );
                        return Err(Error::InvalidBinding);
                    }
                    let action = Action::new(actor, step, app.actor(actor).execution_time());
                    let action = match app.actor(actor).kind() {
                        ActorKind::CommRead => action.read_half(),
                        ActorKind::CommWrite => action.write_half(),
                        _ => action,
                    };
                    self.schedules
                        .get_mut(&processor)
                        .ok_or(Error::UnknownProcessor(processor))?
                        .push_candidate(action);
                }
                for sched in self.schedules.values_mut() {
                    sched.commit_candidates(app, arch, bindings)?;
                }
            }
            log::trace!("iteration {} complete", iteration);
        }

        // deferred candidates may unblock each other; drain to fixpoint
        loop {
            let mut progress = 0;
            for sched in self.schedules.values_mut() {
                progress += sched.commit_candidates(app, arch, bindings)?;
            }
            if progress == 0 {
                break;
            }
        }
        let leftover: usize = self.schedules.values().map(|s| s.pending()).sum();
        if leftover > 0 {
            log::debug!("{} candidates never became enabled", leftover);
        }

        self.apply_ledger_ops(arch);
        Ok(self.report(arch))
    }

    /// Fold the schedulers' deferred ledger traffic into the memories, in
    /// timestamp order. Puts win ties so a same-instant read of a fresh
    /// token never observes an empty ledger.
    fn apply_ledger_ops(&mut self, arch: &mut Architecture) {
        let mut ops: Vec<LedgerOp> = self
            .schedules
            .values_mut()
            .flat_map(|s| s.drain_ledger_ops())
            .collect();
        ops.sort_by(|a, b| {
            a.at.partial_cmp(&b.at)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| match (a.kind, b.kind) {
                    (LedgerOpKind::Put, LedgerOpKind::Remove) => std::cmp::Ordering::Less,
                    (LedgerOpKind::Remove, LedgerOpKind::Put) => std::cmp::Ordering::Greater,
                    _ => std::cmp::Ordering::Equal,
                })
        });
        for op in ops {
            match op.kind {
                LedgerOpKind::Put => arch.memory_mut(op.memory).put(op.at, op.bytes),
                LedgerOpKind::Remove => arch.memory_mut(op.memory).remove(op.at, op.bytes),
            }
        }
    }

    fn report(&self, arch: &Architecture) -> SimulationReport {
        let mut actions: Vec<ScheduledAction> = self
            .schedules
            .values()
            .flat_map(|sched| {
                sched.committed().iter().map(move |action| ScheduledAction {
                    actor: action.actor,
                    processor: sched.processor(),
                    step: action.step,
                    start: action.start,
                    due: action.due,
                })
            })
            .collect();
        // stable: equal start times keep processor-id order
        actions.sort_by(|a, b| {
            a.start
                .partial_cmp(&b.start)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut makespan: SimTime = actions.iter().map(|a| a.due).fold(0.0, f64::max);
        for id in arch.memory_ids() {
            for entry in arch.memory(id).ledger() {
                makespan = makespan.max(entry.at);
            }
        }

        let mut memory_samples = Vec::new();
        let mut memory_utilization = Vec::new();
        for id in arch.memory_ids() {
            let memory = arch.memory(id);
            memory_samples.extend(memory.ledger().iter().map(|entry| MemorySample {
                memory: id,
                at: entry.at,
                occupied: entry.occupied,
            }));
            memory_utilization.push((id, memory.utilization(makespan)));
        }

        let mut interconnect_busy = Vec::new();
        let mut interconnect_utilization = Vec::new();
        for id in arch.interconnect_ids() {
            let interconnect = arch.interconnect(id);
            interconnect_busy.extend(interconnect.busy_time().into_iter().enumerate().map(
                |(channel, busy)| ChannelBusy {
                    interconnect: id,
                    channel,
                    busy,
                },
            ));
            interconnect_utilization.push((id, interconnect.utilization(makespan)));
        }

        SimulationReport {
            actions,
            memory_samples,
            interconnect_busy,
            memory_utilization,
            interconnect_utilization,
            makespan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{ActorProperties, ChannelConfiguration};
    use crate::bindings::{self, BindingPolicy};
    use crate::hw::{
        topologies, ArchitectureConfig, InterconnectConfiguration, MemoryConfiguration,
        TileConfiguration,
    };

    fn two_actor_app(capacity: usize) -> (Application, ActorId, ActorId) {
        let mut app = Application::new("app");
        let src = app.add_actor(
            "src",
            &ActorProperties { execution_time: 2.0, ..Default::default() },
        );
        let snk = app.add_actor(
            "snk",
            &ActorProperties { execution_time: 1.0, ..Default::default() },
        );
        app.add_channel(
            src,
            snk,
            &ChannelConfiguration { capacity, ..Default::default() },
        )
        .unwrap();
        (app, src, snk)
    }

    #[test]
    fn five_iterations_on_one_processor() {
        let (mut app, src, snk) = two_actor_app(1);
        let mut arch = topologies::homogeneous("uni", 1, 1);
        let mut bindings = bindings::assign(&app, &arch, &BindingPolicy::Random { seed: 1 }).unwrap();
        bindings::assign_channel_memories(&mut app, &arch, &mut bindings).unwrap();
        let mut kernel = Kernel::new(0, 1);
        kernel.assign(0, src);
        kernel.assign(1, snk);
        let mut sim = TimingSimulation::new(&arch);
        let report = sim
            .run(&mut app, &mut arch, &mut bindings, &kernel, 5)
            .unwrap();
        let sink_dues: Vec<SimTime> = report
            .actions
            .iter()
            .filter(|a| a.actor == snk)
            .map(|a| a.due)
            .collect();
        assert_eq!(sink_dues.len(), 5);
        for pair in sink_dues.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        // the capacity-1 channel never overflowed (fatal assert otherwise)
        assert!(app.channel(app.channel_ids()[0]).tokens(snk) <= 1);
        assert!(report.makespan > 0.0);
    }

    #[test]
    fn cross_tile_channels_use_the_noc() {
        let (mut app, src, snk) = two_actor_app(2);
        let mut arch = topologies::homogeneous("duo", 2, 1);
        let mut bindings = bindings::assign(&app, &arch, &BindingPolicy::OneToOne).unwrap();
        bindings::assign_channel_memories(&mut app, &arch, &mut bindings).unwrap();
        let kernel = Kernel::single_step(&app.actor_ids());
        let mut sim = TimingSimulation::new(&arch);
        let report = sim
            .run(&mut app, &mut arch, &mut bindings, &kernel, 3)
            .unwrap();
        let _ = (src, snk);
        let noc_busy: SimTime = report
            .interconnect_busy
            .iter()
            .filter(|cb| cb.interconnect == arch.noc())
            .map(|cb| cb.busy)
            .sum();
        assert!(noc_busy > 0.0);
        // the global memory saw the traffic
        let global_samples = report
            .memory_samples
            .iter()
            .filter(|s| s.memory == arch.global_memory())
            .count();
        assert!(global_samples > 0);
    }

    #[test]
    fn consumer_scheduled_before_producer_still_completes() {
        let (mut app, src, snk) = two_actor_app(1);
        let mut arch = topologies::homogeneous("uni", 1, 2);
        let mut bindings = bindings::assign(&app, &arch, &BindingPolicy::OneToOne).unwrap();
        bindings::assign_channel_memories(&mut app, &arch, &mut bindings).unwrap();
        // the kernel lists the consumer first; it defers until tokens land
        let mut kernel = Kernel::new(0, 1);
        kernel.assign(0, snk);
        kernel.assign(1, src);
        let mut sim = TimingSimulation::new(&arch);
        let report = sim
            .run(&mut app, &mut arch, &mut bindings, &kernel, 2)
            .unwrap();
        assert_eq!(report.actions.iter().filter(|a| a.actor == snk).count(), 2);
        assert_eq!(report.actions.iter().filter(|a| a.actor == src).count(), 2);
    }

    #[test]
    fn initial_tokens_relocate_to_global_when_local_memory_is_small() {
        let mut app = Application::new("app");
        let a = app.add_actor("a", &ActorProperties::default());
        let b = app.add_actor("b", &ActorProperties::default());
        let ch = app
            .add_channel(
                a,
                b,
                &ChannelConfiguration {
                    capacity: 4,
                    initial_tokens: 2,
                    token_size: 8,
                    ..Default::default()
                },
            )
            .unwrap();
        let config = ArchitectureConfig {
            tiles: vec![TileConfiguration {
                processors: 2,
                // too small for the 16B of initial tokens
                memory: MemoryConfiguration { capacity: Some(8) },
                crossbar: InterconnectConfiguration::default(),
            }],
            global_memory: MemoryConfiguration { capacity: None },
            noc: InterconnectConfiguration::noc_default(),
        };
        let mut arch = topologies::from_config("tiny", &config);
        let mut bindings = bindings::assign(&app, &arch, &BindingPolicy::OneToOne).unwrap();
        bindings::assign_channel_memories(&mut app, &arch, &mut bindings).unwrap();
        assert_eq!(
            bindings.memory_of(ch).unwrap(),
            arch.tile(arch.tile_ids()[0]).memory()
        );
        let mut sim = TimingSimulation::new(&arch);
        sim.reset(&mut app, &mut arch, &mut bindings).unwrap();
        // the channel moved to the global memory and its tokens were placed
        assert_eq!(bindings.memory_of(ch).unwrap(), arch.global_memory());
        assert_eq!(arch.memory(arch.global_memory()).occupied(), 16);
    }

    #[test]
    fn exhausted_relocation_is_a_terminal_error() {
        let mut app = Application::new("app");
        let a = app.add_actor("a", &ActorProperties::default());
        let b = app.add_actor("b", &ActorProperties::default());
        let ch = app
            .add_channel(
                a,
                b,
                &ChannelConfiguration {
                    capacity: 4,
                    initial_tokens: 4,
                    token_size: 8,
                    ..Default::default()
                },
            )
            .unwrap();
        let config = ArchitectureConfig {
            tiles: vec![TileConfiguration {
                processors: 2,
                memory: MemoryConfiguration { capacity: Some(8) },
                crossbar: InterconnectConfiguration::default(),
            }],
            // nowhere to go: the global memory is bounded too
            global_memory: MemoryConfiguration { capacity: Some(8) },
            noc: InterconnectConfiguration::noc_default(),
        };
        let mut arch = topologies::from_config("tiny", &config);
        let mut bindings = bindings::assign(&app, &arch, &BindingPolicy::OneToOne).unwrap();
        bindings::assign_channel_memories(&mut app, &arch, &mut bindings).unwrap();
        let mut sim = TimingSimulation::new(&arch);
        assert_eq!(
            sim.reset(&mut app, &mut arch, &mut bindings).unwrap_err(),
            Error::MemoryRelocation {
                channel: ch,
                attempts: MAX_MEMORY_RELOCATIONS
            }
        );
    }
}
