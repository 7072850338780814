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

//! The per-processor scheduler.
//!
//! Each processor owns a queue of candidate actions. Committing a candidate
//! re-validates its firing guard, drains the input channels' produced-at
//! records to find when the consumed tokens actually landed, emits one READ
//! transfer per token against the owning crossbar or NoC, places the
//! execution window behind the processor watermark and the last read, emits
//! one WRITE transfer per produced token at completion, and finally applies
//! the token deltas as one unit.
//!
//! Candidates whose guard fails stay queued in arrival order; equal-time
//! actions therefore commit first-validated-first (queue order), never by
//! wall-clock submission order.
//!
//! Memory ledger traffic is recorded as deferred ops rather than applied
//! inline: processors commit sequentially, so inline application would
//! interleave ledger timestamps in commit order instead of time order. The
//! simulation driver sorts and applies the ops after the run (see `sim`).

use std::collections::{HashMap, VecDeque};

use crate::app::{ActorId, Application, ChannelId};
use crate::bindings::Bindings;
use crate::hw::{Architecture, InterconnectId, MemoryId, ProcessorId, TileId};
use crate::{Error, SimTime};

mod action;
pub use action::{Action, Transfer, TransferKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LedgerOpKind {
    Put,
    Remove,
}

/// A deferred memory-ledger transaction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct LedgerOp {
    pub memory: MemoryId,
    pub at: SimTime,
    pub bytes: u64,
    pub kind: LedgerOpKind,
}

/// Accesses to a tile-local memory ride the tile's crossbar; everything
/// else (global memory, another tile's memory) crosses the NoC.
fn route(arch: &Architecture, tile: TileId, memory: MemoryId) -> InterconnectId {
    if arch.tile(tile).memory() == memory {
        arch.tile(tile).crossbar()
    } else {
        arch.noc()
    }
}

#[derive(Clone, Debug)]
pub struct ProcessorSchedule {
    processor: ProcessorId,
    candidates: VecDeque<Action>,
    committed: Vec<Action>,
    reads: HashMap<ActorId, Vec<Transfer>>,
    writes: HashMap<ActorId, Vec<Transfer>>,
    ledger_ops: Vec<LedgerOp>,
    /// the processor's last-event watermark
    last_event: SimTime,
}

impl ProcessorSchedule {
    pub fn new(processor: ProcessorId) -> Self {
        Self {
            processor,
            candidates: VecDeque::new(),
            committed: Vec::new(),
            reads: HashMap::new(),
            writes: HashMap::new(),
            ledger_ops: Vec::new(),
            last_event: 0.0,
        }
    }

    pub fn processor(&self) -> ProcessorId {
        self.processor
    }

    pub fn push_candidate(&mut self, action: Action) {
        self.candidates.push_back(action);
    }

    pub fn pending(&self) -> usize {
        self.candidates.len()
    }

    pub fn committed(&self) -> &[Action] {
        &self.committed
    }

    pub fn last_event(&self) -> SimTime {
        self.last_event
    }

    pub fn read_transfers(&self, actor: ActorId) -> &[Transfer] {
        self.reads.get(&actor).map_or(&[], |t| t.as_slice())
    }

    pub fn write_transfers(&self, actor: ActorId) -> &[Transfer] {
        self.writes.get(&actor).map_or(&[], |t| t.as_slice())
    }

    pub(crate) fn drain_ledger_ops(&mut self) -> Vec<LedgerOp> {
        std::mem::take(&mut self.ledger_ops)
    }

    pub fn reset(&mut self) {
        self.candidates.clear();
        self.committed.clear();
        self.reads.clear();
        self.writes.clear();
        self.ledger_ops.clear();
        self.last_event = 0.0;
    }

    /// One pass over the candidate queue: commit every candidate whose
    /// guard holds, defer the rest in arrival order. Returns the number of
    /// committed actions.
    pub fn commit_candidates(
        &mut self,
        app: &mut Application,
        arch: &mut Architecture,
        bindings: &Bindings,
    ) -> Result<usize, Error> {
        let mut deferred = VecDeque::new();
        let mut committed = 0;
        while let Some(action) = self.candidates.pop_front() {
            if !app.enabled(action.actor, action.skip_reads, action.skip_writes) {
                log::trace!("{}: deferring {}", self.processor, action.actor);
                deferred.push_back(action);
                continue;
            }
            self.commit_action(action, app, arch, bindings)?;
            committed += 1;
        }
        self.candidates = deferred;
        Ok(committed)
    }

    fn commit_action(
        &mut self,
        mut action: Action,
        app: &mut Application,
        arch: &mut Architecture,
        bindings: &Bindings,
    ) -> Result<(), Error> {
        let actor_id = action.actor;
        let tile = arch.processor(self.processor).tile();
        let (inputs, outputs) = {
            let actor = app.actor(actor_id);
            (actor.inputs().to_vec(), actor.outputs().to_vec())
        };

        // read side: one transfer per consumed token, no earlier than the
        // token's production completion, gated by the channel's flush policy
        let mut latest_read: SimTime = 0.0;
        let mut flush_expected: HashMap<ChannelId, bool> = HashMap::new();
        if !action.skip_reads {
            for ch_id in inputs.iter() {
                let (rate, token_bytes, flushes) = {
                    let ch = app.channel(*ch_id);
                    (
                        ch.consumption_rate(actor_id),
                        ch.token_size() as u64,
                        ch.flush_pending(),
                    )
                };
                flush_expected.insert(*ch_id, flushes);
                if rate == 0 {
                    continue;
                }
                let available = app.channel_mut(*ch_id).take_produced(actor_id, rate);
                let memory = bindings.memory_of(*ch_id)?;
                let via = route(arch, tile, memory);
                for _ in 0..rate {
                    let requested = if available > self.last_event {
                        available
                    } else {
                        self.last_event
                    };
                    let (start, due) = if flushes {
                        let assignment = arch.interconnect_mut(via).assign(requested, token_bytes);
                        self.ledger_ops.push(LedgerOp {
                            memory,
                            at: assignment.due,
                            bytes: token_bytes,
                            kind: LedgerOpKind::Remove,
                        });
                        (assignment.start, assignment.due)
                    } else {
                        // a non-flushing multicast read costs no physical traffic
                        (requested, requested)
                    };
                    self.reads.entry(actor_id).or_insert_with(Vec::new).push(Transfer {
                        kind: TransferKind::Read,
                        actor: actor_id,
                        channel: *ch_id,
                        start,
                        due,
                        bytes: token_bytes,
                    });
                    if due > latest_read {
                        latest_read = due;
                    }
                }
            }
        }

        // execution window behind the watermark, the caller's earliest
        // start, and the last required read
        let start = self.last_event.max(action.start).max(latest_read);
        let due = start + action.processing_time;
        action.start = start;
        action.due = due;

        // write side: one transfer per produced token, issued at completion
        let mut completions: Vec<(ChannelId, Vec<SimTime>)> = Vec::new();
        if !action.skip_writes {
            for ch_id in outputs.iter() {
                let (rate, token_bytes) = {
                    let ch = app.channel(*ch_id);
                    (ch.production_rate(), ch.token_size() as u64)
                };
                if rate == 0 {
                    continue;
                }
                let memory = bindings.memory_of(*ch_id)?;
                let via = route(arch, tile, memory);
                let mut times = Vec::with_capacity(rate);
                for _ in 0..rate {
                    let assignment = arch.interconnect_mut(via).assign(due, token_bytes);
                    self.ledger_ops.push(LedgerOp {
                        memory,
                        at: assignment.due,
                        bytes: token_bytes,
                        kind: LedgerOpKind::Put,
                    });
                    self.writes.entry(actor_id).or_insert_with(Vec::new).push(Transfer {
                        kind: TransferKind::Write,
                        actor: actor_id,
                        channel: *ch_id,
                        start: assignment.start,
                        due: assignment.due,
                        bytes: token_bytes,
                    });
                    times.push(assignment.due);
                }
                completions.push((*ch_id, times));
            }
        }

        self.last_event = due;
        log::debug!(
            "{}: committed {} step {} [{} .. {}]",
            self.processor,
            actor_id,
            action.step,
            start,
            due
        );
        self.committed.push(action);

        // apply the firing as one unit; downstream consumers see the tokens
        // at the corresponding write completions
        if !action.skip_reads {
            for ch_id in inputs.iter() {
                let flushed = app.channel_mut(*ch_id).commit_read(actor_id);
                debug_assert_eq!(Some(&flushed), flush_expected.get(ch_id));
            }
        }
        if !action.skip_writes {
            for (ch_id, times) in completions.iter() {
                app.channel_mut(*ch_id).commit_write(times);
            }
        }
        Ok(())
    }
}
