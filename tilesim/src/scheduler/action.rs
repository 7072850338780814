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

use crate::app::{ActorId, ChannelId};
use crate::{SimTime, Step};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    Read,
    Write,
}

/// One token's trip between a processor and a channel's backing memory.
/// Created by the scheduler, timed by the interconnect models, and folded
/// into the memory ledger; not kept beyond the run's transfer log.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transfer {
    pub kind: TransferKind,
    pub actor: ActorId,
    pub channel: ChannelId,
    pub start: SimTime,
    pub due: SimTime,
    pub bytes: u64,
}

/// One firing instance of an actor.
///
/// `start`/`due` are filled in when the scheduler commits the action. The
/// skip flags carry the split-firing variants of decomposed communication
/// tasks: a read half skips the write side and vice versa.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Action {
    pub actor: ActorId,
    pub step: Step,
    pub start: SimTime,
    pub due: SimTime,
    pub processing_time: SimTime,
    pub skip_reads: bool,
    pub skip_writes: bool,
}

impl Action {
    pub fn new(actor: ActorId, step: Step, processing_time: SimTime) -> Self {
        Self {
            actor,
            step,
            start: 0.0,
            due: 0.0,
            processing_time,
            skip_reads: false,
            skip_writes: false,
        }
    }

    /// Constrain the firing to start no earlier than `at`.
    pub fn with_earliest_start(mut self, at: SimTime) -> Self {
        self.start = at;
        self
    }

    /// The read half of a split communication-task firing.
    pub fn read_half(mut self) -> Self {
        self.skip_writes = true;
        self
    }

    /// The write half of a split communication-task firing.
    pub fn write_half(mut self) -> Self {
        self.skip_reads = true;
        self
    }
}
