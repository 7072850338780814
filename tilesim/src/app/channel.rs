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

//! Rate-typed token channels.
//!
//! A channel is either a simple point-to-point FIFO or a composite channel
//! produced by merging a one-writer/many-reader multicast (see
//! `analysis::collapse`). Both variants expose the same capability set —
//! `can_read`, `can_write`, `take_produced`, `commit_read`, `commit_write` —
//! so the scheduler never dispatches on the concrete shape.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::app::ActorId;
use crate::SimTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub(crate) usize);

impl ChannelId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Where a channel's backing buffer lives relative to its endpoints.
///
/// The tag is computed by `bindings::assign_channel_memories` unless the
/// application pinned it explicitly (`Source`/`Destination`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum MappingKind {
    /// Pinned to the producer tile's local memory.
    Source,
    /// Pinned to the consumer tile's local memory.
    Destination,
    /// Both endpoints share a tile; buffer in that tile's memory.
    TileLocalSource,
    TileLocalDestination,
    /// Backed by the global memory, reachable over the NoC.
    Global,
}

/// Static parameters of a channel, separate from its run state.
///
/// Constructed programmatically or read from a config file.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ChannelConfiguration {
    pub capacity: usize,
    pub initial_tokens: usize,
    /// bytes per token
    pub token_size: usize,
    /// tokens produced per source firing
    pub production_rate: usize,
    /// tokens consumed per destination firing
    pub consumption_rate: usize,
    pub mapping: MappingKind,
}

impl Default for ChannelConfiguration {
    fn default() -> Self {
        Self {
            capacity: 1,
            initial_tokens: 0,
            token_size: 4,
            production_rate: 1,
            consumption_rate: 1,
            mapping: MappingKind::Global,
        }
    }
}

/// A point-to-point token FIFO.
///
/// `produced_at` holds one entry per buffered token: the time the token
/// finished landing in the backing memory. Consumers drain it to learn the
/// earliest time their reads may start. A reset seeds it with zero-time
/// entries for the initial tokens.
#[derive(Clone, Debug)]
pub struct Fifo {
    id: ChannelId,
    src: ActorId,
    dst: ActorId,
    tokens: usize,
    initial_tokens: usize,
    capacity: usize,
    token_size: usize,
    production_rate: usize,
    consumption_rate: usize,
    mapping: MappingKind,
    produced_at: VecDeque<SimTime>,
}

impl Fifo {
    pub(crate) fn new(id: ChannelId, src: ActorId, dst: ActorId, config: &ChannelConfiguration) -> Self {
        assert!(
            config.initial_tokens <= config.capacity,
            "Channel {}: initial tokens {} exceed capacity {}",
            id,
            config.initial_tokens,
            config.capacity
        );
        Self {
            id,
            src,
            dst,
            tokens: config.initial_tokens,
            initial_tokens: config.initial_tokens,
            capacity: config.capacity,
            token_size: config.token_size,
            production_rate: config.production_rate,
            consumption_rate: config.consumption_rate,
            mapping: config.mapping,
            produced_at: (0..config.initial_tokens).map(|_| 0.0).collect(),
        }
    }

    pub fn src(&self) -> ActorId {
        self.src
    }

    pub fn dst(&self) -> ActorId {
        self.dst
    }

    pub fn tokens(&self) -> usize {
        self.tokens
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn initial_tokens(&self) -> usize {
        self.initial_tokens
    }

    pub fn token_size(&self) -> usize {
        self.token_size
    }

    pub fn production_rate(&self) -> usize {
        self.production_rate
    }

    pub fn consumption_rate(&self) -> usize {
        self.consumption_rate
    }

    fn can_write(&self) -> bool {
        self.tokens + self.production_rate <= self.capacity
    }

    fn can_read(&self) -> bool {
        self.tokens >= self.consumption_rate
    }

    fn take_produced(&mut self, count: usize) -> SimTime {
        assert!(
            count <= self.produced_at.len(),
            "Channel {}: reading {} tokens but only {} were produced",
            self.id,
            count,
            self.produced_at.len()
        );
        let mut latest: SimTime = 0.0;
        for _ in 0..count {
            let at = self.produced_at.pop_front().unwrap();
            latest = latest.max(at);
        }
        latest
    }

    fn commit_read(&mut self) {
        assert!(
            self.tokens >= self.consumption_rate,
            "Channel {}: token count {} under-runs consumption rate {}",
            self.id,
            self.tokens,
            self.consumption_rate
        );
        self.tokens -= self.consumption_rate;
    }

    fn commit_write(&mut self, completions: &[SimTime]) {
        assert_eq!(
            completions.len(),
            self.production_rate,
            "Channel {}: a firing must produce exactly the production rate",
            self.id
        );
        assert!(
            self.tokens + self.production_rate <= self.capacity,
            "Channel {}: capacity {} exceeded",
            self.id,
            self.capacity
        );
        self.tokens += self.production_rate;
        self.produced_at.extend(completions.iter().copied());
    }

    fn reset(&mut self) {
        self.tokens = self.initial_tokens;
        self.produced_at = (0..self.initial_tokens).map(|_| 0.0).collect();
    }
}

/// One reader leg of a composite channel.
///
/// Token counts are independent per reader; production events are shared.
#[derive(Clone, Debug)]
pub(crate) struct ReaderState {
    pub(crate) actor: ActorId,
    pub(crate) tokens: usize,
    pub(crate) initial_tokens: usize,
    pub(crate) consumption_rate: usize,
    pub(crate) produced_at: VecDeque<SimTime>,
}

impl ReaderState {
    fn new(actor: ActorId, initial_tokens: usize, consumption_rate: usize) -> Self {
        Self {
            actor,
            tokens: initial_tokens,
            initial_tokens,
            consumption_rate,
            produced_at: (0..initial_tokens).map(|_| 0.0).collect(),
        }
    }
}

/// A merged one-writer/many-reader channel.
///
/// A write broadcasts the production rate to every reader leg in one atomic
/// step. A read drains only the reading actor's leg. The backing memory is
/// touched once per full reader round: the cumulative read counter gates the
/// physical transaction so N logical readers cost one memory flush instead
/// of N.
#[derive(Clone, Debug)]
pub struct CompositeFifo {
    id: ChannelId,
    src: ActorId,
    readers: Vec<ReaderState>,
    capacity: usize,
    token_size: usize,
    production_rate: usize,
    mapping: MappingKind,
    reads: usize,
}

impl CompositeFifo {
    pub(crate) fn new(
        id: ChannelId,
        src: ActorId,
        readers: Vec<(ActorId, usize, usize)>,
        capacity: usize,
        token_size: usize,
        production_rate: usize,
        mapping: MappingKind,
    ) -> Self {
        assert!(!readers.is_empty(), "Composite channel {} has no readers", id);
        Self {
            id,
            src,
            readers: readers
                .into_iter()
                .map(|(actor, initial, rate)| ReaderState::new(actor, initial, rate))
                .collect(),
            capacity,
            token_size,
            production_rate,
            mapping,
            reads: 0,
        }
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    pub fn readers(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.readers.iter().map(|r| r.actor)
    }

    fn reader(&self, actor: ActorId) -> &ReaderState {
        self.readers
            .iter()
            .find(|r| r.actor == actor)
            .unwrap_or_else(|| panic!("Channel {}: {} is not a reader", self.id, actor))
    }

    fn reader_mut(&mut self, actor: ActorId) -> &mut ReaderState {
        let id = self.id;
        self.readers
            .iter_mut()
            .find(|r| r.actor == actor)
            .unwrap_or_else(|| panic!("Channel {}: {} is not a reader", id, actor))
    }

    fn can_write(&self) -> bool {
        self.readers
            .iter()
            .all(|r| r.tokens + self.production_rate <= self.capacity)
    }

    fn can_read(&self, actor: ActorId) -> bool {
        let reader = self.reader(actor);
        reader.tokens >= reader.consumption_rate
    }

    /// Whether the next committed read completes a reader round and thus
    /// performs the physical backing-memory transaction.
    fn flush_pending(&self) -> bool {
        (self.reads + 1) % self.readers.len() == 0
    }

    fn take_produced(&mut self, actor: ActorId, count: usize) -> SimTime {
        let id = self.id;
        let reader = self.reader_mut(actor);
        assert!(
            count <= reader.produced_at.len(),
            "Channel {}: reader {} drains {} tokens but only {} were produced",
            id,
            actor,
            count,
            reader.produced_at.len()
        );
        let mut latest: SimTime = 0.0;
        for _ in 0..count {
            latest = latest.max(reader.produced_at.pop_front().unwrap());
        }
        latest
    }

    /// Returns true when this read completed a reader round (flush committed).
    fn commit_read(&mut self, actor: ActorId) -> bool {
        let id = self.id;
        let reader = self.reader_mut(actor);
        assert!(
            reader.tokens >= reader.consumption_rate,
            "Channel {}: reader {} under-runs its token count",
            id,
            actor
        );
        reader.tokens -= reader.consumption_rate;
        self.reads += 1;
        self.reads % self.readers.len() == 0
    }

    fn commit_write(&mut self, completions: &[SimTime]) {
        assert_eq!(
            completions.len(),
            self.production_rate,
            "Channel {}: a firing must produce exactly the production rate",
            self.id
        );
        for reader in self.readers.iter_mut() {
            assert!(
                reader.tokens + self.production_rate <= self.capacity,
                "Channel {}: capacity {} exceeded at reader {}",
                self.id,
                self.capacity,
                reader.actor
            );
            reader.tokens += self.production_rate;
            reader.produced_at.extend(completions.iter().copied());
        }
    }

    fn reset(&mut self) {
        self.reads = 0;
        for reader in self.readers.iter_mut() {
            reader.tokens = reader.initial_tokens;
            reader.produced_at = (0..reader.initial_tokens).map(|_| 0.0).collect();
        }
    }
}

#[derive(Clone, Debug)]
pub enum Channel {
    Simple(Fifo),
    Composite(CompositeFifo),
}

impl Channel {
    pub fn id(&self) -> ChannelId {
        match self {
            Self::Simple(fifo) => fifo.id,
            Self::Composite(fifo) => fifo.id,
        }
    }

    pub fn source(&self) -> ActorId {
        match self {
            Self::Simple(fifo) => fifo.src,
            Self::Composite(fifo) => fifo.src,
        }
    }

    pub fn destinations(&self) -> Vec<ActorId> {
        match self {
            Self::Simple(fifo) => vec![fifo.dst],
            Self::Composite(fifo) => fifo.readers().collect(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }

    pub fn as_simple(&self) -> Option<&Fifo> {
        match self {
            Self::Simple(fifo) => Some(fifo),
            Self::Composite(_) => None,
        }
    }

    pub fn as_composite(&self) -> Option<&CompositeFifo> {
        match self {
            Self::Simple(_) => None,
            Self::Composite(fifo) => Some(fifo),
        }
    }

    pub fn capacity(&self) -> usize {
        match self {
            Self::Simple(fifo) => fifo.capacity,
            Self::Composite(fifo) => fifo.capacity,
        }
    }

    pub fn token_size(&self) -> usize {
        match self {
            Self::Simple(fifo) => fifo.token_size,
            Self::Composite(fifo) => fifo.token_size,
        }
    }

    pub fn production_rate(&self) -> usize {
        match self {
            Self::Simple(fifo) => fifo.production_rate,
            Self::Composite(fifo) => fifo.production_rate,
        }
    }

    pub fn consumption_rate(&self, reader: ActorId) -> usize {
        match self {
            Self::Simple(fifo) => {
                assert_eq!(
                    fifo.dst, reader,
                    "Channel {}: {} is not the destination",
                    fifo.id, reader
                );
                fifo.consumption_rate
            }
            Self::Composite(fifo) => fifo.reader(reader).consumption_rate,
        }
    }

    pub fn tokens(&self, reader: ActorId) -> usize {
        match self {
            Self::Simple(fifo) => fifo.tokens,
            Self::Composite(fifo) => fifo.reader(reader).tokens,
        }
    }

    pub fn mapping(&self) -> MappingKind {
        match self {
            Self::Simple(fifo) => fifo.mapping,
            Self::Composite(fifo) => fifo.mapping,
        }
    }

    pub fn set_mapping(&mut self, mapping: MappingKind) {
        match self {
            Self::Simple(fifo) => fifo.mapping = mapping,
            Self::Composite(fifo) => fifo.mapping = mapping,
        }
    }

    /// Bytes the backing memory holds for the initial-token state. Composite
    /// channels keep a single shared copy regardless of reader count.
    pub fn initial_bytes(&self) -> u64 {
        match self {
            Self::Simple(fifo) => (fifo.initial_tokens * fifo.token_size) as u64,
            Self::Composite(fifo) => {
                let max_initial = fifo
                    .readers
                    .iter()
                    .map(|r| r.initial_tokens)
                    .max()
                    .unwrap_or(0);
                (max_initial * fifo.token_size) as u64
            }
        }
    }

    pub fn can_write(&self) -> bool {
        match self {
            Self::Simple(fifo) => fifo.can_write(),
            Self::Composite(fifo) => fifo.can_write(),
        }
    }

    pub fn can_read(&self, reader: ActorId) -> bool {
        match self {
            Self::Simple(fifo) => {
                assert_eq!(
                    fifo.dst, reader,
                    "Channel {}: {} is not the destination",
                    fifo.id, reader
                );
                fifo.can_read()
            }
            Self::Composite(fifo) => fifo.can_read(reader),
        }
    }

    /// Whether committing one more read performs the physical memory
    /// transaction. Always true for simple channels; for composite channels
    /// only the round-completing read flushes.
    pub fn flush_pending(&self) -> bool {
        match self {
            Self::Simple(_) => true,
            Self::Composite(fifo) => fifo.flush_pending(),
        }
    }

    /// Drain `count` produced-at records for `reader` and return the latest
    /// production completion among them.
    pub fn take_produced(&mut self, reader: ActorId, count: usize) -> SimTime {
        match self {
            Self::Simple(fifo) => fifo.take_produced(count),
            Self::Composite(fifo) => fifo.take_produced(reader, count),
        }
    }

    /// Apply the read-side token delta. Returns true when the backing memory
    /// transaction took place with this read.
    pub fn commit_read(&mut self, reader: ActorId) -> bool {
        match self {
            Self::Simple(fifo) => {
                assert_eq!(
                    fifo.dst, reader,
                    "Channel {}: {} is not the destination",
                    fifo.id, reader
                );
                fifo.commit_read();
                true
            }
            Self::Composite(fifo) => fifo.commit_read(reader),
        }
    }

    /// Apply the write-side token delta; `completions` carries the memory
    /// landing time of each produced token, one entry per token.
    pub fn commit_write(&mut self, completions: &[SimTime]) {
        match self {
            Self::Simple(fifo) => fifo.commit_write(completions),
            Self::Composite(fifo) => fifo.commit_write(completions),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Simple(fifo) => fifo.reset(),
            Self::Composite(fifo) => fifo.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fifo(capacity: usize, initial: usize, prod: usize, cons: usize) -> Channel {
        Channel::Simple(Fifo::new(
            ChannelId(0),
            ActorId(0),
            ActorId(1),
            &ChannelConfiguration {
                capacity,
                initial_tokens: initial,
                production_rate: prod,
                consumption_rate: cons,
                ..Default::default()
            },
        ))
    }

    #[test]
    fn fifo_guards_and_bounds() {
        let mut ch = fifo(2, 0, 1, 1);
        assert!(ch.can_write());
        assert!(!ch.can_read(ActorId(1)));
        ch.commit_write(&[1.0]);
        ch.commit_write(&[2.0]);
        assert!(!ch.can_write());
        assert!(ch.tokens(ActorId(1)) <= ch.capacity());
        assert_eq!(ch.take_produced(ActorId(1), 1), 1.0);
        assert!(ch.commit_read(ActorId(1)));
        assert_eq!(ch.tokens(ActorId(1)), 1);
        ch.reset();
        assert_eq!(ch.tokens(ActorId(1)), 0);
    }

    #[test]
    fn fifo_take_produced_returns_latest() {
        let mut ch = fifo(4, 0, 2, 2);
        ch.commit_write(&[3.0, 7.0]);
        assert_eq!(ch.take_produced(ActorId(1), 2), 7.0);
    }

    #[test]
    fn reset_seeds_initial_tokens_at_time_zero() {
        let mut ch = fifo(4, 3, 1, 1);
        assert_eq!(ch.tokens(ActorId(1)), 3);
        assert_eq!(ch.take_produced(ActorId(1), 3), 0.0);
        assert!(ch.commit_read(ActorId(1)));
        ch.reset();
        assert_eq!(ch.tokens(ActorId(1)), 3);
        assert_eq!(ch.take_produced(ActorId(1), 1), 0.0);
    }

    fn composite() -> Channel {
        Channel::Composite(CompositeFifo::new(
            ChannelId(9),
            ActorId(0),
            vec![
                (ActorId(1), 0, 1),
                (ActorId(2), 0, 1),
                (ActorId(3), 0, 1),
            ],
            4,
            4,
            1,
            MappingKind::Global,
        ))
    }

    #[test]
    fn composite_write_broadcasts_atomically() {
        let mut ch = composite();
        ch.commit_write(&[5.0]);
        for reader in [ActorId(1), ActorId(2), ActorId(3)].iter() {
            assert_eq!(ch.tokens(*reader), 1);
        }
    }

    #[test]
    fn composite_flushes_once_per_reader_round() {
        let mut ch = composite();
        for _ in 0..3 {
            ch.commit_write(&[1.0]);
        }
        let readers = [ActorId(1), ActorId(2), ActorId(3)];
        let mut flushed_at = vec![];
        for nth in 1..=9 {
            let reader = readers[(nth - 1) % 3];
            let pending = ch.flush_pending();
            let flushed = ch.commit_read(reader);
            assert_eq!(pending, flushed);
            if flushed {
                flushed_at.push(nth);
            }
        }
        // the 3rd, 6th and 9th cumulative reads flushed, never in between
        assert_eq!(flushed_at, vec![3, 6, 9]);
    }

    #[test]
    fn composite_read_only_drains_own_leg() {
        let mut ch = composite();
        ch.commit_write(&[2.0]);
        ch.commit_read(ActorId(2));
        assert_eq!(ch.tokens(ActorId(1)), 1);
        assert_eq!(ch.tokens(ActorId(2)), 0);
        assert_eq!(ch.tokens(ActorId(3)), 1);
    }

    #[test]
    #[should_panic(expected = "is not a reader")]
    fn composite_rejects_wrong_reader() {
        let ch = composite();
        ch.can_read(ActorId(7));
    }

    #[test]
    #[should_panic(expected = "capacity")]
    fn composite_write_over_capacity_is_fatal() {
        let mut ch = Channel::Composite(CompositeFifo::new(
            ChannelId(9),
            ActorId(0),
            vec![(ActorId(1), 0, 1), (ActorId(2), 0, 1)],
            1,
            4,
            1,
            MappingKind::Global,
        ));
        ch.commit_write(&[1.0]);
        ch.commit_write(&[2.0]);
    }
}
