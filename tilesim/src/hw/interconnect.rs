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

//! Bandwidth-divided interconnect timing.
//!
//! Crossbars (intra-tile) and the NoC (inter-tile) share one model: K
//! parallel channels splitting a total bandwidth B, each channel serving
//! B/K. A transfer picks the channel with the fewest committed transfers,
//! then serializes behind that channel's completion watermark. Channels are
//! independent of each other.
//!
//! Bandwidth is in GB/s (decimal) and time in nanoseconds, so a transfer of
//! `bytes` over one channel lasts `bytes / (B/K)` ns.

use std::fmt;

use crate::SimTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterconnectId(pub(crate) usize);

impl InterconnectId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for InterconnectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterconnectKind {
    Crossbar,
    NetworkOnChip,
}

/// A transfer committed onto one interconnect channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CommittedTransfer {
    pub start: SimTime,
    pub due: SimTime,
    pub bytes: u64,
}

/// The timing outcome of routing a transfer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Assignment {
    pub channel: usize,
    pub start: SimTime,
    pub due: SimTime,
}

#[derive(Clone, Debug, Default)]
struct InterconnectChannel {
    busy_until: SimTime,
    transfers: Vec<CommittedTransfer>,
}

#[derive(Clone, Debug)]
pub struct Interconnect {
    id: InterconnectId,
    name: String,
    kind: InterconnectKind,
    /// total bandwidth in GB/s, split evenly over the channels
    bandwidth: f64,
    channels: Vec<InterconnectChannel>,
}

impl Interconnect {
    pub(crate) fn new(
        id: InterconnectId,
        name: &str,
        kind: InterconnectKind,
        channels: usize,
        bandwidth: f64,
    ) -> Self {
        assert!(channels > 0, "Interconnect {} needs at least one channel", id);
        assert!(
            bandwidth > 0.0,
            "Interconnect {} needs positive bandwidth",
            id
        );
        Self {
            id,
            name: String::from(name),
            kind,
            bandwidth,
            channels: vec![InterconnectChannel::default(); channels],
        }
    }

    pub fn id(&self) -> InterconnectId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn kind(&self) -> InterconnectKind {
        self.kind
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_bandwidth(&self) -> f64 {
        self.bandwidth / self.channels.len() as f64
    }

    /// Greedy load balancing: the channel with the fewest committed
    /// transfers wins; ties go to the lowest index. The pick is not
    /// load-aware — queue length, not queued bytes.
    fn pick_channel(&self) -> usize {
        self.channels
            .iter()
            .enumerate()
            .min_by_key(|(_, ch)| ch.transfers.len())
            .map(|(idx, _)| idx)
            .unwrap()
    }

    /// Route a transfer of `bytes`, no earlier than `requested`. The
    /// selected channel serializes: the transfer starts at the later of the
    /// request and the channel's completion watermark.
    pub fn assign(&mut self, requested: SimTime, bytes: u64) -> Assignment {
        let duration = bytes as f64 / self.channel_bandwidth();
        let idx = self.pick_channel();
        let channel = &mut self.channels[idx];
        let start = if requested > channel.busy_until {
            requested
        } else {
            channel.busy_until
        };
        let due = start + duration;
        channel.busy_until = due;
        channel.transfers.push(CommittedTransfer { start, due, bytes });
        log::trace!(
            "{}: {}B on channel {} [{} .. {}]",
            self.id,
            bytes,
            idx,
            start,
            due
        );
        Assignment {
            channel: idx,
            start,
            due,
        }
    }

    pub fn transfers(&self, channel: usize) -> &[CommittedTransfer] {
        &self.channels[channel].transfers
    }

    /// Accumulated busy time per channel.
    pub fn busy_time(&self) -> Vec<SimTime> {
        self.channels
            .iter()
            .map(|ch| ch.transfers.iter().map(|t| t.due - t.start).sum())
            .collect()
    }

    /// Mean busy fraction across channels over `[0, horizon]`.
    pub fn utilization(&self, horizon: SimTime) -> f64 {
        if horizon <= 0.0 {
            return 0.0;
        }
        let busy: SimTime = self.busy_time().iter().sum();
        busy / (self.channels.len() as f64 * horizon)
    }

    pub fn reset(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.busy_until = 0.0;
            channel.transfers.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noc(channels: usize, bandwidth: f64) -> Interconnect {
        Interconnect::new(
            InterconnectId(0),
            "noc",
            InterconnectKind::NetworkOnChip,
            channels,
            bandwidth,
        )
    }

    #[test]
    fn picks_channel_with_fewest_transfers() {
        let mut noc = noc(3, 3.0);
        // preload queues to sizes [2, 0, 1]
        noc.channels[0].transfers = vec![
            CommittedTransfer { start: 0.0, due: 1.0, bytes: 1 },
            CommittedTransfer { start: 1.0, due: 2.0, bytes: 1 },
        ];
        noc.channels[2].transfers = vec![CommittedTransfer { start: 0.0, due: 1.0, bytes: 1 }];
        let assignment = noc.assign(0.0, 4);
        assert_eq!(assignment.channel, 1);
    }

    #[test]
    fn duration_is_linear_in_bytes() {
        let mut noc = noc(1, 2.0);
        let a = noc.assign(0.0, 64);
        let b = noc.assign(a.due, 128);
        assert_eq!(a.due - a.start, 32.0);
        assert_eq!(b.due - b.start, 64.0);
    }

    #[test]
    fn duration_is_inverse_in_channel_bandwidth() {
        // same total bandwidth, twice the channels: each channel is half as fast
        let mut narrow = noc(1, 4.0);
        let mut wide = noc(2, 4.0);
        let a = narrow.assign(0.0, 64);
        let b = wide.assign(0.0, 64);
        assert_eq!(b.due - b.start, 2.0 * (a.due - a.start));
    }

    #[test]
    fn one_channel_never_overlaps_transfers() {
        let mut noc = noc(1, 1.0);
        let a = noc.assign(0.0, 10);
        let b = noc.assign(5.0, 10);
        assert_eq!(b.start, a.due);
        let transfers = noc.transfers(0);
        for pair in transfers.windows(2) {
            assert!(pair[1].start >= pair[0].due);
        }
    }

    #[test]
    fn channels_are_independent() {
        let mut noc = noc(2, 2.0);
        let a = noc.assign(0.0, 100);
        let b = noc.assign(0.0, 100);
        assert_ne!(a.channel, b.channel);
        assert_eq!(a.start, 0.0);
        assert_eq!(b.start, 0.0);
    }

    #[test]
    fn busy_time_accumulates_per_channel() {
        let mut noc = noc(2, 2.0);
        noc.assign(0.0, 64); // 64 ns on channel 0
        noc.assign(0.0, 32); // 32 ns on channel 1
        assert_eq!(noc.busy_time(), vec![64.0, 32.0]);
        assert_eq!(noc.utilization(96.0), 0.5);
    }
}
