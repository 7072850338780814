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

//! The application model: an id-indexed graph of actors and rate-typed
//! channels.
//!
//! Actors and channels live in arenas keyed by integer ids and reference
//! each other only through those ids, so cloning an `Application` for a new
//! design point can never alias state between points. The id counters are
//! owned by the `Application` itself and threaded through the `add_*`
//! constructors.

use itertools::Itertools;
use std::collections::HashMap;
use std::fmt;

use crate::{Error, SimTime};

mod channel;
pub use channel::{Channel, ChannelConfiguration, ChannelId, CompositeFifo, Fifo, MappingKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub(crate) usize);

impl ActorId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorKind {
    Plain,
    /// A pure fan-out node; candidates for `analysis::collapse` when the
    /// mergeable flag is set.
    Multicast,
    /// The read half of a decomposed communication task; fires with
    /// `skip_writes`.
    CommRead,
    /// The write half of a decomposed communication task; fires with
    /// `skip_reads`.
    CommWrite,
}

/// Construction-time parameters of an actor.
#[derive(Clone, Copy, Debug)]
pub struct ActorProperties {
    pub kind: ActorKind,
    pub priority: usize,
    /// per-firing latency, in the simulation time unit (ns)
    pub execution_time: SimTime,
    pub mergeable: bool,
}

impl Default for ActorProperties {
    fn default() -> Self {
        Self {
            kind: ActorKind::Plain,
            priority: 0,
            execution_time: 1.0,
            mergeable: false,
        }
    }
}

/// A computation node of the application graph.
///
/// Channel references are ordered: the scheduler consumes inputs and
/// produces outputs in declaration order.
#[derive(Clone, Debug)]
pub struct Actor {
    id: ActorId,
    name: String,
    priority: usize,
    kind: ActorKind,
    inputs: Vec<ChannelId>,
    outputs: Vec<ChannelId>,
    mergeable: bool,
    execution_time: SimTime,
}

impl Actor {
    fn new(id: ActorId, name: &str, props: &ActorProperties) -> Self {
        Self {
            id,
            name: String::from(name),
            priority: props.priority,
            kind: props.kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            mergeable: props.mergeable,
            execution_time: props.execution_time,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    pub fn priority(&self) -> usize {
        self.priority
    }

    pub fn execution_time(&self) -> SimTime {
        self.execution_time
    }

    pub fn set_execution_time(&mut self, execution_time: SimTime) {
        self.execution_time = execution_time;
    }

    pub fn inputs(&self) -> &[ChannelId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ChannelId] {
        &self.outputs
    }

    pub fn is_mergeable_multicast(&self) -> bool {
        self.mergeable && self.kind == ActorKind::Multicast
    }

    pub(crate) fn replace_input(&mut self, from: ChannelId, to: ChannelId) {
        for ch in self.inputs.iter_mut() {
            if *ch == from {
                *ch = to;
            }
        }
    }

    pub(crate) fn replace_output(&mut self, from: ChannelId, to: ChannelId) {
        for ch in self.outputs.iter_mut() {
            if *ch == from {
                *ch = to;
            }
        }
    }
}

/// The id-indexed application graph. The only aggregate whose identity
/// persists across a simulation run; design points clone it wholesale.
#[derive(Clone, Debug)]
pub struct Application {
    name: String,
    actors: HashMap<ActorId, Actor>,
    channels: HashMap<ChannelId, Channel>,
    next_actor: usize,
    next_channel: usize,
}

impl Application {
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            actors: HashMap::new(),
            channels: HashMap::new(),
            next_actor: 0,
            next_channel: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn add_actor(&mut self, name: &str, props: &ActorProperties) -> ActorId {
        let id = ActorId(self.next_actor);
        self.next_actor += 1;
        self.actors.insert(id, Actor::new(id, name, props));
        id
    }

    /// Connect `src` to `dst`. The channel is appended to the source's
    /// output list and the destination's input list, in call order.
    pub fn add_channel(
        &mut self,
        src: ActorId,
        dst: ActorId,
        config: &ChannelConfiguration,
    ) -> Result<ChannelId, Error> {
        if !self.actors.contains_key(&src) {
            return Err(Error::UnknownActor(src));
        }
        if !self.actors.contains_key(&dst) {
            return Err(Error::UnknownActor(dst));
        }
        let id = ChannelId(self.next_channel);
        self.next_channel += 1;
        self.channels
            .insert(id, Channel::Simple(Fifo::new(id, src, dst, config)));
        self.actors.get_mut(&src).unwrap().outputs.push(id);
        self.actors.get_mut(&dst).unwrap().inputs.push(id);
        Ok(id)
    }

    /// Insert a composite channel. Wiring up the endpoint actors is the
    /// caller's job (see `analysis::collapse`).
    pub(crate) fn add_composite_channel(
        &mut self,
        src: ActorId,
        readers: Vec<(ActorId, usize, usize)>,
        capacity: usize,
        token_size: usize,
        production_rate: usize,
        mapping: MappingKind,
    ) -> ChannelId {
        let id = ChannelId(self.next_channel);
        self.next_channel += 1;
        self.channels.insert(
            id,
            Channel::Composite(CompositeFifo::new(
                id,
                src,
                readers,
                capacity,
                token_size,
                production_rate,
                mapping,
            )),
        );
        id
    }

    pub(crate) fn remove_actor(&mut self, id: ActorId) -> Option<Actor> {
        self.actors.remove(&id)
    }

    pub(crate) fn remove_channel(&mut self, id: ChannelId) -> Option<Channel> {
        self.channels.remove(&id)
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn get_actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn actor(&self, id: ActorId) -> &Actor {
        self.actors
            .get(&id)
            .unwrap_or_else(|| panic!("No such actor {}", id))
    }

    pub fn actor_mut(&mut self, id: ActorId) -> &mut Actor {
        self.actors
            .get_mut(&id)
            .unwrap_or_else(|| panic!("No such actor {}", id))
    }

    pub fn get_channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        self.channels
            .get(&id)
            .unwrap_or_else(|| panic!("No such channel {}", id))
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> &mut Channel {
        self.channels
            .get_mut(&id)
            .unwrap_or_else(|| panic!("No such channel {}", id))
    }

    /// Actor ids in ascending order. The arenas are hash maps; every
    /// iteration with observable side effects must go through the sorted
    /// views to keep runs deterministic.
    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.actors.keys().copied().sorted().collect()
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.keys().copied().sorted().collect()
    }

    /// The all-guards-true firing rule: every output channel can accept a
    /// full production and every input channel can supply a full
    /// consumption. The split flags drop one side of the check for
    /// decomposed communication tasks.
    pub fn enabled(&self, actor_id: ActorId, skip_reads: bool, skip_writes: bool) -> bool {
        let actor = self.actor(actor_id);
        if !skip_writes {
            for ch in actor.outputs.iter() {
                if !self.channel(*ch).can_write() {
                    log::trace!("{} blocked: {} cannot accept a production", actor_id, ch);
                    return false;
                }
            }
        }
        if !skip_reads {
            for ch in actor.inputs.iter() {
                if !self.channel(*ch).can_read(actor_id) {
                    log::trace!("{} blocked: {} cannot supply a consumption", actor_id, ch);
                    return false;
                }
            }
        }
        true
    }

    /// Reset every channel to its initial-token state, reseeding the
    /// produced-at queues with zero-time records.
    pub fn reset_channels(&mut self) {
        for ch in self.channels.values_mut() {
            ch.reset();
        }
    }

    /// Check referential integrity of the arenas. Entry point for
    /// externally assembled graphs; the simulator calls this before a run
    /// so that dangling ids surface as errors instead of panics mid-run.
    pub fn validate(&self) -> Result<(), Error> {
        for (id, ch) in self.channels.iter() {
            if !self.actors.contains_key(&ch.source()) {
                return Err(Error::UnknownActor(ch.source()));
            }
            for dst in ch.destinations() {
                if !self.actors.contains_key(&dst) {
                    return Err(Error::UnknownActor(dst));
                }
            }
            debug_assert_eq!(*id, ch.id());
        }
        for actor in self.actors.values() {
            for ch in actor.inputs.iter().chain(actor.outputs.iter()) {
                if !self.channels.contains_key(ch) {
                    return Err(Error::UnknownChannel(*ch));
                }
            }
        }
        Ok(())
    }

    pub fn to_graphviz(&self) -> String {
        use petgraph::dot::{Config, Dot};
        use petgraph::prelude::*;

        let mut graph: Graph<String, String> = Graph::new();
        let mut nodes = HashMap::new();
        for id in self.actor_ids() {
            let label = format!("{} ({})", self.actor(id).name(), id);
            nodes.insert(id, graph.add_node(label));
        }
        for id in self.channel_ids() {
            let ch = self.channel(id);
            for dst in ch.destinations() {
                graph.add_edge(
                    nodes[&ch.source()],
                    nodes[&dst],
                    format!("{}", id),
                );
            }
        }
        format!(
            "{:?}",
            Dot::with_config(&graph, &[Config::GraphContentOnly])
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (Application, ActorId, ActorId, ChannelId) {
        let mut app = Application::new("chain");
        let src = app.add_actor("src", &ActorProperties::default());
        let dst = app.add_actor("dst", &ActorProperties::default());
        let ch = app
            .add_channel(src, dst, &ChannelConfiguration::default())
            .unwrap();
        (app, src, dst, ch)
    }

    #[test]
    fn add_channel_wires_endpoint_lists() {
        let (app, src, dst, ch) = chain();
        assert_eq!(app.actor(src).outputs(), &[ch]);
        assert_eq!(app.actor(dst).inputs(), &[ch]);
        assert_eq!(app.channel(ch).source(), src);
        assert_eq!(app.channel(ch).destinations(), vec![dst]);
    }

    #[test]
    fn add_channel_rejects_unknown_actor() {
        let (mut app, src, _, _) = chain();
        let err = app
            .add_channel(src, ActorId(99), &ChannelConfiguration::default())
            .unwrap_err();
        assert_eq!(err, Error::UnknownActor(ActorId(99)));
    }

    #[test]
    fn enabled_is_all_guards() {
        let (mut app, src, dst, ch) = chain();
        // empty capacity-1 channel: src may fire, dst may not
        assert!(app.enabled(src, false, false));
        assert!(!app.enabled(dst, false, false));
        app.channel_mut(ch).commit_write(&[1.0]);
        // full channel: roles swap
        assert!(!app.enabled(src, false, false));
        assert!(app.enabled(dst, false, false));
        // the split variants check only one side
        assert!(app.enabled(src, false, true));
        assert!(app.enabled(dst, true, false));
    }

    #[test]
    fn tokens_stay_within_bounds_across_fires_and_reset() {
        let (mut app, _, dst, ch) = chain();
        for _ in 0..5 {
            app.channel_mut(ch).commit_write(&[1.0]);
            let tokens = app.channel(ch).tokens(dst);
            assert!(tokens <= app.channel(ch).capacity());
            app.channel_mut(ch).take_produced(dst, 1);
            app.channel_mut(ch).commit_read(dst);
        }
        app.reset_channels();
        assert_eq!(app.channel(ch).tokens(dst), 0);
    }

    #[test]
    fn validate_catches_dangling_ids() {
        let (mut app, _, _, ch) = chain();
        assert!(app.validate().is_ok());
        app.remove_channel(ch);
        assert_eq!(app.validate(), Err(Error::UnknownChannel(ch)));
    }

    #[test]
    fn graphviz_names_every_actor() {
        let (app, _, _, _) = chain();
        let dot = app.to_graphviz();
        assert!(dot.contains("src (a0)"));
        assert!(dot.contains("dst (a1)"));
    }
}
