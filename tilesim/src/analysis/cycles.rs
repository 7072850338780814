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

//! Cycle detection and the recurrence bound.
//!
//! For every actor, a Bellman–Ford-style longest-path relaxation (unit
//! edge weight per channel, rounds bounded by the actor count) finds the
//! longest way back to the actor through its own input channels. Every
//! self-reachable actor yields a cycle, recovered by walking maximum-
//! distance predecessors. The recurrence bound is the longest such cycle
//! divided by its registered-delay count — fixed at one per edge here —
//! and lower-bounds the achievable steady-state period of any mapping.

use itertools::Itertools;
use petgraph::prelude::*;
use std::collections::{BTreeMap, HashMap};

use crate::app::{ActorId, Application};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleInfo {
    /// the actors on the cycle, starting at the analyzed actor
    pub actors: Vec<ActorId>,
    pub length: usize,
    /// registered delays on the cycle; structurally one per edge for now
    // TODO(cascaval): count initial tokens along the cycle instead once
    // delay-aware scheduling needs the tighter bound.
    pub distance: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    pub cycles: Vec<CycleInfo>,
    /// `max over cycles of ceil(length / distance)`; zero when acyclic
    pub recurrence_bound: usize,
}

fn dependency_graph(app: &Application) -> (Graph<ActorId, ()>, BTreeMap<ActorId, NodeIndex>) {
    let mut graph = Graph::new();
    let mut nodes = BTreeMap::new();
    for id in app.actor_ids() {
        nodes.insert(id, graph.add_node(id));
    }
    for ch_id in app.channel_ids() {
        let ch = app.channel(ch_id);
        for dst in ch.destinations() {
            graph.add_edge(nodes[&ch.source()], nodes[&dst], ());
        }
    }
    (graph, nodes)
}

/// Longest-path distances from `source`, never relaxing back into the
/// source itself; rounds are bounded by the node count so cycles elsewhere
/// in the graph cannot diverge.
fn longest_distances(graph: &Graph<ActorId, ()>, source: NodeIndex) -> HashMap<NodeIndex, usize> {
    let mut dist: HashMap<NodeIndex, usize> = HashMap::new();
    dist.insert(source, 0);
    for _round in 0..graph.node_count() {
        let mut changed = false;
        for edge in graph.edge_references() {
            let (u, v) = (edge.source(), edge.target());
            if v == source {
                continue;
            }
            if let Some(du) = dist.get(&u).copied() {
                let candidate = du + 1;
                if dist.get(&v).map_or(true, |dv| candidate > *dv) {
                    dist.insert(v, candidate);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    dist
}

/// Walk back from `source` through maximum-distance predecessors until the
/// distances bottom out at the source again.
fn recover_cycle(
    graph: &Graph<ActorId, ()>,
    source: NodeIndex,
    dist: &HashMap<NodeIndex, usize>,
) -> Option<Vec<NodeIndex>> {
    let entry = graph
        .neighbors_directed(source, Direction::Incoming)
        .filter(|p| dist.contains_key(p))
        .max_by_key(|p| dist[p])?;
    let mut path = vec![source];
    let mut cursor = entry;
    for _guard in 0..graph.node_count() {
        path.push(cursor);
        if dist[&cursor] == 0 {
            break;
        }
        cursor = graph
            .neighbors_directed(cursor, Direction::Incoming)
            .filter(|p| dist.get(p).map_or(false, |d| *d < dist[&cursor]))
            .max_by_key(|p| dist[p])?;
    }
    // the walk ends where it started
    if *path.last().unwrap() == source {
        path.pop();
        Some(path)
    } else {
        None
    }
}

/// Find every dependency cycle and the recurrence bound they imply.
pub fn recurrence_bound(app: &Application) -> CycleReport {
    let (graph, nodes) = dependency_graph(app);
    let mut cycles: Vec<CycleInfo> = Vec::new();
    let mut seen: Vec<Vec<ActorId>> = Vec::new();
    for (actor, node) in nodes.iter() {
        let dist = longest_distances(&graph, *node);
        if let Some(path) = recover_cycle(&graph, *node, &dist) {
            let actors: Vec<ActorId> = path.iter().map(|n| graph[*n]).collect();
            // one cycle may be discovered once per member; dedupe on the
            // sorted member set
            let key: Vec<ActorId> = actors.iter().copied().sorted().collect();
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            log::debug!("cycle of length {} through {}", actors.len(), actor);
            cycles.push(CycleInfo {
                length: actors.len(),
                distance: 1,
                actors,
            });
        }
    }
    let recurrence_bound = cycles
        .iter()
        .map(|c| (c.length + c.distance - 1) / c.distance)
        .max()
        .unwrap_or(0);
    CycleReport {
        cycles,
        recurrence_bound,
    }
}
