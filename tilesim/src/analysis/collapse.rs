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

//! Multicast collapsing.
//!
//! A mergeable multicast actor is a pure fan-out: one input channel from
//! the writer, one output channel per reader. The rewrite replaces the
//! actor and its M+1 channels with a single composite channel, so the
//! broadcast costs one memory transaction per reader round instead of M
//! point-to-point copies. Aggregate token flow and per-edge rates are
//! unchanged; only the channel count and the memory traffic shrink.

use crate::app::{Application, ChannelId};
use crate::Error;

/// Collapse every mergeable multicast actor in `app`, destructively.
/// Returns the ids of the composite channels created. Must run before the
/// first channel reset: the rewrite does not migrate run state.
pub fn collapse_multicasts(app: &mut Application) -> Result<Vec<ChannelId>, Error> {
    let candidates: Vec<_> = app
        .actor_ids()
        .into_iter()
        .filter(|id| app.actor(*id).is_mergeable_multicast())
        .collect();
    let mut created = Vec::with_capacity(candidates.len());
    for mcast in candidates {
        let inputs = app.actor(mcast).inputs().to_vec();
        let outputs = app.actor(mcast).outputs().to_vec();
        assert_eq!(
            inputs.len(),
            1,
            "Mergeable multicast {} must have exactly one input channel",
            mcast
        );
        assert!(
            !outputs.is_empty(),
            "Mergeable multicast {} has no readers",
            mcast
        );
        let in_ch = inputs[0];
        let (writer, production_rate, token_size, writer_capacity, mapping) = {
            let fifo = app
                .channel(in_ch)
                .as_simple()
                .unwrap_or_else(|| panic!("{} is already composite", in_ch));
            (
                fifo.src(),
                fifo.production_rate(),
                fifo.token_size(),
                fifo.capacity(),
                app.channel(in_ch).mapping(),
            )
        };

        let mut readers = Vec::with_capacity(outputs.len());
        let mut max_reader_capacity = 0;
        for out_ch in outputs.iter() {
            let fifo = app
                .channel(*out_ch)
                .as_simple()
                .unwrap_or_else(|| panic!("{} is already composite", out_ch));
            assert_eq!(
                fifo.production_rate(),
                production_rate,
                "Multicast {} does not preserve the production rate on {}",
                mcast,
                out_ch
            );
            readers.push((fifo.dst(), fifo.initial_tokens(), fifo.consumption_rate()));
            max_reader_capacity = max_reader_capacity.max(fifo.capacity());
        }

        let composite = app.add_composite_channel(
            writer,
            readers.clone(),
            writer_capacity + max_reader_capacity,
            token_size,
            production_rate,
            mapping,
        );

        // rewire the writer and every reader onto the composite channel
        app.actor_mut(writer).replace_output(in_ch, composite);
        for (reader, out_ch) in readers.iter().map(|r| r.0).zip(outputs.iter()) {
            app.actor_mut(reader).replace_input(*out_ch, composite);
        }

        app.remove_channel(in_ch);
        for out_ch in outputs.iter() {
            app.remove_channel(*out_ch);
        }
        app.remove_actor(mcast);
        log::debug!(
            "collapsed {} into {} ({} readers)",
            mcast,
            composite,
            readers.len()
        );
        created.push(composite);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{ActorId, ActorKind, ActorProperties, ChannelConfiguration};

    /// writer -> mcast -> {r0, r1, r2}
    fn multicast_app() -> (Application, ActorId, Vec<ActorId>) {
        let mut app = Application::new("mcast");
        let writer = app.add_actor("writer", &ActorProperties::default());
        let mcast = app.add_actor(
            "mcast",
            &ActorProperties {
                kind: ActorKind::Multicast,
                mergeable: true,
                ..Default::default()
            },
        );
        let readers: Vec<ActorId> = (0..3)
            .map(|i| app.add_actor(&format!("r{}", i), &ActorProperties::default()))
            .collect();
        app.add_channel(
            writer,
            mcast,
            &ChannelConfiguration { capacity: 2, ..Default::default() },
        )
        .unwrap();
        for reader in readers.iter() {
            app.add_channel(
                mcast,
                *reader,
                &ChannelConfiguration { capacity: 3, ..Default::default() },
            )
            .unwrap();
        }
        (app, writer, readers)
    }

    #[test]
    fn collapse_shrinks_the_graph_and_rewires_endpoints() {
        let (mut app, writer, readers) = multicast_app();
        let actors_before = app.actor_count();
        let channels_before = app.channel_count();
        let created = collapse_multicasts(&mut app).unwrap();
        assert_eq!(created.len(), 1);
        let composite = created[0];
        // N-1 actors, E-(M+1)+1 channels
        assert_eq!(app.actor_count(), actors_before - 1);
        assert_eq!(app.channel_count(), channels_before - 4 + 1);
        assert_eq!(app.actor(writer).outputs(), &[composite]);
        for reader in readers.iter() {
            assert_eq!(app.actor(*reader).inputs(), &[composite]);
        }
        let ch = app.channel(composite);
        assert!(ch.is_composite());
        assert_eq!(ch.source(), writer);
        assert_eq!(ch.destinations(), readers);
        // writer capacity + max reader capacity
        assert_eq!(ch.capacity(), 2 + 3);
        assert!(app.validate().is_ok());
    }

    #[test]
    fn collapse_ignores_plain_actors() {
        let mut app = Application::new("plain");
        let a = app.add_actor("a", &ActorProperties::default());
        let b = app.add_actor("b", &ActorProperties::default());
        app.add_channel(a, b, &ChannelConfiguration::default()).unwrap();
        let created = collapse_multicasts(&mut app).unwrap();
        assert!(created.is_empty());
        assert_eq!(app.actor_count(), 2);
        assert_eq!(app.channel_count(), 1);
    }
}
