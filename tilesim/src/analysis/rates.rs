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

//! SDF balance equations.
//!
//! For every channel, `reps[src] * production_rate == reps[dst] *
//! consumption_rate` must admit a positive integer solution; the smallest
//! one is the repetition vector. A graph without a solution cannot run in
//! bounded memory and is rejected before any simulation.

use num::integer::{gcd, lcm};
use std::collections::BTreeMap;

use crate::app::{ActorId, Application, ChannelId};
use crate::Error;

/// A reduced positive fraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Ratio {
    num: usize,
    den: usize,
}

impl Ratio {
    fn one() -> Self {
        Self { num: 1, den: 1 }
    }

    fn scaled(&self, num: usize, den: usize) -> Self {
        let num = self.num * num;
        let den = self.den * den;
        let common = gcd(num, den);
        Self {
            num: num / common,
            den: den / common,
        }
    }
}

/// One rate-typed edge of the balance system; composite channels
/// contribute one edge per reader leg.
struct Leg {
    channel: ChannelId,
    src: ActorId,
    dst: ActorId,
    production: usize,
    consumption: usize,
}

fn legs(app: &Application) -> Vec<Leg> {
    let mut legs = Vec::new();
    for ch_id in app.channel_ids() {
        let ch = app.channel(ch_id);
        for dst in ch.destinations() {
            legs.push(Leg {
                channel: ch_id,
                src: ch.source(),
                dst,
                production: ch.production_rate(),
                consumption: ch.consumption_rate(dst),
            });
        }
    }
    legs
}

/// Compute the smallest positive repetition vector, or report the channel
/// whose rates cannot balance.
pub fn repetition_vector(app: &Application) -> Result<BTreeMap<ActorId, usize>, Error> {
    let legs = legs(app);
    let mut reps: BTreeMap<ActorId, usize> = BTreeMap::new();

    // each weak component balances (and minimizes) independently
    for seed in app.actor_ids() {
        if reps.contains_key(&seed) {
            continue;
        }
        let mut ratios: BTreeMap<ActorId, Ratio> = BTreeMap::new();
        ratios.insert(seed, Ratio::one());
        let mut frontier = vec![seed];
        while let Some(actor) = frontier.pop() {
            let here = ratios[&actor];
            for leg in legs.iter() {
                if leg.production == 0 || leg.consumption == 0 {
                    return Err(Error::InconsistentRates(leg.channel));
                }
                let (peer, expected) = if leg.src == actor {
                    // reps[dst] = reps[src] * production / consumption
                    (leg.dst, here.scaled(leg.production, leg.consumption))
                } else if leg.dst == actor {
                    (leg.src, here.scaled(leg.consumption, leg.production))
                } else {
                    continue;
                };
                match ratios.get(&peer) {
                    None => {
                        ratios.insert(peer, expected);
                        frontier.push(peer);
                    }
                    Some(found) if *found != expected => {
                        log::error!(
                            "{}: rates do not balance ({}:{} vs {}:{})",
                            leg.channel,
                            found.num,
                            found.den,
                            expected.num,
                            expected.den
                        );
                        return Err(Error::InconsistentRates(leg.channel));
                    }
                    Some(_) => {}
                }
            }
        }

        // clear the denominators and reduce to the smallest integer vector
        let scale = ratios.values().fold(1, |acc, r| lcm(acc, r.den));
        let mut component: Vec<(ActorId, usize)> = ratios
            .into_iter()
            .map(|(actor, r)| (actor, r.num * (scale / r.den)))
            .collect();
        let common = component.iter().fold(0, |acc, (_, r)| gcd(acc, *r));
        if common > 1 {
            for (_, rep) in component.iter_mut() {
                *rep /= common;
            }
        }
        reps.extend(component);
    }
    Ok(reps)
}
