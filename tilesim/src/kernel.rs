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

//! The modulo-scheduling kernel interface.
//!
//! The kernel is computed by an external scheduler; the simulator consumes
//! it as an opaque step→actors assignment over an inclusive steady-state
//! window. Nothing here decides *when* an actor fires — only at which step
//! it becomes a candidate on its bound processor.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::app::{ActorId, Application};
use crate::{Error, Step};

#[derive(Clone, Debug)]
pub struct Kernel {
    steps: BTreeMap<Step, Vec<ActorId>>,
    first: Step,
    last: Step,
}

impl Kernel {
    pub fn new(first: Step, last: Step) -> Self {
        assert!(first <= last, "Kernel window [{}, {}] is inverted", first, last);
        Self {
            steps: BTreeMap::new(),
            first,
            last,
        }
    }

    /// A degenerate kernel: every actor is a candidate at the single step 0.
    pub fn single_step(actors: &[ActorId]) -> Self {
        let mut kernel = Self::new(0, 0);
        for actor in actors.iter() {
            kernel.assign(0, *actor);
        }
        kernel
    }

    pub fn assign(&mut self, step: Step, actor: ActorId) {
        assert!(
            step >= self.first && step <= self.last,
            "Step {} outside the kernel window [{}, {}]",
            step,
            self.first,
            self.last
        );
        self.steps.entry(step).or_insert_with(Vec::new).push(actor);
    }

    pub fn actors_at(&self, step: Step) -> &[ActorId] {
        self.steps.get(&step).map_or(&[], |actors| actors.as_slice())
    }

    /// The inclusive steady-state window.
    pub fn steps(&self) -> RangeInclusive<Step> {
        self.first..=self.last
    }

    pub fn is_empty(&self) -> bool {
        self.steps.values().all(|actors| actors.is_empty())
    }

    /// Check every assigned actor against the application before a run.
    pub fn validate(&self, app: &Application) -> Result<(), Error> {
        for actors in self.steps.values() {
            for actor in actors.iter() {
                if app.get_actor(*actor).is_none() {
                    return Err(Error::UnknownActor(*actor));
                }
            }
        }
        Ok(())
    }
}
