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

//! Graph analyses and rewrites over the application model: multicast
//! collapsing, cycle/recurrence bounds, and the SDF repetition vector.

mod collapse;
mod cycles;
mod rates;

pub use collapse::collapse_multicasts;
pub use cycles::{recurrence_bound, CycleInfo, CycleReport};
pub use rates::repetition_vector;
