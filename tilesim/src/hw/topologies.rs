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

//! Canned architecture builders.

use crate::hw::{Architecture, ArchitectureConfig, TileConfiguration};

/// Build an architecture from a parsed configuration.
pub fn from_config(name: &str, config: &ArchitectureConfig) -> Architecture {
    let mut arch = Architecture::new(name, &config.global_memory, &config.noc);
    for tile in config.tiles.iter() {
        arch.add_tile(tile);
    }
    log::debug!(
        "built architecture {}: {} tiles, {} processors",
        name,
        arch.tile_count(),
        arch.processor_count()
    );
    arch
}

/// `tiles` identical tiles of `processors_per_tile` cores each, default
/// memory and interconnect provisioning.
pub fn homogeneous(name: &str, tiles: usize, processors_per_tile: usize) -> Architecture {
    let config = ArchitectureConfig {
        tiles: vec![
            TileConfiguration {
                processors: processors_per_tile,
                ..Default::default()
            };
            tiles
        ],
        ..Default::default()
    };
    from_config(name, &config)
}
