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

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Default capacity of a tile-local memory, in bytes.
const LOCAL_MEMORY_CAPACITY: u64 = 64 * 1024;

/// Default crossbar provisioning: channel count and total bandwidth (GB/s).
const CROSSBAR_CHANNELS: usize = 4;
const CROSSBAR_BANDWIDTH: f64 = 8.0;

/// Default NoC provisioning.
const NOC_CHANNELS: usize = 8;
const NOC_BANDWIDTH: f64 = 4.0;

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct MemoryConfiguration {
    /// `None` is an unbounded memory.
    pub capacity: Option<u64>,
}

impl Default for MemoryConfiguration {
    fn default() -> Self {
        Self {
            capacity: Some(LOCAL_MEMORY_CAPACITY),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct InterconnectConfiguration {
    pub channels: usize,
    /// total bandwidth in GB/s, split evenly across channels
    pub bandwidth: f64,
}

impl Default for InterconnectConfiguration {
    fn default() -> Self {
        Self {
            channels: CROSSBAR_CHANNELS,
            bandwidth: CROSSBAR_BANDWIDTH,
        }
    }
}

impl InterconnectConfiguration {
    pub fn noc_default() -> Self {
        Self {
            channels: NOC_CHANNELS,
            bandwidth: NOC_BANDWIDTH,
        }
    }
}

/// provides a set of parameters to configure a tile
///
/// constructed programmatically or read from a config file.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct TileConfiguration {
    pub processors: usize,
    pub memory: MemoryConfiguration,
    pub crossbar: InterconnectConfiguration,
}

impl Default for TileConfiguration {
    fn default() -> Self {
        Self {
            processors: 2,
            memory: MemoryConfiguration::default(),
            crossbar: InterconnectConfiguration::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ArchitectureConfig {
    pub tiles: Vec<TileConfiguration>,
    pub global_memory: MemoryConfiguration,
    pub noc: InterconnectConfiguration,
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self {
            tiles: vec![TileConfiguration::default()],
            // the global memory backs relocated channels; unbounded
            global_memory: MemoryConfiguration { capacity: None },
            noc: InterconnectConfiguration::noc_default(),
        }
    }
}

impl ArchitectureConfig {
    pub fn from_file(file_name: &str) -> anyhow::Result<Self> {
        let file = File::open(Path::new(file_name))
            .with_context(|| format!("File {} not found", file_name))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader)
            .with_context(|| format!("Malformed architecture config {}", file_name))
    }

    pub fn from_str(config: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(config).context("Malformed architecture config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_yaml_config() {
        let conf_str = "---
tiles:
  - processors: 2
    memory:
      capacity: 1024
    crossbar:
      channels: 4
      bandwidth: 8.0
  - processors: 1
    memory:
      capacity: 2048
    crossbar:
      channels: 2
      bandwidth: 4.0
global_memory:
  capacity: ~
noc:
  channels: 8
  bandwidth: 4.0
";
        let config = ArchitectureConfig::from_str(conf_str).unwrap();
        assert_eq!(config.tiles.len(), 2);
        assert_eq!(config.tiles[0].processors, 2);
        assert_eq!(config.tiles[0].memory.capacity, Some(1024));
        assert_eq!(config.tiles[0].crossbar.channels, 4);
        assert_eq!(config.tiles[1].memory.capacity, Some(2048));
        assert_eq!(config.tiles[1].crossbar.bandwidth, 4.0);
        assert_eq!(config.global_memory.capacity, None);
        assert_eq!(config.noc.channels, 8);
    }

    #[test]
    fn write_yaml_config() {
        let mut config = ArchitectureConfig::default();
        config.tiles.push(TileConfiguration {
            processors: 4,
            ..Default::default()
        });
        let rendered = serde_yaml::to_string(&config).unwrap();
        let parsed = ArchitectureConfig::from_str(&rendered).unwrap();
        assert_eq!(parsed.tiles.len(), 2);
        assert_eq!(parsed.tiles[1].processors, 4);
        assert_eq!(parsed.global_memory.capacity, None);
    }
}
