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

use std::fmt;

use crate::app::{ActorId, ChannelId};
use crate::hw::{MemoryId, ProcessorId, TileId};

#[derive(Debug, PartialEq)]
pub enum Error {
    UnknownActor(ActorId),
    UnknownChannel(ChannelId),
    UnknownProcessor(ProcessorId),
    UnknownTile(TileId),
    UnknownMemory(MemoryId),
    UnboundActor(ActorId),
    UnboundChannel(ChannelId),
    InvalidBinding,
    InvalidMapping(ChannelId),
    InvalidKernel,
    InconsistentRates(ChannelId),
    MemoryRelocation { channel: ChannelId, attempts: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnboundActor(a) => {
                write!(f, "ERROR: actor {} has no processor/tile binding", a)
            }
            Self::UnboundChannel(c) => {
                write!(f, "ERROR: channel {} has no memory binding", c)
            }
            Self::InconsistentRates(c) => {
                write!(f, "ERROR: no repetition vector; channel {} rates do not balance", c)
            }
            Self::MemoryRelocation { channel, attempts } => {
                write!(
                    f,
                    "ERROR: no memory can host channel {} after {} relocations",
                    channel, attempts
                )
            }
            _ => write!(f, "{:?}", self),
        }
    }
}

// Implemented so that `anyhow::Result` accepts our errors in the
// application drivers.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
