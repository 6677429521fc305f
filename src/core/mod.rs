// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Core emulation components
//!
//! This module contains all pipeline components:
//! - Ring queue (bus-write ingestion with wake coalescing)
//! - CmdFifo (in-memory DMA command stream with out-of-order healing)
//! - Dispatcher (single consumer thread, register files, 2D engine)
//! - Render worker pool (parity-split scanline rasterization)
//! - Swap coordinator (vsync-tied buffer swaps, status synthesis)
//! - Texture cache
//! - SLI bridge (two-board scanline interleave)
//! - Device facade

pub mod cmdfifo;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod queue;
pub mod render;
pub mod sli;
pub mod swap;
pub mod texture;

// Re-export commonly used types
pub use config::DeviceConfig;
pub use device::Device;
pub use error::{EmulatorError, PipelineError, Result};
pub use memory::DeviceMemory;
pub use queue::{CommandEntry, EntryKind, RingQueue};
pub use sli::SliBridge;
