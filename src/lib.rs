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

//! 3dfx Voodoo-style accelerator command-pipeline emulator core
//!
//! This library models the command pipeline of a late-90s PC 3D accelerator
//! board: a bounded ring queue fed by intercepted bus writes, an in-memory
//! CmdFifo DMA command stream, a dispatcher thread, one or two scanline
//! render workers, and vsync-tied buffer swapping - optionally as a
//! two-board scanline-interleave (SLI) pair.
//!
//! # Example
//!
//! ```
//! use sstrx::core::config::DeviceConfig;
//! use sstrx::core::device::Device;
//!
//! let device = Device::new(DeviceConfig::default()).unwrap();
//! let status = device.read_status();
//! assert_eq!(status & 0x3F, 0x3F); // queue fully free
//! device.flush();
//! ```

pub mod core;
