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

//! Scanline-interleave (SLI) board pairing
//!
//! Two boards act as one logical device: board 0 renders even scanlines,
//! board 1 odd ones. Every write is forwarded to both boards (each snoops
//! the full command stream and rasterizes only its own rows), so their
//! register files never diverge. Reads aggregate: the pair is only as free
//! as its fuller queue and as idle as its busier half.

use super::config::DeviceConfig;
use super::device::Device;
use super::error::Result;


/// A pair of boards in scanline interleave
pub struct SliBridge {
    /// Board 0 owns even scanlines, board 1 odd
    boards: [Device; 2],
}

impl SliBridge {
    /// Build both boards from one shared configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        log::info!("sli pair up");
        Ok(Self {
            boards: [
                Device::with_parity(config.clone(), Some(0))?,
                Device::with_parity(config, Some(1))?,
            ],
        })
    }

    /// The board driving the shared display timing
    pub fn primary(&self) -> &Device {
        &self.boards[0]
    }

    pub fn write_register(&self, index: u32, value: u32) {
        for board in &self.boards {
            board.write_register(index, value);
        }
    }

    pub fn write_register_2d(&self, slot: u32, value: u32) {
        for board in &self.boards {
            board.write_register_2d(slot, value);
        }
    }

    pub fn write_fb_u8(&self, addr: u32, value: u8) {
        for board in &self.boards {
            board.write_fb_u8(addr, value);
        }
    }

    pub fn write_fb_u16(&self, addr: u32, value: u16) {
        for board in &self.boards {
            board.write_fb_u16(addr, value);
        }
    }

    pub fn write_fb_u32(&self, addr: u32, value: u32) {
        for board in &self.boards {
            board.write_fb_u32(addr, value);
        }
    }

    pub fn write_tex_u32(&self, addr: u32, value: u32) {
        for board in &self.boards {
            board.write_tex_u32(addr, value);
        }
    }

    /// Aggregated status word
    ///
    /// Free space is the minimum of the pair, busy the OR, the pending-swap
    /// count the maximum; the retrace phase comes from the primary.
    pub fn read_status(&self) -> u32 {
        let s0 = self.boards[0].read_status();
        let s1 = self.boards[1].read_status();

        let free = (s0 & 0x3F).min(s1 & 0x3F);
        let vblank = s0 & (1 << 6);
        let busy = (s0 | s1) & (1 << 7);
        let pending = ((s0 >> 28) & 7).max((s1 >> 28) & 7) << 28;
        free | vblank | busy | pending
    }

    /// Retrace callback, delivered to both boards in lockstep
    pub fn scanline_tick(&self) {
        for board in &self.boards {
            board.scanline_tick();
        }
    }

    /// Flush both pipelines to quiescence
    pub fn flush(&self) {
        for board in &self.boards {
            board.flush();
        }
    }

    /// Interleave the owned rows of both display buffers into one RGB24
    /// frame for the external scanout
    pub fn combined_framebuffer_rgb24(&self) -> Vec<u8> {
        let config = self.boards[0].config();
        let row_bytes = config.width as usize * 3;

        let frames = [
            self.boards[0].framebuffer_rgb24(),
            self.boards[1].framebuffer_rgb24(),
        ];

        let mut out = Vec::with_capacity(row_bytes * config.height as usize);
        for y in 0..config.height as usize {
            let row = &frames[y % 2][y * row_bytes..(y + 1) * row_bytes];
            out.extend_from_slice(row);
        }
        out
    }
}
