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

//! Register files
//!
//! The 3D register file is addressed by word index. Vertex coordinates are
//! signed 12.4 fixed point in the low 16 bits of their registers. The 2D
//! engine is a separate array of 32 word slots; writing the command slot
//! executes the selected 2D operation.

use crate::core::render::{ClipRect, Vertex};

/// 3D register word indices
pub mod reg {
    pub const VERTEX_AX: u32 = 0x00;
    pub const VERTEX_AY: u32 = 0x01;
    pub const VERTEX_BX: u32 = 0x02;
    pub const VERTEX_BY: u32 = 0x03;
    pub const VERTEX_CX: u32 = 0x04;
    pub const VERTEX_CY: u32 = 0x05;
    pub const TRIANGLE_CMD: u32 = 0x06;
    pub const NOP_CMD: u32 = 0x07;
    pub const FASTFILL_CMD: u32 = 0x08;
    pub const SWAPBUFFER_CMD: u32 = 0x09;
    pub const FBZ_MODE: u32 = 0x0A;
    pub const FOG_MODE: u32 = 0x0B;
    pub const FOG_COLOR: u32 = 0x0C;
    pub const ALPHA_MODE: u32 = 0x0D;
    pub const ZA_COLOR: u32 = 0x0E;
    pub const CLIP_LEFT_RIGHT: u32 = 0x0F;
    pub const CLIP_LOW_Y_HIGH_Y: u32 = 0x10;
    pub const COLOR0: u32 = 0x11;
    pub const COLOR1: u32 = 0x12;
    pub const TEX_BASE_ADDR: u32 = 0x13;
    pub const TEX_MODE: u32 = 0x14;
    pub const CMDFIFO_BASE: u32 = 0x15;
    pub const CMDFIFO_END: u32 = 0x16;
    pub const CMDFIFO_RP: u32 = 0x17;
    pub const CMDFIFO_DEPTH: u32 = 0x18;
    pub const CMDFIFO_CTRL: u32 = 0x19;
}

/// 2D register slot indices
pub mod reg2d {
    pub const DST_BASE: usize = 0x02;
    /// Low 14 bits: destination pitch in bytes
    pub const DST_FORMAT: usize = 0x03;
    pub const COLOR_FORE: usize = 0x08;
    /// Width in the low 16 bits, height in the high 16
    pub const DST_SIZE: usize = 0x0C;
    /// X in the low 16 bits, Y in the high 16
    pub const DST_XY: usize = 0x0D;
    /// Writing this slot executes the opcode in its low 4 bits
    pub const COMMAND: usize = 0x1F;
}

/// Number of 3D register words (indices wrap into this range)
pub const REG_COUNT: usize = 0x40;

/// Number of 2D register slots
pub const REG2D_COUNT: usize = 0x20;

/// Decode a signed 12.4 fixed-point coordinate from a register's low 16 bits
pub fn fixed12_4(value: u32) -> f32 {
    (value as u16 as i16) as f32 / 16.0
}

/// The 3D register file, owned by the dispatcher
pub struct RegisterFile {
    values: [u32; REG_COUNT],
}

impl RegisterFile {
    /// Fresh register file with the clip rectangle opened to the full
    /// render buffer (the hardware reset value would be a zero-area clip,
    /// which draws nothing until programmed; opening it is friendlier and
    /// guests that program the clip overwrite it anyway)
    pub fn new(width: u32, height: u32) -> Self {
        let mut values = [0u32; REG_COUNT];
        values[reg::CLIP_LEFT_RIGHT as usize] = width & 0xFFF;
        values[reg::CLIP_LOW_Y_HIGH_Y as usize] = height & 0xFFF;
        Self { values }
    }

    #[inline(always)]
    pub fn read(&self, index: u32) -> u32 {
        self.values[index as usize & (REG_COUNT - 1)]
    }

    #[inline(always)]
    pub fn write(&mut self, index: u32, value: u32) {
        self.values[index as usize & (REG_COUNT - 1)] = value;
    }

    /// The three vertices currently latched in the vertex registers
    pub fn vertices(&self) -> [Vertex; 3] {
        [
            Vertex {
                x: fixed12_4(self.read(reg::VERTEX_AX)),
                y: fixed12_4(self.read(reg::VERTEX_AY)),
            },
            Vertex {
                x: fixed12_4(self.read(reg::VERTEX_BX)),
                y: fixed12_4(self.read(reg::VERTEX_BY)),
            },
            Vertex {
                x: fixed12_4(self.read(reg::VERTEX_CX)),
                y: fixed12_4(self.read(reg::VERTEX_CY)),
            },
        ]
    }

    /// Clip rectangle from the two clip registers
    ///
    /// `clip_left_right` carries left in bits 16-27 and right in bits 0-11;
    /// `clip_low_y_high_y` carries top and bottom the same way.
    pub fn clip_rect(&self) -> ClipRect {
        let lr = self.read(reg::CLIP_LEFT_RIGHT);
        let tb = self.read(reg::CLIP_LOW_Y_HIGH_Y);
        ClipRect {
            left: (lr >> 16) & 0xFFF,
            right: lr & 0xFFF,
            top: (tb >> 16) & 0xFFF,
            bottom: tb & 0xFFF,
        }
    }
}

/// The 2D engine's register array
pub struct Registers2d {
    slots: [u32; REG2D_COUNT],
}

impl Registers2d {
    pub fn new() -> Self {
        Self {
            slots: [0; REG2D_COUNT],
        }
    }

    #[inline(always)]
    pub fn read(&self, slot: usize) -> u32 {
        self.slots[slot & (REG2D_COUNT - 1)]
    }

    #[inline(always)]
    pub fn write(&mut self, slot: usize, value: u32) {
        self.slots[slot & (REG2D_COUNT - 1)] = value;
    }
}

impl Default for Registers2d {
    fn default() -> Self {
        Self::new()
    }
}
