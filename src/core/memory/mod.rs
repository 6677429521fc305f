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

//! Shared device memory
//!
//! The board carries two RAM banks: framebuffer RAM (render buffers, depth
//! buffer, and the in-memory CmdFifo window) and texture RAM. Both are
//! shared between the dispatcher thread and the render workers.
//!
//! # Write protocol
//!
//! There is no per-access locking. The quiescence protocol makes all
//! concurrent access disjoint:
//!
//! - The dispatcher is the only writer while no render job is in flight.
//! - During a render job, workers write only to scanlines they own (rows are
//!   statically partitioned by parity), and the dispatcher does not touch
//!   the render target until every worker reports idle.
//!
//! Addresses are masked to the bank size, so out-of-range guest addresses
//! wrap instead of faulting - the modeled hardware has no fault path.

use std::cell::UnsafeCell;

use super::config::{FB_MEM_SIZE, TEX_MEM_SIZE};

#[cfg(test)]
mod tests;

/// Framebuffer RAM address mask
pub const FB_MASK: u32 = (FB_MEM_SIZE - 1) as u32;

/// Texture RAM address mask
pub const TEX_MASK: u32 = (TEX_MEM_SIZE - 1) as u32;

/// The two RAM banks on the board
///
/// All accessors take `&self`; interior mutability with the partition
/// protocol above stands in for per-access locking, the same shape the
/// scanline-renderer thread pools in other emulators use for their shared
/// VRAM.
pub struct DeviceMemory {
    /// Framebuffer RAM (render buffers, aux buffer, CmdFifo window)
    fb: UnsafeCell<Box<[u8]>>,

    /// Texture RAM
    tex: UnsafeCell<Box<[u8]>>,
}

// SAFETY: concurrent writers never overlap; see the module-level protocol.
unsafe impl Sync for DeviceMemory {}

impl DeviceMemory {
    /// Allocate both banks, zero-filled
    pub fn new() -> Self {
        Self {
            fb: UnsafeCell::new(vec![0u8; FB_MEM_SIZE].into_boxed_slice()),
            tex: UnsafeCell::new(vec![0u8; TEX_MEM_SIZE].into_boxed_slice()),
        }
    }

    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    fn fb_bank(&self) -> &mut [u8] {
        // SAFETY: module-level write protocol
        unsafe { &mut *self.fb.get() }
    }

    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    fn tex_bank(&self) -> &mut [u8] {
        // SAFETY: module-level write protocol
        unsafe { &mut *self.tex.get() }
    }

    /// Write a byte to framebuffer RAM
    #[inline(always)]
    pub fn fb_write_u8(&self, addr: u32, value: u8) {
        self.fb_bank()[(addr & FB_MASK) as usize] = value;
    }

    /// Write a 16-bit little-endian value to framebuffer RAM
    ///
    /// Each byte is masked independently, so a write straddling the end of
    /// the bank wraps instead of faulting.
    #[inline(always)]
    pub fn fb_write_u16(&self, addr: u32, value: u16) {
        let bank = self.fb_bank();
        for (i, byte) in value.to_le_bytes().iter().enumerate() {
            bank[((addr + i as u32) & FB_MASK) as usize] = *byte;
        }
    }

    /// Write a 32-bit little-endian value to framebuffer RAM
    #[inline(always)]
    pub fn fb_write_u32(&self, addr: u32, value: u32) {
        let bank = self.fb_bank();
        for (i, byte) in value.to_le_bytes().iter().enumerate() {
            bank[((addr + i as u32) & FB_MASK) as usize] = *byte;
        }
    }

    /// Read a byte from framebuffer RAM
    #[inline(always)]
    pub fn fb_read_u8(&self, addr: u32) -> u8 {
        self.fb_bank()[(addr & FB_MASK) as usize]
    }

    /// Read a 16-bit little-endian value from framebuffer RAM
    #[inline(always)]
    pub fn fb_read_u16(&self, addr: u32) -> u16 {
        let bank = self.fb_bank();
        let b0 = bank[(addr & FB_MASK) as usize];
        let b1 = bank[((addr + 1) & FB_MASK) as usize];
        u16::from_le_bytes([b0, b1])
    }

    /// Read a 32-bit little-endian value from framebuffer RAM
    #[inline(always)]
    pub fn fb_read_u32(&self, addr: u32) -> u32 {
        let bank = self.fb_bank();
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = bank[((addr + i as u32) & FB_MASK) as usize];
        }
        u32::from_le_bytes(bytes)
    }

    /// Write a 32-bit little-endian value to texture RAM
    #[inline(always)]
    pub fn tex_write_u32(&self, addr: u32, value: u32) {
        let bank = self.tex_bank();
        for (i, byte) in value.to_le_bytes().iter().enumerate() {
            bank[((addr + i as u32) & TEX_MASK) as usize] = *byte;
        }
    }

    /// Read a byte from texture RAM
    #[inline(always)]
    pub fn tex_read_u8(&self, addr: u32) -> u8 {
        self.tex_bank()[(addr & TEX_MASK) as usize]
    }

    /// Read a 16-bit little-endian value from texture RAM
    #[inline(always)]
    pub fn tex_read_u16(&self, addr: u32) -> u16 {
        let bank = self.tex_bank();
        let b0 = bank[(addr & TEX_MASK) as usize];
        let b1 = bank[((addr + 1) & TEX_MASK) as usize];
        u16::from_le_bytes([b0, b1])
    }

    /// Copy `len` bytes out of framebuffer RAM starting at `addr`
    ///
    /// Used by the external scanout path and by tests; the copy wraps at the
    /// end of the bank like every other access.
    pub fn fb_copy_out(&self, addr: u32, len: usize) -> Vec<u8> {
        let bank = self.fb_bank();
        (0..len)
            .map(|i| bank[((addr + i as u32) & FB_MASK) as usize])
            .collect()
    }
}

impl Default for DeviceMemory {
    fn default() -> Self {
        Self::new()
    }
}
