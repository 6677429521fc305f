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

//! Device facade
//!
//! One accelerator board: the write entrypoints the bus interceptor calls,
//! the synchronous status read, the per-scanline retrace callback and the
//! flush/shutdown lifecycle. Construction spawns the dispatcher and the
//! render workers; drop stops and joins them.
//!
//! Writes into the four device windows (3D registers, 2D registers, linear
//! framebuffer, texture download) become ring-queue entries and return
//! immediately. Two exceptions are handled synchronously on the caller's
//! thread: CmdFifo control registers (the window must be armed before the
//! very next framebuffer write can be claimed by it) and framebuffer writes
//! that land inside an enabled CmdFifo window (they feed the out-of-order
//! tracker, not the queue).

use std::sync::Arc;
use std::thread;

use super::config::DeviceConfig;
use super::dispatch::{reg, Dispatcher, PipelineShared};
use super::error::Result;
use super::memory::DeviceMemory;
use super::queue::{CommandEntry, EntryKind};

#[cfg(test)]
mod tests;

/// One emulated accelerator board
pub struct Device {
    shared: Arc<PipelineShared>,
    dispatcher: Option<thread::JoinHandle<()>>,
}

impl Device {
    /// Build a board and spawn its pipeline threads
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        Self::with_parity(config, None)
    }

    /// Build a board owning only scanlines of the given parity (SLI half)
    pub(crate) fn with_parity(config: DeviceConfig, sli_parity: Option<u32>) -> Result<Self> {
        config.validate()?;

        let shared = PipelineShared::new(config, sli_parity);
        let dispatcher = Dispatcher::spawn(Arc::clone(&shared));

        log::info!(
            "device up: {}x{}, {} workers{}",
            shared.config.width,
            shared.config.height,
            shared.config.render_workers,
            match sli_parity {
                Some(p) => format!(", sli parity {p}"),
                None => String::new(),
            }
        );

        Ok(Self {
            shared,
            dispatcher: Some(dispatcher),
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }

    pub fn memory(&self) -> &Arc<DeviceMemory> {
        &self.shared.mem
    }

    pub(crate) fn shared(&self) -> &PipelineShared {
        &self.shared
    }

    /// 3D register write window
    ///
    /// CmdFifo control registers take effect synchronously; everything else
    /// is queued for the dispatcher.
    pub fn write_register(&self, index: u32, value: u32) {
        match index & 0x3F {
            reg::CMDFIFO_BASE => self.shared.cmdfifo.set_base(value),
            reg::CMDFIFO_END => self.shared.cmdfifo.set_end(value),
            reg::CMDFIFO_RP => self.shared.cmdfifo.set_read_pointer(value),
            reg::CMDFIFO_DEPTH => self.shared.cmdfifo.set_depth(value),
            reg::CMDFIFO_CTRL => self.shared.cmdfifo.set_enabled(value & 1 != 0),
            _ => self.shared.queue.enqueue(CommandEntry {
                kind: EntryKind::RegWrite,
                addr: index,
                value,
            }),
        }
    }

    /// 2D register write window
    pub fn write_register_2d(&self, slot: u32, value: u32) {
        self.shared.queue.enqueue(CommandEntry {
            kind: EntryKind::Reg2dWrite,
            addr: slot,
            value,
        });
    }

    /// Linear framebuffer byte write
    pub fn write_fb_u8(&self, addr: u32, value: u8) {
        self.shared.queue.enqueue(CommandEntry {
            kind: EntryKind::FbWriteByte,
            addr,
            value: value as u32,
        });
    }

    /// Linear framebuffer 16-bit write
    pub fn write_fb_u16(&self, addr: u32, value: u16) {
        self.shared.queue.enqueue(CommandEntry {
            kind: EntryKind::FbWriteWord,
            addr,
            value: value as u32,
        });
    }

    /// Linear framebuffer 32-bit write
    ///
    /// A write landing inside an enabled CmdFifo window feeds the command
    /// stream instead of the queue; when it completes a packet announcement
    /// the dispatcher is woken immediately.
    pub fn write_fb_u32(&self, addr: u32, value: u32) {
        if self.shared.cmdfifo.claims(addr) {
            if self.shared.cmdfifo.write(&self.shared.mem, addr, value) {
                self.shared.queue.force_wake();
            }
        } else {
            self.shared.queue.enqueue(CommandEntry {
                kind: EntryKind::FbWriteLong,
                addr,
                value,
            });
        }
    }

    /// Texture download window
    pub fn write_tex_u32(&self, addr: u32, value: u32) {
        self.shared.queue.enqueue(CommandEntry {
            kind: EntryKind::TexWriteLong,
            addr,
            value,
        });
    }

    /// Synchronous status read
    ///
    /// Guests poll this in tight loops, so the read doubles as a progress
    /// kick: the dispatcher is woken past its coalescing delay before the
    /// word is synthesized.
    pub fn read_status(&self) -> u32 {
        self.shared.queue.force_wake();
        self.shared
            .swap
            .status_word(self.shared.queue.free_estimate(), self.shared.is_busy())
    }

    /// Per-scanline callback from the external display scheduler
    pub fn scanline_tick(&self) {
        self.shared.swap.scanline_tick();
    }

    /// Drain the whole pipeline; see [`PipelineShared::flush`]
    pub fn flush(&self) {
        self.shared.flush();
    }

    /// Number of swaps waiting for a retrace
    pub fn pending_swaps(&self) -> u32 {
        self.shared.swap.pending_swaps()
    }

    /// Byte offset of the buffer currently on display
    pub fn display_offset(&self) -> u32 {
        self.shared.swap.display_offset()
    }

    /// Copy the display buffer out as packed RGB24 for the external scanout
    pub fn framebuffer_rgb24(&self) -> Vec<u8> {
        let config = &self.shared.config;
        let pitch = config.row_pitch() as u32;
        let base = self.shared.swap.display_offset();

        let mut out = Vec::with_capacity((config.width * config.height) as usize * 3);
        for y in 0..config.height {
            for x in 0..config.width {
                let pixel = self.shared.mem.fb_read_u16(base + y * pitch + x * 2);
                let r = ((pixel >> 11) & 0x1F) as u8;
                let g = ((pixel >> 5) & 0x3F) as u8;
                let b = (pixel & 0x1F) as u8;
                out.push((r << 3) | (r >> 2));
                out.push((g << 2) | (g >> 4));
                out.push((b << 3) | (b >> 2));
            }
        }
        out
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.shared.stop();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
        log::info!("device down");
    }
}
