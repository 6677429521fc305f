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

//! Swap coordinator
//!
//! Front/back (and optionally a third) buffer bookkeeping, tied to display
//! timing. A swap request only marks a swap as pending; the pointer
//! exchange happens inside the vertical-retrace callback once the retrace
//! counter reaches the requested interval ("wait for vsync" semantics).
//! The one exception is an emergency flush - a caller blocked waiting for
//! the pipeline to drain - which commits immediately to avoid livelock.
//!
//! The guest-visible status word is synthesized here too, packing the ring
//! queue's free-space estimate, the saturating pending-swap counter, the
//! vertical-sync phase and the aggregated busy bit.

use std::sync::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use super::config::DeviceConfig;

#[cfg(test)]
mod tests;

/// Vertical blanking lines appended after the visible frame
pub const VBLANK_LINES: u32 = 45;

/// The pending-swap counter saturates at this value (3-bit status field)
pub const MAX_PENDING_SWAPS: u32 = 7;

/// Re-check period while the dispatcher waits behind a vsync swap
const WAIT_PERIOD: Duration = Duration::from_millis(1);

struct Inner {
    /// Buffer index currently scanned out
    display_buffer: u32,
    /// Buffer index triangles render into
    draw_buffer: u32,
    buffer_count: u32,
    /// Retraces a pending swap waits for
    interval: u32,
    /// Retraces seen since the last committed swap
    retrace_count: u32,
    /// Current scanline within the frame
    line: u32,
    /// Total committed swaps (diagnostics)
    swaps_committed: u64,
}

/// Buffer-swap and retrace bookkeeping
pub struct SwapCoordinator {
    visible_lines: u32,
    stride: u32,
    inner: Mutex<Inner>,
    /// Signaled on every committed swap
    committed: Condvar,
    /// Pending-swap counter, mirrored for lock-free status reads
    pending: AtomicU32,
    /// Vertical-sync phase, mirrored for lock-free status reads
    in_vblank: AtomicBool,
}

impl SwapCoordinator {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            visible_lines: config.height,
            stride: config.buffer_stride() as u32,
            inner: Mutex::new(Inner {
                display_buffer: 0,
                draw_buffer: 1,
                buffer_count: config.buffer_count,
                interval: config.swap_interval,
                retrace_count: 0,
                line: 0,
                swaps_committed: 0,
            }),
            committed: Condvar::new(),
            pending: AtomicU32::new(0),
            in_vblank: AtomicBool::new(false),
        }
    }

    /// Byte offset of the buffer being scanned out
    pub fn display_offset(&self) -> u32 {
        self.inner.lock().unwrap().display_buffer * self.stride
    }

    /// Byte offset of the buffer being rendered into
    pub fn draw_offset(&self) -> u32 {
        self.inner.lock().unwrap().draw_buffer * self.stride
    }

    /// Byte offset of the auxiliary (depth) buffer
    pub fn aux_offset(&self) -> u32 {
        self.inner.lock().unwrap().buffer_count * self.stride
    }

    /// Number of swaps waiting for a retrace
    pub fn pending_swaps(&self) -> u32 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Current vertical-sync phase
    pub fn in_vblank(&self) -> bool {
        self.in_vblank.load(Ordering::Relaxed)
    }

    /// Total committed swaps
    pub fn swaps_committed(&self) -> u64 {
        self.inner.lock().unwrap().swaps_committed
    }

    /// Mark a swap as pending
    ///
    /// Only bookkeeping happens here; the pointer exchange waits for the
    /// retrace callback. The pending counter saturates - extra requests
    /// beyond the status field's range collapse into it.
    pub fn request_swap(&self, interval: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.interval = interval.max(1);
        let pending = self.pending.load(Ordering::Relaxed);
        if pending < MAX_PENDING_SWAPS {
            self.pending.store(pending + 1, Ordering::Relaxed);
        }
        log::debug!("swap requested (pending {})", pending + 1);
    }

    /// Per-scanline retrace callback, driven by the external scheduler
    ///
    /// Advances the scanline counter; at the start of vertical blank the
    /// retrace counter ticks and a pending swap commits once the counter
    /// reaches the requested interval.
    pub fn scanline_tick(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.line += 1;

        if inner.line == self.visible_lines {
            // Entering vertical blank: this is the retrace boundary
            self.in_vblank.store(true, Ordering::Relaxed);
            inner.retrace_count += 1;

            if self.pending.load(Ordering::Relaxed) > 0 && inner.retrace_count >= inner.interval {
                inner.retrace_count = 0;
                self.commit_locked(&mut inner);
            }
        } else if inner.line >= self.visible_lines + VBLANK_LINES {
            inner.line = 0;
            self.in_vblank.store(false, Ordering::Relaxed);
        }
    }

    /// Commit every pending swap immediately
    ///
    /// Emergency-flush path: a caller is blocked waiting for the pipeline
    /// to drain, so waiting for a retrace would livelock.
    pub fn flush_pending(&self) {
        let mut inner = self.inner.lock().unwrap();
        while self.pending.load(Ordering::Relaxed) > 0 {
            self.commit_locked(&mut inner);
        }
    }

    /// Block until no swap is pending
    ///
    /// Used by the dispatcher behind a wait-for-vsync swap command. Returns
    /// early (without the swap having committed) only when `abort` is set,
    /// which the flush path uses after calling [`SwapCoordinator::flush_pending`].
    pub fn wait_idle(&self, abort: &AtomicBool) {
        let mut inner = self.inner.lock().unwrap();
        while self.pending.load(Ordering::Relaxed) > 0 && !abort.load(Ordering::Relaxed) {
            let (guard, _) = self.committed.wait_timeout(inner, WAIT_PERIOD).unwrap();
            inner = guard;
        }
    }

    fn commit_locked(&self, inner: &mut Inner) {
        let pending = self.pending.load(Ordering::Relaxed);
        if pending == 0 {
            return;
        }

        // The front buffer takes the just-rendered image; drawing moves on
        // to the next buffer in rotation (identical roles for 2 buffers,
        // rotation for 3)
        inner.display_buffer = inner.draw_buffer;
        inner.draw_buffer = (inner.draw_buffer + 1) % inner.buffer_count;
        inner.swaps_committed += 1;
        self.pending.store(pending - 1, Ordering::Relaxed);
        self.committed.notify_all();

        log::debug!(
            "swap committed: display={} draw={} (total {})",
            inner.display_buffer,
            inner.draw_buffer,
            inner.swaps_committed
        );
    }

    /// Synthesize the guest-visible 32-bit status value
    ///
    /// - bits 0-5: free ring-queue capacity, saturating at 0x3F
    /// - bit 6: vertical-sync phase
    /// - bit 7: aggregated busy (queue non-empty, any worker busy, or
    ///   CmdFifo depths unequal)
    /// - bits 28-30: pending-swap count
    pub fn status_word(&self, free_entries: usize, busy: bool) -> u32 {
        let mut status = free_entries.min(0x3F) as u32;
        if self.in_vblank() {
            status |= 1 << 6;
        }
        if busy {
            status |= 1 << 7;
        }
        status |= self.pending_swaps().min(MAX_PENDING_SWAPS) << 28;
        status
    }
}
