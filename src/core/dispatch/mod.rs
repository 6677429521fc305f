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

//! Dispatcher
//!
//! The single thread that consumes both ingestion paths and owns all
//! mutable pipeline state: the register files, the 2D engine, vertex
//! assembly and the texture cache. One drain pass empties the ring queue,
//! then decodes pending CmdFifo packets, and repeats until both sources
//! report empty; within each source ordering is strict, and the sources are
//! never interleaved by timestamp.
//!
//! Draw commands are handed to the render pool and the dispatcher moves on;
//! only a wait-for-vsync swap (and, with a single worker, the draw itself)
//! blocks it. Everything the flush path needs to observe - queue occupancy,
//! CmdFifo depths, worker busy counters, the dispatcher's own busy flag -
//! lives in [`PipelineShared`].

mod registers;
#[cfg(test)]
mod tests;

pub use registers::{fixed12_4, reg, reg2d, RegisterFile, Registers2d};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use super::cmdfifo::{CmdFifo, FifoEvent};
use super::config::DeviceConfig;
use super::memory::DeviceMemory;
use super::queue::{CommandEntry, EntryKind, RingQueue, WaitOutcome};
use super::render::{ClipRect, JobKind, RasterState, RenderJob, RenderPool, Vertex};
use super::swap::SwapCoordinator;
use super::texture::TextureCache;

/// Re-check period for quiescence waits
const WAIT_PERIOD: Duration = Duration::from_millis(1);

/// Everything shared between the producer side, the dispatcher thread and
/// the flush/status paths
pub struct PipelineShared {
    pub config: DeviceConfig,
    pub mem: Arc<DeviceMemory>,
    pub queue: RingQueue,
    pub cmdfifo: CmdFifo,
    pub swap: SwapCoordinator,
    pub pool: RenderPool,
    /// Set while the dispatcher is inside a drain pass
    pub dispatcher_busy: AtomicBool,
    /// Stops the dispatcher and aborts decoder waits
    pub shutdown: AtomicBool,
    /// A flush is in progress; blocking swap waits abort
    pub flushing: AtomicBool,
    quiesce_lock: Mutex<()>,
    /// Signaled when the dispatcher finishes a drain pass
    quiesce: Condvar,
}

impl PipelineShared {
    pub fn new(config: DeviceConfig, sli_parity: Option<u32>) -> Arc<Self> {
        let mem = Arc::new(DeviceMemory::new());
        let pool = RenderPool::new(config.render_workers, sli_parity, Arc::clone(&mem));

        Arc::new(Self {
            queue: RingQueue::new(config.queue_capacity),
            cmdfifo: CmdFifo::new(),
            swap: SwapCoordinator::new(&config),
            pool,
            mem,
            dispatcher_busy: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            flushing: AtomicBool::new(false),
            quiesce_lock: Mutex::new(()),
            quiesce: Condvar::new(),
            config,
        })
    }

    /// Aggregated pipeline busy: queue non-empty, dispatcher mid-pass, any
    /// worker busy, or announced CmdFifo words not yet consumed
    pub fn is_busy(&self) -> bool {
        self.queue.depth_estimate() > 0
            || self.dispatcher_busy.load(Ordering::SeqCst)
            || self.pool.is_busy()
            || self.cmdfifo.pending()
    }

    /// Drain the pipeline to quiescence
    ///
    /// Idempotent and terminating: on return the ring queue is empty, the
    /// CmdFifo is drained, every worker is idle and any pending swap has
    /// been committed without waiting for a retrace.
    pub fn flush(&self) {
        self.flushing.store(true, Ordering::SeqCst);
        // Commit pending swaps first so a dispatcher blocked behind a
        // wait-for-vsync swap gets unstuck
        self.swap.flush_pending();
        self.queue.force_wake();

        let mut guard = self.quiesce_lock.lock().unwrap();
        while self.is_busy() {
            let (g, _) = self.quiesce.wait_timeout(guard, WAIT_PERIOD).unwrap();
            guard = g;
        }
        drop(guard);

        // A swap command drained by the pass above may have gone pending
        // after the first commit
        self.swap.flush_pending();
        self.flushing.store(false, Ordering::SeqCst);
        log::debug!("pipeline flushed");
    }

    /// Begin shutdown: wake everything that might be waiting
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Release a dispatcher parked behind a wait-for-vsync swap
        self.flushing.store(true, Ordering::SeqCst);
        self.swap.flush_pending();
        self.queue.shutdown();
    }

    fn signal_quiescent(&self) {
        let _guard = self.quiesce_lock.lock().unwrap();
        self.quiesce.notify_all();
    }
}

/// The dispatcher thread's private state
pub struct Dispatcher {
    shared: Arc<PipelineShared>,
    regs: RegisterFile,
    regs2d: Registers2d,
    textures: TextureCache,
}

impl Dispatcher {
    pub fn new(shared: Arc<PipelineShared>) -> Self {
        let regs = RegisterFile::new(shared.config.width, shared.config.height);
        Self {
            shared,
            regs,
            regs2d: Registers2d::new(),
            textures: TextureCache::new(),
        }
    }

    /// Spawn the dispatcher thread
    pub fn spawn(shared: Arc<PipelineShared>) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("sstrx-dispatch".into())
            .spawn(move || Dispatcher::new(shared).run())
            .expect("spawn dispatcher")
    }

    /// Main loop: sleep, drain both sources to empty, report quiescent
    pub fn run(mut self) {
        log::debug!("dispatcher up");

        loop {
            match self.shared.queue.dispatcher_wait() {
                WaitOutcome::Shutdown => break,
                WaitOutcome::Ready => {}
            }

            self.shared.dispatcher_busy.store(true, Ordering::SeqCst);
            loop {
                let mut progressed = false;

                while let Some(entry) = self.shared.queue.drain_one() {
                    self.apply_entry(entry);
                    progressed = true;
                }

                if self.shared.cmdfifo.pending() {
                    let shared = Arc::clone(&self.shared);
                    if shared.cmdfifo.process_packet(&shared.mem, &shared.shutdown, |event| {
                        self.apply_event(event)
                    }) {
                        progressed = true;
                    }
                }

                if !progressed {
                    break;
                }
            }
            self.shared.dispatcher_busy.store(false, Ordering::SeqCst);
            self.shared.signal_quiescent();
        }

        log::debug!("dispatcher down");
    }

    /// Apply one ring-queue entry
    fn apply_entry(&mut self, entry: CommandEntry) {
        match entry.kind {
            EntryKind::RegWrite => self.write_register(entry.addr, entry.value),
            EntryKind::Reg2dWrite => self.write_register_2d(entry.addr as usize, entry.value),
            EntryKind::FbWriteByte => {
                self.quiesce_workers();
                self.shared.mem.fb_write_u8(entry.addr, entry.value as u8);
            }
            EntryKind::FbWriteWord => {
                self.quiesce_workers();
                self.shared.mem.fb_write_u16(entry.addr, entry.value as u16);
            }
            EntryKind::FbWriteLong => {
                self.quiesce_workers();
                self.shared.mem.fb_write_u32(entry.addr, entry.value);
            }
            EntryKind::TexWriteLong => {
                self.shared.mem.tex_write_u32(entry.addr, entry.value);
                self.textures.mark_write(entry.addr);
            }
        }
    }

    /// Apply one decoded CmdFifo command
    fn apply_event(&mut self, event: FifoEvent) {
        match event {
            FifoEvent::Register { index, value } => self.write_register(index, value),
            FifoEvent::Register2d { slot, value } => self.write_register_2d(slot as usize, value),
            FifoEvent::Triangle { verts } => {
                let color = verts[0].rgba.unwrap_or_else(|| self.regs.read(reg::COLOR0));
                let verts = verts.map(|v| Vertex { x: v.x, y: v.y });
                self.draw_triangle(verts, color);
            }
            FifoEvent::FbWrite { addr, value } => {
                self.quiesce_workers();
                self.shared.mem.fb_write_u32(addr, value);
            }
            FifoEvent::TexWrite { addr, value } => {
                self.shared.mem.tex_write_u32(addr, value);
                self.textures.mark_write(addr);
            }
        }
    }

    /// Direct memory writes must not overlap an in-flight render job
    fn quiesce_workers(&self) {
        if self.shared.pool.is_busy() {
            self.shared.pool.wait_idle();
        }
    }

    /// 3D register write, including the command registers
    fn write_register(&mut self, index: u32, value: u32) {
        match index & (registers::REG_COUNT as u32 - 1) {
            reg::NOP_CMD => {}
            reg::TRIANGLE_CMD => {
                self.regs.write(reg::TRIANGLE_CMD, value);
                let verts = self.regs.vertices();
                let color = self.regs.read(reg::COLOR0);
                self.draw_triangle(verts, color);
            }
            reg::FASTFILL_CMD => self.fast_fill(),
            reg::SWAPBUFFER_CMD => self.swap_buffers(value),
            reg::CMDFIFO_BASE => self.shared.cmdfifo.set_base(value),
            reg::CMDFIFO_END => self.shared.cmdfifo.set_end(value),
            reg::CMDFIFO_RP => self.shared.cmdfifo.set_read_pointer(value),
            reg::CMDFIFO_DEPTH => self.shared.cmdfifo.set_depth(value),
            reg::CMDFIFO_CTRL => self.shared.cmdfifo.set_enabled(value & 1 != 0),
            other => self.regs.write(other, value),
        }
    }

    /// 2D register write; the command slot executes its opcode
    fn write_register_2d(&mut self, slot: usize, value: u32) {
        self.regs2d.write(slot, value);
        if slot & (registers::REG2D_COUNT - 1) == reg2d::COMMAND {
            match value & 0xF {
                0 => {}
                1 => self.rect_fill_2d(),
                opcode => {
                    // Unmodeled 2D opcodes are guest-reachable, so they are
                    // ignored rather than fatal
                    log::warn!("2d engine: unimplemented opcode {opcode}, ignored");
                }
            }
        }
    }

    /// Snapshot the current raster parameters for a render job
    fn build_snapshot(&mut self) -> Arc<RasterState> {
        let texture = if self.regs.read(reg::TEX_MODE) & 1 != 0 {
            Some(self.textures.bind(
                &self.shared.mem,
                self.regs.read(reg::TEX_BASE_ADDR),
                self.regs.read(reg::TEX_MODE),
            ))
        } else {
            None
        };

        Arc::new(RasterState {
            color0: self.regs.read(reg::COLOR0),
            color1: self.regs.read(reg::COLOR1),
            clip: self.regs.clip_rect(),
            fbz_mode: self.regs.read(reg::FBZ_MODE),
            fog_mode: self.regs.read(reg::FOG_MODE),
            fog_color: self.regs.read(reg::FOG_COLOR),
            alpha_mode: self.regs.read(reg::ALPHA_MODE),
            za_color: self.regs.read(reg::ZA_COLOR),
            draw_offset: self.shared.swap.draw_offset(),
            row_pitch: self.shared.config.row_pitch() as u32,
            width: self.shared.config.width,
            height: self.shared.config.height,
            texture,
        })
    }

    /// Hand a job to the pool; a single-worker pool runs synchronously
    fn submit(&self, job: RenderJob) {
        self.shared.pool.submit(job);
        if self.shared.pool.worker_count() == 1 {
            self.shared.pool.wait_idle();
        }
    }

    fn draw_triangle(&mut self, verts: [Vertex; 3], color: u32) {
        let state = self.build_snapshot();
        log::trace!(
            "triangle ({:.1},{:.1}) ({:.1},{:.1}) ({:.1},{:.1})",
            verts[0].x,
            verts[0].y,
            verts[1].x,
            verts[1].y,
            verts[2].x,
            verts[2].y
        );
        self.submit(RenderJob {
            kind: JobKind::Triangle { verts, color },
            state,
        });
    }

    fn fast_fill(&mut self) {
        let state = self.build_snapshot();
        self.submit(RenderJob {
            kind: JobKind::FastFill,
            state,
        });
    }

    /// `swapbuffer_cmd`: bit 0 = wait for vsync, bits 1-8 = retrace interval
    fn swap_buffers(&mut self, value: u32) {
        let wait_vsync = value & 1 != 0;
        let interval = (value >> 1) & 0xFF;

        // The frame must be complete before its buffer can go on display
        self.quiesce_workers();
        self.shared.swap.request_swap(interval);

        if self.shared.flushing.load(Ordering::SeqCst) {
            self.shared.swap.flush_pending();
        } else if wait_vsync {
            self.shared.swap.wait_idle(&self.shared.flushing);
        }
    }

    /// 2D opcode 1: solid rectangle fill
    fn rect_fill_2d(&mut self) {
        let base = self.regs2d.read(reg2d::DST_BASE);
        let mut pitch = self.regs2d.read(reg2d::DST_FORMAT) & 0x3FFF;
        if pitch == 0 {
            pitch = self.shared.config.row_pitch() as u32;
        }

        let xy = self.regs2d.read(reg2d::DST_XY);
        let size = self.regs2d.read(reg2d::DST_SIZE);
        let (x, y) = (xy & 0xFFFF, xy >> 16);
        let (w, h) = (size & 0xFFFF, size >> 16);

        let color = self.regs2d.read(reg2d::COLOR_FORE);
        let state = Arc::new(RasterState {
            color0: color,
            color1: color,
            clip: ClipRect {
                left: x,
                top: y,
                right: x.saturating_add(w),
                bottom: y.saturating_add(h),
            },
            fbz_mode: 0,
            fog_mode: 0,
            fog_color: 0,
            alpha_mode: 0,
            za_color: 0,
            draw_offset: base,
            row_pitch: pitch,
            width: pitch / 2,
            height: self.shared.config.height,
            texture: None,
        });

        log::debug!("2d rect fill {w}x{h} at ({x},{y})");
        self.submit(RenderJob {
            kind: JobKind::FastFill,
            state,
        });
    }
}
