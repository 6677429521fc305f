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

//! Ring queue between the bus-write interceptor and the dispatcher
//!
//! Every intercepted bus write becomes one [`CommandEntry`] in a bounded
//! ring. The producer (CPU emulation) blocks when the ring is full; the
//! dispatcher drains entries strictly in submission order.
//!
//! # Cursors
//!
//! The ring uses monotonically increasing 64-bit write/read cursors; the
//! slot index is `cursor & (capacity - 1)`. The occupancy invariant
//! `write_cursor - read_cursor <= capacity` holds at all times, and entries
//! between the cursors are consumed strictly in index order.
//!
//! # Wake coalescing
//!
//! An enqueue does not wake the dispatcher immediately. The first enqueue
//! after idle arms a single ~100 us wake deadline; bursts of rapid
//! single-word writes then ride the same deadline, trading a little latency
//! for far fewer thread handoffs. [`RingQueue::force_wake`] bypasses the
//! deadline for callers that need forward progress now (a blocked producer,
//! a synchronous status read, `flush`).

use std::sync::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};


/// Delay applied to a coalesced dispatcher wake
pub const WAKE_DELAY: Duration = Duration::from_micros(100);

/// Re-check period for blocked producers and the idle dispatcher
const POLL_PERIOD: Duration = Duration::from_millis(1);

/// What kind of device access an entry carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// 3D register write
    RegWrite,
    /// 2D engine register write
    Reg2dWrite,
    /// Linear framebuffer byte write
    FbWriteByte,
    /// Linear framebuffer 16-bit write
    FbWriteWord,
    /// Linear framebuffer 32-bit write
    FbWriteLong,
    /// Texture-download 32-bit write
    TexWriteLong,
}

/// One intercepted bus access
///
/// Produced on every write into one of the device's address windows and
/// consumed exactly once by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub kind: EntryKind,
    pub addr: u32,
    pub value: u32,
}

/// Outcome of a dispatcher wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Work (or a forced wake) is ready
    Ready,
    /// The queue is shutting down
    Shutdown,
}

struct Inner {
    entries: Vec<CommandEntry>,
    write_cursor: u64,
    read_cursor: u64,
    /// Armed coalesced-wake deadline, if any
    wake_deadline: Option<Instant>,
    /// A caller demanded an immediate dispatcher wake
    wake_forced: bool,
    shutdown: bool,
}

impl Inner {
    #[inline(always)]
    fn len(&self) -> usize {
        (self.write_cursor - self.read_cursor) as usize
    }
}

/// Bounded command ring between producer and dispatcher
pub struct RingQueue {
    capacity: usize,
    /// Blocked producers are released once occupancy drops below this
    high_water: usize,
    inner: Mutex<Inner>,
    /// Producers blocked on a full ring wait here
    not_full: Condvar,
    /// The dispatcher waits here for work
    dispatch: Condvar,
    /// Occupancy mirror for the lock-free status-read estimate
    occupancy: AtomicUsize,
}

impl RingQueue {
    /// Create a ring with `capacity` slots (must be a power of two)
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());

        let filler = CommandEntry {
            kind: EntryKind::RegWrite,
            addr: 0,
            value: 0,
        };

        Self {
            capacity,
            high_water: capacity - capacity / 4,
            inner: Mutex::new(Inner {
                entries: vec![filler; capacity],
                write_cursor: 0,
                read_cursor: 0,
                wake_deadline: None,
                wake_forced: false,
                shutdown: false,
            }),
            not_full: Condvar::new(),
            dispatch: Condvar::new(),
            occupancy: AtomicUsize::new(0),
        }
    }

    /// Ring capacity in entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current occupancy estimate (lock-free)
    pub fn depth_estimate(&self) -> usize {
        self.occupancy.load(Ordering::Relaxed)
    }

    /// Free-slot estimate for the guest-visible status word (lock-free)
    pub fn free_estimate(&self) -> usize {
        self.capacity - self.depth_estimate().min(self.capacity)
    }

    /// Insert an entry at the write cursor
    ///
    /// Blocks while the ring is full, forcing a dispatcher wake and
    /// periodically re-attempting until a slot opens. Entries offered after
    /// shutdown are dropped.
    pub fn enqueue(&self, entry: CommandEntry) {
        let mut inner = self.inner.lock().unwrap();

        while inner.len() == self.capacity {
            if inner.shutdown {
                return;
            }
            // A stalled producer must guarantee forward progress
            inner.wake_forced = true;
            self.dispatch.notify_one();
            let (guard, _) = self.not_full.wait_timeout(inner, POLL_PERIOD).unwrap();
            inner = guard;
        }

        if inner.shutdown {
            return;
        }

        let idx = (inner.write_cursor as usize) & (self.capacity - 1);
        inner.entries[idx] = entry;
        inner.write_cursor += 1;
        self.occupancy.store(inner.len(), Ordering::Relaxed);

        // Arm one coalesced wake per burst; later enqueues ride the same
        // deadline
        if inner.wake_deadline.is_none() {
            inner.wake_deadline = Some(Instant::now() + WAKE_DELAY);
            self.dispatch.notify_one();
        }
    }

    /// Read and consume the entry at the read cursor (dispatcher only)
    pub fn drain_one(&self) -> Option<CommandEntry> {
        let mut inner = self.inner.lock().unwrap();

        if inner.len() == 0 {
            return None;
        }

        let idx = (inner.read_cursor as usize) & (self.capacity - 1);
        let entry = inner.entries[idx];
        inner.read_cursor += 1;
        let len = inner.len();
        self.occupancy.store(len, Ordering::Relaxed);

        if len < self.high_water {
            self.not_full.notify_all();
        }

        Some(entry)
    }

    /// Wake the dispatcher immediately, bypassing the coalescing delay
    pub fn force_wake(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.wake_forced = true;
        self.dispatch.notify_one();
    }

    /// Dispatcher-side wait for work
    ///
    /// Returns [`WaitOutcome::Ready`] once the coalesced wake deadline has
    /// passed with entries pending, or immediately on a forced wake (which
    /// may fire with an empty ring so the dispatcher can re-scan the
    /// CmdFifo and flush state).
    pub fn dispatcher_wait(&self) -> WaitOutcome {
        let mut inner = self.inner.lock().unwrap();

        loop {
            if inner.shutdown {
                return WaitOutcome::Shutdown;
            }

            if inner.wake_forced {
                inner.wake_forced = false;
                inner.wake_deadline = None;
                return WaitOutcome::Ready;
            }

            if inner.len() > 0 {
                let deadline = *inner
                    .wake_deadline
                    .get_or_insert_with(|| Instant::now() + WAKE_DELAY);
                let now = Instant::now();
                if now >= deadline {
                    inner.wake_deadline = None;
                    return WaitOutcome::Ready;
                }
                let (guard, _) = self
                    .dispatch
                    .wait_timeout(inner, deadline - now)
                    .unwrap();
                inner = guard;
            } else {
                inner.wake_deadline = None;
                let (guard, _) = self.dispatch.wait_timeout(inner, POLL_PERIOD).unwrap();
                inner = guard;
            }
        }
    }

    /// Stop the queue: wake everything, drop entries offered from now on
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.shutdown = true;
        self.dispatch.notify_all();
        self.not_full.notify_all();
    }

    /// Current cursor pair (for diagnostics and invariant checks)
    pub fn cursors(&self) -> (u64, u64) {
        let inner = self.inner.lock().unwrap();
        (inner.write_cursor, inner.read_cursor)
    }
}
