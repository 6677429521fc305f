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

//! Render worker pool
//!
//! One or two OS threads rasterize triangle and fill commands in parallel.
//! With two workers, scanlines are statically partitioned by parity -
//! worker 0 takes even rows, worker 1 odd rows - never by dynamic stealing,
//! so the workers cannot contend for a row. Under SLI the board first keeps
//! only the rows its parity owns, then splits those between its workers the
//! same way.
//!
//! Workers read nothing but their job's immutable [`RasterState`] snapshot;
//! the dispatcher hands one out per job and never mutates a published one.
//! Per-worker busy counters let the dispatcher hand a job off and keep
//! going, while `flush` can still wait for true completion.

mod raster;

pub use raster::{argb_to_rgb565, fill_rect, fill_triangle, ClipRect, RasterState, Vertex};

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use super::memory::DeviceMemory;

/// Re-check period for worker and idle waits
const WAIT_PERIOD: Duration = Duration::from_millis(1);

/// What a render job rasterizes
#[derive(Debug, Clone)]
pub enum JobKind {
    /// Flat-shaded triangle
    Triangle { verts: [Vertex; 3], color: u32 },
    /// Fill the clip rectangle with the snapshot's `color1`
    FastFill,
}

/// One rasterization job, bound to its raster-parameter snapshot
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub kind: JobKind,
    pub state: Arc<RasterState>,
}

struct WorkerState {
    jobs: Mutex<VecDeque<Arc<RenderJob>>>,
    available: Condvar,
    /// Jobs queued plus running on this worker
    busy: AtomicU32,
    /// Total rows this worker has filled (diagnostics, parity checks)
    rows_filled: AtomicU64,
}

struct PoolShared {
    workers: Vec<WorkerState>,
    /// Signaled whenever a worker goes idle
    idle: Condvar,
    idle_lock: Mutex<()>,
    shutdown: AtomicBool,
    /// SLI scanline ownership of this board (0 = even rows, 1 = odd)
    sli_parity: Option<u32>,
}

impl PoolShared {
    /// Static scanline ownership: SLI parity first, then worker parity
    /// within the board's rows
    fn owns_row(&self, worker: usize, row: u32) -> bool {
        let row = match self.sli_parity {
            Some(parity) => {
                if row % 2 != parity {
                    return false;
                }
                row / 2
            }
            None => row,
        };
        self.workers.len() == 1 || (row % 2) as usize == worker
    }
}

/// Pool of one or two rasterization workers
pub struct RenderPool {
    shared: Arc<PoolShared>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl RenderPool {
    /// Spawn `worker_count` workers writing into `mem`
    pub fn new(worker_count: usize, sli_parity: Option<u32>, mem: Arc<DeviceMemory>) -> Self {
        debug_assert!(worker_count == 1 || worker_count == 2);

        let shared = Arc::new(PoolShared {
            workers: (0..worker_count)
                .map(|_| WorkerState {
                    jobs: Mutex::new(VecDeque::new()),
                    available: Condvar::new(),
                    busy: AtomicU32::new(0),
                    rows_filled: AtomicU64::new(0),
                })
                .collect(),
            idle: Condvar::new(),
            idle_lock: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            sli_parity,
        });

        let handles = (0..worker_count)
            .map(|idx| {
                let shared = Arc::clone(&shared);
                let mem = Arc::clone(&mem);
                thread::Builder::new()
                    .name(format!("sstrx-render-{idx}"))
                    .spawn(move || worker_main(idx, shared, mem))
                    .expect("spawn render worker")
            })
            .collect();

        Self { shared, handles }
    }

    pub fn worker_count(&self) -> usize {
        self.shared.workers.len()
    }

    /// Hand a job to every worker; each rasterizes only the rows it owns
    pub fn submit(&self, job: RenderJob) {
        let job = Arc::new(job);
        for worker in &self.shared.workers {
            worker.busy.fetch_add(1, Ordering::SeqCst);
            worker.jobs.lock().unwrap().push_back(Arc::clone(&job));
            worker.available.notify_one();
        }
    }

    /// True while any worker has queued or running jobs
    pub fn is_busy(&self) -> bool {
        self.shared
            .workers
            .iter()
            .any(|w| w.busy.load(Ordering::SeqCst) > 0)
    }

    /// Block until every worker reports idle
    pub fn wait_idle(&self) {
        let mut guard = self.shared.idle_lock.lock().unwrap();
        while self.is_busy() {
            let (g, _) = self.shared.idle.wait_timeout(guard, WAIT_PERIOD).unwrap();
            guard = g;
        }
    }

    /// Rows filled so far by worker `idx`
    pub fn rows_filled(&self, idx: usize) -> u64 {
        self.shared.workers[idx].rows_filled.load(Ordering::SeqCst)
    }
}

impl Drop for RenderPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        for worker in &self.shared.workers {
            worker.available.notify_one();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_main(idx: usize, shared: Arc<PoolShared>, mem: Arc<DeviceMemory>) {
    log::debug!("render worker {idx} up");

    loop {
        let job = {
            let state = &shared.workers[idx];
            let mut jobs = state.jobs.lock().unwrap();
            loop {
                if let Some(job) = jobs.pop_front() {
                    break job;
                }
                if shared.shutdown.load(Ordering::SeqCst) {
                    log::debug!("render worker {idx} down");
                    return;
                }
                let (guard, _) = state.available.wait_timeout(jobs, WAIT_PERIOD).unwrap();
                jobs = guard;
            }
        };

        let owns = |row: u32| shared.owns_row(idx, row);
        let rows = match &job.kind {
            JobKind::Triangle { verts, color } => {
                fill_triangle(&mem, &job.state, verts, *color, owns)
            }
            JobKind::FastFill => fill_rect(&mem, &job.state, job.state.color1, owns),
        };

        let state = &shared.workers[idx];
        state.rows_filled.fetch_add(rows as u64, Ordering::SeqCst);
        // Drop the snapshot (and any texture binding it holds) before
        // reporting idle, so a flush cannot observe a stale reference
        drop(job);
        state.busy.fetch_sub(1, Ordering::SeqCst);
        shared.idle.notify_all();
    }
}
