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

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use sstrx::core::cmdfifo::CmdFifo;
use sstrx::core::memory::DeviceMemory;
use sstrx::core::queue::{CommandEntry, EntryKind, RingQueue};

fn queue_throughput_benchmark(c: &mut Criterion) {
    c.bench_function("queue_enqueue_drain_1k", |b| {
        let queue = RingQueue::new(2048);
        let entry = CommandEntry {
            kind: EntryKind::RegWrite,
            addr: 0x11,
            value: 0xDEAD_BEEF,
        };

        b.iter(|| {
            for _ in 0..1024 {
                queue.enqueue(black_box(entry));
            }
            while queue.drain_one().is_some() {}
        });
    });

    c.bench_function("queue_status_estimate", |b| {
        let queue = RingQueue::new(2048);
        b.iter(|| black_box(queue.free_estimate()));
    });
}

fn cmdfifo_write_benchmark(c: &mut Criterion) {
    c.bench_function("cmdfifo_in_order_writes_1k", |b| {
        let mem = DeviceMemory::new();
        let fifo = CmdFifo::new();
        fifo.set_enabled(true);

        b.iter(|| {
            fifo.configure(0, 0x10_0000);
            for i in 0..1024u32 {
                fifo.write(&mem, i * 4, black_box(i));
            }
        });
    });

    c.bench_function("cmdfifo_hole_heal_64", |b| {
        let mem = DeviceMemory::new();
        let fifo = CmdFifo::new();
        fifo.set_enabled(true);

        b.iter(|| {
            fifo.configure(0x1000, 0x10_0000);
            // Skip ahead, then heal the gap back to front
            fifo.write(&mem, 0x1000 + 64 * 4, 0);
            for i in (0..64u32).rev() {
                fifo.write(&mem, 0x1000 + i * 4, black_box(i));
            }
        });
    });
}

criterion_group!(benches, queue_throughput_benchmark, cmdfifo_write_benchmark);
criterion_main!(benches);
