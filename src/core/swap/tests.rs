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

//! Swap coordinator tests

use super::*;
use crate::core::config::DeviceConfig;

fn coordinator() -> SwapCoordinator {
    SwapCoordinator::new(&DeviceConfig::default())
}

/// Run one full frame of scanline ticks (visible + blanking)
fn run_frame(swap: &SwapCoordinator, height: u32) {
    for _ in 0..height + VBLANK_LINES {
        swap.scanline_tick();
    }
}

#[test]
fn test_initial_buffer_roles() {
    let swap = coordinator();
    let stride = DeviceConfig::default().buffer_stride() as u32;

    assert_eq!(swap.display_offset(), 0);
    assert_eq!(swap.draw_offset(), stride);
    assert_eq!(swap.aux_offset(), 2 * stride);
    assert_eq!(swap.pending_swaps(), 0);
}

#[test]
fn test_request_only_sets_pending() {
    let swap = coordinator();
    let display_before = swap.display_offset();

    swap.request_swap(1);
    assert_eq!(swap.pending_swaps(), 1);
    // No pointer exchange until retrace
    assert_eq!(swap.display_offset(), display_before);
    assert_eq!(swap.swaps_committed(), 0);
}

#[test]
fn test_swap_commits_at_retrace_boundary() {
    let swap = coordinator();
    let draw_before = swap.draw_offset();

    swap.request_swap(1);
    run_frame(&swap, 480);

    assert_eq!(swap.pending_swaps(), 0);
    assert_eq!(swap.swaps_committed(), 1);
    // The front buffer took the just-rendered image, exactly once
    assert_eq!(swap.display_offset(), draw_before);
}

#[test]
fn test_interval_defers_commit() {
    let swap = coordinator();

    swap.request_swap(2);
    run_frame(&swap, 480);
    // One retrace seen; interval of 2 not reached yet
    assert_eq!(swap.pending_swaps(), 1);
    assert_eq!(swap.swaps_committed(), 0);

    run_frame(&swap, 480);
    assert_eq!(swap.pending_swaps(), 0);
    assert_eq!(swap.swaps_committed(), 1);
}

#[test]
fn test_pending_counter_saturates() {
    let swap = coordinator();

    for _ in 0..20 {
        swap.request_swap(1);
    }
    assert_eq!(swap.pending_swaps(), MAX_PENDING_SWAPS);

    // The counter only decreases at committed retrace boundaries
    run_frame(&swap, 480);
    assert_eq!(swap.pending_swaps(), MAX_PENDING_SWAPS - 1);
}

#[test]
fn test_vblank_phase_tracks_scanlines() {
    let swap = coordinator();
    assert!(!swap.in_vblank());

    for _ in 0..480 {
        swap.scanline_tick();
    }
    assert!(swap.in_vblank());

    for _ in 0..VBLANK_LINES {
        swap.scanline_tick();
    }
    assert!(!swap.in_vblank());
}

#[test]
fn test_emergency_flush_commits_immediately() {
    let swap = coordinator();

    swap.request_swap(1);
    swap.request_swap(1);
    swap.flush_pending();

    assert_eq!(swap.pending_swaps(), 0);
    assert_eq!(swap.swaps_committed(), 2);
}

#[test]
fn test_triple_buffer_rotation() {
    let config = DeviceConfig {
        buffer_count: 3,
        ..DeviceConfig::default()
    };
    let swap = SwapCoordinator::new(&config);
    let stride = config.buffer_stride() as u32;

    // draw starts at buffer 1; each commit promotes it to display and
    // rotates drawing to the next buffer
    swap.request_swap(1);
    swap.flush_pending();
    assert_eq!(swap.display_offset(), stride);
    assert_eq!(swap.draw_offset(), 2 * stride);

    swap.request_swap(1);
    swap.flush_pending();
    assert_eq!(swap.display_offset(), 2 * stride);
    assert_eq!(swap.draw_offset(), 0);
}

#[test]
fn test_status_word_packing() {
    let swap = coordinator();

    // Free space saturates at 0x3F
    assert_eq!(swap.status_word(8192, false) & 0x3F, 0x3F);
    assert_eq!(swap.status_word(5, false) & 0x3F, 5);

    // Busy bit
    assert_eq!(swap.status_word(0, true) & (1 << 7), 1 << 7);
    assert_eq!(swap.status_word(0, false) & (1 << 7), 0);

    // Pending swap field
    swap.request_swap(1);
    swap.request_swap(1);
    assert_eq!((swap.status_word(0, false) >> 28) & 7, 2);

    // Vsync phase bit
    for _ in 0..480 {
        swap.scanline_tick();
    }
    assert_eq!(swap.status_word(0, false) & (1 << 6), 1 << 6);
}

#[test]
fn test_wait_idle_returns_after_commit() {
    use std::sync::Arc;
    use std::thread;

    let swap = Arc::new(coordinator());
    swap.request_swap(1);

    let waiter = {
        let swap = Arc::clone(&swap);
        thread::spawn(move || {
            let abort = AtomicBool::new(false);
            swap.wait_idle(&abort);
            swap.pending_swaps()
        })
    };

    thread::sleep(Duration::from_millis(10));
    run_frame(&swap, 480);
    assert_eq!(waiter.join().unwrap(), 0);
}
