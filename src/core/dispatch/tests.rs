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

//! Dispatcher tests

use super::*;

use std::time::Instant;

const W: u32 = 64;
const H: u32 = 64;
/// Rows are 128-byte aligned, so one 64-pixel row is exactly 128 bytes
const PITCH: u32 = 128;
const STRIDE: u32 = PITCH * H;

const RED: u32 = 0x00FF_0000;
const BLUE: u32 = 0x0000_00FF;

fn pipeline(workers: usize) -> (Arc<PipelineShared>, thread::JoinHandle<()>) {
    let config = DeviceConfig {
        width: W,
        height: H,
        render_workers: workers,
        queue_capacity: 64,
        ..DeviceConfig::default()
    };
    let shared = PipelineShared::new(config, None);
    let handle = Dispatcher::spawn(Arc::clone(&shared));
    (shared, handle)
}

fn reg_write(shared: &PipelineShared, index: u32, value: u32) {
    shared.queue.enqueue(CommandEntry {
        kind: EntryKind::RegWrite,
        addr: index,
        value,
    });
}

fn reg2d_write(shared: &PipelineShared, slot: u32, value: u32) {
    shared.queue.enqueue(CommandEntry {
        kind: EntryKind::Reg2dWrite,
        addr: slot,
        value,
    });
}

fn wait_until<F: Fn() -> bool>(cond: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Pixel address within the buffer drawn into at startup (buffer 1)
fn draw_pixel(x: u32, y: u32) -> u32 {
    STRIDE + y * PITCH + x * 2
}

#[test]
fn test_fill_then_triangle_lands_in_framebuffer() {
    let (shared, handle) = pipeline(2);

    reg_write(&shared, reg::COLOR1, BLUE);
    reg_write(&shared, reg::FASTFILL_CMD, 0);

    reg_write(&shared, reg::COLOR0, RED);
    // Triangle (0,0) (16,0) (0,8) in 12.4 fixed point
    reg_write(&shared, reg::VERTEX_AX, 0);
    reg_write(&shared, reg::VERTEX_AY, 0);
    reg_write(&shared, reg::VERTEX_BX, 16 << 4);
    reg_write(&shared, reg::VERTEX_BY, 0);
    reg_write(&shared, reg::VERTEX_CX, 0);
    reg_write(&shared, reg::VERTEX_CY, 8 << 4);
    reg_write(&shared, reg::TRIANGLE_CMD, 0);

    shared.flush();

    let red = crate::core::render::argb_to_rgb565(RED);
    let blue = crate::core::render::argb_to_rgb565(BLUE);
    assert_eq!(shared.mem.fb_read_u16(draw_pixel(1, 1)), red);
    assert_eq!(shared.mem.fb_read_u16(draw_pixel(60, 60)), blue);

    // Flushing an already-quiescent pipeline changes nothing
    shared.flush();
    assert_eq!(shared.mem.fb_read_u16(draw_pixel(1, 1)), red);
    assert!(!shared.is_busy());

    shared.stop();
    handle.join().unwrap();
}

#[test]
fn test_single_worker_output_matches() {
    let (shared, handle) = pipeline(1);

    reg_write(&shared, reg::COLOR1, BLUE);
    reg_write(&shared, reg::FASTFILL_CMD, 0);
    shared.flush();

    let blue = crate::core::render::argb_to_rgb565(BLUE);
    for y in [0, 1, 31, 63] {
        assert_eq!(shared.mem.fb_read_u16(draw_pixel(0, y)), blue);
    }

    shared.stop();
    handle.join().unwrap();
}

#[test]
fn test_swap_commits_only_at_retrace() {
    let (shared, handle) = pipeline(2);

    assert_eq!(shared.swap.display_offset(), 0);
    reg_write(&shared, reg::SWAPBUFFER_CMD, 0); // no wait bit
    wait_until(|| !shared.is_busy());

    // Requested but not committed: no retrace has happened
    assert_eq!(shared.swap.pending_swaps(), 1);
    assert_eq!(shared.swap.display_offset(), 0);

    for _ in 0..H {
        shared.swap.scanline_tick();
    }

    assert_eq!(shared.swap.pending_swaps(), 0);
    assert_eq!(shared.swap.display_offset(), STRIDE);

    shared.stop();
    handle.join().unwrap();
}

#[test]
fn test_wait_vsync_swap_blocks_dispatcher() {
    let (shared, handle) = pipeline(2);

    reg_write(&shared, reg::SWAPBUFFER_CMD, 1); // wait bit set
    wait_until(|| shared.swap.pending_swaps() == 1);

    // The dispatcher is parked behind the swap
    thread::sleep(Duration::from_millis(5));
    assert!(shared.is_busy());

    for _ in 0..H {
        shared.swap.scanline_tick();
    }
    wait_until(|| !shared.is_busy());
    assert_eq!(shared.swap.display_offset(), STRIDE);

    shared.stop();
    handle.join().unwrap();
}

#[test]
fn test_flush_commits_blocking_swap() {
    let (shared, handle) = pipeline(2);

    reg_write(&shared, reg::SWAPBUFFER_CMD, 1);
    // Must terminate without any retrace ever happening
    shared.flush();

    assert_eq!(shared.swap.pending_swaps(), 0);
    assert_eq!(shared.swap.display_offset(), STRIDE);

    shared.stop();
    handle.join().unwrap();
}

#[test]
fn test_cmdfifo_block_copy_packet() {
    let (shared, handle) = pipeline(2);

    reg_write(&shared, reg::CMDFIFO_BASE, 0x1_0000);
    reg_write(&shared, reg::CMDFIFO_END, 0x2_0000);
    reg_write(&shared, reg::CMDFIFO_CTRL, 1);
    shared.flush();
    assert!(shared.cmdfifo.is_enabled());

    // Kind-5 packet: 2 words into linear framebuffer space at 0x4_0000
    let stream = [(2 << 3) | 5, 0x4_0000, 0xAAAA_BBBB, 0xCCCC_DDDD];
    for (i, word) in stream.iter().enumerate() {
        shared
            .cmdfifo
            .write(&shared.mem, 0x1_0000 + 4 * i as u32, *word);
    }
    shared.queue.force_wake();
    shared.flush();

    assert_eq!(shared.mem.fb_read_u32(0x4_0000), 0xAAAA_BBBB);
    assert_eq!(shared.mem.fb_read_u32(0x4_0004), 0xCCCC_DDDD);
    assert!(shared.cmdfifo.drained());

    shared.stop();
    handle.join().unwrap();
}

#[test]
fn test_block_copy_ordered_after_in_flight_draw() {
    let (shared, handle) = pipeline(2);

    reg_write(&shared, reg::CMDFIFO_BASE, 0x1_0000);
    reg_write(&shared, reg::CMDFIFO_END, 0x2_0000);
    reg_write(&shared, reg::CMDFIFO_CTRL, 1);
    shared.flush();

    // A full-buffer fill handed to both workers, immediately chased by a
    // block copy over the same pixels: the copy must not land until every
    // worker has retired the fill, or the fill would overwrite it
    reg_write(&shared, reg::COLOR1, BLUE);
    reg_write(&shared, reg::FASTFILL_CMD, 0);
    let stream = [(2 << 3) | 5, draw_pixel(0, 0), 0x9999_8888, 0x7777_6666];
    for (i, word) in stream.iter().enumerate() {
        shared
            .cmdfifo
            .write(&shared.mem, 0x1_0000 + 4 * i as u32, *word);
    }
    shared.queue.force_wake();
    shared.flush();

    assert_eq!(shared.mem.fb_read_u32(draw_pixel(0, 0)), 0x9999_8888);
    assert_eq!(shared.mem.fb_read_u32(draw_pixel(2, 0)), 0x7777_6666);
    let blue = crate::core::render::argb_to_rgb565(BLUE);
    assert_eq!(shared.mem.fb_read_u16(draw_pixel(5, 5)), blue);

    shared.stop();
    handle.join().unwrap();
}

#[test]
fn test_block_copy_into_texture_ram_invalidates_cache() {
    // Drive a dispatcher directly (no thread) so the texture cache it owns
    // is observable through successive snapshots
    let config = DeviceConfig {
        width: W,
        height: H,
        render_workers: 2,
        queue_capacity: 64,
        ..DeviceConfig::default()
    };
    let shared = PipelineShared::new(config, None);
    let mut dispatcher = Dispatcher::new(Arc::clone(&shared));

    // 32x16 texture at base 0, enable bit set
    shared.mem.tex_write_u32(0, 0x1111_1111);
    dispatcher.write_register(reg::TEX_BASE_ADDR, 0);
    dispatcher.write_register(reg::TEX_MODE, (4 << 4) | 5);
    let stale = dispatcher.build_snapshot().texture.clone().unwrap();
    assert_eq!(&stale.data[..2], &[0x11, 0x11]);

    // Upload fresh texels through a kind-5 texture-space packet
    shared.cmdfifo.configure(0x1_0000, 0x2_0000);
    shared.cmdfifo.set_enabled(true);
    let stream = [(2 << 30) | (1 << 3) | 5, 0, 0x2222_2222];
    for (i, word) in stream.iter().enumerate() {
        shared
            .cmdfifo
            .write(&shared.mem, 0x1_0000 + 4 * i as u32, *word);
    }
    let sh = Arc::clone(&shared);
    assert!(sh
        .cmdfifo
        .process_packet(&sh.mem, &sh.shutdown, |e| dispatcher.apply_event(e)));

    // The next bind must rebuild from RAM, not serve the cached texels
    let fresh = dispatcher.build_snapshot().texture.clone().unwrap();
    assert!(!Arc::ptr_eq(&stale, &fresh));
    assert_eq!(&fresh.data[..4], &[0x22, 0x22, 0x22, 0x22]);
}

#[test]
fn test_2d_rect_fill() {
    let (shared, handle) = pipeline(2);

    reg2d_write(&shared, reg2d::DST_BASE as u32, 0);
    reg2d_write(&shared, reg2d::DST_FORMAT as u32, PITCH);
    reg2d_write(&shared, reg2d::COLOR_FORE as u32, 0x00FF_FFFF);
    reg2d_write(&shared, reg2d::DST_XY as u32, (1 << 16) | 1);
    reg2d_write(&shared, reg2d::DST_SIZE as u32, (2 << 16) | 2);
    reg2d_write(&shared, reg2d::COMMAND as u32, 1);
    shared.flush();

    // 2x2 rect at (1,1) in buffer 0
    assert_eq!(shared.mem.fb_read_u16(PITCH + 2), 0xFFFF);
    assert_eq!(shared.mem.fb_read_u16(2 * PITCH + 4), 0xFFFF);
    assert_eq!(shared.mem.fb_read_u16(0), 0);
    assert_eq!(shared.mem.fb_read_u16(3 * PITCH + 2), 0);

    shared.stop();
    handle.join().unwrap();
}

#[test]
fn test_fb_write_entries_update_memory() {
    let (shared, handle) = pipeline(2);

    shared.queue.enqueue(CommandEntry {
        kind: EntryKind::FbWriteLong,
        addr: 0x8_0000,
        value: 0x0102_0304,
    });
    shared.queue.enqueue(CommandEntry {
        kind: EntryKind::FbWriteByte,
        addr: 0x8_0004,
        value: 0xEE,
    });
    shared.queue.enqueue(CommandEntry {
        kind: EntryKind::TexWriteLong,
        addr: 0x100,
        value: 0xDEAD_BEEF,
    });
    shared.flush();

    assert_eq!(shared.mem.fb_read_u32(0x8_0000), 0x0102_0304);
    assert_eq!(shared.mem.fb_read_u8(0x8_0004), 0xEE);
    assert_eq!(shared.mem.tex_read_u16(0x100), 0xBEEF);

    shared.stop();
    handle.join().unwrap();
}

#[test]
fn test_fixed12_4_decoding() {
    assert_eq!(fixed12_4(0), 0.0);
    assert_eq!(fixed12_4(16), 1.0);
    assert_eq!(fixed12_4(0x18), 1.5);
    // Negative coordinates sign-extend from bit 15
    assert_eq!(fixed12_4(0xFFF0), -1.0);
}
