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

//! Device facade tests

use super::*;

use std::time::{Duration, Instant};

fn test_device() -> Device {
    let config = DeviceConfig {
        width: 64,
        height: 64,
        queue_capacity: 64,
        ..DeviceConfig::default()
    };
    Device::new(config).unwrap()
}

fn wait_until<F: Fn() -> bool>(cond: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = DeviceConfig {
        render_workers: 0,
        ..DeviceConfig::default()
    };
    assert!(Device::new(config).is_err());
}

#[test]
fn test_status_free_space_saturates() {
    let device = test_device();
    // 64 free slots clamp into the 6-bit field
    assert_eq!(device.read_status() & 0x3F, 0x3F);
}

#[test]
fn test_status_busy_clears_after_flush() {
    let device = test_device();

    device.write_register(reg::COLOR1, 0x0000_00FF);
    device.write_register(reg::FASTFILL_CMD, 0);
    device.flush();

    assert_eq!(device.read_status() & (1 << 7), 0);
}

#[test]
fn test_status_read_kicks_the_dispatcher() {
    let device = test_device();

    device.write_fb_u8(0x8_0000, 0x5A);
    // No flush: the forced wake from polling must be enough to drain
    wait_until(|| {
        device.read_status();
        device.read_status() & (1 << 7) == 0
    });
    assert_eq!(device.memory().fb_read_u8(0x8_0000), 0x5A);
}

#[test]
fn test_status_vblank_phase() {
    let device = test_device();
    assert_eq!(device.read_status() & (1 << 6), 0);

    for _ in 0..64 {
        device.scanline_tick();
    }
    assert_ne!(device.read_status() & (1 << 6), 0);

    for _ in 0..crate::core::swap::VBLANK_LINES {
        device.scanline_tick();
    }
    assert_eq!(device.read_status() & (1 << 6), 0);
}

#[test]
fn test_status_pending_swap_field() {
    let device = test_device();

    device.write_register(reg::SWAPBUFFER_CMD, 0);
    device.write_register(reg::SWAPBUFFER_CMD, 0);
    wait_until(|| device.pending_swaps() == 2);

    assert_eq!((device.read_status() >> 28) & 7, 2);

    device.flush();
    assert_eq!((device.read_status() >> 28) & 7, 0);
}

#[test]
fn test_framebuffer_rgb24_export() {
    let device = test_device();

    device.write_register(reg::COLOR1, 0x0000_00FF);
    device.write_register(reg::FASTFILL_CMD, 0);
    device.write_register(reg::SWAPBUFFER_CMD, 0);
    device.flush();

    // The filled buffer is now on display
    assert_eq!(device.display_offset(), 128 * 64);
    let rgb = device.framebuffer_rgb24();
    assert_eq!(rgb.len(), 64 * 64 * 3);
    assert_eq!(&rgb[..3], &[0, 0, 255]);
}

#[test]
fn test_fb_window_write_feeds_cmdfifo() {
    let device = test_device();

    device.write_register(reg::CMDFIFO_BASE, 0x1_0000);
    device.write_register(reg::CMDFIFO_END, 0x2_0000);
    device.write_register(reg::CMDFIFO_CTRL, 1);

    // A NOP packet through the window
    device.write_fb_u32(0x1_0000, 0);
    device.flush();

    let (rd, wr) = device.shared().cmdfifo.depths();
    assert_eq!((rd, wr), (1, 1));

    // A write outside the window is a plain memory write
    device.write_fb_u32(0x8_0000, 0x1234_5678);
    device.flush();
    assert_eq!(device.memory().fb_read_u32(0x8_0000), 0x1234_5678);
}

#[test]
fn test_cmdfifo_disable_gates_admission() {
    let device = test_device();

    device.write_register(reg::CMDFIFO_BASE, 0x1_0000);
    device.write_register(reg::CMDFIFO_END, 0x2_0000);
    device.write_register(reg::CMDFIFO_CTRL, 1);
    device.write_register(reg::CMDFIFO_CTRL, 0);

    // With the gate closed the window is ordinary framebuffer RAM
    device.write_fb_u32(0x1_0000, 0xAABB_CCDD);
    device.flush();

    assert_eq!(device.memory().fb_read_u32(0x1_0000), 0xAABB_CCDD);
    let (rd, wr) = device.shared().cmdfifo.depths();
    assert_eq!((rd, wr), (0, 0));
}

#[test]
fn test_drop_joins_cleanly_with_work_in_flight() {
    let device = test_device();
    device.write_register(reg::COLOR1, 0x00FF_FFFF);
    device.write_register(reg::FASTFILL_CMD, 0);
    drop(device);
}
