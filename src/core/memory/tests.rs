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

//! Device memory tests

use super::*;
use crate::core::config::FB_MEM_SIZE;

#[test]
fn test_fb_read_write_roundtrip() {
    let mem = DeviceMemory::new();

    mem.fb_write_u32(0x1000, 0xDEADBEEF);
    assert_eq!(mem.fb_read_u32(0x1000), 0xDEADBEEF);

    // Little-endian byte order
    assert_eq!(mem.fb_read_u8(0x1000), 0xEF);
    assert_eq!(mem.fb_read_u8(0x1003), 0xDE);
}

#[test]
fn test_fb_u16_access() {
    let mem = DeviceMemory::new();

    mem.fb_write_u16(0x200, 0xABCD);
    assert_eq!(mem.fb_read_u16(0x200), 0xABCD);
    assert_eq!(mem.fb_read_u8(0x200), 0xCD);
    assert_eq!(mem.fb_read_u8(0x201), 0xAB);
}

#[test]
fn test_fb_address_wraps() {
    let mem = DeviceMemory::new();

    // Out-of-range addresses wrap to the bank size; no fault path exists
    mem.fb_write_u8(FB_MEM_SIZE as u32 + 4, 0x5A);
    assert_eq!(mem.fb_read_u8(4), 0x5A);
}

#[test]
fn test_fb_write_straddling_end_wraps_per_byte() {
    let mem = DeviceMemory::new();
    let end = FB_MEM_SIZE as u32 - 2;

    mem.fb_write_u32(end, 0x44332211);
    assert_eq!(mem.fb_read_u8(end), 0x11);
    assert_eq!(mem.fb_read_u8(end + 1), 0x22);
    assert_eq!(mem.fb_read_u8(0), 0x33);
    assert_eq!(mem.fb_read_u8(1), 0x44);
}

#[test]
fn test_tex_bank_is_independent() {
    let mem = DeviceMemory::new();

    mem.fb_write_u32(0x40, 0x11111111);
    mem.tex_write_u32(0x40, 0x22222222);

    assert_eq!(mem.fb_read_u32(0x40), 0x11111111);
    assert_eq!(mem.tex_read_u8(0x40), 0x22);
}

#[test]
fn test_fb_copy_out() {
    let mem = DeviceMemory::new();
    mem.fb_write_u32(0x80, 0x04030201);

    let bytes = mem.fb_copy_out(0x80, 4);
    assert_eq!(bytes, vec![0x01, 0x02, 0x03, 0x04]);
}
