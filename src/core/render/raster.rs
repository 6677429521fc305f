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

//! Scanline rasterization
//!
//! Flat-shaded triangle fill using the classic split-at-the-middle-vertex
//! scanline walk: sort vertices by Y, split into a flat-bottom and a
//! flat-top half, interpolate the left/right edge X per row. Each worker
//! runs the same walk but only touches rows it owns, so two workers never
//! contend for a scanline.
//!
//! Degenerate triangles (zero height) are dropped and out-of-range clip
//! rectangles clamp silently - the modeled hardware has no fault path for
//! either, so none is invented here.

use std::sync::Arc;

use crate::core::memory::DeviceMemory;
use crate::core::texture::TextureCacheEntry;

/// Inclusive-left, exclusive-right clip rectangle in buffer coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Immutable raster-parameter snapshot
///
/// Built by the dispatcher and published to workers as `Arc<RasterState>`;
/// a published snapshot is never mutated, so a worker can never observe a
/// half-written one. A bound texture rides along as another `Arc`, which
/// doubles as its in-flight reference count.
#[derive(Debug, Clone)]
pub struct RasterState {
    /// Flat shading color (packed ARGB)
    pub color0: u32,
    /// Fast-fill color (packed ARGB)
    pub color1: u32,
    pub clip: ClipRect,
    pub fbz_mode: u32,
    pub fog_mode: u32,
    pub fog_color: u32,
    pub alpha_mode: u32,
    pub za_color: u32,
    /// Byte offset of the draw buffer in framebuffer RAM
    pub draw_offset: u32,
    /// Bytes per framebuffer row
    pub row_pitch: u32,
    pub width: u32,
    pub height: u32,
    /// Texture bound for this job, if any
    pub texture: Option<Arc<TextureCacheEntry>>,
}

/// One screen-space vertex
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
}

/// Convert packed ARGB to the framebuffer's RGB565 format
pub fn argb_to_rgb565(argb: u32) -> u16 {
    let r = (argb >> 16) & 0xFF;
    let g = (argb >> 8) & 0xFF;
    let b = argb & 0xFF;
    (((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3)) as u16
}

/// Clamp the snapshot's clip rectangle to the buffer bounds
fn clamped_clip(state: &RasterState) -> ClipRect {
    ClipRect {
        left: state.clip.left.min(state.width),
        top: state.clip.top.min(state.height),
        right: state.clip.right.min(state.width),
        bottom: state.clip.bottom.min(state.height),
    }
}

#[inline(always)]
fn write_pixel(mem: &DeviceMemory, state: &RasterState, x: u32, y: u32, color: u16) {
    let addr = state.draw_offset + y * state.row_pitch + x * 2;
    mem.fb_write_u16(addr, color);
}

/// Fill the clip rectangle with `color`, visiting only owned rows
///
/// Returns the number of rows this caller filled.
pub fn fill_rect<F>(mem: &DeviceMemory, state: &RasterState, color: u32, owns_row: F) -> u32
where
    F: Fn(u32) -> bool,
{
    let clip = clamped_clip(state);
    let color = argb_to_rgb565(color);
    let mut rows = 0;

    for y in clip.top..clip.bottom {
        if !owns_row(y) {
            continue;
        }
        for x in clip.left..clip.right {
            write_pixel(mem, state, x, y, color);
        }
        rows += 1;
    }
    rows
}

/// Rasterize a flat-shaded triangle, visiting only owned rows
///
/// Returns the number of rows this caller touched.
pub fn fill_triangle<F>(
    mem: &DeviceMemory,
    state: &RasterState,
    verts: &[Vertex; 3],
    color: u32,
    owns_row: F,
) -> u32
where
    F: Fn(u32) -> bool,
{
    // Sort by Y so v0.y <= v1.y <= v2.y
    let mut v = *verts;
    if v[0].y > v[1].y {
        v.swap(0, 1);
    }
    if v[1].y > v[2].y {
        v.swap(1, 2);
    }
    if v[0].y > v[1].y {
        v.swap(0, 1);
    }

    let y_top = v[0].y.ceil() as i64;
    let y_bot = v[2].y.ceil() as i64;
    if y_top >= y_bot {
        // Zero-height triangle: dropped, no fault path
        return 0;
    }

    let clip = clamped_clip(state);
    let color = argb_to_rgb565(color);
    let mut rows = 0;

    // Long edge runs v0 -> v2; the short edges are v0 -> v1 and v1 -> v2
    let long_dxdy = (v[2].x - v[0].x) / (v[2].y - v[0].y);

    for y in y_top.max(clip.top as i64)..y_bot.min(clip.bottom as i64) {
        let fy = y as f32;
        if !owns_row(y as u32) {
            continue;
        }

        let long_x = v[0].x + (fy - v[0].y) * long_dxdy;
        let short_x = if fy < v[1].y {
            if v[1].y - v[0].y <= f32::EPSILON {
                v[1].x
            } else {
                v[0].x + (fy - v[0].y) * ((v[1].x - v[0].x) / (v[1].y - v[0].y))
            }
        } else if v[2].y - v[1].y <= f32::EPSILON {
            v[1].x
        } else {
            v[1].x + (fy - v[1].y) * ((v[2].x - v[1].x) / (v[2].y - v[1].y))
        };

        let (mut xl, mut xr) = if long_x <= short_x {
            (long_x, short_x)
        } else {
            (short_x, long_x)
        };
        xl = xl.max(clip.left as f32);
        xr = xr.min(clip.right as f32);

        let xl = xl.ceil() as i64;
        let xr = xr.ceil() as i64;
        if xl >= xr {
            continue;
        }

        for x in xl..xr {
            write_pixel(mem, state, x as u32, y as u32, color);
        }
        rows += 1;
    }
    rows
}
