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

//! Texture cache
//!
//! Decoded texture data is cached per base address so repeated binds do not
//! re-read texture RAM. Guest writes into texture RAM set bits in a
//! per-4KiB-region dirty bitmap; a bind whose backing range intersects a
//! dirty region rebuilds the entry from RAM.
//!
//! Entries are handed out as `Arc<TextureCacheEntry>`: the strong count is
//! the in-flight reference count, so an entry bound to a render job that a
//! worker is still rasterizing can never be evicted out from under it.
//! Eviction only considers entries whose strong count has dropped back to
//! the cache's own reference.

use std::collections::HashMap;
use std::sync::Arc;

use super::config::TEX_MEM_SIZE;
use super::memory::DeviceMemory;


/// Dirty-tracking granularity over texture RAM
const REGION_SIZE: usize = 4096;

/// Maximum cached entries before eviction kicks in
const CACHE_CAPACITY: usize = 16;

/// One cached texture
#[derive(Debug)]
pub struct TextureCacheEntry {
    /// Base address in texture RAM
    pub base: u32,
    /// Raw mode register value the entry was decoded under
    pub mode: u32,
    pub width: u32,
    pub height: u32,
    /// Texel data copied out of texture RAM (16 bpp)
    pub data: Vec<u8>,
}

/// Per-region dirty bitmap over texture RAM
struct DirtyBitmap {
    bits: Vec<u64>,
}

impl DirtyBitmap {
    fn new() -> Self {
        Self {
            bits: vec![0; TEX_MEM_SIZE / REGION_SIZE / 64],
        }
    }

    fn mark(&mut self, addr: u32) {
        let region = (addr as usize % TEX_MEM_SIZE) / REGION_SIZE;
        self.bits[region / 64] |= 1 << (region % 64);
    }

    /// Regions covered by `[base, base + len)`; a range crossing the end of
    /// texture RAM wraps around, the same way the backing addresses do
    fn regions(base: u32, len: usize) -> impl Iterator<Item = usize> {
        const TOTAL: usize = TEX_MEM_SIZE / REGION_SIZE;
        let first = (base as usize % TEX_MEM_SIZE) / REGION_SIZE;
        let count = ((base as usize % REGION_SIZE) + len.max(1))
            .div_ceil(REGION_SIZE)
            .min(TOTAL);
        (0..count).map(move |i| (first + i) % TOTAL)
    }

    fn any_dirty(&self, base: u32, len: usize) -> bool {
        Self::regions(base, len).any(|region| self.bits[region / 64] & (1 << (region % 64)) != 0)
    }

    fn clear(&mut self, base: u32, len: usize) {
        for region in Self::regions(base, len) {
            self.bits[region / 64] &= !(1 << (region % 64));
        }
    }
}

/// Texture cache, owned by the dispatcher thread
pub struct TextureCache {
    entries: HashMap<u32, Arc<TextureCacheEntry>>,
    /// Bind order, oldest first (eviction order)
    lru: Vec<u32>,
    dirty: DirtyBitmap,
}

impl TextureCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            lru: Vec::new(),
            dirty: DirtyBitmap::new(),
        }
    }

    /// Record a guest write into texture RAM
    pub fn mark_write(&mut self, addr: u32) {
        self.dirty.mark(addr);
    }

    /// Texture dimensions encoded in the mode register (log2 in the low
    /// byte, capped at 256x256)
    fn decode_dims(mode: u32) -> (u32, u32) {
        let w = 1u32 << (mode & 0xF).min(8);
        let h = 1u32 << ((mode >> 4) & 0xF).min(8);
        (w, h)
    }

    /// Bind the texture at `base`, rebuilding from texture RAM when the
    /// backing range has been written since the last decode
    pub fn bind(&mut self, mem: &DeviceMemory, base: u32, mode: u32) -> Arc<TextureCacheEntry> {
        let (width, height) = Self::decode_dims(mode);
        let len = (width * height * 2) as usize;

        let stale = match self.entries.get(&base) {
            Some(entry) => entry.mode != mode || self.dirty.any_dirty(base, len),
            None => true,
        };

        if stale {
            let data = (0..len)
                .map(|i| mem.tex_read_u8(base.wrapping_add(i as u32)))
                .collect();
            let entry = Arc::new(TextureCacheEntry {
                base,
                mode,
                width,
                height,
                data,
            });
            self.dirty.clear(base, len);
            if self.entries.insert(base, entry).is_none() {
                log::debug!("texture cache: new entry at {base:06X} ({width}x{height})");
            }
        }

        // Refresh LRU position
        self.lru.retain(|&b| b != base);
        self.lru.push(base);
        self.evict_over_capacity();

        Arc::clone(&self.entries[&base])
    }

    /// Evict least-recently-bound entries beyond capacity
    ///
    /// Entries still referenced by an in-flight job (strong count above the
    /// cache's own) are skipped; the cache runs over capacity until those
    /// jobs retire.
    fn evict_over_capacity(&mut self) {
        while self.entries.len() > CACHE_CAPACITY {
            let victim = self
                .lru
                .iter()
                .copied()
                .find(|base| Arc::strong_count(&self.entries[base]) == 1);
            match victim {
                Some(base) => {
                    self.entries.remove(&base);
                    self.lru.retain(|&b| b != base);
                    log::debug!("texture cache: evicted {base:06X}");
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new()
    }
}
