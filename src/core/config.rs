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

//! Device configuration
//!
//! Display timing (resolution, refresh) is owned by the external scanout;
//! the values here only size the buffers the pipeline renders into and
//! select the pipeline topology (worker count, SLI, queue capacity).

use std::path::Path;

use serde::Deserialize;

use super::error::{EmulatorError, PipelineError, Result};

/// Framebuffer RAM size in bytes (4MB, Voodoo2-class board)
pub const FB_MEM_SIZE: usize = 4 * 1024 * 1024;

/// Texture RAM size in bytes (4MB)
pub const TEX_MEM_SIZE: usize = 4 * 1024 * 1024;

/// Device configuration
///
/// Deserializable from TOML; every field has a default so a partial config
/// file (or none at all) is valid.
///
/// # Examples
///
/// ```
/// use sstrx::core::config::DeviceConfig;
///
/// let config = DeviceConfig::default();
/// assert_eq!(config.width, 640);
/// assert_eq!(config.render_workers, 2);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Horizontal resolution of the render buffers in pixels
    pub width: u32,

    /// Vertical resolution of the render buffers in pixels
    pub height: u32,

    /// Number of display buffers (2 = double buffered, 3 = triple)
    pub buffer_count: u32,

    /// Number of render worker threads (1 or 2)
    pub render_workers: usize,

    /// Ring queue capacity in entries (power of two)
    pub queue_capacity: usize,

    /// Number of retraces a pending swap waits for before committing
    pub swap_interval: u32,

    /// Scanline-interleave (SLI) pairing: this board is half of a two-board
    /// logical device
    pub sli: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            buffer_count: 2,
            render_workers: 2,
            queue_capacity: 8192,
            swap_interval: 1,
            sli: false,
        }
    }
}

impl DeviceConfig {
    /// Load a configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, not valid TOML,
    /// or fails [`DeviceConfig::validate`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EmulatorError::ConfigNotFound(path.display().to_string()));
        }

        let text = std::fs::read_to_string(path)?;
        let config: DeviceConfig = toml::from_str(&text)?;
        config.validate()?;

        log::info!(
            "Loaded device config: {}x{}, {} buffers, {} workers{}",
            config.width,
            config.height,
            config.buffer_count,
            config.render_workers,
            if config.sli { ", SLI" } else { "" }
        );

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.render_workers == 0 || self.render_workers > 2 {
            return Err(PipelineError::InvalidWorkerCount {
                count: self.render_workers,
            }
            .into());
        }

        if self.queue_capacity < 64 || !self.queue_capacity.is_power_of_two() {
            return Err(PipelineError::InvalidQueueCapacity {
                capacity: self.queue_capacity,
            }
            .into());
        }

        if self.width == 0 || self.height == 0 || self.width > 2048 || self.height > 2048 {
            return Err(PipelineError::InvalidResolution {
                width: self.width,
                height: self.height,
            }
            .into());
        }

        if self.buffer_count < 2 || self.buffer_count > 3 {
            return Err(PipelineError::InvalidBufferCount {
                count: self.buffer_count,
            }
            .into());
        }

        // All buffers (plus the depth/aux buffer) must fit in framebuffer RAM
        let need = self.buffer_stride() * (self.buffer_count as usize + 1);
        if need > FB_MEM_SIZE {
            return Err(PipelineError::FramebufferTooSmall {
                got: FB_MEM_SIZE,
                need,
            }
            .into());
        }

        Ok(())
    }

    /// Byte size of one render buffer (16 bpp, row-aligned to 128 bytes)
    pub fn buffer_stride(&self) -> usize {
        let row = (self.width as usize * 2).next_multiple_of(128);
        row * self.height as usize
    }

    /// Byte offset of buffer `index` in framebuffer RAM
    pub fn buffer_offset(&self, index: u32) -> u32 {
        (self.buffer_stride() * index as usize) as u32
    }

    /// Bytes per framebuffer row (including alignment padding)
    pub fn row_pitch(&self) -> usize {
        (self.width as usize * 2).next_multiple_of(128)
    }
}
