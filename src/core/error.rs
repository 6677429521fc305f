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

/// Emulator error types
use thiserror::Error;

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Main error type for the emulator
///
/// The modeled accelerator has no guest-visible fault path: malformed guest
/// input is clamped or dropped silently, and backpressure is resolved by
/// blocking. These errors therefore only cover the embedder-facing surface
/// (configuration, file I/O, device construction).
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Pipeline-specific error types
///
/// Raised only while building a device, never during command processing.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid worker count: {count} (must be 1 or 2)")]
    InvalidWorkerCount { count: usize },

    #[error("Invalid queue capacity: {capacity} (must be a power of two >= 64)")]
    InvalidQueueCapacity { capacity: usize },

    #[error("Invalid resolution: {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    #[error("Invalid buffer count: {count} (must be 2 or 3)")]
    InvalidBufferCount { count: u32 },

    #[error("Framebuffer memory too small: {got} bytes (need {need})")]
    FramebufferTooSmall { got: usize, need: usize },
}
