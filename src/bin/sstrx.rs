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

use std::fs::File;
use std::io::Write;

use clap::Parser;
use log::info;

use sstrx::core::config::DeviceConfig;
use sstrx::core::device::Device;
use sstrx::core::dispatch::reg;
use sstrx::core::error::Result;
use sstrx::core::sli::SliBridge;
use sstrx::core::swap::VBLANK_LINES;

/// 3dfx Voodoo-style accelerator pipeline demo
#[derive(Parser)]
#[command(name = "sstrx")]
#[command(about = "3D accelerator command-pipeline emulator", long_about = None)]
struct Args {
    /// Path to a TOML device configuration (defaults used when omitted)
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Emulate a two-board SLI pair
    #[arg(long)]
    sli: bool,

    /// Write the final frame to this PPM file
    #[arg(short = 'o', long, default_value = "frame.ppm")]
    output: String,
}

/// One logical device, single board or SLI pair
enum Board {
    Single(Device),
    Pair(SliBridge),
}

impl Board {
    fn write_register(&self, index: u32, value: u32) {
        match self {
            Board::Single(d) => d.write_register(index, value),
            Board::Pair(p) => p.write_register(index, value),
        }
    }

    fn write_fb_u32(&self, addr: u32, value: u32) {
        match self {
            Board::Single(d) => d.write_fb_u32(addr, value),
            Board::Pair(p) => p.write_fb_u32(addr, value),
        }
    }

    fn read_status(&self) -> u32 {
        match self {
            Board::Single(d) => d.read_status(),
            Board::Pair(p) => p.read_status(),
        }
    }

    fn scanline_tick(&self) {
        match self {
            Board::Single(d) => d.scanline_tick(),
            Board::Pair(p) => p.scanline_tick(),
        }
    }

    fn flush(&self) {
        match self {
            Board::Single(d) => d.flush(),
            Board::Pair(p) => p.flush(),
        }
    }

    fn framebuffer_rgb24(&self) -> Vec<u8> {
        match self {
            Board::Single(d) => d.framebuffer_rgb24(),
            Board::Pair(p) => p.combined_framebuffer_rgb24(),
        }
    }
}

fn main() -> Result<()> {
    // Load .env file if present (for development configuration)
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize logger with default level INFO
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("sstrx v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => DeviceConfig::load(path)?,
        None => DeviceConfig::default(),
    };
    let (width, height) = (config.width, config.height);

    let board = if args.sli {
        Board::Pair(SliBridge::new(config)?)
    } else {
        Board::Single(Device::new(config)?)
    };

    // Clear the back buffer through the register path
    board.write_register(reg::COLOR1, 0x0018_1830);
    board.write_register(reg::FASTFILL_CMD, 0);

    // A flat red triangle through the register path (12.4 fixed point)
    board.write_register(reg::COLOR0, 0x00E0_3020);
    board.write_register(reg::VERTEX_AX, 60 << 4);
    board.write_register(reg::VERTEX_AY, 40 << 4);
    board.write_register(reg::VERTEX_BX, 320 << 4);
    board.write_register(reg::VERTEX_BY, 400 << 4);
    board.write_register(reg::VERTEX_CX, 580 << 4);
    board.write_register(reg::VERTEX_CY, 60 << 4);
    board.write_register(reg::TRIANGLE_CMD, 0);

    // A two-triangle strip through the CmdFifo path
    let window = 0x30_0000;
    board.write_register(reg::CMDFIFO_BASE, window);
    board.write_register(reg::CMDFIFO_END, window + 0x1_0000);
    board.write_register(reg::CMDFIFO_CTRL, 1);

    // Kind 3, strip mode, 4 vertices, packed RGBA per vertex
    let header = 3 | (1 << 3) | (4 << 6) | (1 << 12);
    let quad = [
        (120.0f32, 300.0f32, 0x0020_C040u32),
        (120.0, 440.0, 0x0020_C040),
        (300.0, 300.0, 0x00F0_D030),
        (300.0, 440.0, 0x00F0_D030),
    ];
    let mut stream = vec![header];
    for (x, y, rgba) in quad {
        stream.push(x.to_bits());
        stream.push(y.to_bits());
        stream.push(rgba);
    }
    for (i, word) in stream.iter().enumerate() {
        board.write_fb_u32(window + 4 * i as u32, *word);
    }

    // Render everything, then swap the finished frame onto the display
    board.flush();
    board.write_register(reg::SWAPBUFFER_CMD, 0);
    board.flush();
    // One frame of display timing, for the vblank phase in the status word
    for _ in 0..(height + VBLANK_LINES) {
        board.scanline_tick();
    }

    info!("status word: {:08X}", board.read_status());

    let frame = board.framebuffer_rgb24();
    let mut file = File::create(&args.output)?;
    write!(file, "P6\n{} {}\n255\n", width, height)?;
    file.write_all(&frame)?;
    info!("wrote {}x{} frame to {}", width, height, args.output);

    Ok(())
}
