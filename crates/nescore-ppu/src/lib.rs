//! NES 2C02 PPU (Picture Processing Unit) emulation.
//!
//! This crate provides a cycle-accurate implementation of the NES PPU,
//! responsible for all graphics rendering.
//!
//! # Overview
//!
//! The PPU operates at 3x the CPU clock rate and generates a 256x240 pixel
//! image. It consists of several subsystems:
//!
//! - **Registers**: Control, Mask, Status, OAM Address, Scroll, Address, Data
//! - **Background rendering**: Nametables, pattern tables, attribute tables
//! - **Sprite rendering**: OAM, sprite evaluation, sprite 0 hit detection
//! - **Palette**: 32-byte palette RAM with mirroring
//!
//! # Timing
//!
//! NTSC timing (the primary target):
//! - Master clock: 21.477272 MHz
//! - PPU clock: 5.369318 MHz (master / 4)
//! - 341 dots per scanline
//! - 262 scanlines per frame
//! - 89,341-89,342 dots per frame (odd frame skip)
//!
//! # Usage
//!
//! ```no_run
//! use nescore_ppu::{Mirroring, Ppu};
//!
//! let mut ppu = Ppu::new(Mirroring::Horizontal);
//!
//! // Step the PPU once per dot (call 3 times per CPU cycle for NTSC),
//! // supplying a callback that resolves pattern-table (CHR) reads via the
//! // cartridge mapper.
//! let (frame_complete, nmi) = ppu.step_with_chr(|addr| 0);
//! if nmi {
//!     // Trigger NMI in CPU
//! }
//!
//! // Access registers from CPU
//! ppu.write_register(0x2000, 0x80, |_, _| {}); // Enable NMI
//! let status = ppu.read_register(0x2002, |_| 0);
//! ```
//!
//! # Features
//!
//! - `serde`: Enable serialization support for save states

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod background;
mod oam;
mod ppu;
mod registers;
mod scroll;
mod sprites;
mod timing;
mod vram;

pub use oam::{Oam, SecondaryOam, Sprite, SpriteAttributes};
pub use ppu::{FRAME_HEIGHT, FRAME_SIZE, FRAME_WIDTH, Ppu};
pub use registers::{PpuCtrl, PpuMask, PpuStatus};
pub use scroll::ScrollRegisters;
pub use vram::Mirroring;
