//! NesCore Core - NES Emulation Integration Layer.
//!
//! This crate provides the high-level NES emulation API, integrating the CPU,
//! PPU, APU, and mapper components into a complete console emulator.
//!
//! # Architecture
//!
//! The core crate connects all NES components through a central bus:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Console                              │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │                      NesBus                          │   │
//! │  │  ┌─────┐  ┌─────┐  ┌─────┐  ┌────────┐  ┌────────┐ │   │
//! │  │  │ RAM │  │ PPU │  │ APU │  │ Mapper │  │ Input  │ │   │
//! │  │  │ 2KB │  │     │  │     │  │        │  │        │ │   │
//! │  │  └─────┘  └─────┘  └─────┘  └────────┘  └────────┘ │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                          ▲                                  │
//! │                          │                                  │
//! │                     ┌────┴────┐                             │
//! │                     │   CPU   │                             │
//! │                     │  6502   │                             │
//! │                     └─────────┘                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use nescore_core::{Console, ControllerState};
//!
//! // Load a ROM file
//! let rom_data = std::fs::read("game.nes").expect("Failed to read ROM");
//! let mut console = Console::new(&rom_data).expect("Failed to create console");
//!
//! // Power on and run
//! console.power_on();
//!
//! loop {
//!     // Set controller input
//!     let mut input = ControllerState::default();
//!     input.buttons = ControllerState::A | ControllerState::START;
//!     console.set_controller1(input);
//!
//!     // Run one frame
//!     console.step_frame();
//!
//!     // Get framebuffer for display (256x240 RGBA)
//!     let _framebuffer = console.framebuffer();
//!
//!     // Get audio samples
//!     let _audio = console.take_audio();
//! }
//! ```
//!
//! # Features
//!
//! - `std` (default): Enable standard library support
//! - `serde`: Enable serialization for save states

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod audio_queue;
mod bus;
mod console;
mod filters;
pub mod palette;
pub mod save_state;

// Re-export main types
pub use audio_queue::AudioQueue;
pub use bus::{ControllerState, NesBus, Zapper};
pub use console::{Console, ConsoleError, timing};
pub use save_state::SaveStateError;

// Re-export commonly used types from dependencies
pub use nescore_apu::Apu;
pub use nescore_cpu::Cpu;
pub use nescore_mappers::{Mapper, Mirroring, Rom, RomError, RomHeader, create_mapper};
pub use nescore_ppu::Ppu;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// NES screen dimensions.
pub mod screen {
    /// Screen width in pixels.
    pub const WIDTH: u32 = 256;
    /// Screen height in pixels.
    pub const HEIGHT: u32 = 240;
    /// Total pixels per frame.
    pub const PIXELS: u32 = WIDTH * HEIGHT;
    /// Bytes per frame (RGBA).
    pub const FRAMEBUFFER_SIZE: usize = (PIXELS * 4) as usize;
}
