//! NES APU (Audio Processing Unit) Emulation.
//!
//! This crate provides a cycle-accurate implementation of the NES 2A03 APU,
//! which generates all audio for the NES. The APU contains five channels:
//!
//! - **Pulse 1 & 2**: Square wave generators with variable duty cycle
//! - **Triangle**: Triangle wave generator (fixed volume)
//! - **Noise**: Pseudo-random noise generator
//! - **DMC**: Delta modulation channel for sample playback
//!
//! # Architecture
//!
//! The APU runs at half the CPU clock rate. Each channel has its own
//! timer, and most have envelope and length counter units for volume
//! and duration control.
//!
//! The frame counter provides timing signals for envelope, length counter,
//! and sweep updates at specific cycle intervals.
//!
//! # Example
//!
//! ```no_run
//! use nescore_apu::Apu;
//!
//! let mut apu = Apu::new();
//!
//! // Enable pulse channel 1
//! apu.write(0x4015, 0x01);
//!
//! // Configure pulse 1: 50% duty, constant volume 15
//! apu.write(0x4000, 0xBF);
//! apu.write(0x4002, 0xFD); // Timer low
//! apu.write(0x4003, 0x00); // Timer high + length counter
//!
//! // Clock the APU
//! for _ in 0..29780 {
//!     apu.clock();
//!     let sample = apu.output(); // 0.0 to 1.0
//! }
//! ```
//!
//! # no_std Support
//!
//! This crate supports `no_std` environments with the `alloc` crate.
//! Enable the `std` feature (enabled by default) for standard library support.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

mod apu;
mod dmc;
mod envelope;
mod frame_counter;
mod length_counter;
pub mod mixer;
mod noise;
mod pulse;
#[cfg(feature = "std")]
pub mod resampler;
mod sweep;
mod timer;
mod triangle;

pub use apu::Apu;
pub use dmc::Dmc;
pub use envelope::Envelope;
pub use frame_counter::{FrameCounter, FrameCounterMode, FrameEvent};
pub use length_counter::LengthCounter;
pub use mixer::Mixer;
pub use noise::Noise;
pub use pulse::Pulse;
#[cfg(feature = "std")]
pub use resampler::HighQualityResampler;
pub use sweep::{PulseChannel, Sweep};
pub use timer::Timer;
pub use triangle::Triangle;

/// NTSC CPU clock rate in Hz.
pub const CPU_CLOCK_NTSC: u32 = 1_789_773;

/// PAL CPU clock rate in Hz.
pub const CPU_CLOCK_PAL: u32 = 1_662_607;

/// NTSC APU sample rate (before resampling).
/// This is the CPU clock rate since we sample every CPU cycle.
pub const APU_SAMPLE_RATE_NTSC: u32 = CPU_CLOCK_NTSC;

/// Cycles per frame (NTSC).
pub const CYCLES_PER_FRAME_NTSC: u32 = 29780;

/// Cycles per frame (PAL).
pub const CYCLES_PER_FRAME_PAL: u32 = 33247;
