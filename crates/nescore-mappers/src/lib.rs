//! NES Cartridge Mapper Implementations.
//!
//! This crate provides mapper implementations for NES cartridge emulation.
//! Mappers handle memory banking for PRG-ROM, CHR-ROM/RAM, and provide
//! various hardware features like IRQ generation.
//!
//! # Supported Mappers
//!
//! | Mapper | Name | Description |
//! |--------|------|-------------|
//! | 0 | NROM | No banking, simplest mapper |
//! | 1 | MMC1 | Nintendo's first bank-switching mapper |
//! | 2 | UxROM | PRG-ROM banking only |
//! | 3 | CNROM | CHR-ROM banking only |
//! | 4 | MMC3 | Most popular, fine-grained banking + IRQ |
//! | 66 | GxROM | 32KB PRG bank + 8KB CHR bank select |
//!
//! # Example
//!
//! ```no_run
//! use nescore_mappers::{Rom, create_mapper};
//!
//! // Load ROM from file
//! let rom_data = std::fs::read("game.nes").expect("Failed to read ROM");
//! let rom = Rom::load(&rom_data).expect("Failed to parse ROM");
//!
//! // Create appropriate mapper
//! let mut mapper = create_mapper(&rom).expect("Unsupported mapper");
//!
//! // Use mapper for memory access
//! let opcode = mapper.read_prg(0x8000);
//! let tile = mapper.read_chr(0x0000);
//! ```
//!
//! # no_std Support
//!
//! This crate supports `no_std` environments with the `alloc` feature.
//! Disable the default `std` feature for embedded use.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

pub mod mapper;
pub mod rom;

mod cnrom;
mod gxrom;
mod mmc1;
mod mmc3;
mod nrom;
mod uxrom;

pub use cnrom::Cnrom;
pub use gxrom::Gxrom;
pub use mapper::{Mapper, Mirroring};
pub use mmc1::Mmc1;
pub use mmc3::Mmc3;
pub use nrom::Nrom;
pub use rom::{Rom, RomError, RomHeader};
pub use uxrom::Uxrom;

/// Create a mapper instance from ROM data.
///
/// Returns the appropriate mapper implementation based on the ROM header's
/// mapper number. Returns an error if the mapper is not supported.
///
/// # Errors
///
/// Returns `RomError::UnsupportedMapper` if the mapper number is not
/// implemented in this crate.
///
/// # Example
///
/// ```no_run
/// use nescore_mappers::{Rom, create_mapper};
///
/// let rom_data = std::fs::read("game.nes").expect("Failed to read ROM");
/// let rom = Rom::load(&rom_data).expect("Failed to parse ROM");
/// let mapper = create_mapper(&rom).expect("Unsupported mapper");
///
/// println!("Mapper: {} ({})", mapper.mapper_name(), mapper.mapper_number());
/// ```
pub fn create_mapper(rom: &Rom) -> Result<Box<dyn Mapper>, RomError> {
    let number = rom.header.mapper_number;
    log::debug!("constructing mapper {number} ({:?})", mapper_name(number));
    match number {
        0 => Ok(Box::new(Nrom::new(rom))),
        1 => Ok(Box::new(Mmc1::new(rom))),
        2 => Ok(Box::new(Uxrom::new(rom))),
        3 => Ok(Box::new(Cnrom::new(rom))),
        4 => Ok(Box::new(Mmc3::new(rom))),
        66 => Ok(Box::new(Gxrom::new(rom))),
        n => {
            log::warn!("unsupported mapper number {n}");
            Err(RomError::UnsupportedMapper(n))
        }
    }
}

/// Get a list of supported mapper numbers.
#[must_use]
pub fn supported_mappers() -> &'static [u16] {
    &[0, 1, 2, 3, 4, 66]
}

/// Check if a mapper number is supported.
#[must_use]
pub fn is_mapper_supported(mapper: u16) -> bool {
    supported_mappers().contains(&mapper)
}

/// Get the name of a mapper by number.
#[must_use]
pub fn mapper_name(mapper: u16) -> Option<&'static str> {
    match mapper {
        0 => Some("NROM"),
        1 => Some("MMC1"),
        2 => Some("UxROM"),
        3 => Some("CNROM"),
        4 => Some("MMC3"),
        66 => Some("GxROM"),
        _ => None,
    }
}
