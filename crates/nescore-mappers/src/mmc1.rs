//! MMC1 Mapper (Mapper 1).
//!
//! One of the most common NES mappers, used by games like The Legend of Zelda,
//! Metroid, and Final Fantasy. Features:
//!
//! - Serial shift register for configuration writes
//! - PRG-ROM banking: 16KB or 32KB modes
//! - CHR-ROM/RAM banking: 4KB or 8KB modes
//! - Mirroring control (H/V/single-screen)
//! - 8KB PRG-RAM at $6000-$7FFF (often battery-backed)
//!
//! Register layout (written via serial shift register):
//! - $8000-$9FFF: Control register
//! - $A000-$BFFF: CHR bank 0
//! - $C000-$DFFF: CHR bank 1
//! - $E000-$FFFF: PRG bank

use crate::mapper::{Mapper, MapperStateError, Mirroring};
use crate::rom::Rom;

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

use serde::{Deserialize, Serialize};

/// Mutable runtime state snapshot for [`Mmc1`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Mmc1State {
    chr: Vec<u8>,
    prg_ram: Vec<u8>,
    shift_reg: u8,
    shift_count: u8,
    mirroring: Mirroring,
    prg_mode: PrgMode,
    chr_mode: ChrMode,
    chr_bank_0: u8,
    chr_bank_1: u8,
    prg_bank: u8,
    prg_ram_enabled: bool,
}

/// PRG-ROM banking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(Serialize, Deserialize)]
enum PrgMode {
    /// Switch 32KB at $8000, ignore low bit of bank number.
    Switch32K,
    /// Fix first bank at $8000, switch 16KB at $C000.
    FixFirst,
    /// Fix last bank at $C000, switch 16KB at $8000.
    #[default]
    FixLast,
}

/// CHR banking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(Serialize, Deserialize)]
enum ChrMode {
    /// Switch 8KB at a time.
    #[default]
    Switch8K,
    /// Switch two separate 4KB banks.
    Switch4K,
}

/// MMC1 mapper implementation.
#[derive(Debug, Clone)]
pub struct Mmc1 {
    /// PRG-ROM data.
    prg_rom: Vec<u8>,
    /// CHR-ROM/RAM data.
    chr: Vec<u8>,
    /// PRG-RAM data (8KB).
    prg_ram: Vec<u8>,
    /// Whether CHR is RAM (writable).
    chr_is_ram: bool,
    /// Number of PRG-ROM banks (16KB each).
    prg_banks: usize,

    // Shift register
    /// Shift register value.
    shift_reg: u8,
    /// Number of bits written to shift register.
    shift_count: u8,

    // Control register ($8000-$9FFF)
    /// Nametable mirroring mode.
    mirroring: Mirroring,
    /// PRG banking mode.
    prg_mode: PrgMode,
    /// CHR banking mode.
    chr_mode: ChrMode,

    // Bank registers
    /// CHR bank 0 (or 8KB bank in 8K mode).
    chr_bank_0: u8,
    /// CHR bank 1 (4K mode only).
    chr_bank_1: u8,
    /// PRG bank.
    prg_bank: u8,
    /// PRG-RAM enable (active low on bit 4 of PRG bank register).
    prg_ram_enabled: bool,

    /// Has battery-backed RAM.
    has_battery: bool,
}

impl Mmc1 {
    /// Create a new MMC1 mapper from ROM data.
    #[must_use]
    pub fn new(rom: &Rom) -> Self {
        let prg_banks = rom.prg_rom.len() / 16384;
        let chr_is_ram = rom.chr_rom.is_empty();
        let chr = if chr_is_ram {
            vec![0u8; 8192]
        } else {
            rom.chr_rom.clone()
        };

        Self {
            prg_rom: rom.prg_rom.clone(),
            chr,
            prg_ram: vec![0u8; 8192],
            chr_is_ram,
            prg_banks,
            shift_reg: 0,
            shift_count: 0,
            mirroring: rom.header.mirroring,
            prg_mode: PrgMode::FixLast,
            chr_mode: ChrMode::Switch8K,
            chr_bank_0: 0,
            chr_bank_1: 0,
            prg_bank: 0,
            prg_ram_enabled: true,
            has_battery: rom.header.has_battery,
        }
    }

    /// Write to the shift register.
    fn write_shift(&mut self, addr: u16, val: u8) {
        // Bit 7 set = reset shift register
        if val & 0x80 != 0 {
            self.shift_reg = 0;
            self.shift_count = 0;
            // Reset also sets PRG mode to 3 (fix last bank)
            self.prg_mode = PrgMode::FixLast;
            return;
        }

        // Shift in bit 0 of value
        self.shift_reg |= (val & 1) << self.shift_count;
        self.shift_count += 1;

        // After 5 writes, commit to the appropriate register
        if self.shift_count == 5 {
            let register = (addr >> 13) & 0x03;
            match register {
                0 => self.write_control(self.shift_reg),
                1 => self.chr_bank_0 = self.shift_reg,
                2 => self.chr_bank_1 = self.shift_reg,
                3 => self.write_prg_bank(self.shift_reg),
                _ => unreachable!(),
            }
            self.shift_reg = 0;
            self.shift_count = 0;
        }
    }

    /// Write control register.
    fn write_control(&mut self, val: u8) {
        // Bits 0-1: Mirroring
        self.mirroring = match val & 0x03 {
            0 => Mirroring::SingleScreenLower,
            1 => Mirroring::SingleScreenUpper,
            2 => Mirroring::Vertical,
            3 => Mirroring::Horizontal,
            _ => unreachable!(),
        };

        // Bits 2-3: PRG mode
        self.prg_mode = match (val >> 2) & 0x03 {
            0 | 1 => PrgMode::Switch32K,
            2 => PrgMode::FixFirst,
            3 => PrgMode::FixLast,
            _ => unreachable!(),
        };

        // Bit 4: CHR mode
        self.chr_mode = if val & 0x10 != 0 {
            ChrMode::Switch4K
        } else {
            ChrMode::Switch8K
        };
    }

    /// Write PRG bank register.
    fn write_prg_bank(&mut self, val: u8) {
        self.prg_bank = val & 0x0F;
        self.prg_ram_enabled = val & 0x10 == 0;
    }

    /// Get the PRG-ROM address for a CPU address.
    fn prg_addr(&self, addr: u16) -> usize {
        let bank = match self.prg_mode {
            PrgMode::Switch32K => {
                // 32KB mode: ignore low bit of bank number
                let base = (self.prg_bank & 0x0E) as usize;
                if addr < 0xC000 { base } else { base + 1 }
            }
            PrgMode::FixFirst => {
                if addr < 0xC000 {
                    0 // Fixed first bank
                } else {
                    (self.prg_bank & 0x0F) as usize
                }
            }
            PrgMode::FixLast => {
                if addr < 0xC000 {
                    (self.prg_bank & 0x0F) as usize
                } else {
                    self.prg_banks.saturating_sub(1) // Fixed last bank
                }
            }
        };

        let bank = bank % self.prg_banks.max(1);
        let offset = (addr & 0x3FFF) as usize;
        bank * 16384 + offset
    }

    /// Get the CHR address for a PPU address.
    fn chr_addr(&self, addr: u16) -> usize {
        let chr_banks = (self.chr.len() / 4096).max(1);

        match self.chr_mode {
            ChrMode::Switch8K => {
                // 8KB mode: use chr_bank_0, ignore low bit
                let bank = (self.chr_bank_0 & 0x1E) as usize;
                let offset = (addr & 0x1FFF) as usize;
                (bank * 4096 + offset) % self.chr.len().max(1)
            }
            ChrMode::Switch4K => {
                let (bank, offset) = if addr < 0x1000 {
                    (self.chr_bank_0 as usize, (addr & 0x0FFF) as usize)
                } else {
                    (self.chr_bank_1 as usize, (addr & 0x0FFF) as usize)
                };
                let bank = bank % chr_banks;
                bank * 4096 + offset
            }
        }
    }
}

impl Mapper for Mmc1 {
    fn read_prg(&self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => {
                if self.prg_ram_enabled {
                    let offset = (addr - 0x6000) as usize;
                    self.prg_ram.get(offset).copied().unwrap_or(0)
                } else {
                    0 // Open bus when disabled
                }
            }
            0x8000..=0xFFFF => {
                let offset = self.prg_addr(addr);
                self.prg_rom.get(offset).copied().unwrap_or(0)
            }
            _ => 0,
        }
    }

    fn write_prg(&mut self, addr: u16, val: u8) {
        match addr {
            0x6000..=0x7FFF => {
                if self.prg_ram_enabled {
                    let offset = (addr - 0x6000) as usize;
                    if let Some(byte) = self.prg_ram.get_mut(offset) {
                        *byte = val;
                    }
                }
            }
            0x8000..=0xFFFF => {
                self.write_shift(addr, val);
            }
            _ => {}
        }
    }

    fn read_chr(&self, addr: u16) -> u8 {
        let offset = self.chr_addr(addr);
        self.chr.get(offset).copied().unwrap_or(0)
    }

    fn write_chr(&mut self, addr: u16, val: u8) {
        if self.chr_is_ram {
            let offset = self.chr_addr(addr);
            if let Some(byte) = self.chr.get_mut(offset) {
                *byte = val;
            }
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn mapper_number(&self) -> u16 {
        1
    }

    fn mapper_name(&self) -> &'static str {
        "MMC1"
    }

    fn has_battery(&self) -> bool {
        self.has_battery
    }

    fn battery_ram(&self) -> Option<&[u8]> {
        if self.has_battery {
            Some(&self.prg_ram)
        } else {
            None
        }
    }

    fn set_battery_ram(&mut self, data: &[u8]) {
        let len = data.len().min(self.prg_ram.len());
        self.prg_ram[..len].copy_from_slice(&data[..len]);
    }

    fn reset(&mut self) {
        self.shift_reg = 0;
        self.shift_count = 0;
        self.prg_mode = PrgMode::FixLast;
    }

    fn clone_mapper(&self) -> Box<dyn Mapper> {
        Box::new(self.clone())
    }

    fn save_state(&self) -> Vec<u8> {
        let state = Mmc1State {
            chr: if self.chr_is_ram {
                self.chr.clone()
            } else {
                Vec::new()
            },
            prg_ram: self.prg_ram.clone(),
            shift_reg: self.shift_reg,
            shift_count: self.shift_count,
            mirroring: self.mirroring,
            prg_mode: self.prg_mode,
            chr_mode: self.chr_mode,
            chr_bank_0: self.chr_bank_0,
            chr_bank_1: self.chr_bank_1,
            prg_bank: self.prg_bank,
            prg_ram_enabled: self.prg_ram_enabled,
        };
        postcard::to_allocvec(&state).unwrap_or_default()
    }

    fn load_state(&mut self, data: &[u8]) -> Result<(), MapperStateError> {
        let state: Mmc1State =
            postcard::from_bytes(data).map_err(|_| MapperStateError::Malformed)?;
        if state.prg_ram.len() != self.prg_ram.len() {
            return Err(MapperStateError::Malformed);
        }
        if self.chr_is_ram {
            if state.chr.len() != self.chr.len() {
                return Err(MapperStateError::Malformed);
            }
            self.chr = state.chr;
        }
        self.prg_ram = state.prg_ram;
        self.shift_reg = state.shift_reg;
        self.shift_count = state.shift_count;
        self.mirroring = state.mirroring;
        self.prg_mode = state.prg_mode;
        self.chr_mode = state.chr_mode;
        self.chr_bank_0 = state.chr_bank_0;
        self.chr_bank_1 = state.chr_bank_1;
        self.prg_bank = state.prg_bank;
        self.prg_ram_enabled = state.prg_ram_enabled;
        Ok(())
    }
}
