//! Save state encoding for `NesCore`.
//!
//! A save state is a header followed by a payload of length-prefixed
//! sections:
//!
//! ```text
//! magic "jNES" (4) | version (2) | crc32 of payload (4) | rom fingerprint (4)
//! [len|cpu] [len|ppu] [len|apu] [len|cpu ram (2048)] [len|cartridge] clock (8)
//! ```
//!
//! CPU, PPU and APU sections are the components' own `Serialize` form,
//! encoded with `postcard`. The cartridge section is the mapper's
//! `save_state()` blob followed by the mirroring mode ordinal. Anything
//! that isn't a well-formed "jNES" blob is handed to a legacy loader that
//! treats the bytes as raw CPU RAM followed by PRG RAM.

pub mod error;

pub use error::SaveStateError;

use nescore_apu::Apu;
use nescore_cpu::Cpu;
use nescore_mappers::Mirroring;
use nescore_ppu::Ppu;

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

/// Magic bytes identifying a `NesCore` save state.
pub const SAVE_STATE_MAGIC: [u8; 4] = *b"jNES";

/// Save state format version.
pub const SAVE_STATE_VERSION: u16 = 3;

const HEADER_LEN: usize = 4 + 2 + 4 + 4;
const LEGACY_RAM_LEN: usize = 2048;

/// A fully decoded "jNES" save state, ready to be applied to a running
/// [`crate::Console`].
pub struct DecodedState {
    /// CPU register/flag state.
    pub cpu: Cpu,
    /// PPU state.
    pub ppu: Ppu,
    /// APU state.
    pub apu: Apu,
    /// Internal CPU RAM (2048 bytes).
    pub ram: [u8; LEGACY_RAM_LEN],
    /// Opaque mapper state blob, to be handed to `Mapper::load_state`.
    pub mapper_state: Vec<u8>,
    /// Nametable mirroring mode at the time of the save.
    pub mirroring: Mirroring,
    /// System clock (total CPU cycles executed) at the time of the save.
    pub clock: u64,
}

/// A save state whose header didn't match "jNES", recovered via the
/// legacy fallback: the blob is raw CPU RAM followed by PRG RAM.
pub struct LegacyState {
    /// Internal CPU RAM (2048 bytes).
    pub ram: [u8; LEGACY_RAM_LEN],
    /// Remaining bytes, interpreted as PRG RAM.
    pub prg_ram: Vec<u8>,
}

/// Outcome of [`decode`].
pub enum LoadedState {
    /// A well-formed save state.
    Full(Box<DecodedState>),
    /// Bytes recovered through the legacy raw-RAM fallback.
    Legacy(LegacyState),
}

fn write_section(out: &mut Vec<u8>, bytes: &[u8]) {
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn read_section<'a>(data: &'a [u8], cursor: &mut usize) -> Result<&'a [u8], SaveStateError> {
    if data.len() < *cursor + 4 {
        return Err(SaveStateError::StateCorrupt);
    }
    let len_bytes: [u8; 4] = data[*cursor..*cursor + 4]
        .try_into()
        .map_err(|_| SaveStateError::StateCorrupt)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    *cursor += 4;

    if data.len() < *cursor + len {
        return Err(SaveStateError::StateCorrupt);
    }
    let section = &data[*cursor..*cursor + len];
    *cursor += len;
    Ok(section)
}

fn encode_cartridge(mapper_state: &[u8], mirroring: Mirroring) -> Vec<u8> {
    let mut out = Vec::with_capacity(mapper_state.len() + 1);
    out.extend_from_slice(mapper_state);
    out.push(mirroring as u8);
    out
}

fn decode_cartridge(bytes: &[u8]) -> Result<(Vec<u8>, Mirroring), SaveStateError> {
    let (&ordinal, mapper_state) = bytes.split_last().ok_or(SaveStateError::StateCorrupt)?;
    let mirroring = match ordinal {
        0 => Mirroring::Horizontal,
        1 => Mirroring::Vertical,
        2 => Mirroring::SingleScreenLower,
        3 => Mirroring::SingleScreenUpper,
        4 => Mirroring::FourScreen,
        _ => return Err(SaveStateError::StateCorrupt),
    };
    Ok((mapper_state.to_vec(), mirroring))
}

/// Encode a complete save state.
///
/// `fingerprint` should be the CRC-32 fingerprint of the currently loaded
/// ROM (see [`nescore_mappers::Rom::fingerprint`]); it is carried in the
/// header so a later load can detect a foreign cartridge.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn encode(
    cpu: &Cpu,
    ppu: &Ppu,
    apu: &Apu,
    ram: &[u8; LEGACY_RAM_LEN],
    mapper_state: &[u8],
    mirroring: Mirroring,
    clock: u64,
    fingerprint: u32,
) -> Vec<u8> {
    let cpu_bytes = postcard::to_allocvec(cpu).unwrap_or_default();
    let ppu_bytes = postcard::to_allocvec(ppu).unwrap_or_default();
    let apu_bytes = postcard::to_allocvec(apu).unwrap_or_default();
    let cartridge_bytes = encode_cartridge(mapper_state, mirroring);

    let mut payload = Vec::new();
    write_section(&mut payload, &cpu_bytes);
    write_section(&mut payload, &ppu_bytes);
    write_section(&mut payload, &apu_bytes);
    write_section(&mut payload, ram);
    write_section(&mut payload, &cartridge_bytes);
    payload.extend_from_slice(&clock.to_le_bytes());

    let crc = crc32fast::hash(&payload);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&SAVE_STATE_MAGIC);
    out.extend_from_slice(&SAVE_STATE_VERSION.to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&fingerprint.to_le_bytes());
    out.extend_from_slice(&payload);
    out
}

/// Decode a save state blob, falling back to the legacy raw-RAM
/// interpretation if the header doesn't match.
///
/// `current_fingerprint` is the fingerprint of the cartridge currently
/// loaded; a non-zero fingerprint in the blob that disagrees with it is
/// reported as [`SaveStateError::StateForeign`].
///
/// # Errors
///
/// Returns [`SaveStateError::StateCorrupt`] if the blob (or its legacy
/// fallback) is too short, has a bad checksum, or a section fails to
/// decode.
pub fn decode(data: &[u8], current_fingerprint: u32) -> Result<LoadedState, SaveStateError> {
    if data.len() < 4 || data[0..4] != SAVE_STATE_MAGIC {
        return decode_legacy(data).map(LoadedState::Legacy);
    }

    if data.len() < HEADER_LEN {
        return Err(SaveStateError::StateCorrupt);
    }

    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != SAVE_STATE_VERSION {
        return Err(SaveStateError::StateCorrupt);
    }

    let stored_crc = u32::from_le_bytes([data[6], data[7], data[8], data[9]]);
    let fingerprint = u32::from_le_bytes([data[10], data[11], data[12], data[13]]);

    let payload = &data[HEADER_LEN..];
    if crc32fast::hash(payload) != stored_crc {
        return Err(SaveStateError::StateCorrupt);
    }

    if fingerprint != 0 && fingerprint != current_fingerprint {
        return Err(SaveStateError::StateForeign);
    }

    let mut cursor = 0usize;
    let cpu_bytes = read_section(payload, &mut cursor)?;
    let ppu_bytes = read_section(payload, &mut cursor)?;
    let apu_bytes = read_section(payload, &mut cursor)?;
    let ram_bytes = read_section(payload, &mut cursor)?;
    let cartridge_bytes = read_section(payload, &mut cursor)?;

    if payload.len() < cursor + 8 {
        return Err(SaveStateError::StateCorrupt);
    }
    let clock = u64::from_le_bytes(
        payload[cursor..cursor + 8]
            .try_into()
            .map_err(|_| SaveStateError::StateCorrupt)?,
    );

    let cpu: Cpu = postcard::from_bytes(cpu_bytes).map_err(|_| SaveStateError::StateCorrupt)?;
    let ppu: Ppu = postcard::from_bytes(ppu_bytes).map_err(|_| SaveStateError::StateCorrupt)?;
    let apu: Apu = postcard::from_bytes(apu_bytes).map_err(|_| SaveStateError::StateCorrupt)?;

    if ram_bytes.len() != LEGACY_RAM_LEN {
        return Err(SaveStateError::StateCorrupt);
    }
    let mut ram = [0u8; LEGACY_RAM_LEN];
    ram.copy_from_slice(ram_bytes);

    let (mapper_state, mirroring) = decode_cartridge(cartridge_bytes)?;

    Ok(LoadedState::Full(Box::new(DecodedState {
        cpu,
        ppu,
        apu,
        ram,
        mapper_state,
        mirroring,
        clock,
    })))
}

fn decode_legacy(data: &[u8]) -> Result<LegacyState, SaveStateError> {
    if data.len() < LEGACY_RAM_LEN {
        return Err(SaveStateError::StateCorrupt);
    }
    let mut ram = [0u8; LEGACY_RAM_LEN];
    ram.copy_from_slice(&data[..LEGACY_RAM_LEN]);
    let prg_ram = data[LEGACY_RAM_LEN..].to_vec();
    Ok(LegacyState { ram, prg_ram })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_empty_components() {
        let cpu = Cpu::new();
        let ppu = Ppu::new(nescore_ppu::Mirroring::Horizontal);
        let apu = Apu::new();
        let ram = [0u8; LEGACY_RAM_LEN];

        let bytes = encode(&cpu, &ppu, &apu, &ram, &[], Mirroring::Horizontal, 42, 0xDEAD_BEEF);

        match decode(&bytes, 0xDEAD_BEEF).unwrap() {
            LoadedState::Full(state) => {
                assert_eq!(state.clock, 42);
                assert_eq!(state.mirroring, Mirroring::Horizontal);
                assert!(state.mapper_state.is_empty());
            }
            LoadedState::Legacy(_) => panic!("expected a full save state"),
        }
    }

    #[test]
    fn rejects_foreign_fingerprint() {
        let cpu = Cpu::new();
        let ppu = Ppu::new(nescore_ppu::Mirroring::Horizontal);
        let apu = Apu::new();
        let ram = [0u8; LEGACY_RAM_LEN];

        let bytes = encode(&cpu, &ppu, &apu, &ram, &[], Mirroring::Horizontal, 0, 0x1234_5678);

        let err = decode(&bytes, 0x0000_0001).unwrap_err();
        assert!(matches!(err, SaveStateError::StateForeign));
    }

    #[test]
    fn rejects_bad_crc() {
        let cpu = Cpu::new();
        let ppu = Ppu::new(nescore_ppu::Mirroring::Horizontal);
        let apu = Apu::new();
        let ram = [0u8; LEGACY_RAM_LEN];

        let mut bytes = encode(&cpu, &ppu, &apu, &ram, &[], Mirroring::Horizontal, 0, 0);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let err = decode(&bytes, 0).unwrap_err();
        assert!(matches!(err, SaveStateError::StateCorrupt));
    }

    #[test]
    fn falls_back_to_legacy_on_bad_magic() {
        let mut blob = vec![0xAAu8; LEGACY_RAM_LEN + 10];
        blob[0..4].copy_from_slice(b"XXXX");

        match decode(&blob, 0).unwrap() {
            LoadedState::Legacy(state) => {
                assert_eq!(state.ram, [0xAAu8; LEGACY_RAM_LEN]);
                assert_eq!(state.prg_ram.len(), 10);
            }
            LoadedState::Full(_) => panic!("expected legacy fallback"),
        }
    }

    #[test]
    fn bad_magic_too_short_is_corrupt() {
        let blob = vec![0u8; 100];
        let err = decode(&blob, 0).unwrap_err();
        assert!(matches!(err, SaveStateError::StateCorrupt));
    }
}
