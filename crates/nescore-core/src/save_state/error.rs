//! Save state error types.

use thiserror::Error;

/// Save state operation error.
#[derive(Debug, Clone, Copy, Error)]
pub enum SaveStateError {
    /// The blob is not a well-formed save state: truncated section, bad
    /// CRC, or a section that fails to decode against the running mapper.
    #[error("save state is corrupt or truncated")]
    StateCorrupt,

    /// The blob has a valid header and checksum but carries a ROM
    /// fingerprint that disagrees with the cartridge currently loaded.
    #[error("save state was produced by a different ROM")]
    StateForeign,
}
