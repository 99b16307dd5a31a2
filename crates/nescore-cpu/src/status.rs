//! CPU Status Register (P register) flags.
//!
//! The 6502 status register is an 8-bit register that contains various flags
//! reflecting the state of the processor:
//!
//! ```text
//! 7  6  5  4  3  2  1  0
//! N  V  U  B  D  I  Z  C
//! │  │  │  │  │  │  │  └─ Carry
//! │  │  │  │  │  │  └──── Zero
//! │  │  │  │  │  └─────── Interrupt Disable
//! │  │  │  │  └────────── Decimal Mode (not used in NES but still functional)
//! │  │  │  └───────────── Break (1 when pushed from PHP/BRK, 0 from IRQ/NMI)
//! │  │  └──────────────── Unused (always 1 when pushed to stack)
//! │  └─────────────────── Overflow
//! └────────────────────── Negative
//! ```

use bitflags::bitflags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

bitflags! {
    /// CPU Status Register flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct StatusFlags: u8 {
        /// Carry flag - set if the last operation caused a carry out of bit 7
        /// or a borrow into bit 0.
        const CARRY = 1 << 0;

        /// Zero flag - set if the result of the last operation was zero.
        const ZERO = 1 << 1;

        /// Interrupt Disable flag - when set, IRQ interrupts are ignored.
        /// NMI interrupts are not affected.
        const INTERRUPT_DISABLE = 1 << 2;

        /// Decimal Mode flag - decoded and settable via SED/CLD but never
        /// consulted by ADC/SBC; the NES 2A03 lacks BCD arithmetic.
        const DECIMAL = 1 << 3;

        /// Break flag - distinguishes a software BRK from a hardware
        /// interrupt in the byte pushed to the stack. Set by PHP/BRK,
        /// clear when IRQ/NMI push status.
        const BREAK = 1 << 4;

        /// Unused flag - always 1 when the status byte is pushed to the stack.
        const UNUSED = 1 << 5;

        /// Overflow flag - set on signed overflow in ADC/SBC.
        const OVERFLOW = 1 << 6;

        /// Negative flag - set if bit 7 of the result is set.
        const NEGATIVE = 1 << 7;
    }
}

impl StatusFlags {
    /// Status immediately after the RESET sequence: I set, U always 1.
    pub const POWER_ON: Self = Self::INTERRUPT_DISABLE.union(Self::UNUSED);

    /// Flags restored by PLP / RTI; B and U are not part of the logical register.
    pub const PLP_MASK: Self = Self::CARRY
        .union(Self::ZERO)
        .union(Self::INTERRUPT_DISABLE)
        .union(Self::DECIMAL)
        .union(Self::OVERFLOW)
        .union(Self::NEGATIVE);

    /// Status register immediately after RESET (I=1, U=1).
    #[must_use]
    pub const fn new() -> Self {
        Self::POWER_ON
    }

    /// Sets Zero and Negative from a result byte, as every load/transfer/ALU op does.
    #[inline]
    pub fn set_zn(&mut self, value: u8) {
        self.set_flag(Self::ZERO, value == 0);
        self.set_flag(Self::NEGATIVE, value & 0x80 != 0);
    }

    /// Sets or clears a single flag.
    #[inline]
    pub fn set_flag(&mut self, flag: Self, value: bool) {
        if value {
            *self |= flag;
        } else {
            *self &= !flag;
        }
    }

    /// Encodes the register as the byte PHP/BRK push to the stack.
    /// U is always set; B reflects whether this is a software interrupt.
    #[inline]
    #[must_use]
    pub const fn to_stack_byte(self, brk: bool) -> u8 {
        let mut value = self.bits() | Self::UNUSED.bits();
        if brk {
            value |= Self::BREAK.bits();
        }
        value
    }

    /// Decodes a byte popped by PLP/RTI. B is discarded, U forced set.
    #[inline]
    #[must_use]
    pub fn from_stack_byte(value: u8) -> Self {
        Self::from_bits_truncate((value & !Self::BREAK.bits()) | Self::UNUSED.bits())
    }
}
