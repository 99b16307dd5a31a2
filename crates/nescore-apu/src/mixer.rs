//! Non-linear audio mixer for NES APU channels
//!
//! The NES APU combines channels using two separate non-linear curves that
//! approximate the behavior of the console's analog mixing resistor network.
//!
//! # Mixing Formula
//!
//! **Pulse channels:**
//! ```text
//! pulse_out = 95.88 / ((8128.0 / (pulse1 + pulse2)) + 100.0)
//! ```
//!
//! **Triangle, Noise, and DMC (TND) channels:**
//! ```text
//! tnd_out = 159.79 / ((1.0 / (triangle/8227 + noise/12241 + dmc/22638)) + 100.0)
//! ```
//!
//! Final output: `output = pulse_out + tnd_out`
//!
//! The pulse curve depends only on the sum `pulse1 + pulse2`, so it is exact
//! to pre-compute as a 31-entry table. The TND curve depends on three
//! independent channels whose practical combinations (16 * 16 * 128) are too
//! many to tabulate densely without collapsing distinct inputs onto the same
//! entry, so `tnd_in` is evaluated directly from the formula on every sample.
//!
//! # Example
//!
//! ```rust
//! use nescore_apu::mixer::Mixer;
//!
//! let mixer = Mixer::new();
//!
//! // Mix all channels (pulse1=15, pulse2=15, triangle=15, noise=10, dmc=64)
//! let output = mixer.mix(15, 15, 15, 10, 64);
//! assert!(output > 0.0 && output < 2.0);
//! ```

/// Pulse mixing lookup table (31 entries: 0-30).
///
/// Index = `pulse1 + pulse2` (each 0-15). Exact for this curve since the
/// pulse output depends only on the sum of the two channels.
const PULSE_TABLE: [f64; 31] = {
    let mut table = [0.0f64; 31];
    let mut i = 0;
    while i < 31 {
        if i == 0 {
            table[i] = 0.0;
        } else {
            #[allow(clippy::cast_precision_loss)]
            let i_f64 = i as f64;
            table[i] = 95.88 / ((8128.0 / i_f64) + 100.0);
        }
        i += 1;
    }
    table
};

/// Non-linear mixer for NES APU audio channels.
///
/// Combines 5 channels (2 pulse, 1 triangle, 1 noise, 1 DMC) using
/// hardware-accurate non-linear mixing curves. Carries no state of its own;
/// the instance methods exist for API ergonomics and delegate to the
/// associated functions that do the actual computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mixer;

impl Mixer {
    /// Create a new mixer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Mix all five APU channels using hardware-accurate non-linear curves.
    ///
    /// # Arguments
    ///
    /// * `pulse1` - Pulse channel 1 output (0-15)
    /// * `pulse2` - Pulse channel 2 output (0-15)
    /// * `triangle` - Triangle channel output (0-15)
    /// * `noise` - Noise channel output (0-15)
    /// * `dmc` - DMC channel output (0-127)
    ///
    /// # Returns
    ///
    /// Mixed audio sample in range approximately `[0.0, 1.0]`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use nescore_apu::mixer::Mixer;
    ///
    /// let mixer = Mixer::new();
    ///
    /// // All channels at maximum (hardware-accurate formula produces ~0.999)
    /// let output = mixer.mix(15, 15, 15, 15, 127);
    /// assert!(output > 0.9 && output < 1.0);
    ///
    /// // All channels silent
    /// let silence = mixer.mix(0, 0, 0, 0, 0);
    /// assert_eq!(silence, 0.0);
    /// ```
    #[must_use]
    pub fn mix(&self, pulse1: u8, pulse2: u8, triangle: u8, noise: u8, dmc: u8) -> f64 {
        Self::mix_channels(pulse1, pulse2, triangle, noise, dmc)
    }

    /// Canonical non-linear mix, callable without a `Mixer` instance.
    ///
    /// This is the single spec-correct mixing path; [`Mixer::mix`] and
    /// [`crate::Apu::output`] both delegate here rather than each keeping
    /// their own copy of the formula.
    ///
    /// # Panics
    ///
    /// Debug-asserts that every channel is within its valid range.
    #[must_use]
    pub fn mix_channels(pulse1: u8, pulse2: u8, triangle: u8, noise: u8, dmc: u8) -> f64 {
        debug_assert!(pulse1 <= 15, "pulse1 out of range: {pulse1}");
        debug_assert!(pulse2 <= 15, "pulse2 out of range: {pulse2}");
        debug_assert!(triangle <= 15, "triangle out of range: {triangle}");
        debug_assert!(noise <= 15, "noise out of range: {noise}");
        debug_assert!(dmc <= 127, "dmc out of range: {dmc}");

        let pulse_index = usize::from(pulse1 + pulse2);
        let pulse_out = PULSE_TABLE[pulse_index];

        let tnd_in =
            f64::from(triangle) / 8227.0 + f64::from(noise) / 12241.0 + f64::from(dmc) / 22638.0;
        let tnd_out = if tnd_in == 0.0 {
            0.0
        } else {
            159.79 / ((1.0 / tnd_in) + 100.0)
        };

        pulse_out + tnd_out
    }

    /// Mix channels using linear approximation (for comparison/testing).
    ///
    /// This is less accurate than non-linear mixing but useful for debugging
    /// and comparing against other emulators.
    ///
    /// # Arguments
    ///
    /// Same as [`mix()`](Self::mix)
    ///
    /// # Example
    ///
    /// ```rust
    /// use nescore_apu::mixer::Mixer;
    ///
    /// // Linear mixing is a fast approximation
    /// let output_linear = Mixer::mix_linear(15, 15, 15, 10, 64);
    ///
    /// // Result is in the 0.0-1.0 range
    /// assert!(output_linear > 0.0 && output_linear < 1.0);
    /// ```
    #[must_use]
    pub fn mix_linear(pulse1: u8, pulse2: u8, triangle: u8, noise: u8, dmc: u8) -> f64 {
        let pulse = f64::from(pulse1 + pulse2) * 0.00752;
        let tnd = (f64::from(triangle) * 0.00851)
            + (f64::from(noise) * 0.00494)
            + (f64::from(dmc) * 0.00335);

        pulse + tnd
    }
}
