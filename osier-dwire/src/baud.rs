//! Pulse-width arithmetic for debugWIRE clock recovery
//!
//! The target answers a break with a `0x55` frame -- ten alternating
//! bits -- and the adapter measures each half-bit pulse in its own
//! clock cycles. These functions turn a capture into the target's
//! bit-cell time and the divisor the adapter needs to match it.

/// The adapter's clock rate; pulse measurements are in these cycles
pub const ADAPTER_HZ: u32 = 16_500_000;

/// Fewest captured bytes that make a measurement usable
/// ([`SAMPLES_USED`] 16-bit samples)
pub const MIN_CAPTURE_BYTES: usize = 18;

/// Trailing samples averaged; the early edges of the frame are the
/// noisiest, so only the tail is used
pub const SAMPLES_USED: usize = 9;

/// Decode a captured buffer into 16-bit little-endian pulse samples.
///
/// Returns the number of samples written to `out`; a trailing odd byte
/// is ignored.
pub fn decode_samples(raw: &[u8], out: &mut [u16; 64]) -> usize {
    let mut n = 0;
    for pair in raw.chunks_exact(2).take(out.len()) {
        out[n] = u16::from_le_bytes([pair[0], pair[1]]);
        n += 1;
    }
    n
}

/// Recover the target's bit-cell time in adapter clock cycles.
///
/// The adapter's sampling loop costs `6·m + 8` cycles for a reported
/// measurement `m`, so the per-pulse cycle count is reconstructed from
/// the mean of the last [`SAMPLES_USED`] samples. Nine 16-bit samples
/// can sum past 16 bits, so the accumulator is explicitly `u32`.
///
/// Returns `None` for captures with too few samples.
pub fn cycles_per_pulse(samples: &[u16]) -> Option<u32> {
    if samples.len() < SAMPLES_USED {
        return None;
    }
    let sum: u32 = samples[samples.len() - SAMPLES_USED..]
        .iter()
        .map(|&s| u32::from(s))
        .sum();
    Some((6 * sum) / (SAMPLES_USED as u32) + 8)
}

/// The loop-iteration divisor to program into the adapter for a
/// recovered bit-cell time
pub fn bit_time(cycles_per_pulse: u32) -> u16 {
    ((cycles_per_pulse - 8) / 4) as u16
}

/// The recovered connection rate in baud
pub fn baud(cycles_per_pulse: u32) -> u32 {
    ADAPTER_HZ / cycles_per_pulse
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/baud.rs"]
mod tests;
