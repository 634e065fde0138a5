use super::*;

#[test]
fn reference_capture() {
    // Nine samples of 82 -> 500 cycles per pulse, i.e. 33000 baud,
    // divisor 123
    let samples = [82u16; 9];
    let cycles = cycles_per_pulse(&samples).unwrap();
    assert_eq!(cycles, 500);
    assert_eq!(bit_time(cycles), 123);
    assert_eq!(baud(cycles), 33000);
}

#[test]
fn averages_trailing_samples_only() {
    // Early edges (the break itself) must not affect the result
    let samples = [9999u16, 9999, 82, 82, 82, 82, 82, 82, 82, 82, 82];
    assert_eq!(cycles_per_pulse(&samples), Some(500));
}

#[test]
fn too_few_samples() {
    assert_eq!(cycles_per_pulse(&[82u16; 8]), None);
}

#[test]
fn truncating_division() {
    // S = 739: 6*739/9 = 492 (truncated), + 8 = 500
    let samples = [83u16, 82, 82, 82, 82, 82, 82, 82, 82];
    assert_eq!(cycles_per_pulse(&samples), Some(500));
}

#[test]
fn accumulator_is_wide_enough() {
    // Nine full-scale samples overflow 16 bits many times over
    assert_eq!(cycles_per_pulse(&[0xFFFF; 9]), Some(6 * 0xFFFF + 8));
}

#[test]
fn decode_little_endian() {
    let mut out = [0u16; 64];
    let n = decode_samples(&[0x52, 0x00, 0x01, 0x02, 0xFF], &mut out);
    assert_eq!(n, 2);
    assert_eq!(out[0], 0x0052);
    assert_eq!(out[1], 0x0201);
}

#[test]
fn decode_empty() {
    let mut out = [0u16; 64];
    assert_eq!(decode_samples(&[], &mut out), 0);
}
