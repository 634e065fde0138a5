use super::*;

#[test]
fn mega328p() {
    let d = Characteristics::find(0x950F).unwrap();
    assert_eq!(d.name, "ATmega328P");
    assert_eq!(d.flash_size, 32768);
    assert_eq!(d.dwdr_reg(), 0x31);
    assert_eq!(d.dwdr_addr(), 0x51);
    assert_eq!(d.ram_end(), 0x900);
}

#[test]
fn tiny85() {
    let d = Characteristics::find(0x930B).unwrap();
    assert_eq!(d.name, "ATtiny85");
    assert_eq!(d.dwdr_addr(), 0x42);
    assert_eq!(d.ram_end(), 0x260);
}

#[test]
fn tiny13_dwdr_is_high_io() {
    // ATtiny13 is the odd one out with DWDR up at 0x2E
    let d = Characteristics::find(0x9007).unwrap();
    assert_eq!(d.dwdr_addr(), 0x4E);
}

#[test]
fn unknown_signature() {
    assert!(Characteristics::find(0x1E93).is_none());
}

#[test]
fn signatures_unique() {
    for (i, a) in DEVICES.iter().enumerate() {
        for b in &DEVICES[i + 1..] {
            assert_ne!(a.signature, b.signature, "{} vs {}", a.name, b.name);
        }
    }
}
