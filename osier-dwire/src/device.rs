//! Characteristics of debugWIRE-capable AVR parts
//!
//! The engine needs three facts about the part on the other end of the
//! wire: how big its flash is (to canonicalize the program counter),
//! where its SRAM lives, and which I/O register is DWDR -- the one the
//! protocol shuttles every data byte through, and which bulk transfers
//! must therefore route around.

/// Fixed characteristics of one AVR part, keyed by signature
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct Characteristics {
    /// Part name as it appears in the datasheet
    pub name: &'static str,
    /// Signature word as returned by the debugWIRE `F3` command
    pub signature: u16,
    /// Flash size in bytes
    pub flash_size: u32,
    /// First data-space address of SRAM
    pub sram_base: u16,
    /// SRAM size in bytes
    pub sram_size: u16,
    /// I/O-space register index of DWDR
    pub dwdr: u8,
}

impl Characteristics {
    /// Look a part up by its signature word
    pub fn find(signature: u16) -> Option<&'static Characteristics> {
        DEVICES.iter().find(|d| d.signature == signature)
    }

    /// DWDR as an I/O-space register index, for `IN`/`OUT` operands
    pub const fn dwdr_reg(&self) -> u8 {
        self.dwdr
    }

    /// DWDR as a data-space address, for the bulk-transfer hazard check
    pub const fn dwdr_addr(&self) -> u16 {
        self.dwdr as u16 + 0x20
    }

    /// One past the last data-space address of SRAM
    pub const fn ram_end(&self) -> u16 {
        self.sram_base + self.sram_size
    }
}

const fn part(
    name: &'static str,
    signature: u16,
    flash_size: u32,
    sram_base: u16,
    sram_size: u16,
    dwdr: u8,
) -> Characteristics {
    Characteristics {
        name,
        signature,
        flash_size,
        sram_base,
        sram_size,
        dwdr,
    }
}

static DEVICES: &[Characteristics] = &[
    part("ATtiny13", 0x9007, 1024, 0x60, 64, 0x2E),
    part("ATtiny2313", 0x910A, 2048, 0x60, 128, 0x1F),
    part("ATtiny24", 0x910B, 2048, 0x60, 128, 0x27),
    part("ATtiny44", 0x9207, 4096, 0x60, 256, 0x27),
    part("ATtiny84", 0x930C, 8192, 0x60, 512, 0x27),
    part("ATtiny25", 0x9108, 2048, 0x60, 128, 0x22),
    part("ATtiny45", 0x9206, 4096, 0x60, 256, 0x22),
    part("ATtiny85", 0x930B, 8192, 0x60, 512, 0x22),
    part("ATmega48A", 0x9205, 4096, 0x100, 512, 0x31),
    part("ATmega48PA", 0x920A, 4096, 0x100, 512, 0x31),
    part("ATmega88A", 0x930A, 8192, 0x100, 1024, 0x31),
    part("ATmega88PA", 0x930F, 8192, 0x100, 1024, 0x31),
    part("ATmega168A", 0x9406, 16384, 0x100, 1024, 0x31),
    part("ATmega168PA", 0x940B, 16384, 0x100, 1024, 0x31),
    part("ATmega328", 0x9514, 32768, 0x100, 2048, 0x31),
    part("ATmega328P", 0x950F, 32768, 0x100, 2048, 0x31),
];

#[cfg(all(test, feature = "std"))]
#[path = "tests/device.rs"]
mod tests;
