//! A debugging session on one halted AVR target
//!
//! [`Session`] composes debugWIRE command bytes (and, where the
//! protocol needs them, synthesised AVR instructions) into the
//! pipeline, and owns the host-side cache of the state the protocol
//! itself clobbers: r28-r31, which every bulk transfer uses as
//! scratch, and the byte-addressed program counter of the halted
//! target.

use crate::avr;
use crate::debug;
use crate::device::Characteristics;
use crate::pipeline::{Pipeline, BUFFER_SIZE};
use crate::{Adapter, Error, SendMode};

// debugWIRE command bytes (after RikusW's protocol notes)
//
//   06        disable debugWIRE, giving the pin back to reset
//   07        reset
//   20        go, reading/writing based on IR and the low byte of PC
//   23        execute the instruction loaded with D2
//   30        resume normal execution
//   31        single step
//   40/60     set go context (timers running / timers frozen)
//   41/61     set run-to-breakpoint context
//   66        execute from virtual space (repeating instructions)
//   C2 k      select the repeating instruction pair: 0 SRAM read,
//             4 SRAM write, 1 register read, 5 register write
//   D0/D1/D2  load PC / BP / IR (word registers, high bit 0x10 forced)
//   F0/F3     read PC / signature
const DISABLE: u8 = 0x06;
const RESET: u8 = 0x07;
const GO_RW: u8 = 0x20;
const EXECUTE_IR: u8 = 0x23;
const GO: u8 = 0x30;
const STEP: u8 = 0x31;
const CONTEXT_GO_TIMERS: u8 = 0x40;
const CONTEXT_GO: u8 = 0x60;
const CONTEXT_BP_TIMERS: u8 = 0x41;
const CONTEXT_BP: u8 = 0x61;
const VIRTUAL_CONTEXT: u8 = 0x66;
const REPEAT_MODE: u8 = 0xC2;
const LOAD_PC: u8 = 0xD0;
const LOAD_BP: u8 = 0xD1;
const LOAD_IR: u8 = 0xD2;
const READ_PC: u8 = 0xF0;
const READ_SIGNATURE: u8 = 0xF3;

// Repeating-instruction selectors for C2
const SRAM_READ: u8 = 0x00; // ld r16,Z+ ; out DWDR,r16
const REGS_READ: u8 = 0x01; // out DWDR,r0 ; out DWDR,r1 ; ...
const SRAM_WRITE: u8 = 0x04; // in r16,DWDR ; st Z+,r16
const REGS_WRITE: u8 = 0x05; // in r0,DWDR ; in r1,DWDR ; ...

fn hi(w: u16) -> u8 {
    (w >> 8) as u8
}

fn lo(w: u16) -> u8 {
    w as u8
}

/// A debugging session on one halted AVR target
///
/// Owns the adapter (through its [`Pipeline`]) for the lifetime of the
/// connection; all session state -- cached registers, PC, breakpoint --
/// lives here, and every operation takes `&mut self`, so a
/// multi-threaded host must serialise its calls. DebugWIRE is a
/// request/response protocol with implicit state mutated by almost
/// every command; there is no finer-grained locking that is safe.
///
/// Any error is fatal to the session: drop it (closing the adapter)
/// and reconnect from scratch.
pub struct Session<A: Adapter> {
    pipeline: Pipeline<A>,
    device: &'static Characteristics,
    /// Byte-addressed program counter of the halted target
    pub pc: u32,
    /// Byte-addressed breakpoint, if one is set
    pub bp: Option<u32>,
    /// Leave the target's timers running across [`Session::go`]
    pub timer_enable: bool,
    // Live values of r28-r31, which the protocol uses as scratch.
    // Invariant: equal to the target's values whenever it is halted at
    // user level; restored to the target before it runs.
    shadow: [u8; 4],
}

impl<A: Adapter> Session<A> {
    /// Open a session: sync to the target's clock, identify it, and
    /// cache its halted state.
    pub fn connect(adapter: A) -> Result<Self, Error<A::Error>> {
        let mut pipeline = Pipeline::new(adapter);
        pipeline.break_and_sync()?;
        pipeline.send(&[READ_SIGNATURE])?;
        let signature = pipeline.read_word()?;
        let device = Characteristics::find(signature)
            .ok_or(Error::UnknownSignature(signature))?;
        debug::println!("device recognised as {}", device.name);
        let mut session = Self {
            pipeline,
            device,
            pc: 0,
            bp: None,
            timer_enable: false,
            shadow: [0; 4],
        };
        session.reconnect()?;
        Ok(session)
    }

    /// The recognised part
    pub fn device(&self) -> &'static Characteristics {
        self.device
    }

    /// The recovered connection rate in baud
    pub fn baud(&self) -> u32 {
        self.pipeline.baud()
    }

    /// The cached live values of r28-r31
    pub fn cached_regs(&self) -> [u8; 4] {
        self.shadow
    }

    // Raw pipeline surface, for clients (flash programmer, EEPROM
    // driver) that compose their own command sequences.

    /// Queue raw debugWIRE bytes
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), Error<A::Error>> {
        self.pipeline.send(bytes)
    }

    /// Ship anything queued, reading back the target's reply
    pub fn flush(&mut self) -> Result<(), Error<A::Error>> {
        self.pipeline.flush(SendMode::ExpectBytes)
    }

    /// Ship anything queued and read back `buf.len()` reply bytes
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<(), Error<A::Error>> {
        self.pipeline.receive(buf)
    }

    /// Ship anything queued and read back one byte
    pub fn read_byte(&mut self) -> Result<u8, Error<A::Error>> {
        self.pipeline.read_byte()
    }

    /// Ship anything queued and read back a big-endian word
    pub fn read_word(&mut self) -> Result<u16, Error<A::Error>> {
        self.pipeline.read_word()
    }

    /// Resynchronise after a command that altered the target's clock
    pub fn sync(&mut self) -> Result<(), Error<A::Error>> {
        self.pipeline.sync()
    }

    // Control-register loads and instruction injection.

    /// Load the target's program counter.
    ///
    /// `pc` is a *word* address: the lifecycle operations halve the
    /// byte-addressed [`Session::pc`] before calling this.
    pub fn set_pc(&mut self, pc: u16) -> Result<(), Error<A::Error>> {
        self.pipeline.send(&[LOAD_PC, hi(pc) | 0x10, lo(pc)])
    }

    /// Load the target's breakpoint register (word address)
    pub fn set_bp(&mut self, bp: u16) -> Result<(), Error<A::Error>> {
        self.pipeline.send(&[LOAD_BP, hi(bp) | 0x10, lo(bp)])
    }

    /// Load a 16-bit AVR instruction into IR and execute it in place
    pub fn inst(&mut self, opcode: u16) -> Result<(), Error<A::Error>> {
        self.pipeline
            .send(&[LOAD_IR, (opcode >> 8) as u8, opcode as u8, EXECUTE_IR])
    }

    /// Execute `IN reg, ioreg` on the target
    pub fn in_(&mut self, reg: u8, ioreg: u8) -> Result<(), Error<A::Error>> {
        self.inst(avr::in_opcode(reg, ioreg))
    }

    /// Execute `OUT ioreg, reg` on the target
    pub fn out(&mut self, ioreg: u8, reg: u8) -> Result<(), Error<A::Error>> {
        self.inst(avr::out_opcode(ioreg, reg))
    }

    // Register-file access.

    /// Read registers `first..first + regs.len()` into `regs`.
    ///
    /// A single register goes through one synthesised `OUT` to DWDR;
    /// anything more uses the bulk register-read loop.
    pub fn get_regs(
        &mut self,
        first: u8,
        regs: &mut [u8],
    ) -> Result<(), Error<A::Error>> {
        if regs.len() == 1 {
            self.out(self.device.dwdr_reg(), first)?;
        } else {
            self.set_pc(first.into())?;
            self.set_bp(u16::from(first) + regs.len() as u16)?;
            self.pipeline
                .send(&[VIRTUAL_CONTEXT, REPEAT_MODE, REGS_READ, GO_RW])?;
        }
        self.pipeline.receive(regs)
    }

    // One register write on the wire, without touching the cache.
    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error<A::Error>> {
        self.in_(reg, self.device.dwdr_reg())?;
        self.pipeline.send(&[value])
    }

    // Bulk or per-byte register writes on the wire, without touching
    // the cache. Below four bytes, per-byte writes cost less than the
    // bulk framing.
    fn write_regs(
        &mut self,
        first: u8,
        values: &[u8],
    ) -> Result<(), Error<A::Error>> {
        if values.len() <= 3 {
            for (i, &v) in values.iter().enumerate() {
                self.write_reg(first + i as u8, v)?;
            }
            Ok(())
        } else {
            self.set_pc(first.into())?;
            self.set_bp(u16::from(first) + values.len() as u16)?;
            self.pipeline
                .send(&[VIRTUAL_CONTEXT, REPEAT_MODE, REGS_WRITE, GO_RW])?;
            self.pipeline.send(values)
        }
    }

    // Fold a register write into the r28-r31 cache where it overlaps.
    fn cache_regs(&mut self, first: u8, values: &[u8]) {
        for (i, &v) in values.iter().enumerate() {
            let r = usize::from(first) + i;
            if (28..32).contains(&r) {
                self.shadow[r - 28] = v;
            }
        }
    }

    /// Write one register
    pub fn set_reg(&mut self, reg: u8, value: u8) -> Result<(), Error<A::Error>> {
        self.write_reg(reg, value)?;
        self.cache_regs(reg, &[value]);
        Ok(())
    }

    /// Write registers `first..first + values.len()`
    pub fn set_regs(
        &mut self,
        first: u8,
        values: &[u8],
    ) -> Result<(), Error<A::Error>> {
        self.write_regs(first, values)?;
        self.cache_regs(first, values);
        Ok(())
    }

    // Point Z (r30:r31) at a data-space address. Scratch use by the
    // bulk loops; deliberately bypasses the cache, which keeps holding
    // the *user's* r30:r31 for restoration before the target runs.
    fn set_z(&mut self, z: u16) -> Result<(), Error<A::Error>> {
        self.write_regs(30, &z.to_le_bytes())
    }

    // Data-area access.

    // Bulk-read data space via the `ld r16,Z+ / out DWDR,r16` loop.
    // The loop body is two words, so BP is 2·len. Must never span r30,
    // r31 or DWDR -- read_addr carves its requests around them.
    fn read_addr_unchecked(
        &mut self,
        addr: u16,
        buf: &mut [u8],
    ) -> Result<(), Error<A::Error>> {
        self.set_z(addr)?;
        self.set_pc(0)?;
        self.set_bp(2 * buf.len() as u16)?;
        self.pipeline
            .send(&[VIRTUAL_CONTEXT, REPEAT_MODE, SRAM_READ, GO_RW])?;
        self.pipeline.receive(buf)
    }

    /// Read `buf.len()` bytes of data space (CPU registers, I/O, SRAM)
    /// starting at `addr`.
    ///
    /// r28-r31 are served from the session cache and DWDR reads as
    /// zero; the wire never sees a bulk read spanning r30, r31 or DWDR,
    /// all of which the read loop itself depends on.
    pub fn read_addr(
        &mut self,
        addr: u16,
        buf: &mut [u8],
    ) -> Result<(), Error<A::Error>> {
        let mut addr = addr;
        let mut ix = 0usize;

        // The range below the cached registers
        if addr < 28 && ix < buf.len() {
            let n = usize::min(buf.len() - ix, usize::from(28 - addr));
            self.read_addr_unchecked(addr, &mut buf[ix..ix + n])?;
            addr += n as u16;
            ix += n;
        }

        // r28-r31 come from the cache
        while (28..=31).contains(&addr) && ix < buf.len() {
            buf[ix] = self.shadow[usize::from(addr - 28)];
            addr += 1;
            ix += 1;
        }

        // From the I/O file up to DWDR
        let dwdr = self.device.dwdr_addr();
        if addr < dwdr && ix < buf.len() {
            let n = usize::min(buf.len() - ix, usize::from(dwdr - addr));
            self.read_addr_unchecked(addr, &mut buf[ix..ix + n])?;
            addr += n as u16;
            ix += n;
        }

        // DWDR has no stable value of its own; report zero
        if addr == dwdr && ix < buf.len() {
            buf[ix] = 0;
            addr += 1;
            ix += 1;
        }

        // Everything beyond, in transfer-sized chunks
        while buf.len() - ix > BUFFER_SIZE {
            self.read_addr_unchecked(addr, &mut buf[ix..ix + BUFFER_SIZE])?;
            addr += BUFFER_SIZE as u16;
            ix += BUFFER_SIZE;
        }
        if ix < buf.len() {
            self.read_addr_unchecked(addr, &mut buf[ix..])?;
        }
        Ok(())
    }

    /// Write `values` into data space starting at `addr`.
    ///
    /// One wire write per byte: bulk framing cannot be used here
    /// because r28-r31 and DWDR must be skipped individually (the
    /// write loop would corrupt its own pointer). Skipped registers
    /// land in the cache instead and reach the target when it next
    /// runs.
    pub fn write_addr(
        &mut self,
        addr: u16,
        values: &[u8],
    ) -> Result<(), Error<A::Error>> {
        self.set_z(addr)?;
        self.set_bp(3)?;
        self.pipeline.send(&[VIRTUAL_CONTEXT, REPEAT_MODE, SRAM_WRITE])?;
        let dwdr = self.device.dwdr_addr();
        let mut addr = addr;
        for &v in values {
            if (28..=31).contains(&addr) {
                self.shadow[usize::from(addr - 28)] = v;
                self.set_z(addr + 1)?;
            } else if addr == dwdr {
                // Writing DWDR would corrupt the transfer itself
                self.set_z(addr + 1)?;
            } else {
                self.set_pc(1)?;
                self.pipeline.send(&[GO_RW, v])?;
            }
            addr += 1;
        }
        Ok(())
    }

    // Lifecycle.

    /// Refresh the PC and register cache after any auto-baud resync.
    ///
    /// The target reports the word address one *past* the current
    /// instruction; the session stores byte addresses, one back.
    pub fn reconnect(&mut self) -> Result<(), Error<A::Error>> {
        self.pipeline.send(&[READ_PC])?;
        let w = self.pipeline.read_word()?;
        self.pc = (2 * (i32::from(w) - 1))
            .rem_euclid(self.device.flash_size as i32) as u32;
        let mut shadow = [0u8; 4];
        self.get_regs(28, &mut shadow)?;
        self.shadow = shadow;
        Ok(())
    }

    /// Reset the target, resynchronise to its (possibly changed) clock,
    /// and refresh the cached state
    pub fn reset(&mut self) -> Result<(), Error<A::Error>> {
        self.pipeline.send(&[RESET])?;
        self.pipeline.sync()?;
        self.reconnect()
    }

    /// Permanently disable debugWIRE on the target.
    ///
    /// The reset pin becomes an ordinary reset pin again (and ISP
    /// programming works once more). No further commands are valid, so
    /// this consumes the session.
    pub fn disable(mut self) -> Result<(), Error<A::Error>> {
        self.pipeline.send(&[DISABLE])?;
        self.pipeline.flush(SendMode::ExpectBytes)
    }

    /// Execute one instruction
    pub fn trace(&mut self) -> Result<(), Error<A::Error>> {
        let shadow = self.shadow;
        self.write_regs(28, &shadow)?; // give r28-r31 back before running
        self.set_pc((self.pc / 2) as u16)?;
        self.pipeline.send(&[CONTEXT_GO, STEP])?;
        self.pipeline.sync()?;
        self.reconnect()
    }

    /// Begin execution, to the breakpoint if one is set.
    ///
    /// Returns once the start command is on the wire; the adapter then
    /// holds the line until the target halts. Poll
    /// [`Session::reached_breakpoint`] to find out when, then
    /// [`Session::reconnect`] to refresh the PC.
    pub fn go(&mut self) -> Result<(), Error<A::Error>> {
        let shadow = self.shadow;
        self.write_regs(28, &shadow)?;
        self.set_pc((self.pc / 2) as u16)?;
        match self.bp {
            None => {
                self.pipeline.send(&[if self.timer_enable {
                    CONTEXT_GO_TIMERS
                } else {
                    CONTEXT_GO
                }])?;
            }
            Some(bp) => {
                self.set_bp((bp / 2) as u16)?;
                self.pipeline.send(&[if self.timer_enable {
                    CONTEXT_BP_TIMERS
                } else {
                    CONTEXT_BP
                }])?;
            }
        }
        self.pipeline.send(&[GO])?;
        self.pipeline.wait()
    }

    /// Has the running target dropped back into break?
    ///
    /// One cheap poll; transport errors read as "not yet".
    pub fn reached_breakpoint(&mut self) -> bool {
        let mut buf = [0u8; 10];
        match self.pipeline.poll_back(&mut buf) {
            Ok(n) => n > 0 && buf[0] != 0,
            Err(_) => false,
        }
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/session.rs"]
mod tests;
