//! The outbound byte pipeline and clock recovery
//!
//! Every byte the command encoder emits passes through here. Bytes are
//! coalesced into one buffer to minimise USB transactions, and the
//! buffer is flushed with whichever [`SendMode`] the command stream
//! needs -- in particular, a read transaction always carries at least
//! one outbound byte, so the adapter has something to transmit before
//! it turns the line around.

use crate::baud;
use crate::debug;
use crate::{Adapter, Error, Retry, SendMode};

/// Capacity of the coalescing buffer, which is also the largest single
/// transfer the adapter accepts
pub const BUFFER_SIZE: usize = 128;

/// Attempts of the full break-and-capture handshake before giving up
pub const SYNC_ATTEMPTS: u32 = 25;

/// The outbound coalescing buffer, its flush modes, and the adapter's
/// recovered timing
pub struct Pipeline<A: Adapter> {
    adapter: A,
    buf: [u8; BUFFER_SIZE],
    len: usize,
    cycles_per_pulse: u32,
}

impl<A: Adapter> Pipeline<A> {
    /// Wrap an adapter. No traffic happens until the first send or
    /// sync.
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            buf: [0; BUFFER_SIZE],
            len: 0,
            cycles_per_pulse: 0,
        }
    }

    /// Queue bytes for the wire.
    ///
    /// If the queue would overflow, full buffers are shipped
    /// immediately with [`SendMode::Plain`] until between 1 and
    /// [`BUFFER_SIZE`] bytes remain; the residue stays queued so that a
    /// following read transaction is never empty.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), Error<A::Error>> {
        let mut bytes = bytes;
        while self.len + bytes.len() > BUFFER_SIZE {
            let take = BUFFER_SIZE - self.len;
            self.buf[self.len..].copy_from_slice(&bytes[..take]);
            self.adapter.send(SendMode::Plain, &self.buf, Retry::SEND)?;
            self.len = 0;
            bytes = &bytes[take..];
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Ship everything queued, completing per `mode`. No-op when the
    /// queue is empty.
    pub fn flush(&mut self, mode: SendMode) -> Result<(), Error<A::Error>> {
        if self.len > 0 {
            self.adapter.send(mode, &self.buf[..self.len], Retry::SEND)?;
            self.len = 0;
        }
        Ok(())
    }

    /// Ship everything queued and read back `buf.len()` reply bytes.
    ///
    /// `buf.len()` must not exceed [`BUFFER_SIZE`]. A target that
    /// produces fewer bytes than asked for is a protocol failure
    /// ([`Error::ShortRead`]), not a partial success.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<(), Error<A::Error>> {
        assert!(buf.len() <= BUFFER_SIZE);
        self.flush(SendMode::ExpectBytes)?;
        let got = self.adapter.read_back(buf, Retry::READ)?;
        if got < buf.len() {
            return Err(Error::ShortRead {
                wanted: buf.len(),
                got,
            });
        }
        Ok(())
    }

    /// Ship everything queued and read back one byte
    pub fn read_byte(&mut self) -> Result<u8, Error<A::Error>> {
        let mut b = [0u8; 1];
        self.receive(&mut b)?;
        Ok(b[0])
    }

    /// Ship everything queued and read back a big-endian word
    pub fn read_word(&mut self) -> Result<u16, Error<A::Error>> {
        let mut b = [0u8; 2];
        self.receive(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    /// Ship everything queued in pulse-capture mode, then re-measure
    /// the target's clock and reprogram the adapter's bit time.
    ///
    /// Required after any command that leaves the line in an auto-baud
    /// state: reset, single-stepping an SPM. Acts as a barrier -- when
    /// this returns, everything previously queued has been delivered
    /// and the adapter is retimed.
    pub fn sync(&mut self) -> Result<(), Error<A::Error>> {
        self.flush(SendMode::ExpectPulses)?;
        if self.recover_timing()? {
            Ok(())
        } else {
            Err(Error::SyncFailed)
        }
    }

    /// Ship everything queued, leaving the adapter holding the line
    /// until the target drops into break.
    ///
    /// This transfer itself completes immediately; the host discovers
    /// the halt later by polling [`Pipeline::poll_back`] (see
    /// `Session::reached_breakpoint`).
    pub fn wait(&mut self) -> Result<(), Error<A::Error>> {
        self.flush(SendMode::ExpectBreak)
    }

    /// One cheap unretried read-back of whatever the adapter has
    /// captured
    pub fn poll_back(&mut self, buf: &mut [u8]) -> Result<usize, Error<A::Error>> {
        self.adapter.read_back(buf, Retry::PROBE)
    }

    /// Drive the full break-and-capture handshake until the target's
    /// clock is recovered, retrying up to [`SYNC_ATTEMPTS`] times.
    pub fn break_and_sync(&mut self) -> Result<(), Error<A::Error>> {
        for _ in 0..SYNC_ATTEMPTS {
            if self.adapter.request_break().is_err() {
                continue;
            }
            if self.recover_timing()? {
                return Ok(());
            }
            debug::println!("break-and-sync: no usable capture, retrying");
        }
        Err(Error::SyncFailed)
    }

    /// One measurement attempt: poll the captured pulse widths, derive
    /// the target's bit-cell time, program the adapter's divisor.
    ///
    /// `Ok(false)` means the capture was missing or too short -- soft,
    /// the caller may break and try again. Failing to program the
    /// divisor is hard.
    fn recover_timing(&mut self) -> Result<bool, Error<A::Error>> {
        let mut raw = [0u8; BUFFER_SIZE];
        let got = match self.adapter.read_back(&mut raw, Retry::CAPTURE) {
            Ok(n) => n,
            Err(_) => return Ok(false),
        };
        if got < baud::MIN_CAPTURE_BYTES {
            return Ok(false);
        }
        let mut samples = [0u16; BUFFER_SIZE / 2];
        let n = baud::decode_samples(&raw[..got], &mut samples);
        let Some(cycles) = baud::cycles_per_pulse(&samples[..n]) else {
            return Ok(false);
        };
        self.adapter.set_bit_time(baud::bit_time(cycles))?;
        self.cycles_per_pulse = cycles;
        debug::println!("connected at {} baud", baud::baud(cycles));
        Ok(true)
    }

    /// The most recent bit-cell measurement in adapter clock cycles;
    /// zero until the first successful sync
    pub fn cycles_per_pulse(&self) -> u32 {
        self.cycles_per_pulse
    }

    /// The recovered connection rate in baud; zero until the first
    /// successful sync
    pub fn baud(&self) -> u32 {
        if self.cycles_per_pulse == 0 {
            0
        } else {
            baud::baud(self.cycles_per_pulse)
        }
    }

    /// Bytes currently queued and not yet shipped
    pub fn pending(&self) -> usize {
        self.len
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/pipeline.rs"]
mod tests;
