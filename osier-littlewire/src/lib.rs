#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use core::time::Duration;
use osier_dwire::{Adapter, Error, Retry, SendMode};
use rusb::{Context, DeviceHandle, UsbContext};
use std::thread::sleep;

/// USB vendor id of a Little-Wire / Digispark adapter
pub const VENDOR_ID: u16 = 0x1781;
/// USB product id of a Little-Wire / Digispark adapter
pub const PRODUCT_ID: u16 = 0x0C9F;

// The one vendor control request the firmware implements; wValue
// selects the operation (SendMode's discriminants, plus the two below).
const DEBUGWIRE_REQUEST: u8 = 60;
const MODE_SET_TIMING: u16 = 2;
const MODE_BREAK_CAPTURE: u16 = 33;

const USB_TIMEOUT: Duration = Duration::from_secs(5);
// The adapter has begun shifting onto the wire after this long
const SETTLE: Duration = Duration::from_millis(3);
// Time for the adapter to drive a break and capture the 0x55 reply
const BREAK_CAPTURE: Duration = Duration::from_millis(120);

/// Errors from the Little-Wire link itself
///
/// Surfaced to the engine through `osier_dwire::Error::Transport`; all
/// of them end the session.
#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LinkError {
    /// libusb failed outright
    #[error("usb: {0}")]
    Usb(#[from] rusb::Error),

    /// No adapter on the bus
    #[error("no Little-Wire adapter found (1781:0c9f)")]
    NotFound,

    /// The adapter stayed busy through the whole retry budget
    #[error("adapter still busy after {attempts} attempts ({operation})")]
    Exhausted {
        /// Which transfer was being retried
        operation: &'static str,
        /// Attempts made before giving up
        attempts: u32,
    },

    /// An outbound transfer was cut short; the wire state is unknown
    #[error("short write: sent {sent} of {wanted} bytes")]
    ShortWrite {
        /// Bytes that should have gone out
        wanted: usize,
        /// Bytes libusb accepted
        sent: usize,
    },
}

/// One Little-Wire adapter, driven over vendor control transfers
pub struct LittleWire<C: UsbContext> {
    handle: DeviceHandle<C>,
}

impl LittleWire<Context> {
    /// Find and open the first adapter on the bus
    pub fn open() -> Result<Self, LinkError> {
        let context = Context::new()?;
        let handle = context
            .open_device_with_vid_pid(VENDOR_ID, PRODUCT_ID)
            .ok_or(LinkError::NotFound)?;
        tracing::debug!("opened Little-Wire adapter");
        Ok(Self { handle })
    }
}

impl<C: UsbContext> LittleWire<C> {
    /// Wrap an already-open device handle (alternative contexts,
    /// hotplug integration)
    pub fn from_handle(handle: DeviceHandle<C>) -> Self {
        Self { handle }
    }

    fn control_out(&mut self, value: u16, bytes: &[u8]) -> rusb::Result<usize> {
        self.handle.write_control(
            rusb::request_type(
                rusb::Direction::Out,
                rusb::RequestType::Vendor,
                rusb::Recipient::Device,
            ),
            DEBUGWIRE_REQUEST,
            value,
            0,
            bytes,
            USB_TIMEOUT,
        )
    }

    fn control_in(&mut self, buf: &mut [u8]) -> rusb::Result<usize> {
        self.handle.read_control(
            rusb::request_type(
                rusb::Direction::In,
                rusb::RequestType::Vendor,
                rusb::Recipient::Device,
            ),
            DEBUGWIRE_REQUEST,
            0,
            0,
            buf,
            USB_TIMEOUT,
        )
    }
}

impl<C: UsbContext> Adapter for LittleWire<C> {
    type Error = LinkError;

    fn send(
        &mut self,
        mode: SendMode,
        bytes: &[u8],
        retry: Retry,
    ) -> Result<(), Error<LinkError>> {
        let mut attempts = 0;
        let sent = loop {
            attempts += 1;
            match self.control_out(mode as u16, bytes) {
                Ok(n) => break n,
                Err(e) => {
                    tracing::trace!("send busy, attempt {attempts}: {e}");
                    if attempts >= retry.attempts {
                        return Err(Error::Transport(LinkError::Exhausted {
                            operation: "send",
                            attempts,
                        }));
                    }
                    sleep(retry.backoff);
                }
            }
        };
        if sent < bytes.len() {
            return Err(Error::Transport(LinkError::ShortWrite {
                wanted: bytes.len(),
                sent,
            }));
        }
        // Wait at least until the adapter starts shifting the data
        sleep(SETTLE);
        Ok(())
    }

    fn request_break(&mut self) -> Result<(), Error<LinkError>> {
        // Also aborts a wait-for-break (mode 0x0C) still pending in the
        // firmware's start-bit loop
        self.control_out(MODE_BREAK_CAPTURE, &[])
            .map_err(|e| Error::Transport(LinkError::Usb(e)))?;
        // The adapter pulls the line low, releases it and measures the
        // target's 0x55 reply; nothing to poll until that is over
        sleep(BREAK_CAPTURE);
        Ok(())
    }

    fn set_bit_time(&mut self, divisor: u16) -> Result<(), Error<LinkError>> {
        tracing::debug!("bit-time divisor {divisor}");
        let sent = self
            .control_out(MODE_SET_TIMING, &divisor.to_le_bytes())
            .map_err(|e| Error::Transport(LinkError::Usb(e)))?;
        if sent < 2 {
            return Err(Error::Transport(LinkError::ShortWrite {
                wanted: 2,
                sent,
            }));
        }
        Ok(())
    }

    fn read_back(
        &mut self,
        buf: &mut [u8],
        retry: Retry,
    ) -> Result<usize, Error<LinkError>> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            // The firmware reports nothing until it has finished
            // working the wire, so pause first
            sleep(retry.backoff);
            match self.control_in(buf) {
                Ok(n) if n > 0 => {
                    tracing::trace!("read back {n} bytes");
                    return Ok(n);
                }
                Ok(_) => {}
                Err(e) => tracing::trace!("read busy, attempt {attempts}: {e}"),
            }
            if attempts >= retry.attempts {
                return Err(Error::Transport(LinkError::Exhausted {
                    operation: "read back",
                    attempts,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_match_the_firmware() {
        assert_eq!(SendMode::Plain as u16, 0x04);
        assert_eq!(SendMode::ExpectBreak as u16, 0x0C);
        assert_eq!(SendMode::ExpectBytes as u16, 0x14);
        assert_eq!(SendMode::ExpectPulses as u16, 0x24);
    }

    #[test]
    fn errors_display() {
        assert_eq!(
            LinkError::Exhausted {
                operation: "send",
                attempts: 50
            }
            .to_string(),
            "adapter still busy after 50 attempts (send)"
        );
        assert_eq!(
            LinkError::ShortWrite { wanted: 3, sent: 1 }.to_string(),
            "short write: sent 1 of 3 bytes"
        );
    }
}
