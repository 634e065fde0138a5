#![cfg_attr(not(feature = "std"), no_std)]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(docsrs, feature(doc_cfg_hide))]
#![cfg_attr(docsrs, doc(cfg_hide(doc)))]
mod debug;

/// Pulse-width arithmetic for the auto-baud handshake
pub mod baud;

/// Synthesising AVR opcodes for injection into the target
pub mod avr;

/// Characteristics of debugWIRE-capable AVR parts
pub mod device;
pub use device::Characteristics;

/// The outbound byte pipeline and its flush modes
pub mod pipeline;
pub use pipeline::Pipeline;

/// A debugging session on one halted AVR target
pub mod session;
pub use session::Session;

/// A mock [`Adapter`] for testing everything above the USB boundary
#[cfg(feature = "std")]
pub mod mocks;

use core::time::Duration;

/// How the adapter completes an outbound byte transfer
///
/// debugWIRE is half-duplex: after shifting the host's bytes onto the
/// wire the adapter either leaves the line alone, turns it around to
/// read the target's reply, measures the pulse widths of an auto-baud
/// frame, or sits on the line waiting for the target to drop into
/// break. The command stream itself determines which of these is
/// correct, so the flushing layer must say so explicitly.
///
/// The discriminants are the wire values of the adapter's vendor
/// control request.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum SendMode {
    /// Send bytes; nothing comes back.
    Plain = 0x04,
    /// Send bytes, then hold the line until the target drops into
    /// break (it halted, or hit a breakpoint). The host discovers
    /// completion by polling, not from this transfer.
    ExpectBreak = 0x0C,
    /// Send bytes, then turn the line around and read the target's
    /// reply bytes.
    ExpectBytes = 0x14,
    /// Send bytes, then capture the pulse widths of the `0x55`
    /// auto-baud frame that follows (reset, SPM single-step).
    ExpectPulses = 0x24,
}

/// A bounded retry policy for one adapter transaction
///
/// The adapter reports "busy" while it is still shifting a previous
/// transfer onto the (much slower) debugWIRE line, so every transport
/// operation retries with a wall-clock pause. Policies are passed per
/// call site; tests substitute faster ones.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Retry {
    /// Most attempts made before the transport gives up
    pub attempts: u32,
    /// Pause before each retry
    pub backoff: Duration,
}

impl Retry {
    /// Outbound byte transfers
    pub const SEND: Retry = Retry {
        attempts: 50,
        backoff: Duration::from_millis(20),
    };
    /// Inbound reply bytes
    pub const READ: Retry = Retry {
        attempts: 50,
        backoff: Duration::from_millis(20),
    };
    /// Captured pulse widths during clock recovery (the whole handshake
    /// is itself retried, so individual polls give up sooner)
    pub const CAPTURE: Retry = Retry {
        attempts: 5,
        backoff: Duration::from_millis(20),
    };
    /// A single cheap poll, e.g. "has the target halted yet?"
    pub const PROBE: Retry = Retry {
        attempts: 1,
        backoff: Duration::from_millis(0),
    };
}

/// An abstract debugWIRE USB adapter
///
/// The dongle on the other end of the USB cable: a half-duplex UART
/// bridge onto the target's reset pin, with pulse-width capture for
/// auto-baud. One vendor control request does everything; the
/// implementation owns every wall-clock delay and retry loop, so the
/// engine above never sleeps.
pub trait Adapter {
    /// The transport's own failures (USB stalls, device gone, ...),
    /// surfaced through [`Error::Transport`].
    type Error: PartialEq + Eq;

    /// Ship `bytes` onto the debugWIRE line, completing per `mode`.
    ///
    /// Must not return success until the whole payload is on its way
    /// to the wire; a short transfer is a transport-fatal error, not a
    /// partial success.
    fn send(
        &mut self,
        mode: SendMode,
        bytes: &[u8],
        retry: Retry,
    ) -> Result<(), Error<Self::Error>>;

    /// Drive a break on the wire, release it, and capture the pulse
    /// widths of the target's `0x55` reply.
    ///
    /// Returns once the capture window has passed; the measurements are
    /// collected with [`Adapter::read_back`]. Also aborts any
    /// wait-for-break (mode [`SendMode::ExpectBreak`]) still pending in
    /// the adapter.
    fn request_break(&mut self) -> Result<(), Error<Self::Error>>;

    /// Program the adapter's bit-time divisor, as computed by
    /// [`baud::bit_time`] from a capture.
    fn set_bit_time(&mut self, divisor: u16) -> Result<(), Error<Self::Error>>;

    /// Read back whatever the adapter last captured: reply bytes, or
    /// pulse widths as 16-bit little-endian words. Returns the number
    /// of bytes available.
    fn read_back(
        &mut self,
        buf: &mut [u8],
        retry: Retry,
    ) -> Result<usize, Error<Self::Error>>;
}

/// Errors which can arise during a debugWIRE session
///
/// Everything here is fatal to the session: transient adapter-busy
/// conditions are absorbed by the transport's retry loops and never
/// observed above them.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error<T: PartialEq + Eq> {
    /// The transport itself failed (retry budget exhausted, short
    /// write, device vanished).
    Transport(T),

    /// The break-and-capture handshake never produced enough pulse
    /// samples to recover the target's clock.
    SyncFailed,

    /// The target's signature is not in the characteristics table.
    UnknownSignature(u16),

    /// The target sent fewer reply bytes than the command sequence
    /// promised.
    ShortRead {
        /// Bytes the command sequence should have produced
        wanted: usize,
        /// Bytes the adapter actually captured
        got: usize,
    },
}
