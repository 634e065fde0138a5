//! A mock [`Adapter`] for testing everything above the USB boundary
//!
//! The mockall-generated mock lives behind a wrapper struct so that
//! expectations are set on `.inner` while the wrapper itself implements
//! the real trait; downstream crates can reuse it for their own tests.

use crate::{Adapter, Error, Retry, SendMode};
use mockall::mock;

/// The engine error type as instantiated by [`MockAdapter`]
pub type MockError = Error<()>;

mock! {
    /// Expectation surface for [`MockAdapter`]
    pub AdapterInner {
        /// See [`Adapter::send`]
        pub fn send(
            &mut self,
            mode: SendMode,
            bytes: &[u8],
            retry: Retry,
        ) -> Result<(), MockError>;

        /// See [`Adapter::request_break`]
        pub fn request_break(&mut self) -> Result<(), MockError>;

        /// See [`Adapter::set_bit_time`]
        pub fn set_bit_time(&mut self, divisor: u16) -> Result<(), MockError>;

        /// See [`Adapter::read_back`]
        pub fn read_back(
            &mut self,
            buf: &mut [u8],
            retry: Retry,
        ) -> Result<usize, MockError>;
    }
}

/// An [`Adapter`] backed by mockall expectations
pub struct MockAdapter {
    /// Set expectations here
    pub inner: MockAdapterInner,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self {
            inner: MockAdapterInner::new(),
        }
    }
}

impl Adapter for MockAdapter {
    type Error = ();

    fn send(
        &mut self,
        mode: SendMode,
        bytes: &[u8],
        retry: Retry,
    ) -> Result<(), MockError> {
        self.inner.send(mode, bytes, retry)
    }

    fn request_break(&mut self) -> Result<(), MockError> {
        self.inner.request_break()
    }

    fn set_bit_time(&mut self, divisor: u16) -> Result<(), MockError> {
        self.inner.set_bit_time(divisor)
    }

    fn read_back(
        &mut self,
        buf: &mut [u8],
        retry: Retry,
    ) -> Result<usize, MockError> {
        self.inner.read_back(buf, retry)
    }
}
