#![cfg_attr(not(feature = "std"), no_std)]

/// The no_std enclave
pub mod core;

pub use self::core::*;

#[cfg(feature = "std")]
pub mod cycle;

#[cfg(feature = "std")]
pub mod relay;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "std")]
pub mod session;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "std")]
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Byte-oriented, timeout-bounded access to the shared half-duplex line.
///
/// The line carries one request/response transaction at a time. Writes push a
/// complete command frame; reads block until a LF-terminated response line
/// arrives or the fixed per-session timeout elapses, in which case the
/// implementation must fail with `std::io::ErrorKind::TimedOut`.
#[cfg(feature = "std")]
pub trait Transport {
    /// Write one command frame to the line.
    fn send(&mut self, frame: &[u8]) -> std::io::Result<()>;

    /// Read one response line, up to and including the LF terminator.
    fn read_line(&mut self) -> std::io::Result<Vec<u8>>;
}

/// Shared cancellation flag for orderly shutdown.
///
/// Cloned into signal handlers and polled by the measurement loop and by
/// relay holds, so an interrupt can never leave a relay energized or a
/// transaction half-written.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

#[cfg(feature = "std")]
impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
