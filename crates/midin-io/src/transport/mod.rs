//! Native MIDI transport seam.
//!
//! The rest of the crate sees a transport only as a list of named ports and a
//! source of raw message bytes. [`MidirTransport`] talks to the OS through
//! `midir`; [`VirtualTransport`] is an in-memory, scriptable stand-in.

use std::time::{Duration, Instant};

use crate::error::Result;

#[cfg(feature = "midi-io")]
mod midir_backend;
mod virtual_port;

#[cfg(feature = "midi-io")]
pub use midir_backend::MidirTransport;
pub use virtual_port::VirtualTransport;

/// One enumerated input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub index: usize,
    pub name: String,
}

/// One transport-framed MIDI message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub timestamp: Instant,
    pub bytes: Vec<u8>,
}

impl RawMessage {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp: Instant::now(),
            bytes: bytes.into(),
        }
    }
}

/// Port enumeration and open.
pub trait MidiTransport: Send + Sync {
    /// Current input ports, ordered by index.
    fn enumerate(&self) -> Result<Vec<PortDescriptor>>;

    /// Open the input port at `index`. The port is closed when the box is dropped.
    fn open(&self, index: usize) -> Result<Box<dyn InputPort>>;
}

/// An open input port, owned by exactly one reader thread.
pub trait InputPort: Send {
    fn name(&self) -> &str;

    /// Wait at most `timeout` for the next message.
    ///
    /// `Ok(None)` means nothing arrived in time.
    fn read(&mut self, timeout: Duration) -> Result<Option<RawMessage>>;
}
