//! Error types for the MIDI input I/O subsystem.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("MIDI transport initialization failed: {0}")]
    TransportInit(String),

    #[error("MIDI port enumeration failed: {0}")]
    Enumerate(String),

    #[error("Failed to open MIDI port {index}: {message}")]
    PortOpen { index: usize, message: String },

    #[error("MIDI port connection failed: {0}")]
    Connect(String),

    #[error("MIDI port read error: {0}")]
    PortRead(String),

    #[error("MIDI port {0} not found")]
    PortNotFound(usize),

    #[error("Failed to spawn port reader thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Host device error: {0}")]
    Host(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Record(#[from] midin_core::Error),
}

#[cfg(feature = "midi-io")]
impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::TransportInit(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::PortInfoError> for Error {
    fn from(e: midir::PortInfoError) -> Self {
        Error::Enumerate(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Error::Connect(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
