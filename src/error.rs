//! Centralized error type for the midin umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] midin_core::Error),

    #[error("MIDI input: {0}")]
    Io(#[from] midin_io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
