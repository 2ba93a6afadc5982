//! # midin - Real-time MIDI Input
//!
//! Reads live MIDI 1.0 input from hardware ports and turns it into per-device
//! state blocks a host can poll once per frame.
//!
//! ## Architecture
//!
//! midin is an umbrella crate that coordinates:
//! - **midin-core** - Wire decoding, per-channel note state, delta records, double-buffered event queue
//! - **midin-io** - Transports, port reader threads, hot-plug catalog, device registry
//!
//! ## Quick Start
//!
//! ```ignore
//! use midin::prelude::*;
//!
//! let mut midi = MidiInputSystem::builder().client_name("my-app").build()?;
//! let mut host = StateBlockHost::new();
//!
//! loop {
//!     midi.tick(&mut host);
//!     for (device, description) in host.devices() {
//!         if host.is_note_pressed(device, 60) {
//!             println!("{} channel {:?}: middle C", description.product, description.channel);
//!         }
//!     }
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Hardware input
//! - `midi-io` - Hardware input through midir

pub mod error;
pub use error::{Error, Result};

/// Re-export of midin-core for direct access
pub use midin_core as core;

/// Re-export of midin-io for direct access
pub use midin_io as io;

pub use midin_core::{
    decode_message, ActiveNoteSet, ChannelModeKind, ChannelState, ChannelVoiceEvent, ContextId,
    Control, Decoded, DeviceId, Payload, Route, StateDelta, TransportKind, STATE_BLOCK_SIZE,
};

pub use midin_io::{
    DeviceDescription, DeviceHost, MidiInputConfig, MidiInputSystem, MidiInputSystemBuilder,
    MidiTransport, PortInfo, ReaderState, StateBlockHost, TickReport, VirtualTransport,
};

#[cfg(feature = "midi-io")]
pub use midin_io::MidirTransport;

/// Common imports for hosts embedding midin.
pub mod prelude {
    pub use crate::{Error, Result};

    pub use midin_core::{ChannelVoiceEvent, ContextId, DeviceId, TransportKind};
    pub use midin_io::{
        DeviceDescription, DeviceHost, MidiInputConfig, MidiInputSystem, StateBlockHost,
        TickReport, VirtualTransport,
    };
}
