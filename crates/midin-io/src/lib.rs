//! Threaded MIDI input for the midin subsystem.
//!
//! Provides the transport seam, per-port reader threads, the hot-plug port
//! catalog, the device registry and the [`MidiInputSystem`] that ties them
//! to a host once per tick.
//!
//! Feature gates: `midi-io` (hardware input through `midir`, on by default).

pub mod error;
pub use error::{Error, Result};

pub mod transport;
#[cfg(feature = "midi-io")]
pub use transport::MidirTransport;
pub use transport::{InputPort, MidiTransport, PortDescriptor, RawMessage, VirtualTransport};

pub mod host;
pub use host::{DeviceDescription, DeviceHost, StateBlockHost};

pub mod registry;
pub use registry::{
    DeviceKey, DeviceRegistry, DeviceRequests, DeviceSlot, FlushReport, SlotState, MAX_ADD_ATTEMPTS,
};

pub mod port;
pub use port::{Port, PortCatalog, PortInfo, ReaderConfig, ReaderState, ReaderStats, RefreshOutcome};

mod system;
pub use system::{MidiInputConfig, MidiInputSystem, MidiInputSystemBuilder, TickReport};
