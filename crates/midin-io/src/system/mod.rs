//! The input subsystem as a single context object.
//!
//! ## Quick Start
//!
//! ```ignore
//! use midin_io::{MidiInputSystem, StateBlockHost};
//!
//! let mut midi = MidiInputSystem::builder().client_name("my-app").build()?;
//! let mut host = StateBlockHost::new();
//!
//! // Once per frame, on the thread that owns the host
//! let report = midi.tick(&mut host);
//!
//! if let Some(keys) = host.find_device("Keystation 49", None) {
//!     let pressed = host.is_note_pressed(keys, 60);
//!     let bend = host.pitch_bend_normalized(keys);
//! }
//! ```

mod builder;

pub use builder::{MidiInputConfig, MidiInputSystemBuilder};

use serde::{Deserialize, Serialize};

use midin_core::EventDrain;

use crate::host::DeviceHost;
use crate::port::{PortCatalog, PortInfo, ReaderState, ReaderStats};
use crate::registry::DeviceRegistry;

/// What one [`MidiInputSystem::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub ports_rebuilt: bool,
    pub events_delivered: usize,
    /// Deltas addressed to devices the registry no longer owns.
    pub events_dropped: usize,
    pub devices_added: usize,
    pub devices_removed: usize,
}

/// Owns the port readers, the event queue consumer and the device registry.
///
/// Build it once, call [`tick`](Self::tick) from the host's update loop and
/// drop it (or call [`shutdown`](Self::shutdown)) when done. Dropping stops
/// and joins every reader thread.
pub struct MidiInputSystem {
    config: MidiInputConfig,
    catalog: PortCatalog,
    registry: DeviceRegistry,
    drain: EventDrain,
}

impl MidiInputSystem {
    pub fn builder() -> MidiInputSystemBuilder {
        MidiInputSystemBuilder::default()
    }

    pub fn config(&self) -> &MidiInputConfig {
        &self.config
    }

    /// Currently open ports.
    pub fn ports(&self) -> Vec<PortInfo> {
        self.catalog.port_infos()
    }

    /// Reader state of every open port, by port index.
    pub fn reader_states(&self) -> Vec<(usize, ReaderState)> {
        self.catalog
            .ports()
            .iter()
            .map(|port| (port.index(), port.reader_state()))
            .collect()
    }

    pub fn reader_stats(&self, port_index: usize) -> Option<ReaderStats> {
        self.catalog
            .ports()
            .iter()
            .find(|port| port.index() == port_index)
            .map(|port| port.stats())
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Run one consumer cycle.
    ///
    /// Refreshes the port catalog, delivers everything queued since the last
    /// tick, then applies pending device adds and removes.
    pub fn tick<H: DeviceHost + ?Sized>(&mut self, host: &mut H) -> TickReport {
        let mut report = TickReport::default();
        host.begin_update();

        report.ports_rebuilt = self.catalog.refresh().rebuilt;

        for delta in self.drain.drain() {
            if !self.registry.owns(delta.device) {
                report.events_dropped += 1;
                continue;
            }
            host.deliver_delta(delta.device, delta.offset, &delta.payload.bytes());
            report.events_delivered += 1;
        }

        let flushed = self.registry.flush(host);
        report.devices_added = flushed.added;
        report.devices_removed = flushed.removed;

        tracing::trace!("MIDI input tick: {:?}", report);
        report
    }

    /// Close every port and remove every device from `host`.
    pub fn shutdown<H: DeviceHost + ?Sized>(&mut self, host: &mut H) -> TickReport {
        let closed = self.catalog.close_all();
        // Events still queued address devices that are about to go
        let events_dropped = self.drain.drain().count();
        let flushed = self.registry.flush(host);
        tracing::info!(
            "MIDI input shut down: {} ports closed, {} devices removed",
            closed,
            flushed.removed
        );
        TickReport {
            ports_rebuilt: false,
            events_delivered: 0,
            events_dropped,
            devices_added: flushed.added,
            devices_removed: flushed.removed,
        }
    }
}

impl std::fmt::Debug for MidiInputSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiInputSystem")
            .field("config", &self.config)
            .field("ports", &self.catalog.ports())
            .field("registry", &self.registry)
            .finish()
    }
}
