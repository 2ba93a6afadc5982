//! Port catalog: keeps the set of open ports in step with the transport.
//!
//! Port indices are not stable across hot-plug, so the catalog does not try
//! to patch its list. Any sign of change (a different port count, a dead
//! reader, a port whose name moved, a port that failed to open last cycle)
//! disposes every port and rebuilds the whole list from a fresh enumeration.

use std::sync::Arc;

use midin_core::EventSender;

use super::{Port, PortInfo, ReaderConfig};
use crate::registry::DeviceRequests;
use crate::transport::{MidiTransport, PortDescriptor};

/// What one [`PortCatalog::refresh`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub rebuilt: bool,
    pub closed: usize,
    pub opened: usize,
    /// Ports skipped after exhausting their open attempts.
    pub failed: usize,
}

pub struct PortCatalog {
    transport: Arc<dyn MidiTransport>,
    ports: Vec<Port>,
    /// Port count enumerated at the last rebuild; `None` before the first.
    last_count: Option<usize>,
    open_attempts: u32,
    reader_config: ReaderConfig,
    requests: DeviceRequests,
    sender: EventSender,
}

impl PortCatalog {
    pub fn new(
        transport: Arc<dyn MidiTransport>,
        requests: DeviceRequests,
        sender: EventSender,
        reader_config: ReaderConfig,
        open_attempts: u32,
    ) -> Self {
        Self {
            transport,
            ports: Vec::new(),
            last_count: None,
            open_attempts: open_attempts.max(1),
            reader_config,
            requests,
            sender,
        }
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port_infos(&self) -> Vec<PortInfo> {
        self.ports.iter().map(|port| port.info().clone()).collect()
    }

    pub fn transport(&self) -> &Arc<dyn MidiTransport> {
        &self.transport
    }

    /// Probe the transport and rebuild the port list if anything changed.
    pub fn refresh(&mut self) -> RefreshOutcome {
        let descriptors = match self.transport.enumerate() {
            Ok(descriptors) => descriptors,
            Err(e) => {
                tracing::warn!("MIDI port enumeration failed, keeping current ports: {}", e);
                return RefreshOutcome::default();
            }
        };

        if !self.needs_rebuild(&descriptors) {
            return RefreshOutcome::default();
        }
        self.rebuild(&descriptors)
    }

    fn needs_rebuild(&self, descriptors: &[PortDescriptor]) -> bool {
        if self.last_count != Some(descriptors.len()) {
            return true;
        }
        if self.ports.len() != descriptors.len() {
            tracing::debug!(
                "{} of {} MIDI ports open, retrying the rest",
                self.ports.len(),
                descriptors.len()
            );
            return true;
        }
        self.ports.iter().any(|port| {
            if !port.is_alive() {
                tracing::debug!("MIDI port {} ({}) is no longer alive", port.index(), port.name());
                return true;
            }
            match descriptors.get(port.index()) {
                Some(descriptor) if descriptor.name == port.name() => false,
                Some(descriptor) => {
                    tracing::debug!(
                        "MIDI port {} renamed from {} to {}",
                        port.index(),
                        port.name(),
                        descriptor.name
                    );
                    true
                }
                None => true,
            }
        })
    }

    fn rebuild(&mut self, descriptors: &[PortDescriptor]) -> RefreshOutcome {
        let mut outcome = RefreshOutcome {
            rebuilt: true,
            closed: self.close_all(),
            ..RefreshOutcome::default()
        };

        for descriptor in descriptors {
            match self.open_with_retry(descriptor) {
                Some(port) => {
                    self.ports.push(port);
                    outcome.opened += 1;
                }
                None => outcome.failed += 1,
            }
        }
        self.last_count = Some(descriptors.len());

        tracing::info!(
            "Rebuilt MIDI port list: {} of {} ports open",
            outcome.opened,
            descriptors.len()
        );
        outcome
    }

    fn open_with_retry(&self, descriptor: &PortDescriptor) -> Option<Port> {
        for attempt in 1..=self.open_attempts {
            match Port::open(
                self.transport.as_ref(),
                descriptor.index,
                self.requests.clone(),
                self.sender.clone(),
                self.reader_config,
            ) {
                Ok(port) => return Some(port),
                Err(e) => tracing::warn!(
                    "Failed to open MIDI port {} ({}), attempt {}/{}: {}",
                    descriptor.index,
                    descriptor.name,
                    attempt,
                    self.open_attempts,
                    e
                ),
            }
        }
        None
    }

    /// Close every port. Returns how many were closed.
    pub fn close_all(&mut self) -> usize {
        let count = self.ports.len();
        for mut port in self.ports.drain(..) {
            port.close();
        }
        count
    }
}

impl Drop for PortCatalog {
    fn drop(&mut self) {
        self.close_all();
    }
}
