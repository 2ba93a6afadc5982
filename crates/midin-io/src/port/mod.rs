//! Open input ports and the catalog that keeps them in sync with the transport.

pub mod catalog;
pub mod reader;
pub mod router;

pub use catalog::{PortCatalog, RefreshOutcome};
pub use reader::{ReaderConfig, ReaderState, ReaderStats, ReaderStatus};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;

use midin_core::EventSender;

use crate::error::Result;
use crate::registry::{DeviceRequests, DeviceSlot};
use crate::transport::{InputPort, MidiTransport};
use router::Router;

/// Identity of an open port: its index and the name it had when opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortInfo {
    pub index: usize,
    pub name: String,
}

/// One open hardware port and the reader thread that owns its handle.
///
/// Dropping a `Port` stops and joins the reader, closes the handle, then
/// queues removal of every device the port requested.
pub struct Port {
    info: PortInfo,
    status: Arc<ReaderStatus>,
    thread: Option<JoinHandle<Box<dyn InputPort>>>,
    requested: Arc<Mutex<Vec<Arc<DeviceSlot>>>>,
    requests: DeviceRequests,
}

impl Port {
    /// Open the transport port at `index` and start its reader.
    pub fn open(
        transport: &dyn MidiTransport,
        index: usize,
        requests: DeviceRequests,
        sender: EventSender,
        config: ReaderConfig,
    ) -> Result<Port> {
        let status = Arc::new(ReaderStatus::default());
        status.set_state(ReaderState::Opening);
        let input = match transport.open(index) {
            Ok(input) => input,
            Err(e) => {
                status.set_state(ReaderState::Stopped);
                return Err(e);
            }
        };

        let info = PortInfo {
            index,
            name: input.name().to_string(),
        };
        let requested = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new(
            info.clone(),
            requests.clone(),
            sender,
            Arc::clone(&requested),
        );
        let thread = reader::spawn(index, input, router, Arc::clone(&status), config)?;
        tracing::info!("Opened MIDI input port {}: {}", info.index, info.name);

        Ok(Port {
            info,
            status,
            thread: Some(thread),
            requested,
            requests,
        })
    }

    pub fn info(&self) -> &PortInfo {
        &self.info
    }

    pub fn index(&self) -> usize {
        self.info.index
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn reader_state(&self) -> ReaderState {
        self.status.state()
    }

    pub fn stats(&self) -> ReaderStats {
        self.status.stats()
    }

    /// Whether the reader is still running.
    ///
    /// A reader that panicked never publishes `Stopped`, so the thread itself is checked too.
    pub fn is_alive(&self) -> bool {
        self.status.state() != ReaderState::Stopped
            && self
                .thread
                .as_ref()
                .is_some_and(|thread| !thread.is_finished())
    }

    /// Number of device slots this port has requested.
    pub fn device_count(&self) -> usize {
        self.requested.lock().len()
    }

    /// Stop the reader, close the handle and queue removal of this port's devices.
    ///
    /// Blocks for at most one read timeout. Idempotent.
    pub fn close(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.status.request_stop();
        match thread.join() {
            // Closing the native port after the thread is gone
            Ok(input) => drop(input),
            Err(_) => tracing::warn!("MIDI reader thread for port {} panicked", self.info.index),
        }
        self.status.set_state(ReaderState::Stopped);

        for slot in self.requested.lock().drain(..) {
            self.requests.queue_remove(&slot);
        }
        tracing::info!("Closed MIDI input port {}: {}", self.info.index, self.info.name);
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("info", &self.info)
            .field("state", &self.status.state())
            .finish_non_exhaustive()
    }
}
