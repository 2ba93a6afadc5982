//! In-memory transport for tests and programmatic input.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{InputPort, MidiTransport, PortDescriptor, RawMessage};
use crate::error::{Error, Result};

const DEFAULT_QUEUE_LEN: usize = 1024;

struct VirtualPortEntry {
    name: String,
    listeners: Vec<Sender<RawMessage>>,
    read_failures: Arc<AtomicUsize>,
}

#[derive(Default)]
struct Inner {
    ports: Vec<VirtualPortEntry>,
    open_failures: usize,
    enumerate_failures: usize,
    opens: usize,
}

/// Scriptable transport: ports are added, renamed and removed by hand,
/// and bytes sent to a port reach every handle currently open on it.
///
/// Clones share the same port list.
#[derive(Clone)]
pub struct VirtualTransport {
    inner: Arc<Mutex<Inner>>,
    queue_len: usize,
}

impl Default for VirtualTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTransport {
    pub fn new() -> Self {
        Self::with_queue_len(DEFAULT_QUEUE_LEN)
    }

    /// Each open handle buffers at most `queue_len` unread messages.
    pub fn with_queue_len(queue_len: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            queue_len: queue_len.max(1),
        }
    }

    /// Append a port and return its index.
    pub fn add_port(&self, name: impl Into<String>) -> usize {
        let mut inner = self.inner.lock();
        inner.ports.push(VirtualPortEntry {
            name: name.into(),
            listeners: Vec::new(),
            read_failures: Arc::new(AtomicUsize::new(0)),
        });
        inner.ports.len() - 1
    }

    /// Remove the port at `index`. Open handles on it start failing reads.
    pub fn remove_port(&self, index: usize) -> bool {
        let mut inner = self.inner.lock();
        if index < inner.ports.len() {
            inner.ports.remove(index);
            true
        } else {
            false
        }
    }

    pub fn rename_port(&self, index: usize, name: impl Into<String>) -> bool {
        match self.inner.lock().ports.get_mut(index) {
            Some(entry) => {
                entry.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Deliver one message to every open handle on `index`.
    ///
    /// Returns the number of handles still open on the port.
    pub fn send(&self, index: usize, bytes: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.ports.get_mut(index) else {
            return 0;
        };
        // Handles that were dropped disconnect their receiver
        entry.listeners.retain(|listener| {
            !matches!(listener.try_send(RawMessage::new(bytes)), Err(e) if e.is_disconnected())
        });
        entry.listeners.len()
    }

    /// Make the next `count` reads on `index` fail, across all its handles.
    pub fn fail_reads(&self, index: usize, count: usize) {
        if let Some(entry) = self.inner.lock().ports.get(index) {
            entry.read_failures.store(count, Ordering::Release);
        }
    }

    /// Make the next `count` calls to [`open`](MidiTransport::open) fail.
    pub fn fail_opens(&self, count: usize) {
        self.inner.lock().open_failures = count;
    }

    /// Make the next `count` calls to [`enumerate`](MidiTransport::enumerate) fail.
    pub fn fail_enumerations(&self, count: usize) {
        self.inner.lock().enumerate_failures = count;
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.inner.lock().opens
    }
}

impl MidiTransport for VirtualTransport {
    fn enumerate(&self) -> Result<Vec<PortDescriptor>> {
        let mut inner = self.inner.lock();
        if inner.enumerate_failures > 0 {
            inner.enumerate_failures -= 1;
            return Err(Error::Enumerate("virtual enumeration failure".to_string()));
        }
        Ok(inner
            .ports
            .iter()
            .enumerate()
            .map(|(index, entry)| PortDescriptor {
                index,
                name: entry.name.clone(),
            })
            .collect())
    }

    fn open(&self, index: usize) -> Result<Box<dyn InputPort>> {
        let mut inner = self.inner.lock();
        if inner.open_failures > 0 {
            inner.open_failures -= 1;
            return Err(Error::PortOpen {
                index,
                message: "virtual open failure".to_string(),
            });
        }
        let queue_len = self.queue_len;
        let entry = inner.ports.get_mut(index).ok_or(Error::PortNotFound(index))?;
        let (sender, receiver) = bounded(queue_len);
        entry.listeners.push(sender);
        let port = VirtualInputPort {
            name: entry.name.clone(),
            receiver,
            read_failures: Arc::clone(&entry.read_failures),
        };
        inner.opens += 1;
        Ok(Box::new(port))
    }
}

struct VirtualInputPort {
    name: String,
    receiver: Receiver<RawMessage>,
    read_failures: Arc<AtomicUsize>,
}

impl InputPort for VirtualInputPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, timeout: Duration) -> Result<Option<RawMessage>> {
        let injected = self
            .read_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if injected.is_ok() {
            // Keep the failure from completing instantly so retries are observable
            std::thread::sleep(timeout);
            return Err(Error::PortRead(format!("{}: injected read failure", self.name)));
        }

        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::PortRead(format!("{}: port removed", self.name)))
            }
        }
    }
}
