//! Hardware transport backed by `midir`.
//!
//! midir delivers input on its own callback thread; each open port forwards
//! messages into a bounded channel that the port reader drains with a timeout.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use midir::{Ignore, MidiInput, MidiInputConnection};
use parking_lot::Mutex;
use std::time::Duration;

use super::{InputPort, MidiTransport, PortDescriptor, RawMessage};
use crate::error::{Error, Result};

pub struct MidirTransport {
    client_name: String,
    queue_len: usize,
    /// Long-lived client used only for enumeration.
    probe: Mutex<MidiInput>,
}

impl MidirTransport {
    pub fn new(client_name: impl Into<String>, queue_len: usize) -> Result<Self> {
        let client_name = client_name.into();
        let probe = MidiInput::new(&format!("{}-probe", client_name))?;
        tracing::debug!("Created MIDI transport client {}", client_name);
        Ok(Self {
            client_name,
            queue_len: queue_len.max(1),
            probe: Mutex::new(probe),
        })
    }
}

impl MidiTransport for MidirTransport {
    fn enumerate(&self) -> Result<Vec<PortDescriptor>> {
        let probe = self.probe.lock();
        probe
            .ports()
            .iter()
            .enumerate()
            .map(|(index, port)| {
                Ok(PortDescriptor {
                    index,
                    name: probe.port_name(port)?,
                })
            })
            .collect()
    }

    fn open(&self, index: usize) -> Result<Box<dyn InputPort>> {
        // connect() consumes the client, so every open gets its own
        let mut input = MidiInput::new(&self.client_name)?;
        input.ignore(Ignore::All);

        let ports = input.ports();
        let port = ports.get(index).ok_or(Error::PortNotFound(index))?;
        let name = input.port_name(port).map_err(|e| Error::PortOpen {
            index,
            message: e.to_string(),
        })?;

        let (sender, receiver) = bounded(self.queue_len);
        let port_label = name.clone();
        let connection = input.connect(
            port,
            &format!("{}-in-{}", self.client_name, index),
            move |_timestamp, message, _| {
                if sender.try_send(RawMessage::new(message)).is_err() {
                    tracing::trace!("MIDI input queue full on {}, dropping message", port_label);
                }
            },
            (),
        )?;

        Ok(Box::new(MidirInputPort {
            name,
            receiver,
            _connection: connection,
        }))
    }
}

struct MidirInputPort {
    name: String,
    receiver: Receiver<RawMessage>,
    /// Closes the native port on drop.
    _connection: MidiInputConnection<()>,
}

impl InputPort for MidirInputPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, timeout: Duration) -> Result<Option<RawMessage>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::PortRead(format!(
                "{}: input callback disconnected",
                self.name
            ))),
        }
    }
}
