//! Routing of framed messages through a port's 17 note-tracking contexts.
//!
//! Owned by exactly one reader thread. Nothing here blocks except the short
//! event queue lock inside [`EventSender::append_all`], taken once per
//! context a message reaches.

use parking_lot::Mutex;
use std::sync::Arc;

use midin_core::layout::delta_for;
use midin_core::{
    decode_message, ChannelState, ChannelVoiceEvent, ContextId, EventSender, Route, StateDelta,
};

use super::PortInfo;
use crate::host::DeviceDescription;
use crate::registry::{DeviceKey, DeviceRequests, DeviceSlot};

#[derive(Default)]
struct Context {
    state: ChannelState,
    slot: Option<Arc<DeviceSlot>>,
}

/// Counts from routing one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Deltas appended to the event queue.
    pub queued: usize,
    /// Finalized events with no bound device to address.
    pub dropped: usize,
}

pub struct Router {
    info: PortInfo,
    contexts: [Context; ContextId::COUNT],
    requests: DeviceRequests,
    sender: EventSender,
    /// Every slot this router requested, shared with the owning port for disposal.
    requested: Arc<Mutex<Vec<Arc<DeviceSlot>>>>,
    /// Deltas finalized for one context, reused across messages.
    batch: Vec<StateDelta>,
}

impl Router {
    pub fn new(
        info: PortInfo,
        requests: DeviceRequests,
        sender: EventSender,
        requested: Arc<Mutex<Vec<Arc<DeviceSlot>>>>,
    ) -> Self {
        Self {
            info,
            contexts: std::array::from_fn(|_| Context::default()),
            requests,
            sender,
            requested,
            batch: Vec::new(),
        }
    }

    pub fn info(&self) -> &PortInfo {
        &self.info
    }

    /// Current note state of `context`.
    pub fn channel_state(&self, context: ContextId) -> &ChannelState {
        &self.contexts[context.index()].state
    }

    /// Decode one framed message and deliver its events to every context it reaches.
    pub fn route(&mut self, bytes: &[u8]) -> RouteOutcome {
        let mut outcome = RouteOutcome::default();
        let Some(decoded) = decode_message(bytes) else {
            tracing::trace!("Dropped MIDI message {:02X?} on port {}", bytes, self.info.index);
            return outcome;
        };

        match decoded.route {
            Route::Channel(channel) => {
                self.deliver(ContextId::Channel(channel), decoded.event, &mut outcome);
                self.deliver(ContextId::AllChannels, decoded.event, &mut outcome);
            }
            Route::Port => {
                // Transport never creates a channel context
                for index in 0..ContextId::COUNT - 1 {
                    if self.contexts[index].slot.is_some() {
                        if let Some(context) = ContextId::from_index(index) {
                            self.deliver(context, decoded.event, &mut outcome);
                        }
                    }
                }
                self.deliver(ContextId::AllChannels, decoded.event, &mut outcome);
            }
        }
        outcome
    }

    fn deliver(&mut self, context: ContextId, event: ChannelVoiceEvent, outcome: &mut RouteOutcome) {
        let slot = self.request(context);
        let batch = &mut self.batch;
        batch.clear();

        // Note state is tracked even while the device is unbound
        self.contexts[context.index()].state.apply(event, |finalized| {
            let Some(device) = slot.device() else {
                outcome.dropped += 1;
                return;
            };
            if let Some(delta) = delta_for(device, finalized) {
                batch.push(delta);
            }
        });
        if batch.is_empty() {
            return;
        }

        match self.sender.append_all(batch.as_slice()) {
            Ok(()) => {
                slot.mark_live();
                outcome.queued += batch.len();
            }
            Err(e) => {
                tracing::trace!("Rejected {} deltas for {:?}: {}", batch.len(), context, e);
                outcome.dropped += batch.len();
            }
        }
    }

    /// The slot for `context`, queuing a device add the first time.
    fn request(&mut self, context: ContextId) -> Arc<DeviceSlot> {
        let entry = &mut self.contexts[context.index()].slot;
        if let Some(slot) = entry.as_ref() {
            return Arc::clone(slot);
        }
        let key = DeviceKey {
            port_index: self.info.index,
            port_name: self.info.name.clone(),
            context,
        };
        let description =
            DeviceDescription::new(self.info.name.clone(), self.info.index, context.channel());
        let slot = self.requests.queue_add(key, description);
        self.requested.lock().push(Arc::clone(&slot));
        *entry = Some(Arc::clone(&slot));
        slot
    }
}
