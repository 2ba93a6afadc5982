//! Device registry: the consumer-owned record of which logical devices exist.
//!
//! Port readers never talk to the host. They queue add and remove requests
//! through a [`DeviceRequests`] handle and address events through the
//! returned [`DeviceSlot`]. The consumer applies the queued requests in
//! [`DeviceRegistry::flush`], once per tick, and binds each slot to the
//! device the host created for it.

use arc_swap::ArcSwapOption;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use midin_core::{ContextId, DeviceId};

use crate::host::{DeviceDescription, DeviceHost};

/// Identity of a device: one per port and context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub port_index: usize,
    pub port_name: String,
    pub context: ContextId,
}

/// Unique per slot, so a rebuilt port reusing a key never matches an old slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    /// Add requested, no device yet.
    Queued = 0,
    /// Device created, nothing delivered yet.
    Bound = 1,
    /// At least one event delivered.
    Live = 2,
    Removed = 3,
}

impl SlotState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SlotState::Queued,
            1 => SlotState::Bound,
            2 => SlotState::Live,
            _ => SlotState::Removed,
        }
    }
}

/// Placeholder a producer uses to address a device before and after it is bound.
#[derive(Debug)]
pub struct DeviceSlot {
    id: SlotId,
    key: DeviceKey,
    state: AtomicU8,
    device: ArcSwapOption<DeviceId>,
}

impl DeviceSlot {
    fn new(id: SlotId, key: DeviceKey) -> Self {
        Self {
            id,
            key,
            state: AtomicU8::new(SlotState::Queued as u8),
            device: ArcSwapOption::empty(),
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn key(&self) -> &DeviceKey {
        &self.key
    }

    #[inline]
    pub fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The bound device, if the slot is bound and not removed.
    #[inline]
    pub fn device(&self) -> Option<DeviceId> {
        match self.state() {
            SlotState::Bound | SlotState::Live => self.device.load().as_deref().copied(),
            SlotState::Queued | SlotState::Removed => None,
        }
    }

    /// Bound -> Live. No-op in any other state.
    #[inline]
    pub fn mark_live(&self) {
        let _ = self.state.compare_exchange(
            SlotState::Bound as u8,
            SlotState::Live as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Queued -> Bound. Fails if the slot was removed meanwhile.
    fn bind(&self, device: DeviceId) -> bool {
        self.device.store(Some(Arc::new(device)));
        self.state
            .compare_exchange(
                SlotState::Queued as u8,
                SlotState::Bound as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn mark_removed(&self) {
        self.state.store(SlotState::Removed as u8, Ordering::Release);
    }

    /// Whatever device was ever bound, regardless of state.
    fn bound_device(&self) -> Option<DeviceId> {
        self.device.load().as_deref().copied()
    }
}

/// Host creation attempts per slot before its add is abandoned.
pub const MAX_ADD_ATTEMPTS: u32 = 3;

enum Request {
    Add(Arc<DeviceSlot>, DeviceDescription),
    Remove(Arc<DeviceSlot>),
}

struct PendingAdd {
    slot: Arc<DeviceSlot>,
    description: DeviceDescription,
    attempts: u32,
}

/// Producer handle for queuing device requests. Cheap to clone.
#[derive(Clone)]
pub struct DeviceRequests {
    sender: Sender<Request>,
    next_slot: Arc<AtomicU64>,
}

impl DeviceRequests {
    /// Queue creation of a device and return the slot that will be bound to it.
    pub fn queue_add(&self, key: DeviceKey, description: DeviceDescription) -> Arc<DeviceSlot> {
        let id = SlotId(self.next_slot.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(DeviceSlot::new(id, key));
        tracing::debug!(
            "Queued device for port {} ({}) {:?}",
            slot.key.port_index,
            slot.key.port_name,
            slot.key.context
        );
        // The registry owns the receiver; a send can only fail once it is gone
        let _ = self.sender.send(Request::Add(Arc::clone(&slot), description));
        slot
    }

    /// Mark `slot` removed now and queue destruction of its device.
    pub fn queue_remove(&self, slot: &Arc<DeviceSlot>) {
        slot.mark_removed();
        let _ = self.sender.send(Request::Remove(Arc::clone(slot)));
    }
}

impl std::fmt::Debug for DeviceRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRequests")
            .field("pending", &self.sender.len())
            .finish()
    }
}

/// Outcome of one [`DeviceRegistry::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub added: usize,
    pub removed: usize,
    /// Adds whose slot was removed before the flush reached them.
    pub skipped: usize,
    /// Host creation failures, including ones kept for another attempt.
    pub failed: usize,
    /// Adds dropped after [`MAX_ADD_ATTEMPTS`] failures.
    pub abandoned: usize,
}

#[derive(Debug, Clone, Copy)]
struct BoundDevice {
    slot: SlotId,
    device: DeviceId,
}

/// Consumer-side owner of device identity. Not `Clone`.
pub struct DeviceRegistry {
    requests: DeviceRequests,
    receiver: Receiver<Request>,
    devices: HashMap<DeviceKey, BoundDevice>,
    owned: HashSet<DeviceId>,
    /// Adds the host rejected, retried on the next flush.
    retries: Vec<PendingAdd>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            requests: DeviceRequests {
                sender,
                next_slot: Arc::new(AtomicU64::new(0)),
            },
            receiver,
            devices: HashMap::new(),
            owned: HashSet::new(),
            retries: Vec::new(),
        }
    }

    /// A new producer handle.
    pub fn requests(&self) -> DeviceRequests {
        self.requests.clone()
    }

    /// Requests waiting for the next flush, including adds kept for a retry.
    pub fn pending(&self) -> usize {
        self.receiver.len() + self.retries.len()
    }

    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    /// Whether `device` was created by this registry and not removed since.
    #[inline]
    pub fn owns(&self, device: DeviceId) -> bool {
        self.owned.contains(&device)
    }

    /// Current device for `key`.
    pub fn device_for(&self, key: &DeviceKey) -> Option<DeviceId> {
        self.devices.get(key).map(|bound| bound.device)
    }

    /// Apply every queued request: all adds in queued order, then all removes.
    ///
    /// Adds the host rejected on an earlier flush go first.
    pub fn flush<H: DeviceHost + ?Sized>(&mut self, host: &mut H) -> FlushReport {
        let mut report = FlushReport::default();
        let mut adds = std::mem::take(&mut self.retries);
        let mut removes = Vec::new();
        for request in self.receiver.try_iter() {
            match request {
                Request::Add(slot, description) => adds.push(PendingAdd {
                    slot,
                    description,
                    attempts: 0,
                }),
                Request::Remove(slot) => removes.push(slot),
            }
        }

        for mut add in adds {
            let slot = &add.slot;
            if slot.state() == SlotState::Removed {
                tracing::trace!("Skipping add for removed slot {:?}", slot.key);
                report.skipped += 1;
                continue;
            }
            match host.add_device(&add.description) {
                Ok(device) => {
                    if !slot.bind(device) {
                        // Removed between the check and the bind; its Remove request cleans up
                        tracing::trace!("Slot {:?} removed while binding", slot.key);
                    }
                    self.owned.insert(device);
                    self.devices.insert(
                        slot.key.clone(),
                        BoundDevice {
                            slot: slot.id,
                            device,
                        },
                    );
                    tracing::debug!(
                        "Bound {} to port {} ({}) {:?}",
                        device,
                        slot.key.port_index,
                        slot.key.port_name,
                        slot.key.context
                    );
                    report.added += 1;
                }
                Err(e) => {
                    add.attempts += 1;
                    report.failed += 1;
                    if add.attempts < MAX_ADD_ATTEMPTS {
                        tracing::warn!(
                            "Failed to create device for {}, attempt {}/{}: {}",
                            add.description.product,
                            add.attempts,
                            MAX_ADD_ATTEMPTS,
                            e
                        );
                        self.retries.push(add);
                    } else {
                        tracing::warn!(
                            "Giving up on device for {} {:?} after {} attempts: {}",
                            add.description.product,
                            add.slot.key.context,
                            add.attempts,
                            e
                        );
                        report.abandoned += 1;
                    }
                }
            }
        }

        for slot in removes {
            let Some(device) = slot.bound_device() else {
                continue;
            };
            if !self.owned.remove(&device) {
                continue;
            }
            host.remove_device(device);
            if self
                .devices
                .get(&slot.key)
                .is_some_and(|bound| bound.slot == slot.id)
            {
                self.devices.remove(&slot.key);
            }
            tracing::debug!("Removed {} for port {} ({})", device, slot.key.port_index, slot.key.port_name);
            report.removed += 1;
        }

        report
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.owned.len())
            .field("pending", &self.receiver.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StateBlockHost;

    fn key(port_index: usize, context: ContextId) -> DeviceKey {
        DeviceKey {
            port_index,
            port_name: format!("Port {}", port_index),
            context,
        }
    }

    fn description(key: &DeviceKey) -> DeviceDescription {
        DeviceDescription::new(key.port_name.clone(), key.port_index, key.context.channel())
    }

    fn queue(requests: &DeviceRequests, key: DeviceKey) -> Arc<DeviceSlot> {
        let description = description(&key);
        requests.queue_add(key, description)
    }

    #[test]
    fn test_flush_binds_queued_slots() {
        let mut registry = DeviceRegistry::new();
        let mut host = StateBlockHost::new();
        let requests = registry.requests();

        let slot = queue(&requests, key(0, ContextId::Channel(0)));
        assert_eq!(slot.state(), SlotState::Queued);
        assert_eq!(slot.device(), None);
        assert_eq!(registry.pending(), 1);

        let report = registry.flush(&mut host);
        assert_eq!(report.added, 1);
        assert_eq!(slot.state(), SlotState::Bound);
        let device = slot.device().unwrap();
        assert!(registry.owns(device));
        assert_eq!(registry.device_for(slot.key()), Some(device));
        assert_eq!(host.description(device).unwrap().channel, Some(0));

        slot.mark_live();
        assert_eq!(slot.state(), SlotState::Live);
        assert_eq!(slot.device(), Some(device));
    }

    #[test]
    fn test_adds_run_before_removes() {
        let mut registry = DeviceRegistry::new();
        let mut host = StateBlockHost::new();
        let requests = registry.requests();

        let first = queue(&requests, key(0, ContextId::AllChannels));
        registry.flush(&mut host);

        // Remove queued before the add, both pending in the same flush
        requests.queue_remove(&first);
        let second = queue(&requests, key(0, ContextId::AllChannels));
        let report = registry.flush(&mut host);

        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(host.device_count(), 1);
        let device = second.device().unwrap();
        assert_eq!(registry.device_for(second.key()), Some(device));
        assert!(!registry.owns(first.bound_device().unwrap()));
    }

    #[test]
    fn test_removed_before_flush_never_creates_device() {
        let mut registry = DeviceRegistry::new();
        let mut host = StateBlockHost::new();
        let requests = registry.requests();

        let slot = queue(&requests, key(1, ContextId::Channel(3)));
        requests.queue_remove(&slot);
        let report = registry.flush(&mut host);

        assert_eq!(report.added, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(host.device_count(), 0);
        assert_eq!(slot.state(), SlotState::Removed);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_removed_slot_stops_resolving() {
        let mut registry = DeviceRegistry::new();
        let mut host = StateBlockHost::new();
        let requests = registry.requests();

        let slot = queue(&requests, key(0, ContextId::Channel(0)));
        registry.flush(&mut host);
        let device = slot.device().unwrap();

        requests.queue_remove(&slot);
        assert_eq!(slot.device(), None);
        // Still owned until the consumer flushes the removal
        assert!(registry.owns(device));

        let report = registry.flush(&mut host);
        assert_eq!(report.removed, 1);
        assert!(!registry.owns(device));
        assert_eq!(host.device_count(), 0);
        assert_eq!(registry.device_for(slot.key()), None);
    }

    #[test]
    fn test_host_failure_is_retried_next_flush() {
        let mut registry = DeviceRegistry::new();
        let mut host = StateBlockHost::new();
        host.fail_adds(1);
        let requests = registry.requests();

        let slot = queue(&requests, key(0, ContextId::Channel(0)));
        let report = registry.flush(&mut host);
        assert_eq!(report.failed, 1);
        assert_eq!(report.abandoned, 0);
        assert_eq!(slot.state(), SlotState::Queued);
        assert_eq!(slot.device(), None);
        assert_eq!(registry.pending(), 1);

        let report = registry.flush(&mut host);
        assert_eq!(report.added, 1);
        assert_eq!(slot.state(), SlotState::Bound);
        assert_eq!(registry.device_for(slot.key()), slot.device());
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn test_host_failure_is_abandoned_after_max_attempts() {
        let mut registry = DeviceRegistry::new();
        let mut host = StateBlockHost::new();
        host.fail_adds(MAX_ADD_ATTEMPTS as usize);
        let requests = registry.requests();

        let slot = queue(&requests, key(0, ContextId::Channel(0)));
        let mut abandoned = 0;
        for _ in 0..MAX_ADD_ATTEMPTS {
            abandoned += registry.flush(&mut host).abandoned;
        }
        assert_eq!(abandoned, 1);
        assert_eq!(registry.pending(), 0);

        // The host recovered, but the slot is no longer tried
        assert_eq!(registry.flush(&mut host), FlushReport::default());
        assert_eq!(slot.state(), SlotState::Queued);
        assert_eq!(host.device_count(), 0);
    }

    #[test]
    fn test_removed_slot_is_not_retried() {
        let mut registry = DeviceRegistry::new();
        let mut host = StateBlockHost::new();
        host.fail_adds(1);
        let requests = registry.requests();

        let slot = queue(&requests, key(2, ContextId::AllChannels));
        assert_eq!(registry.flush(&mut host).failed, 1);

        requests.queue_remove(&slot);
        let report = registry.flush(&mut host);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.added, 0);
        assert_eq!(host.device_count(), 0);
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn test_requests_from_many_threads() {
        let mut registry = DeviceRegistry::new();
        let mut host = StateBlockHost::new();

        std::thread::scope(|scope| {
            for port in 0..4 {
                let requests = registry.requests();
                scope.spawn(move || {
                    for channel in 0..16u8 {
                        queue(&requests, key(port, ContextId::Channel(channel)));
                    }
                });
            }
        });

        let report = registry.flush(&mut host);
        assert_eq!(report.added, 64);
        assert_eq!(registry.len(), 64);
        assert_eq!(registry.pending(), 0);
    }
}
