//! In-memory reference host: one state block per device.

use std::collections::BTreeMap;

use midin_core::layout::{fits, Control, STATE_BLOCK_SIZE};
use midin_core::{DeviceId, TransportKind, PITCH_BEND_CENTER};

use super::{DeviceDescription, DeviceHost};
use crate::error::{Error, Result};

const PITCH_BEND_MAX: u16 = 0x3FFF;

struct HostedDevice {
    description: DeviceDescription,
    block: Box<[u8; STATE_BLOCK_SIZE]>,
}

impl HostedDevice {
    fn new(description: DeviceDescription) -> Self {
        let mut block = Box::new([0u8; STATE_BLOCK_SIZE]);
        let offset = Control::PitchBend.offset() as usize;
        block[offset..offset + 2].copy_from_slice(&PITCH_BEND_CENTER.to_le_bytes());
        Self { description, block }
    }

    fn byte(&self, control: Control) -> u8 {
        self.block[control.offset() as usize]
    }
}

/// Keeps a [`STATE_BLOCK_SIZE`]-byte block per device and applies deltas to it.
///
/// Transport bytes behave like momentary buttons: [`begin_update`](DeviceHost::begin_update)
/// clears them, so a transport message is visible for exactly one tick.
#[derive(Default)]
pub struct StateBlockHost {
    devices: BTreeMap<DeviceId, HostedDevice>,
    next_id: u32,
    add_failures: usize,
    removed: usize,
}

impl StateBlockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` device creations fail.
    pub fn fail_adds(&mut self, count: usize) {
        self.add_failures = count;
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Number of devices removed over the host's lifetime.
    pub fn removed_count(&self) -> usize {
        self.removed
    }

    pub fn devices(&self) -> impl Iterator<Item = (DeviceId, &DeviceDescription)> + '_ {
        self.devices
            .iter()
            .map(|(id, device)| (*id, &device.description))
    }

    pub fn description(&self, device: DeviceId) -> Option<&DeviceDescription> {
        self.devices.get(&device).map(|d| &d.description)
    }

    /// The live device for `product` and `channel` (`None` = all channels).
    pub fn find_device(&self, product: &str, channel: Option<u8>) -> Option<DeviceId> {
        self.devices()
            .find(|(_, description)| description.product == product && description.channel == channel)
            .map(|(id, _)| id)
    }

    /// Raw state block of `device`.
    pub fn state(&self, device: DeviceId) -> Option<&[u8]> {
        self.devices.get(&device).map(|d| &d.block[..])
    }

    pub fn note_velocity(&self, device: DeviceId, note: u8) -> Option<u8> {
        self.devices
            .get(&device)
            .map(|d| d.byte(Control::Note(note)))
    }

    pub fn is_note_pressed(&self, device: DeviceId, note: u8) -> bool {
        self.note_velocity(device, note).is_some_and(|v| v > 0)
    }

    pub fn note_pressure(&self, device: DeviceId, note: u8) -> Option<u8> {
        self.devices
            .get(&device)
            .map(|d| d.byte(Control::NotePressure(note)))
    }

    pub fn control(&self, device: DeviceId, controller: u8) -> Option<u8> {
        self.devices
            .get(&device)
            .map(|d| d.byte(Control::Controller(controller)))
    }

    pub fn pitch_bend(&self, device: DeviceId) -> Option<u16> {
        self.devices.get(&device).map(|d| {
            let offset = Control::PitchBend.offset() as usize;
            u16::from_le_bytes([d.block[offset], d.block[offset + 1]])
        })
    }

    pub fn channel_pressure(&self, device: DeviceId) -> Option<u8> {
        self.devices
            .get(&device)
            .map(|d| d.byte(Control::ChannelPressure))
    }

    /// The transport message received this tick, if any.
    pub fn transport(&self, device: DeviceId) -> Option<TransportKind> {
        self.devices
            .get(&device)
            .and_then(|d| TransportKind::from_status_byte(d.byte(Control::Transport)))
    }

    /// Velocity in 0.0..=1.0.
    pub fn note_velocity_normalized(&self, device: DeviceId, note: u8) -> Option<f32> {
        self.note_velocity(device, note).map(normalize_7bit)
    }

    /// Controller value in 0.0..=1.0.
    pub fn control_normalized(&self, device: DeviceId, controller: u8) -> Option<f32> {
        self.control(device, controller).map(normalize_7bit)
    }

    /// Pitch bend in -1.0..=1.0, 0.0 at center.
    pub fn pitch_bend_normalized(&self, device: DeviceId) -> Option<f32> {
        self.pitch_bend(device).map(normalize_pitch_bend)
    }
}

#[inline]
fn normalize_7bit(value: u8) -> f32 {
    value.min(127) as f32 / 127.0
}

/// Zero-point normalization: each side of center scales to its own half range.
fn normalize_pitch_bend(value: u16) -> f32 {
    let value = value.min(PITCH_BEND_MAX) as f32;
    let center = PITCH_BEND_CENTER as f32;
    if value < center {
        (value - center) / center
    } else {
        (value - center) / (PITCH_BEND_MAX as f32 - center)
    }
}

impl DeviceHost for StateBlockHost {
    fn add_device(&mut self, description: &DeviceDescription) -> Result<DeviceId> {
        if self.add_failures > 0 {
            self.add_failures -= 1;
            return Err(Error::Host(format!(
                "refused to create device for {}",
                description.product
            )));
        }
        let id = DeviceId(self.next_id);
        self.next_id += 1;
        self.devices.insert(id, HostedDevice::new(description.clone()));
        Ok(id)
    }

    fn remove_device(&mut self, device: DeviceId) {
        if self.devices.remove(&device).is_some() {
            self.removed += 1;
        }
    }

    fn deliver_delta(&mut self, device: DeviceId, offset: u32, payload: &[u8]) {
        let Some(hosted) = self.devices.get_mut(&device) else {
            tracing::trace!("Delta for unknown {} dropped", device);
            return;
        };
        if payload.is_empty() || !fits(offset, payload.len() as u8) {
            tracing::trace!("Delta at offset {} for {} out of range", offset, device);
            return;
        }
        let start = offset as usize;
        hosted.block[start..start + payload.len()].copy_from_slice(payload);
    }

    fn begin_update(&mut self) {
        let transport = Control::Transport.offset() as usize;
        for device in self.devices.values_mut() {
            device.block[transport] = 0;
        }
    }
}
