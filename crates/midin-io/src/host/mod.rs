//! Host device framework seam.
//!
//! The host owns logical devices and their state blocks. This crate only
//! asks it to create and destroy devices, and hands it validated deltas.

use serde::{Deserialize, Serialize};

use midin_core::DeviceId;

use crate::error::Result;

mod state_block;
pub use state_block::StateBlockHost;

/// Interface tag carried by every device this crate creates.
pub const INTERFACE_NAME: &str = "midin";

/// What the host needs to know to create a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub interface: String,
    /// The port name.
    pub product: String,
    pub port_index: usize,
    /// MIDI channel, or `None` for the all-channels device.
    pub channel: Option<u8>,
}

impl DeviceDescription {
    pub fn new(product: impl Into<String>, port_index: usize, channel: Option<u8>) -> Self {
        Self {
            interface: INTERFACE_NAME.to_string(),
            product: product.into(),
            port_index,
            channel,
        }
    }
}

/// Consumer-side device framework.
///
/// Every method is called from the thread driving [`MidiInputSystem::tick`](crate::MidiInputSystem::tick).
pub trait DeviceHost {
    fn add_device(&mut self, description: &DeviceDescription) -> Result<DeviceId>;

    fn remove_device(&mut self, device: DeviceId);

    /// Write `payload` (1, 2 or 4 little-endian bytes) at `offset` in the device state block.
    fn deliver_delta(&mut self, device: DeviceId, offset: u32, payload: &[u8]);

    /// Called once at the start of every tick.
    fn begin_update(&mut self) {}
}
