//! Device state block layout.
//!
//! Every logical device owns a fixed-size byte block. Each control lives at a
//! static offset with a static width; the table is keyed by [`Control`], so
//! hosts resolve layouts without any name lookup.
//!
//! | bytes     | control                          |
//! |-----------|----------------------------------|
//! | 0..128    | note velocity (0 = released)     |
//! | 128..256  | polyphonic note pressure         |
//! | 256..376  | controllers 0-119                |
//! | 376..378  | pitch bend, u16 little-endian    |
//! | 378       | channel pressure                 |
//! | 379       | transport status byte, 0 = idle  |

use crate::event::{ChannelVoiceEvent, MAX_CONTROLLER};
use crate::record::{DeviceId, Payload, StateDelta};

pub const NOTE_OFFSET: u32 = 0;
pub const NOTE_PRESSURE_OFFSET: u32 = 128;
pub const CONTROL_OFFSET: u32 = 256;
pub const PITCH_BEND_OFFSET: u32 = CONTROL_OFFSET + MAX_CONTROLLER as u32 + 1;
pub const CHANNEL_PRESSURE_OFFSET: u32 = PITCH_BEND_OFFSET + 2;
pub const TRANSPORT_OFFSET: u32 = CHANNEL_PRESSURE_OFFSET + 1;

/// Size in bytes of one device state block.
pub const STATE_BLOCK_SIZE: usize = TRANSPORT_OFFSET as usize + 1;

/// A control within a device state block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Note(u8),
    NotePressure(u8),
    Controller(u8),
    PitchBend,
    ChannelPressure,
    Transport,
}

impl Control {
    #[inline]
    pub fn offset(self) -> u32 {
        match self {
            Control::Note(note) => NOTE_OFFSET + (note & 0x7F) as u32,
            Control::NotePressure(note) => NOTE_PRESSURE_OFFSET + (note & 0x7F) as u32,
            Control::Controller(number) => CONTROL_OFFSET + number.min(MAX_CONTROLLER) as u32,
            Control::PitchBend => PITCH_BEND_OFFSET,
            Control::ChannelPressure => CHANNEL_PRESSURE_OFFSET,
            Control::Transport => TRANSPORT_OFFSET,
        }
    }

    /// Width in bytes.
    #[inline]
    pub fn width(self) -> u8 {
        match self {
            Control::PitchBend => 2,
            _ => 1,
        }
    }

    /// The control whose block starts at `offset`, if any.
    pub fn at_offset(offset: u32) -> Option<Self> {
        let control = match offset {
            o if o < NOTE_PRESSURE_OFFSET => Control::Note((o - NOTE_OFFSET) as u8),
            o if o < CONTROL_OFFSET => Control::NotePressure((o - NOTE_PRESSURE_OFFSET) as u8),
            o if o < PITCH_BEND_OFFSET => Control::Controller((o - CONTROL_OFFSET) as u8),
            PITCH_BEND_OFFSET => Control::PitchBend,
            CHANNEL_PRESSURE_OFFSET => Control::ChannelPressure,
            TRANSPORT_OFFSET => Control::Transport,
            _ => return None,
        };
        Some(control)
    }
}

/// Whether `width` bytes at `offset` fit inside a state block.
#[inline]
pub fn fits(offset: u32, width: u8) -> bool {
    (offset as usize)
        .checked_add(width as usize)
        .is_some_and(|end| end <= STATE_BLOCK_SIZE)
}

/// The state change a finalized event makes on `device`.
///
/// Channel mode resets have no state of their own (they are expanded by
/// [`ChannelState`](crate::ChannelState) before delivery) and yield `None`.
pub fn delta_for(device: DeviceId, event: ChannelVoiceEvent) -> Option<StateDelta> {
    let (control, payload) = match event {
        ChannelVoiceEvent::NoteOn { note, velocity } => (Control::Note(note), Payload::Byte(velocity)),
        ChannelVoiceEvent::NoteOff { note } => (Control::Note(note), Payload::Byte(0)),
        ChannelVoiceEvent::NotePressure { note, pressure } => {
            (Control::NotePressure(note), Payload::Byte(pressure))
        }
        ChannelVoiceEvent::ControlChange { controller, value } => {
            if controller > MAX_CONTROLLER {
                return None;
            }
            (Control::Controller(controller), Payload::Byte(value))
        }
        ChannelVoiceEvent::ChannelPressure { value } => {
            (Control::ChannelPressure, Payload::Byte(value))
        }
        ChannelVoiceEvent::PitchBend { value } => (Control::PitchBend, Payload::Word(value)),
        ChannelVoiceEvent::TransportControl(kind) => {
            (Control::Transport, Payload::Byte(kind.status_byte()))
        }
        ChannelVoiceEvent::ChannelModeReset(_) => return None,
    };

    Some(StateDelta {
        device,
        offset: control.offset(),
        payload,
    })
}
