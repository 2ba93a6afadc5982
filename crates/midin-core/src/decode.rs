//! MIDI 1.0 wire decoding.
//!
//! Pure mapping from one framed message (status byte + data bytes) to at most
//! one [`ChannelVoiceEvent`]. Malformed input is line noise, not an error:
//! it decodes to `None` and the next message is decoded independently.

use crate::event::{ChannelModeKind, ChannelVoiceEvent, TransportKind};

/// Where a decoded event is delivered within a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// A channel message: its channel context and the all-channels aggregate.
    Channel(u8),
    /// A system real-time message: the aggregate and every channel context already in use.
    Port,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decoded {
    pub route: Route,
    pub event: ChannelVoiceEvent,
}

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const NOTE_PRESSURE: u8 = 0xA0;
const CONTROL_CHANGE: u8 = 0xB0;
const PROGRAM_CHANGE: u8 = 0xC0;
const CHANNEL_PRESSURE: u8 = 0xD0;
const PITCH_BEND: u8 = 0xE0;
const SYSTEM: u8 = 0xF0;

/// Decode a message as framed by the transport: byte 0 is the status byte.
#[inline]
pub fn decode_message(bytes: &[u8]) -> Option<Decoded> {
    let (&status, data) = bytes.split_first()?;
    decode(status, data)
}

/// Decode one message. Returns `None` for anything that does not produce an event.
pub fn decode(status: u8, data: &[u8]) -> Option<Decoded> {
    if status & 0x80 == 0 {
        // Running status is not supported
        return None;
    }
    if data.iter().any(|&byte| byte & 0x80 != 0) {
        return None;
    }

    let kind = status & 0xF0;
    let channel = status & 0x0F;

    if kind == SYSTEM {
        return TransportKind::from_status_byte(status).map(|kind| Decoded {
            route: Route::Port,
            event: ChannelVoiceEvent::TransportControl(kind),
        });
    }

    let event = match kind {
        NOTE_OFF => {
            let [note, _velocity] = two(data)?;
            ChannelVoiceEvent::NoteOff { note }
        }
        NOTE_ON => match two(data)? {
            [note, 0] => ChannelVoiceEvent::NoteOff { note },
            [note, velocity] => ChannelVoiceEvent::NoteOn { note, velocity },
        },
        NOTE_PRESSURE => {
            let [note, pressure] = two(data)?;
            ChannelVoiceEvent::NotePressure { note, pressure }
        }
        CONTROL_CHANGE => {
            let [controller, value] = two(data)?;
            control_change(controller, value)?
        }
        PROGRAM_CHANGE => {
            one(data)?;
            return None;
        }
        CHANNEL_PRESSURE => ChannelVoiceEvent::ChannelPressure { value: one(data)? },
        PITCH_BEND => {
            let [lsb, msb] = two(data)?;
            ChannelVoiceEvent::PitchBend {
                value: ((msb as u16) << 7) | lsb as u16,
            }
        }
        _ => return None,
    };

    Some(Decoded {
        route: Route::Channel(channel),
        event,
    })
}

fn control_change(controller: u8, value: u8) -> Option<ChannelVoiceEvent> {
    match controller {
        // All Sound Off, All Notes Off, Omni Off, Omni On, Mono On, Poly On
        120 | 123..=127 => Some(ChannelVoiceEvent::ChannelModeReset(
            ChannelModeKind::AllNotesOff,
        )),
        121 => Some(ChannelVoiceEvent::ChannelModeReset(
            ChannelModeKind::ResetControllers,
        )),
        // Local Control
        122 => None,
        _ => Some(ChannelVoiceEvent::ControlChange { controller, value }),
    }
}

#[inline]
fn one(data: &[u8]) -> Option<u8> {
    data.first().copied()
}

#[inline]
fn two(data: &[u8]) -> Option<[u8; 2]> {
    match data {
        [a, b, ..] => Some([*a, *b]),
        _ => None,
    }
}
