//! Decoded MIDI 1.0 channel-voice events.

use serde::{Deserialize, Serialize};

/// Number of MIDI channels per port.
pub const CHANNEL_COUNT: usize = 16;

/// Highest controller number that carries a plain value (120-127 are channel mode messages).
pub const MAX_CONTROLLER: u8 = 119;

/// Center position of the 14-bit pitch bend range.
pub const PITCH_BEND_CENTER: u16 = 8192;

/// Channel mode messages, collapsed to the two behaviours a receiver needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelModeKind {
    /// All Sound Off, All Notes Off, Omni Off/On, Mono On, Poly On.
    AllNotesOff,
    /// Reset All Controllers.
    ResetControllers,
}

/// System real-time transport messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    Start,
    Continue,
    Stop,
}

impl TransportKind {
    /// The real-time status byte this transport message arrived as.
    #[inline]
    pub fn status_byte(self) -> u8 {
        match self {
            TransportKind::Start => 0xFA,
            TransportKind::Continue => 0xFB,
            TransportKind::Stop => 0xFC,
        }
    }

    #[inline]
    pub fn from_status_byte(status: u8) -> Option<Self> {
        match status {
            0xFA => Some(TransportKind::Start),
            0xFB => Some(TransportKind::Continue),
            0xFC => Some(TransportKind::Stop),
            _ => None,
        }
    }
}

/// A decoded, immutable MIDI event.
///
/// `NoteOn` always carries a non-zero velocity; a zero-velocity note-on is
/// decoded as `NoteOff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelVoiceEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    NotePressure { note: u8, pressure: u8 },
    ControlChange { controller: u8, value: u8 },
    ChannelModeReset(ChannelModeKind),
    ChannelPressure { value: u8 },
    /// 14-bit value, 8192 = center.
    PitchBend { value: u16 },
    TransportControl(TransportKind),
}

impl ChannelVoiceEvent {
    #[inline]
    pub fn note_on(note: u8, velocity: u8) -> Self {
        ChannelVoiceEvent::NoteOn { note, velocity }
    }

    #[inline]
    pub fn note_off(note: u8) -> Self {
        ChannelVoiceEvent::NoteOff { note }
    }

    #[inline]
    pub fn control_change(controller: u8, value: u8) -> Self {
        ChannelVoiceEvent::ControlChange { controller, value }
    }

    #[inline]
    pub fn pitch_bend(value: u16) -> Self {
        ChannelVoiceEvent::PitchBend { value }
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        matches!(self, ChannelVoiceEvent::NoteOn { .. })
    }

    #[inline]
    pub fn is_note_off(&self) -> bool {
        matches!(self, ChannelVoiceEvent::NoteOff { .. })
    }

    #[inline]
    pub fn note(&self) -> Option<u8> {
        match *self {
            ChannelVoiceEvent::NoteOn { note, .. }
            | ChannelVoiceEvent::NoteOff { note }
            | ChannelVoiceEvent::NotePressure { note, .. } => Some(note),
            _ => None,
        }
    }

    #[inline]
    pub fn velocity(&self) -> Option<u8> {
        match *self {
            ChannelVoiceEvent::NoteOn { velocity, .. } => Some(velocity),
            ChannelVoiceEvent::NoteOff { .. } => Some(0),
            _ => None,
        }
    }
}

/// One of the 17 note-tracking contexts of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContextId {
    /// A single MIDI channel (0-15).
    Channel(u8),
    /// The aggregate that observes traffic on every channel.
    AllChannels,
}

impl ContextId {
    /// Number of contexts per port: 16 channels plus the aggregate.
    pub const COUNT: usize = CHANNEL_COUNT + 1;

    /// Dense index into a per-port context table. The aggregate is last.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            ContextId::Channel(channel) => (channel as usize).min(CHANNEL_COUNT - 1),
            ContextId::AllChannels => CHANNEL_COUNT,
        }
    }

    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            i if i < CHANNEL_COUNT => Some(ContextId::Channel(i as u8)),
            CHANNEL_COUNT => Some(ContextId::AllChannels),
            _ => None,
        }
    }

    /// The MIDI channel, or `None` for the aggregate.
    #[inline]
    pub fn channel(self) -> Option<u8> {
        match self {
            ContextId::Channel(channel) => Some(channel),
            ContextId::AllChannels => None,
        }
    }
}
