//! Per-context note tracking.
//!
//! [`ChannelState`] turns decoded events into the sequence a press/release
//! consumer can rely on: no back-to-back note-ons for the same note, and
//! channel mode resets expanded into explicit note-offs / controller zeros.

use smallvec::SmallVec;

use crate::event::{ChannelModeKind, ChannelVoiceEvent, MAX_CONTROLLER};

/// Set of currently sounding notes (0-127).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ActiveNoteSet {
    bits: u128,
}

impl ActiveNoteSet {
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    #[inline]
    pub fn contains(&self, note: u8) -> bool {
        note < 128 && self.bits & (1u128 << note) != 0
    }

    /// Returns `true` if the note was not active before.
    #[inline]
    pub fn insert(&mut self, note: u8) -> bool {
        if note >= 128 {
            return false;
        }
        let was_active = self.contains(note);
        self.bits |= 1u128 << note;
        !was_active
    }

    /// Returns `true` if the note was active before.
    #[inline]
    pub fn remove(&mut self, note: u8) -> bool {
        if note >= 128 {
            return false;
        }
        let was_active = self.contains(note);
        self.bits &= !(1u128 << note);
        was_active
    }

    #[inline]
    pub fn clear(&mut self) {
        self.bits = 0;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Active notes in ascending order.
    pub fn iter(&self) -> ActiveNotes {
        ActiveNotes { bits: self.bits }
    }
}

impl FromIterator<u8> for ActiveNoteSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = ActiveNoteSet::new();
        for note in iter {
            set.insert(note);
        }
        set
    }
}

/// Ascending iterator over an [`ActiveNoteSet`].
#[derive(Debug, Clone)]
pub struct ActiveNotes {
    bits: u128,
}

impl Iterator for ActiveNotes {
    type Item = u8;

    #[inline]
    fn next(&mut self) -> Option<u8> {
        if self.bits == 0 {
            return None;
        }
        let note = self.bits.trailing_zeros() as u8;
        self.bits &= self.bits - 1;
        Some(note)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.bits.count_ones() as usize;
        (len, Some(len))
    }
}

impl ExactSizeIterator for ActiveNotes {}

/// Note state for one context (a channel, or the all-channels aggregate).
///
/// Owned and mutated by exactly one port reader thread.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    active: ActiveNoteSet,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_notes(&self) -> &ActiveNoteSet {
        &self.active
    }

    /// Apply one decoded event, handing every finalized event to `deliver` in order.
    pub fn apply(&mut self, event: ChannelVoiceEvent, mut deliver: impl FnMut(ChannelVoiceEvent)) {
        match event {
            ChannelVoiceEvent::NoteOn { note, .. } => {
                // Consecutive note-ons need a note-off in between
                if self.active.contains(note) {
                    deliver(ChannelVoiceEvent::NoteOff { note });
                }
                deliver(event);
                self.active.insert(note);
            }
            ChannelVoiceEvent::NoteOff { note } => {
                deliver(event);
                self.active.remove(note);
            }
            ChannelVoiceEvent::ChannelModeReset(ChannelModeKind::AllNotesOff) => {
                for note in self.active.iter() {
                    deliver(ChannelVoiceEvent::NoteOff { note });
                }
                self.active.clear();
            }
            ChannelVoiceEvent::ChannelModeReset(ChannelModeKind::ResetControllers) => {
                for controller in 0..=MAX_CONTROLLER {
                    deliver(ChannelVoiceEvent::ControlChange {
                        controller,
                        value: 0,
                    });
                }
            }
            other => deliver(other),
        }
    }

    /// Like [`apply`](Self::apply), collecting the output.
    pub fn process(&mut self, event: ChannelVoiceEvent) -> SmallVec<[ChannelVoiceEvent; 4]> {
        let mut out = SmallVec::new();
        self.apply(event, |finalized| out.push(finalized));
        out
    }
}
