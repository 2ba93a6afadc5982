//! Thread-agnostic core of the midin MIDI input subsystem.
//!
//! - [`decode`]: MIDI 1.0 wire bytes to [`ChannelVoiceEvent`]s
//! - [`channel`]: per-context note tracking and coalescing
//! - [`layout`] / [`record`]: device state blocks and the binary delta records addressing them
//! - [`queue`]: the double-buffered producer/consumer event queue
//!
//! Nothing here spawns threads or touches a transport; see `midin-io` for that.

pub mod error;
pub use error::{Error, Result};

pub(crate) mod event;
pub use event::{
    ChannelModeKind, ChannelVoiceEvent, ContextId, TransportKind, CHANNEL_COUNT, MAX_CONTROLLER,
    PITCH_BEND_CENTER,
};

pub mod decode;
pub use decode::{decode_message, Decoded, Route};

pub mod channel;
pub use channel::{ActiveNoteSet, ChannelState};

pub mod layout;
pub use layout::{Control, STATE_BLOCK_SIZE};

pub mod record;
pub use record::{DeviceId, Payload, StateDelta};

pub mod queue;
pub use queue::{event_queue, event_queue_with_capacity, EventDrain, EventSender};
