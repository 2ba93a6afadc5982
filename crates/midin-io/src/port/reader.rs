//! Background reader thread for one open port.
//!
//! State machine, published through [`ReaderStatus`]:
//!
//! ```text
//! Idle -> Opening -> Reading <-> Retrying -> Stopped
//! ```
//!
//! `Stopped` is terminal. A reader reaches it either because it was asked to
//! stop or because reads failed `read_retry_limit` times in a row; the
//! latter is how a port is marked dead.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::router::Router;
use crate::error::Result;
use crate::transport::InputPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReaderState {
    Idle = 0,
    Opening = 1,
    Reading = 2,
    Retrying = 3,
    Stopped = 4,
}

impl ReaderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReaderState::Idle,
            1 => ReaderState::Opening,
            2 => ReaderState::Reading,
            3 => ReaderState::Retrying,
            _ => ReaderState::Stopped,
        }
    }
}

/// Read-loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    pub read_timeout: Duration,
    pub read_retry_limit: u32,
    pub retry_backoff: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(2),
            read_retry_limit: 3,
            retry_backoff: Duration::from_millis(1),
        }
    }
}

/// State shared between a reader thread and its owner.
#[derive(Debug)]
pub struct ReaderStatus {
    state: AtomicU8,
    stop: AtomicBool,
    messages: AtomicU64,
    queued: AtomicU64,
    dropped: AtomicU64,
    read_failures: AtomicU64,
}

impl Default for ReaderStatus {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(ReaderState::Idle as u8),
            stop: AtomicBool::new(false),
            messages: AtomicU64::new(0),
            queued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
        }
    }
}

impl ReaderStatus {
    #[inline]
    pub fn state(&self) -> ReaderState {
        ReaderState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ReaderState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Snapshot of the reader counters.
    pub fn stats(&self) -> ReaderStats {
        ReaderStats {
            messages: self.messages.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderStats {
    /// Raw messages read from the transport.
    pub messages: u64,
    /// Deltas appended to the event queue.
    pub queued: u64,
    /// Finalized events dropped because no device was bound.
    pub dropped: u64,
    pub read_failures: u64,
}

/// Spawn the reader thread for an already opened port.
///
/// The thread hands the port back when it exits so the owner controls when
/// it is closed.
pub(crate) fn spawn(
    index: usize,
    input: Box<dyn InputPort>,
    router: Router,
    status: Arc<ReaderStatus>,
    config: ReaderConfig,
) -> Result<JoinHandle<Box<dyn InputPort>>> {
    let handle = thread::Builder::new()
        .name(format!("midin-port-{}", index))
        .spawn(move || run(input, router, &status, config))?;
    Ok(handle)
}

fn run(
    mut input: Box<dyn InputPort>,
    mut router: Router,
    status: &ReaderStatus,
    config: ReaderConfig,
) -> Box<dyn InputPort> {
    status.set_state(ReaderState::Reading);
    let mut failures = 0u32;

    while !status.stop_requested() {
        match input.read(config.read_timeout) {
            Ok(message) => {
                if failures > 0 {
                    failures = 0;
                    status.set_state(ReaderState::Reading);
                }
                let Some(message) = message else {
                    continue;
                };
                let outcome = router.route(&message.bytes);
                status
                    .queued
                    .fetch_add(outcome.queued as u64, Ordering::Relaxed);
                status
                    .dropped
                    .fetch_add(outcome.dropped as u64, Ordering::Relaxed);
                status.messages.fetch_add(1, Ordering::Release);
            }
            Err(e) => {
                failures += 1;
                status.read_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Read failed on MIDI port {} ({}), attempt {}/{}: {}",
                    router.info().index,
                    router.info().name,
                    failures,
                    config.read_retry_limit,
                    e
                );
                if failures >= config.read_retry_limit {
                    tracing::warn!(
                        "Giving up on MIDI port {} ({})",
                        router.info().index,
                        router.info().name
                    );
                    break;
                }
                status.set_state(ReaderState::Retrying);
                thread::sleep(config.retry_backoff);
            }
        }
    }

    status.set_state(ReaderState::Stopped);
    input
}
