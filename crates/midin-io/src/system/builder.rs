//! MidiInputSystem builder and configuration.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use midin_core::event_queue_with_capacity;

use crate::error::{Error, Result};
use crate::port::{PortCatalog, ReaderConfig};
use crate::registry::DeviceRegistry;
use crate::transport::MidiTransport;

use super::MidiInputSystem;

/// Tuning for the input subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiInputConfig {
    /// Client name registered with the OS MIDI service.
    pub client_name: String,
    /// Longest a reader blocks waiting for one message.
    pub read_timeout: Duration,
    /// Consecutive read failures before a port is declared dead.
    pub read_retry_limit: u32,
    pub retry_backoff: Duration,
    /// Open attempts per port on each rebuild.
    pub open_attempts: u32,
    /// Initial byte capacity of each event queue buffer.
    pub queue_capacity: usize,
    /// Messages buffered per port between the transport callback and the reader.
    pub transport_queue_len: usize,
}

impl Default for MidiInputConfig {
    fn default() -> Self {
        Self {
            client_name: "midin".to_string(),
            read_timeout: Duration::from_millis(2),
            read_retry_limit: 3,
            retry_backoff: Duration::from_millis(1),
            open_attempts: 3,
            queue_capacity: 2048,
            transport_queue_len: 1024,
        }
    }
}

impl MidiInputConfig {
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout.is_zero() {
            return Err(Error::InvalidConfig("read_timeout must be non-zero".to_string()));
        }
        if self.read_retry_limit == 0 {
            return Err(Error::InvalidConfig("read_retry_limit must be at least 1".to_string()));
        }
        if self.open_attempts == 0 {
            return Err(Error::InvalidConfig("open_attempts must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig("queue_capacity must be non-zero".to_string()));
        }
        if self.transport_queue_len == 0 {
            return Err(Error::InvalidConfig(
                "transport_queue_len must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            read_timeout: self.read_timeout,
            read_retry_limit: self.read_retry_limit,
            retry_backoff: self.retry_backoff,
        }
    }
}

#[derive(Default)]
pub struct MidiInputSystemBuilder {
    pub(super) config: MidiInputConfig,
    pub(super) transport: Option<Arc<dyn MidiTransport>>,
}

impl MidiInputSystemBuilder {
    pub fn config(mut self, config: MidiInputConfig) -> Self {
        self.config = config;
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = name.into();
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn read_retry_limit(mut self, limit: u32) -> Self {
        self.config.read_retry_limit = limit;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    pub fn open_attempts(mut self, attempts: u32) -> Self {
        self.config.open_attempts = attempts;
        self
    }

    pub fn queue_capacity(mut self, bytes: usize) -> Self {
        self.config.queue_capacity = bytes;
        self
    }

    pub fn transport_queue_len(mut self, len: usize) -> Self {
        self.config.transport_queue_len = len;
        self
    }

    /// Use `transport` instead of the default hardware transport.
    pub fn transport(mut self, transport: impl MidiTransport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn build(self) -> Result<MidiInputSystem> {
        self.config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&self.config).inspect_err(|e| {
                tracing::error!("MIDI input disabled: {}", e);
            })?,
        };

        let registry = DeviceRegistry::new();
        let (sender, drain) = event_queue_with_capacity(self.config.queue_capacity);
        let catalog = PortCatalog::new(
            transport,
            registry.requests(),
            sender,
            self.config.reader_config(),
            self.config.open_attempts,
        );

        Ok(MidiInputSystem {
            config: self.config,
            catalog,
            registry,
            drain,
        })
    }
}

#[cfg(feature = "midi-io")]
fn default_transport(config: &MidiInputConfig) -> Result<Arc<dyn MidiTransport>> {
    let transport =
        crate::transport::MidirTransport::new(config.client_name.clone(), config.transport_queue_len)?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "midi-io"))]
fn default_transport(_config: &MidiInputConfig) -> Result<Arc<dyn MidiTransport>> {
    Err(Error::TransportInit(
        "no hardware transport without the `midi-io` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::VirtualTransport;

    #[test]
    fn test_default_config() {
        let config = MidiInputConfig::default();
        assert_eq!(config.client_name, "midin");
        assert_eq!(config.read_timeout, Duration::from_millis(2));
        assert_eq!(config.read_retry_limit, 3);
        assert_eq!(config.open_attempts, 3);
        assert_eq!(config.queue_capacity, 2048);
        assert_eq!(config.transport_queue_len, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let bad = [
            MidiInputConfig {
                read_retry_limit: 0,
                ..Default::default()
            },
            MidiInputConfig {
                open_attempts: 0,
                ..Default::default()
            },
            MidiInputConfig {
                queue_capacity: 0,
                ..Default::default()
            },
            MidiInputConfig {
                read_timeout: Duration::ZERO,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }

        let result = MidiInputSystemBuilder::default()
            .transport(VirtualTransport::new())
            .open_attempts(0)
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_build_with_virtual_transport() {
        let system = MidiInputSystemBuilder::default()
            .transport(VirtualTransport::new())
            .client_name("test")
            .read_timeout(Duration::from_millis(5))
            .build()
            .unwrap();
        assert_eq!(system.config().client_name, "test");
        assert_eq!(system.config().read_timeout, Duration::from_millis(5));
        assert!(system.ports().is_empty());
    }

    #[test]
    fn test_reader_config_follows_config() {
        let config = MidiInputConfig {
            read_retry_limit: 7,
            ..Default::default()
        };
        let reader = config.reader_config();
        assert_eq!(reader.read_retry_limit, 7);
        assert_eq!(reader.read_timeout, config.read_timeout);
    }
}
