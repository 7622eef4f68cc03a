//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use tether_core::ExpiryPolicy;

use crate::error::{ClientError, Result};

/// Configuration for the [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How often the driver evaluates expiry and queued requests.
    #[serde(with = "millis")]
    pub tick_interval: Duration,
    /// What an elapsed timer does to the item's content.
    pub expiry: ExpiryPolicy,
    /// Mirror authoritative snapshots into the state store.
    pub persist_snapshots: bool,
    /// Upper bound on requests waiting for the next tick.
    pub max_queued_requests: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            expiry: ExpiryPolicy::KeepContent,
            persist_snapshots: true,
            max_queued_requests: 64,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(ClientError::Config("tick_interval must be positive".into()));
        }
        if self.max_queued_requests == 0 {
            return Err(ClientError::Config("max_queued_requests must be positive".into()));
        }
        Ok(())
    }
}

/// `Duration` as whole milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
