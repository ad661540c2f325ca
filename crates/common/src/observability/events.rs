//! Structured events published by breakers, the call runner, and the cache

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resilience::CircuitState;

/// Outcome of a protected call as reported to metrics and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Success,
    Error,
    CircuitOpen,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fire-and-forget notification emitted by the resilience layer.
///
/// Serialises with an `event` tag carrying the dotted event name, e.g.
/// `{"event": "cache.hit", "namespace": "...", "key": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum RampartEvent {
    /// One protected call completed (or was rejected)
    #[serde(rename = "circuit_breaker.call")]
    BreakerCall { service_name: String, status: CallStatus, duration_ms: u64 },

    /// A breaker moved between states
    #[serde(rename = "circuit_breaker.state_changed")]
    BreakerStateChanged { service_name: String, from: CircuitState, to: CircuitState },

    #[serde(rename = "cache.hit")]
    CacheHit { namespace: String, key: String },

    #[serde(rename = "cache.miss")]
    CacheMiss { namespace: String, key: String },
}

impl RampartEvent {
    /// Dotted event name, identical to the serialised `event` tag
    pub fn name(&self) -> &'static str {
        match self {
            Self::BreakerCall { .. } => "circuit_breaker.call",
            Self::BreakerStateChanged { .. } => "circuit_breaker.state_changed",
            Self::CacheHit { .. } => "cache.hit",
            Self::CacheMiss { .. } => "cache.miss",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates the serialized shape of each event kind.
    ///
    /// Assertions:
    /// - Confirms the `event` tag matches `RampartEvent::name`.
    /// - Confirms states and statuses serialize in snake_case.
    #[test]
    fn test_event_serialization_shape() {
        let call = RampartEvent::BreakerCall {
            service_name: "users".to_string(),
            status: CallStatus::CircuitOpen,
            duration_ms: 3,
        };
        let value = serde_json::to_value(&call).expect("serialize");
        assert_eq!(value["event"], call.name());
        assert_eq!(value["status"], "circuit_open");
        assert_eq!(value["duration_ms"], 3);

        let changed = RampartEvent::BreakerStateChanged {
            service_name: "users".to_string(),
            from: CircuitState::Closed,
            to: CircuitState::HalfOpen,
        };
        let value = serde_json::to_value(&changed).expect("serialize");
        assert_eq!(value["event"], "circuit_breaker.state_changed");
        assert_eq!(value["to"], "half_open");

        let hit = RampartEvent::CacheHit { namespace: "ns".to_string(), key: "k".to_string() };
        let back: RampartEvent =
            serde_json::from_value(serde_json::to_value(&hit).expect("serialize"))
                .expect("deserialize");
        assert_eq!(back, hit);
    }
}
