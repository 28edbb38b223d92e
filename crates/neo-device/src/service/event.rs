//! Event Bus
//!
//! Protocol requests come in and staged notifications go out as events on a
//! single broadcast channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use super::{ServiceError, ServiceResult};

/// A message on the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Topic, e.g. "ao/write" or "event/notification"
    pub event_type: String,

    /// Publishing service or subsystem
    pub source: String,

    pub data: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Build an event with a serialized payload
    pub fn with_data<T: Serialize>(
        event_type: impl Into<String>,
        source: impl Into<String>,
        data: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, source, serde_json::to_value(data)?))
    }

    /// Match against a subscription pattern
    ///
    /// `"*"` matches everything, `"ao/*"` matches any topic under `ao/`,
    /// anything else must match exactly.
    pub fn matches(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        match pattern.strip_suffix('*') {
            Some(prefix) if prefix.ends_with('/') => self.event_type.starts_with(prefix),
            _ => self.event_type == pattern,
        }
    }

    /// Deserialize the payload
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Cloneable sending side of the bus
#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<Event>,
}

impl EventPublisher {
    pub fn new(tx: broadcast::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Fails only when nobody is listening
    pub fn publish(&self, event: Event) -> ServiceResult<()> {
        self.tx
            .send(event)
            .map(|_| ())
            .map_err(|_| ServiceError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_matching() {
        let event = Event::new("ao/write", "test", serde_json::Value::Null);

        assert!(event.matches("ao/write"));
        assert!(!event.matches("ao/ack"));
        assert!(event.matches("*"));
        assert!(event.matches("ao/*"));
        assert!(!event.matches("cov/*"));

        let bare = Event::new("ao", "test", serde_json::Value::Null);
        assert!(!bare.matches("ao/*"));
        assert!(bare.matches("ao"));
    }

    #[test]
    fn test_payload_round_trip() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Relinquish {
            instance: u32,
            priority: u8,
        }

        let payload = Relinquish {
            instance: 3,
            priority: 8,
        };
        let event = Event::with_data("ao/relinquish", "test", &payload).unwrap();
        assert_eq!(event.data["priority"], 8);
        assert_eq!(event.parse_data::<Relinquish>().unwrap(), payload);
    }

    #[test]
    fn test_publish_without_listeners() {
        let (tx, rx) = broadcast::channel(4);
        let publisher = EventPublisher::new(tx);
        drop(rx);
        assert!(matches!(
            publisher.publish(Event::new("cov/notification", "test", serde_json::Value::Null)),
            Err(ServiceError::ChannelClosed)
        ));
    }
}
