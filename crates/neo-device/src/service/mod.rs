//! Service Runtime
//!
//! Long-running device components run as services on their own task. The
//! manager drives each one through its hooks:
//! - `on_start` once before anything else
//! - `on_event` for bus events matching the subscriptions, and for events
//!   sent straight to its handle
//! - `on_tick` on every tick of the configured interval, or when forced
//! - `on_stop` once on shutdown
//!
//! Hooks run one at a time, so a service never sees an event in the middle
//! of a tick.

mod event;
mod handle;
mod manager;

pub use event::*;
pub use handle::*;
pub use manager::*;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Service Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by the runtime or returned from service hooks
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Service failed to start: {0}")]
    InitializationFailed(String),

    #[error("Service already running: {0}")]
    AlreadyRunning(String),

    #[error("Service not running: {0}")]
    NotRunning(String),

    #[error("Event handling failed: {0}")]
    EventError(String),

    #[error("Shutdown timeout")]
    ShutdownTimeout,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

// ─────────────────────────────────────────────────────────────────────────────
// Service Specification
// ─────────────────────────────────────────────────────────────────────────────

/// Static description of a service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique service identifier, also the source of its events
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Period of `on_tick`; `None` for services that only react to events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_interval: Option<Duration>,

    /// Event type patterns routed to `on_event` (e.g. "ao/write", "ao/*")
    #[serde(default)]
    pub subscriptions: Vec<String>,

    /// Time allowed for `on_stop`
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

impl ServiceSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tick_interval: None,
            subscriptions: Vec::new(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn subscribe(mut self, pattern: impl Into<String>) -> Self {
        self.subscriptions.push(pattern.into());
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service Context
// ─────────────────────────────────────────────────────────────────────────────

/// Passed to every hook; lets a service publish on the event bus
pub struct ServiceContext {
    pub service_id: String,
    publisher: EventPublisher,
}

impl ServiceContext {
    pub fn new(service_id: impl Into<String>, publisher: EventPublisher) -> Self {
        Self {
            service_id: service_id.into(),
            publisher,
        }
    }

    /// Publish `data` as an event sourced from this service
    pub fn emit<T: Serialize>(&self, event_type: &str, data: &T) -> ServiceResult<()> {
        let event = Event::with_data(event_type, &self.service_id, data)
            .map_err(|e| ServiceError::Internal(format!("Unserializable payload: {e}")))?;
        self.publisher.publish(event)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle hooks of a managed service
#[async_trait]
pub trait Service: Send + Sync + 'static {
    fn spec(&self) -> ServiceSpec;

    /// Called once before the service receives events or ticks
    ///
    /// An error here marks the service failed; no other hook runs.
    async fn on_start(&mut self, ctx: &ServiceContext) -> ServiceResult<()>;

    /// Called once on shutdown, bounded by `ServiceSpec::shutdown_timeout`
    async fn on_stop(&mut self, ctx: &ServiceContext) -> ServiceResult<()>;

    async fn on_event(&mut self, _ctx: &ServiceContext, _event: Event) -> ServiceResult<()> {
        Ok(())
    }

    async fn on_tick(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        Ok(())
    }
}
