//! Service Handle

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::{mpsc, oneshot};

use super::{Event, ServiceError, ServiceResult};

/// Lifecycle state of a service task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
    Failed = 4,
}

impl ServiceState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Stopping,
            3 => Self::Stopped,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceState::Stopped | ServiceState::Failed)
    }

    pub fn is_running(&self) -> bool {
        *self == ServiceState::Running
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Commands delivered to a service task, in order
pub enum ServiceCommand {
    Event(Event),
    /// Run `on_tick` now, outside the interval
    ForceTick,
    GetState(oneshot::Sender<ServiceState>),
    Shutdown,
}

/// Cloneable handle to a running service
#[derive(Clone)]
pub struct ServiceHandle {
    pub service_id: String,
    command_tx: mpsc::Sender<ServiceCommand>,
    /// Written by the service task only
    state: Arc<AtomicU8>,
}

impl ServiceHandle {
    pub(crate) fn new(
        service_id: String,
        command_tx: mpsc::Sender<ServiceCommand>,
        state: Arc<AtomicU8>,
    ) -> Self {
        Self {
            service_id,
            command_tx,
            state,
        }
    }

    pub fn state(&self) -> ServiceState {
        ServiceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    async fn send(&self, command: ServiceCommand) -> ServiceResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ServiceError::NotRunning(self.service_id.clone()))
    }

    /// Deliver an event directly, bypassing subscription matching
    ///
    /// Direct events and forced ticks are handled in the order they were sent.
    pub async fn send_event(&self, event: Event) -> ServiceResult<()> {
        self.send(ServiceCommand::Event(event)).await
    }

    pub async fn force_tick(&self) -> ServiceResult<()> {
        self.send(ServiceCommand::ForceTick).await
    }

    pub async fn shutdown(&self) -> ServiceResult<()> {
        self.send(ServiceCommand::Shutdown).await
    }

    /// Round-trip through the task; resolves once every earlier command ran
    pub async fn request_state(&self) -> ServiceResult<ServiceState> {
        let (tx, rx) = oneshot::channel();
        self.send(ServiceCommand::GetState(tx)).await?;
        rx.await.map_err(|_| ServiceError::ChannelClosed)
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("service_id", &self.service_id)
            .field("state", &self.state())
            .finish()
    }
}
