//! Service Manager
//!
//! Spawns services onto tokio tasks, routes bus events to them and shuts
//! them down.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use super::{
    Event, EventPublisher, Service, ServiceCommand, ServiceContext, ServiceError, ServiceHandle,
    ServiceResult, ServiceSpec, ServiceState,
};

const EVENT_CAPACITY: usize = 1024;
const COMMAND_CAPACITY: usize = 256;

struct RunningService {
    handle: ServiceHandle,
    join_handle: JoinHandle<ServiceResult<()>>,
    spec: ServiceSpec,
}

/// Owner of every running service and of the event bus
pub struct ServiceManager {
    services: DashMap<String, RunningService>,
    shutdown_tx: broadcast::Sender<()>,
    event_tx: broadcast::Sender<Event>,
    shutdown_timeout: Duration,
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            services: DashMap::new(),
            shutdown_tx,
            event_tx,
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    pub fn event_publisher(&self) -> EventPublisher {
        EventPublisher::new(self.event_tx.clone())
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Start `service` on its own task
    pub async fn spawn<S: Service>(&self, service: S) -> ServiceResult<ServiceHandle> {
        let spec = service.spec();
        let service_id = spec.id.clone();
        if self.services.contains_key(&service_id) {
            return Err(ServiceError::AlreadyRunning(service_id));
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let state = Arc::new(AtomicU8::new(ServiceState::Starting as u8));
        let handle = ServiceHandle::new(service_id.clone(), command_tx, Arc::clone(&state));

        let task = ServiceTask {
            service,
            ctx: ServiceContext::new(service_id.clone(), self.event_publisher()),
            command_rx,
            shutdown_rx: self.shutdown_tx.subscribe(),
            event_rx: self.event_tx.subscribe(),
            state,
            ticker: spec.tick_interval.map(|period| {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            }),
            subscriptions: spec.subscriptions.clone(),
            shutdown_timeout: spec.shutdown_timeout,
        };
        let join_handle = tokio::spawn(task.run());

        self.services.insert(
            service_id,
            RunningService {
                handle: handle.clone(),
                join_handle,
                spec,
            },
        );
        Ok(handle)
    }

    pub fn get(&self, service_id: &str) -> Option<ServiceHandle> {
        self.services.get(service_id).map(|s| s.handle.clone())
    }

    pub fn is_running(&self, service_id: &str) -> bool {
        self.services
            .get(service_id)
            .is_some_and(|s| s.handle.is_running())
    }

    /// Publish on the bus; dropped silently when nobody listens
    pub fn publish_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    pub fn emit(
        &self,
        event_type: impl Into<String>,
        source: impl Into<String>,
        data: serde_json::Value,
    ) {
        self.publish_event(Event::new(event_type, source, data));
    }

    /// Stop one service and wait for its task
    pub async fn stop(&self, service_id: &str) -> ServiceResult<()> {
        let (_, running) = self
            .services
            .remove(service_id)
            .ok_or_else(|| ServiceError::NotRunning(service_id.to_string()))?;

        let _ = running.handle.shutdown().await;

        match tokio::time::timeout(running.spec.shutdown_timeout, running.join_handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(service_id, error = %e, "Service task panicked");
                Err(ServiceError::Internal(format!("Task panicked: {e}")))
            }
            Err(_) => {
                tracing::warn!(service_id, "Service shutdown timed out");
                Err(ServiceError::ShutdownTimeout)
            }
        }
    }

    /// Stop every service
    pub async fn shutdown_all(&self) -> ServiceResult<()> {
        tracing::info!(count = self.services.len(), "Shutting down services");
        let _ = self.shutdown_tx.send(());

        let result = tokio::time::timeout(self.shutdown_timeout, async {
            while !self.services.is_empty() {
                self.services.retain(|_, s| !s.handle.is_terminal());
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;

        if result.is_err() {
            tracing::warn!("Some services did not stop within timeout");
            return Err(ServiceError::ShutdownTimeout);
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<(String, ServiceState)> {
        self.services
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().handle.state()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service Task
// ─────────────────────────────────────────────────────────────────────────────

struct ServiceTask<S> {
    service: S,
    ctx: ServiceContext,
    command_rx: mpsc::Receiver<ServiceCommand>,
    shutdown_rx: broadcast::Receiver<()>,
    event_rx: broadcast::Receiver<Event>,
    state: Arc<AtomicU8>,
    ticker: Option<Interval>,
    subscriptions: Vec<String>,
    shutdown_timeout: Duration,
}

impl<S: Service> ServiceTask<S> {
    fn set_state(&self, state: ServiceState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    async fn run(mut self) -> ServiceResult<()> {
        let service_id = self.ctx.service_id.clone();

        if let Err(e) = self.service.on_start(&self.ctx).await {
            tracing::error!(%service_id, error = %e, "Service failed to start");
            self.set_state(ServiceState::Failed);
            return Err(e);
        }
        self.set_state(ServiceState::Running);
        tracing::info!(%service_id, "Service started");

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    tracing::debug!(%service_id, "Received global shutdown signal");
                    break;
                }

                command = self.command_rx.recv() => match command {
                    Some(ServiceCommand::Event(event)) => {
                        if let Err(e) = self.service.on_event(&self.ctx, event).await {
                            tracing::warn!(%service_id, error = %e, "Error handling direct event");
                        }
                    }
                    Some(ServiceCommand::ForceTick) => {
                        if let Err(e) = self.service.on_tick(&self.ctx).await {
                            tracing::warn!(%service_id, error = %e, "Error during forced tick");
                        }
                    }
                    Some(ServiceCommand::GetState(tx)) => {
                        let _ = tx.send(ServiceState::from_u8(self.state.load(Ordering::SeqCst)));
                    }
                    Some(ServiceCommand::Shutdown) | None => {
                        tracing::debug!(%service_id, "Received shutdown command");
                        break;
                    }
                },

                received = self.event_rx.recv() => match received {
                    Ok(event) => {
                        if self.subscriptions.iter().any(|p| event.matches(p)) {
                            if let Err(e) = self.service.on_event(&self.ctx, event).await {
                                tracing::warn!(%service_id, error = %e, "Error handling bus event");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(%service_id, skipped, "Service lagged behind the event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                _ = next_tick(&mut self.ticker) => {
                    if let Err(e) = self.service.on_tick(&self.ctx).await {
                        tracing::warn!(%service_id, error = %e, "Error during tick");
                    }
                }
            }
        }

        self.set_state(ServiceState::Stopping);
        let stopped =
            tokio::time::timeout(self.shutdown_timeout, self.service.on_stop(&self.ctx)).await;
        match stopped {
            Ok(Ok(())) => {
                self.set_state(ServiceState::Stopped);
                tracing::info!(%service_id, "Service stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_state(ServiceState::Failed);
                tracing::error!(%service_id, error = %e, "Service stop failed");
                Err(e)
            }
            Err(_) => {
                self.set_state(ServiceState::Failed);
                tracing::error!(%service_id, "Service stop timed out");
                Err(ServiceError::ShutdownTimeout)
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counters {
        started: AtomicUsize,
        stopped: AtomicUsize,
        events: AtomicUsize,
        ticks: AtomicUsize,
    }

    struct CountingService {
        id: String,
        counters: Arc<Counters>,
    }

    impl CountingService {
        fn new(id: &str) -> (Self, Arc<Counters>) {
            let counters = Arc::new(Counters::default());
            (
                Self {
                    id: id.to_string(),
                    counters: Arc::clone(&counters),
                },
                counters,
            )
        }
    }

    #[async_trait::async_trait]
    impl Service for CountingService {
        fn spec(&self) -> ServiceSpec {
            ServiceSpec::new(&self.id, "Counting Service").subscribe("test/*")
        }

        async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
            self.counters.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_event(&mut self, _ctx: &ServiceContext, _event: Event) -> ServiceResult<()> {
            self.counters.events.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_tick(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
            self.counters.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_spawn_and_stop_service() {
        let manager = ServiceManager::new();
        let (service, counters) = CountingService::new("counting");

        let handle = manager.spawn(service).await.unwrap();
        assert_eq!(handle.request_state().await.unwrap(), ServiceState::Running);
        assert_eq!(counters.started.load(Ordering::SeqCst), 1);
        assert!(manager.is_running("counting"));

        manager.stop("counting").await.unwrap();
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
        assert!(manager.is_empty());
        assert!(matches!(
            manager.stop("counting").await,
            Err(ServiceError::NotRunning(_))
        ));
    }

    #[tokio::test]
    async fn test_forced_tick_and_direct_events_run_in_order() {
        let manager = ServiceManager::new();
        let (service, counters) = CountingService::new("counting");
        let handle = manager.spawn(service).await.unwrap();

        handle.force_tick().await.unwrap();
        handle
            .send_event(Event::new("other/topic", "test", serde_json::Value::Null))
            .await
            .unwrap();
        handle.force_tick().await.unwrap();
        handle.request_state().await.unwrap();

        assert_eq!(counters.ticks.load(Ordering::SeqCst), 2);
        // Direct events skip subscription matching
        assert_eq!(counters.events.load(Ordering::SeqCst), 1);

        manager.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_bus_routing_honors_subscriptions() {
        let manager = ServiceManager::new();
        let (service, counters) = CountingService::new("counting");
        let handle = manager.spawn(service).await.unwrap();
        handle.request_state().await.unwrap();

        manager.emit("other/topic", "test", serde_json::json!({}));
        manager.emit("test/ping", "test", serde_json::json!({}));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(counters.events.load(Ordering::SeqCst), 1);
        manager.shutdown_all().await.unwrap();
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_service_id_rejected() {
        let manager = ServiceManager::new();
        let (first, _) = CountingService::new("counting");
        let (second, _) = CountingService::new("counting");

        manager.spawn(first).await.unwrap();
        let result = manager.spawn(second).await;
        assert!(matches!(result, Err(ServiceError::AlreadyRunning(_))));

        manager.shutdown_all().await.unwrap();
    }
}
