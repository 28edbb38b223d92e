//! Analog Output Service
//!
//! Hosts the Analog Output table on the service runtime. Each tick runs the
//! intrinsic reporting pass, then publishes every staged event and COV
//! notification on the bus. Protocol requests arrive as events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use bacnet_objects::{
    AnalogOutputs, PropertyError, PropertyValue, ReadPropertyRequest, TimeStamp,
    WritePropertyRequest,
};

use crate::service::{Event, Service, ServiceContext, ServiceResult, ServiceSpec};

pub const SERVICE_ID: &str = "bacnet/analog-output";

/// Event types handled and published by the service
pub mod topics {
    /// In: `WritePropertyRequest`
    pub const WRITE: &str = "ao/write";
    /// In: `ReadPropertyRequest`
    pub const READ: &str = "ao/read";
    /// In: `RelinquishRequest`
    pub const RELINQUISH: &str = "ao/relinquish";
    /// In: `AckRequest`
    pub const ACK: &str = "ao/ack";

    /// Out: `ReadResult`
    pub const READ_RESULT: &str = "ao/read-result";
    /// Out: `Rejected`
    pub const REJECTED: &str = "ao/rejected";
    /// Out: `CovNotification`
    pub const COV_NOTIFICATION: &str = "cov/notification";
    /// Out: `EventNotification`
    pub const EVENT_NOTIFICATION: &str = "event/notification";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelinquishRequest {
    pub instance: u32,
    pub priority: u8,
}

/// Acknowledge-Alarm request for one transition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AckRequest {
    pub instance: u32,
    /// Transition class index: 0 to-offnormal, 1 to-fault, 2 to-normal
    pub transition: u8,
    pub time_stamp: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResult {
    pub request: ReadPropertyRequest,
    pub value: PropertyValue,
}

/// Reply to a request that failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejected {
    pub event_type: String,
    /// Present when the request payload was understood
    pub error: Option<PropertyError>,
    pub reason: String,
}

/// Service wrapper around a shared Analog Output table
pub struct AnalogOutputService {
    objects: Arc<AnalogOutputs>,
    tick_interval: Duration,
}

impl AnalogOutputService {
    pub fn new(objects: Arc<AnalogOutputs>, tick_interval: Duration) -> Self {
        Self {
            objects,
            tick_interval,
        }
    }

    /// Run the reporting pass and publish everything staged
    fn publish_pending(&self, ctx: &ServiceContext) -> ServiceResult<()> {
        let report = self.objects.intrinsic_reporting_pass(Utc::now());
        if report.transitions > 0 || report.skipped > 0 {
            debug!(
                evaluated = report.evaluated,
                transitions = report.transitions,
                skipped = report.skipped,
                "Intrinsic reporting pass"
            );
        }

        for notification in self.objects.take_event_notifications() {
            ctx.emit(topics::EVENT_NOTIFICATION, &notification)?;
        }

        for notification in self.objects.pending_cov_notifications() {
            ctx.emit(topics::COV_NOTIFICATION, &notification)?;
            if let Err(e) = self.objects.change_of_value_clear(notification.instance) {
                // Deleted between collection and delivery
                debug!(instance = notification.instance, error = %e, "COV clear skipped");
            }
        }
        Ok(())
    }

    fn handle(&self, ctx: &ServiceContext, event: &Event) -> Result<(), Rejected> {
        let reject = |reason: String, error: Option<PropertyError>| Rejected {
            event_type: event.event_type.clone(),
            error,
            reason,
        };
        let bad_payload = |e: serde_json::Error| reject(format!("Malformed payload: {e}"), None);
        let failed = |e: PropertyError| reject(e.to_string(), Some(e));

        match event.event_type.as_str() {
            topics::WRITE => {
                let request: WritePropertyRequest = event.parse_data().map_err(bad_payload)?;
                self.objects.write_property(&request).map_err(failed)?;
                debug!(instance = request.instance, property = ?request.property, "Write accepted");
            }
            topics::READ => {
                let request: ReadPropertyRequest = event.parse_data().map_err(bad_payload)?;
                let value = self.objects.read_property(&request).map_err(failed)?;
                let result = ReadResult { request, value };
                ctx.emit(topics::READ_RESULT, &result)
                    .map_err(|e| reject(e.to_string(), None))?;
            }
            topics::RELINQUISH => {
                let request: RelinquishRequest = event.parse_data().map_err(bad_payload)?;
                self.objects
                    .present_value_relinquish(request.instance, request.priority)
                    .map_err(|e| failed(e.into()))?;
            }
            topics::ACK => {
                let request: AckRequest = event.parse_data().map_err(bad_payload)?;
                self.objects
                    .alarm_ack(request.instance, request.transition, request.time_stamp)
                    .map_err(|e| failed(e.into()))?;
            }
            other => return Err(reject(format!("Unhandled event type {other}"), None)),
        }
        Ok(())
    }
}

#[async_trait]
impl Service for AnalogOutputService {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec::new(SERVICE_ID, "Analog Output Objects")
            .with_tick_interval(self.tick_interval)
            .subscribe(topics::WRITE)
            .subscribe(topics::READ)
            .subscribe(topics::RELINQUISH)
            .subscribe(topics::ACK)
    }

    async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        info!(
            objects = self.objects.count(),
            tick_ms = self.tick_interval.as_millis() as u64,
            intrinsic_reporting = self.objects.options().intrinsic_reporting,
            "Analog output service starting"
        );
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        let outstanding = self.objects.event_information().len();
        info!(outstanding, "Analog output service stopping");
        Ok(())
    }

    async fn on_event(&mut self, ctx: &ServiceContext, event: Event) -> ServiceResult<()> {
        if let Err(rejected) = self.handle(ctx, &event) {
            warn!(event_type = %event.event_type, reason = %rejected.reason, "Request rejected");
            ctx.emit(topics::REJECTED, &rejected)?;
        }
        Ok(())
    }

    async fn on_tick(&mut self, ctx: &ServiceContext) -> ServiceResult<()> {
        self.publish_pending(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bacnet_objects::{
        AnalogOutputOptions, AnalogOutputSettings, ErrorCode, EventEnable, EventNotification,
        EventState, LimitEnable, NotificationKind, PropertyId, ReportingSettings,
    };
    use tokio::sync::broadcast;

    use crate::service::{ServiceHandle, ServiceManager};

    fn objects() -> Arc<AnalogOutputs> {
        let objects = AnalogOutputs::new(AnalogOutputOptions {
            intrinsic_reporting: true,
            ..AnalogOutputOptions::default()
        });
        let mut settings = AnalogOutputSettings::new(1);
        settings.reporting = Some(ReportingSettings {
            high_limit: 80.0,
            deadband: 5.0,
            limit_enable: LimitEnable::HIGH,
            event_enable: EventEnable::ALL,
            ..ReportingSettings::default()
        });
        objects.init(&[settings]).unwrap();
        Arc::new(objects)
    }

    async fn start(
        objects: Arc<AnalogOutputs>,
    ) -> (ServiceManager, ServiceHandle, broadcast::Receiver<Event>) {
        let manager = ServiceManager::new();
        let bus = manager.subscribe();
        // Long period: the tests drive ticks themselves
        let service = AnalogOutputService::new(objects, Duration::from_secs(3600));
        let handle = manager.spawn(service).await.unwrap();
        handle.request_state().await.unwrap();
        (manager, handle, bus)
    }

    async fn next_of(bus: &mut broadcast::Receiver<Event>, event_type: &str) -> Event {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = bus.recv().await.unwrap();
                if event.event_type == event_type {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    fn request(event_type: &str, data: serde_json::Value) -> Event {
        Event::new(event_type, "test", data)
    }

    #[tokio::test]
    async fn test_write_then_tick_publishes_notifications() {
        let objects = objects();
        let (manager, handle, mut bus) = start(Arc::clone(&objects)).await;

        let write =
            WritePropertyRequest::new(1, PropertyId::PresentValue, PropertyValue::Real(95.0))
                .with_priority(8);
        handle
            .send_event(Event::with_data(topics::WRITE, "test", &write).unwrap())
            .await
            .unwrap();
        handle.force_tick().await.unwrap();

        let alarm: EventNotification = next_of(&mut bus, topics::EVENT_NOTIFICATION)
            .await
            .parse_data()
            .unwrap();
        assert_eq!(alarm.instance, 1);
        assert_eq!(alarm.to_state, EventState::HighLimit);
        assert_eq!(alarm.kind, NotificationKind::Alarm);

        let cov = next_of(&mut bus, topics::COV_NOTIFICATION).await;
        assert_eq!(cov.data["instance"], 1);
        handle.request_state().await.unwrap();
        assert!(!objects.change_of_value(1).unwrap());

        // Acknowledge over the bus; the ack notification follows on the next tick
        let ack = AckRequest {
            instance: 1,
            transition: 0,
            time_stamp: alarm.time_stamp,
        };
        handle
            .send_event(Event::with_data(topics::ACK, "test", &ack).unwrap())
            .await
            .unwrap();
        handle.force_tick().await.unwrap();

        let acked: EventNotification = next_of(&mut bus, topics::EVENT_NOTIFICATION)
            .await
            .parse_data()
            .unwrap();
        assert_eq!(acked.kind, NotificationKind::AckNotification);

        manager.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_bus_requests_are_routed() {
        let objects = objects();
        let (manager, handle, mut bus) = start(Arc::clone(&objects)).await;

        manager.emit(
            topics::RELINQUISH,
            "test",
            serde_json::json!({ "instance": 1, "priority": 16 }),
        );
        manager.emit(
            topics::READ,
            "test",
            serde_json::json!({ "instance": 1, "property": "object-name" }),
        );

        let result: ReadResult = next_of(&mut bus, topics::READ_RESULT)
            .await
            .parse_data()
            .unwrap();
        assert_eq!(
            result.value,
            PropertyValue::CharacterString("ANALOG OUTPUT 1".into())
        );

        handle.request_state().await.unwrap();
        manager.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_requests_are_rejected() {
        let (manager, handle, mut bus) = start(objects()).await;

        handle
            .send_event(request(
                topics::WRITE,
                serde_json::json!({
                    "instance": 42,
                    "property": "present-value",
                    "value": { "type": "Real", "value": 1.0 }
                }),
            ))
            .await
            .unwrap();
        let rejected: Rejected = next_of(&mut bus, topics::REJECTED)
            .await
            .parse_data()
            .unwrap();
        assert_eq!(rejected.event_type, topics::WRITE);
        assert_eq!(rejected.error.map(|e| e.code), Some(ErrorCode::UnknownObject));

        handle
            .send_event(request(topics::ACK, serde_json::json!({ "instance": "one" })))
            .await
            .unwrap();
        let rejected: Rejected = next_of(&mut bus, topics::REJECTED)
            .await
            .parse_data()
            .unwrap();
        assert!(rejected.error.is_none());
        assert!(rejected.reason.starts_with("Malformed payload"));

        manager.shutdown_all().await.unwrap();
    }
}
