//! Analog Output object type
//!
//! `AnalogOutput` is the per-instance record; `AnalogOutputs` is the object
//! table that owns every record of the type and is the only way to mutate
//! them. The table serializes all access through one lock: a property write
//! and the evaluation tick of the same instance never interleave.

mod access;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cov::{CovNotification, CovSnapshot, CovState};
use crate::error::{AckError, ObjectError, ObjectResult};
use crate::intrinsic::{
    EventNotification, EventSummary, IntrinsicReporting, ReportingSettings, TickInput,
};
use crate::priority::{PriorityArray, WritePolicy};
use crate::property::PropertyValueEntry;
use crate::store::InstanceStore;
use crate::types::{
    EngineeringUnits, EventEnable, EventState, LimitEnable, ObjectIdentifier, ObjectType,
    Reliability, StatusFlags, TimeStamp, TransitionClass,
};

/// Longest object name or description, in characters
pub const MAX_TEXT_LEN: usize = 63;

/// Default number of instances a table can hold
pub const DEFAULT_CAPACITY: usize = 1024;

/// Instances created by `init` when nothing is configured
pub const DEMO_INSTANCE_COUNT: u32 = 4;

const DEFAULT_COV_INCREMENT: f32 = 1.0;

// ─────────────────────────────────────────────────────────────────────────────
// Options & Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Table-wide behavior switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogOutputOptions {
    /// Maximum number of instances
    pub capacity: usize,
    /// Run the alarm/event state machine and expose its properties
    pub intrinsic_reporting: bool,
    /// Validation of commanded writes
    pub write_policy: WritePolicy,
}

impl Default for AnalogOutputOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            intrinsic_reporting: cfg!(feature = "intrinsic-reporting"),
            write_policy: WritePolicy::default(),
        }
    }
}

/// Initial configuration of one instance, as read by the configuration loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogOutputSettings {
    pub instance: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub units: EngineeringUnits,
    #[serde(default)]
    pub relinquish_default: f32,
    #[serde(default = "default_min_pres_value")]
    pub min_pres_value: f32,
    #[serde(default = "default_max_pres_value")]
    pub max_pres_value: f32,
    #[serde(default = "default_cov_increment")]
    pub cov_increment: f32,
    #[serde(default)]
    pub reporting: Option<ReportingSettings>,
}

fn default_min_pres_value() -> f32 {
    f32::MIN
}

fn default_max_pres_value() -> f32 {
    f32::MAX
}

fn default_cov_increment() -> f32 {
    DEFAULT_COV_INCREMENT
}

impl AnalogOutputSettings {
    pub fn new(instance: u32) -> Self {
        Self {
            instance,
            name: None,
            description: None,
            units: EngineeringUnits::NoUnits,
            relinquish_default: 0.0,
            min_pres_value: default_min_pres_value(),
            max_pres_value: default_max_pres_value(),
            cov_increment: DEFAULT_COV_INCREMENT,
            reporting: None,
        }
    }

    /// A 0-100 % output with both limits armed
    pub fn demo(instance: u32) -> Self {
        Self {
            instance,
            name: Some(format!("AO {instance}")),
            description: Some(format!("Demo analog output {instance}")),
            units: EngineeringUnits::Percent,
            relinquish_default: 0.0,
            min_pres_value: 0.0,
            max_pres_value: 100.0,
            cov_increment: DEFAULT_COV_INCREMENT,
            reporting: Some(ReportingSettings {
                time_delay: 3,
                notification_class: 0,
                high_limit: 90.0,
                low_limit: 10.0,
                deadband: 2.0,
                limit_enable: LimitEnable::BOTH,
                event_enable: EventEnable::ALL,
                ..ReportingSettings::default()
            }),
        }
    }
}

/// Outcome of one evaluation pass over the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TickReport {
    pub evaluated: usize,
    pub transitions: usize,
    pub skipped: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Object Record
// ─────────────────────────────────────────────────────────────────────────────

/// One Analog Output instance
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogOutput {
    instance: u32,
    name: String,
    description: String,
    units: EngineeringUnits,
    out_of_service: bool,
    reliability: Reliability,
    disable: bool,
    priority_array: PriorityArray,
    relinquish_default: f32,
    min_pres_value: f32,
    max_pres_value: f32,
    cov: CovState,
    intrinsic: IntrinsicReporting,
}

impl AnalogOutput {
    pub fn new(instance: u32) -> Self {
        let relinquish_default = 0.0;
        Self {
            instance,
            name: format!("ANALOG OUTPUT {instance}"),
            description: String::new(),
            units: EngineeringUnits::NoUnits,
            out_of_service: false,
            reliability: Reliability::NoFaultDetected,
            disable: false,
            priority_array: PriorityArray::new(),
            relinquish_default,
            min_pres_value: f32::MIN,
            max_pres_value: f32::MAX,
            cov: CovState::new(relinquish_default, DEFAULT_COV_INCREMENT),
            intrinsic: IntrinsicReporting::default(),
        }
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    pub fn object_identifier(&self) -> ObjectIdentifier {
        ObjectIdentifier::new(ObjectType::AnalogOutput, self.instance)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn units(&self) -> EngineeringUnits {
        self.units
    }

    pub fn out_of_service(&self) -> bool {
        self.out_of_service
    }

    pub fn reliability(&self) -> Reliability {
        self.reliability
    }

    pub fn is_reporting_disabled(&self) -> bool {
        self.disable
    }

    pub fn priority_array(&self) -> &PriorityArray {
        &self.priority_array
    }

    pub fn relinquish_default(&self) -> f32 {
        self.relinquish_default
    }

    pub fn min_pres_value(&self) -> f32 {
        self.min_pres_value
    }

    pub fn max_pres_value(&self) -> f32 {
        self.max_pres_value
    }

    pub fn cov(&self) -> &CovState {
        &self.cov
    }

    pub fn intrinsic(&self) -> &IntrinsicReporting {
        &self.intrinsic
    }

    /// Effective present value
    pub fn present_value(&self) -> f32 {
        self.priority_array.effective(self.relinquish_default)
    }

    /// 1-based priority currently in control
    pub fn active_priority(&self) -> Option<u8> {
        self.priority_array.active_priority()
    }

    pub fn status_flags(&self) -> StatusFlags {
        StatusFlags {
            in_alarm: self.intrinsic.event_state() != EventState::Normal,
            fault: self.reliability.is_fault(),
            overridden: false,
            out_of_service: self.out_of_service,
        }
    }

    /// Current present-value / status-flags list, independent of the COV flag
    pub fn value_list(&self, reporting: bool) -> Vec<PropertyValueEntry> {
        self.cov_snapshot(reporting).value_list()
    }

    fn cov_snapshot(&self, reporting: bool) -> CovSnapshot {
        CovSnapshot {
            present_value: self.present_value(),
            status_flags: self.status_flags(),
            reliability: self.reliability,
            event_state: reporting.then(|| self.intrinsic.event_state()),
        }
    }

    fn evaluate_cov(&mut self, reporting: bool) -> bool {
        let snapshot = self.cov_snapshot(reporting);
        let changed = self.cov.detect(&snapshot);
        if changed {
            debug!(
                instance = self.instance,
                present_value = snapshot.present_value,
                "COV notification staged"
            );
        }
        changed
    }

    fn tick_input(&self) -> TickInput {
        TickInput {
            instance: self.instance,
            present_value: self.present_value(),
            reliability: self.reliability,
            out_of_service: self.out_of_service,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutation (reached through `AnalogOutputs`)
    // ─────────────────────────────────────────────────────────────────────────

    /// Command or relinquish (`None`) a priority slot
    fn write_present_value(
        &mut self,
        priority: u8,
        value: Option<f32>,
        policy: &WritePolicy,
    ) -> ObjectResult<()> {
        policy.check_priority(priority)?;
        match value {
            Some(value) => {
                let value = if self.out_of_service {
                    // Out of service values bypass the bounds but must still be numbers
                    if !value.is_finite() {
                        return Err(ObjectError::OutOfRange {
                            value,
                            min: self.min_pres_value,
                            max: self.max_pres_value,
                        });
                    }
                    value
                } else {
                    policy.bound(value, self.min_pres_value, self.max_pres_value)?
                };
                self.priority_array.command(priority, value)?;
                debug!(instance = self.instance, priority, value, "Present value commanded");
            }
            None => {
                self.priority_array.relinquish(priority)?;
                debug!(instance = self.instance, priority, "Priority relinquished");
            }
        }
        Ok(())
    }

    fn set_name(&mut self, name: &str) -> ObjectResult<()> {
        self.name = bounded_text(name)?;
        Ok(())
    }

    fn set_description(&mut self, description: &str) -> ObjectResult<()> {
        self.description = bounded_text(description)?;
        Ok(())
    }

    fn set_relinquish_default(&mut self, value: f32) -> ObjectResult<()> {
        if !value.is_finite() {
            return Err(ObjectError::OutOfRange {
                value,
                min: f32::MIN,
                max: f32::MAX,
            });
        }
        self.relinquish_default = value;
        Ok(())
    }

    fn set_pres_value_limits(&mut self, min: f32, max: f32) -> ObjectResult<()> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(ObjectError::OutOfRange {
                value: min,
                min: f32::MIN,
                max,
            });
        }
        self.min_pres_value = min;
        self.max_pres_value = max;
        Ok(())
    }

    fn set_cov_increment(&mut self, increment: f32) -> ObjectResult<()> {
        if !increment.is_finite() {
            return Err(ObjectError::OutOfRange {
                value: increment,
                min: 0.0,
                max: f32::MAX,
            });
        }
        self.cov.set_increment(increment);
        Ok(())
    }

    fn update_reporting(&mut self, update: impl FnOnce(&mut ReportingSettings)) {
        let mut settings = self.intrinsic.settings;
        update(&mut settings);
        self.intrinsic.configure(settings);
    }

    fn apply(&mut self, settings: &AnalogOutputSettings) -> ObjectResult<()> {
        if let Some(name) = &settings.name {
            self.set_name(name)?;
        }
        if let Some(description) = &settings.description {
            self.set_description(description)?;
        }
        self.units = settings.units;
        self.set_relinquish_default(settings.relinquish_default)?;
        self.set_pres_value_limits(settings.min_pres_value, settings.max_pres_value)?;
        self.cov = CovState::new(self.present_value(), DEFAULT_COV_INCREMENT);
        self.set_cov_increment(settings.cov_increment)?;
        if let Some(reporting) = settings.reporting {
            self.intrinsic.configure(reporting);
        }
        Ok(())
    }
}

fn bounded_text(text: &str) -> ObjectResult<String> {
    let len = text.chars().count();
    if len > MAX_TEXT_LEN {
        return Err(ObjectError::TextTooLong {
            len,
            max: MAX_TEXT_LEN,
        });
    }
    Ok(text.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Object Table
// ─────────────────────────────────────────────────────────────────────────────

/// All Analog Output instances of a device
pub struct AnalogOutputs {
    store: Mutex<InstanceStore<AnalogOutput>>,
    options: AnalogOutputOptions,
}

impl Default for AnalogOutputs {
    fn default() -> Self {
        Self::new(AnalogOutputOptions::default())
    }
}

impl AnalogOutputs {
    pub fn new(options: AnalogOutputOptions) -> Self {
        Self {
            store: Mutex::new(InstanceStore::with_capacity(options.capacity)),
            options,
        }
    }

    pub fn options(&self) -> &AnalogOutputOptions {
        &self.options
    }

    fn reporting(&self) -> bool {
        self.options.intrinsic_reporting
    }

    /// Run `f` against one record under the table lock
    fn with_object<R>(
        &self,
        instance: u32,
        f: impl FnOnce(&mut AnalogOutput) -> ObjectResult<R>,
    ) -> ObjectResult<R> {
        let mut store = self.store.lock();
        f(store.get_mut(instance)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the table contents with the configured instances
    ///
    /// An empty configuration yields the demo set. The new table is built
    /// aside and swapped in whole; on error the old contents stay in place.
    pub fn init(&self, settings: &[AnalogOutputSettings]) -> ObjectResult<()> {
        let demo: Vec<AnalogOutputSettings>;
        let settings = if settings.is_empty() {
            demo = (0..DEMO_INSTANCE_COUNT)
                .map(AnalogOutputSettings::demo)
                .collect();
            &demo[..]
        } else {
            settings
        };

        let mut table = InstanceStore::with_capacity(self.options.capacity);
        for entry in settings {
            let mut object = AnalogOutput::new(entry.instance);
            object.apply(entry)?;
            table.insert(entry.instance, object)?;
        }

        let count = table.count();
        *self.store.lock() = table;
        info!(count, "Analog outputs initialized");
        Ok(())
    }

    /// Create an instance with default properties
    pub fn create(&self, instance: u32) -> ObjectResult<()> {
        self.store
            .lock()
            .insert(instance, AnalogOutput::new(instance))?;
        info!(instance, "Analog output created");
        Ok(())
    }

    /// Delete an instance; its unacknowledged transitions are dropped with it
    pub fn delete(&self, instance: u32) -> ObjectResult<()> {
        let object = self.store.lock().remove(instance)?;
        if object.intrinsic.acked_transitions().any_unacked() {
            warn!(instance, "Deleted analog output with unacknowledged transitions");
        } else {
            info!(instance, "Analog output deleted");
        }
        Ok(())
    }

    /// Remove every instance
    pub fn cleanup(&self) {
        let mut store = self.store.lock();
        let count = store.count();
        store.clear();
        info!(count, "Analog outputs released");
    }

    pub fn count(&self) -> usize {
        self.store.lock().count()
    }

    pub fn is_valid(&self, instance: u32) -> bool {
        self.store.lock().is_valid(instance)
    }

    pub fn index_to_instance(&self, index: usize) -> Option<u32> {
        self.store.lock().instance_of(index)
    }

    pub fn instance_to_index(&self, instance: u32) -> Option<usize> {
        self.store.lock().index_of(instance)
    }

    /// Instance numbers in ascending order
    pub fn instances(&self) -> Vec<u32> {
        self.store.lock().instances()
    }

    /// Copy of one record
    pub fn snapshot(&self, instance: u32) -> ObjectResult<AnalogOutput> {
        self.with_object(instance, |object| Ok(object.clone()))
    }

    pub fn object_name(&self, instance: u32) -> ObjectResult<String> {
        self.with_object(instance, |object| Ok(object.name.clone()))
    }

    pub fn name_set(&self, instance: u32, name: &str) -> ObjectResult<()> {
        self.with_object(instance, |object| object.set_name(name))
    }

    pub fn description(&self, instance: u32) -> ObjectResult<String> {
        self.with_object(instance, |object| Ok(object.description.clone()))
    }

    pub fn description_set(&self, instance: u32, description: &str) -> ObjectResult<()> {
        self.with_object(instance, |object| object.set_description(description))
    }

    pub fn units_set(&self, instance: u32, units: EngineeringUnits) -> ObjectResult<()> {
        self.with_object(instance, |object| {
            object.units = units;
            Ok(())
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Priority Resolver
    // ─────────────────────────────────────────────────────────────────────────

    /// Effective present value
    pub fn present_value(&self, instance: u32) -> ObjectResult<f32> {
        self.with_object(instance, |object| Ok(object.present_value()))
    }

    /// Priority currently in control, `None` when relinquish-default governs
    pub fn present_value_priority(&self, instance: u32) -> ObjectResult<Option<u8>> {
        self.with_object(instance, |object| Ok(object.active_priority()))
    }

    /// Command `value` at a 1-based priority
    pub fn present_value_set(&self, instance: u32, value: f32, priority: u8) -> ObjectResult<()> {
        let policy = self.options.write_policy;
        let reporting = self.reporting();
        self.with_object(instance, |object| {
            object.write_present_value(priority, Some(value), &policy)?;
            object.evaluate_cov(reporting);
            Ok(())
        })
    }

    /// Relinquish a 1-based priority
    pub fn present_value_relinquish(&self, instance: u32, priority: u8) -> ObjectResult<()> {
        let policy = self.options.write_policy;
        let reporting = self.reporting();
        self.with_object(instance, |object| {
            object.write_present_value(priority, None, &policy)?;
            object.evaluate_cov(reporting);
            Ok(())
        })
    }

    pub fn relinquish_default_set(&self, instance: u32, value: f32) -> ObjectResult<()> {
        let reporting = self.reporting();
        self.with_object(instance, |object| {
            object.set_relinquish_default(value)?;
            object.evaluate_cov(reporting);
            Ok(())
        })
    }

    /// Set the bounds applied to commanded values
    pub fn pres_value_limits_set(&self, instance: u32, min: f32, max: f32) -> ObjectResult<()> {
        self.with_object(instance, |object| object.set_pres_value_limits(min, max))
    }

    pub fn out_of_service(&self, instance: u32) -> ObjectResult<bool> {
        self.with_object(instance, |object| Ok(object.out_of_service))
    }

    pub fn out_of_service_set(&self, instance: u32, value: bool) -> ObjectResult<()> {
        let reporting = self.reporting();
        self.with_object(instance, |object| {
            object.out_of_service = value;
            object.evaluate_cov(reporting);
            Ok(())
        })
    }

    pub fn reliability(&self, instance: u32) -> ObjectResult<Reliability> {
        self.with_object(instance, |object| Ok(object.reliability))
    }

    pub fn reliability_set(&self, instance: u32, value: Reliability) -> ObjectResult<()> {
        let reporting = self.reporting();
        self.with_object(instance, |object| {
            object.reliability = value;
            object.evaluate_cov(reporting);
            Ok(())
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // COV Detector
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether a staged COV notification is waiting
    pub fn change_of_value(&self, instance: u32) -> ObjectResult<bool> {
        self.with_object(instance, |object| Ok(object.cov.changed()))
    }

    /// Mark the staged COV notification as delivered
    pub fn change_of_value_clear(&self, instance: u32) -> ObjectResult<()> {
        self.with_object(instance, |object| {
            object.cov.clear();
            Ok(())
        })
    }

    pub fn cov_increment_set(&self, instance: u32, increment: f32) -> ObjectResult<()> {
        self.with_object(instance, |object| object.set_cov_increment(increment))
    }

    /// Staged COV notification of one instance
    pub fn cov_notification(&self, instance: u32) -> ObjectResult<Option<CovNotification>> {
        self.with_object(instance, |object| {
            Ok(object.cov.staged().map(|values| CovNotification {
                instance,
                values: values.to_vec(),
            }))
        })
    }

    /// All staged COV notifications, in instance order
    pub fn pending_cov_notifications(&self) -> Vec<CovNotification> {
        let store = self.store.lock();
        store
            .iter()
            .filter_map(|(instance, object)| {
                object.cov.staged().map(|values| CovNotification {
                    instance,
                    values: values.to_vec(),
                })
            })
            .collect()
    }

    /// Current value list of one instance
    pub fn encode_value_list(&self, instance: u32) -> ObjectResult<Vec<PropertyValueEntry>> {
        let reporting = self.reporting();
        self.with_object(instance, |object| Ok(object.value_list(reporting)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Intrinsic Reporting
    // ─────────────────────────────────────────────────────────────────────────

    pub fn event_state(&self, instance: u32) -> ObjectResult<EventState> {
        self.with_object(instance, |object| Ok(object.intrinsic.event_state()))
    }

    /// Replace the alarm settings of one instance
    pub fn reporting_set(&self, instance: u32, settings: ReportingSettings) -> ObjectResult<()> {
        self.with_object(instance, |object| {
            object.intrinsic.configure(settings);
            Ok(())
        })
    }

    /// Enable or administratively disable event detection for one instance
    pub fn event_detection_enable_set(&self, instance: u32, enabled: bool) -> ObjectResult<()> {
        self.with_object(instance, |object| {
            object.disable = !enabled;
            Ok(())
        })
    }

    /// Evaluate one instance for this tick
    ///
    /// Returns the new event state when a transition committed.
    pub fn intrinsic_reporting(
        &self,
        instance: u32,
        now: TimeStamp,
    ) -> ObjectResult<Option<EventState>> {
        let reporting = self.reporting();
        self.with_object(instance, |object| {
            if !reporting || object.disable {
                return Ok(None);
            }
            let input = object.tick_input();
            Ok(object.intrinsic.tick(&input, now))
        })
    }

    /// Evaluate every instance in ascending order
    ///
    /// A failing instance is logged and skipped; the pass always completes.
    pub fn intrinsic_reporting_pass(&self, now: TimeStamp) -> TickReport {
        self.reporting_pass_over(&self.instances(), now)
    }

    /// Table lock is taken per instance, so entries may vanish mid-pass
    fn reporting_pass_over(&self, instances: &[u32], now: TimeStamp) -> TickReport {
        let mut report = TickReport::default();
        for &instance in instances {
            match self.intrinsic_reporting(instance, now) {
                Ok(transition) => {
                    report.evaluated += 1;
                    if transition.is_some() {
                        report.transitions += 1;
                    }
                }
                Err(e) => {
                    report.skipped += 1;
                    warn!(instance, error = %e, "Skipping intrinsic reporting for instance");
                }
            }
        }
        report
    }

    /// Hand over every staged event notification, in instance order
    pub fn take_event_notifications(&self) -> Vec<EventNotification> {
        let mut store = self.store.lock();
        store
            .iter_mut()
            .flat_map(|(_, object)| object.intrinsic.take_staged())
            .collect()
    }

    /// Acknowledge the transition of class `transition` stamped `time_stamp`
    pub fn alarm_ack(
        &self,
        instance: u32,
        transition: u8,
        time_stamp: TimeStamp,
    ) -> ObjectResult<()> {
        self.with_object(instance, |object| {
            let transition =
                TransitionClass::from_index(transition).ok_or(AckError::InvalidTransition)?;
            object.intrinsic.acknowledge(transition, time_stamp)?;
            info!(instance, ?transition, "Transition acknowledged");
            Ok(())
        })
    }

    /// Objects with an active event state or unacknowledged transitions
    pub fn event_information(&self) -> Vec<EventSummary> {
        if !self.reporting() {
            return Vec::new();
        }
        let store = self.store.lock();
        store
            .iter()
            .filter(|(_, object)| object.intrinsic.needs_attention())
            .map(|(instance, object)| object.intrinsic.summary(instance))
            .collect()
    }

    /// The `index`-th entry of `event_information`
    pub fn event_information_at(&self, index: usize) -> Option<EventSummary> {
        self.event_information().into_iter().nth(index)
    }

    /// Alarm summary: the same objects as `event_information`
    pub fn alarm_summary(&self) -> Vec<EventSummary> {
        self.event_information()
    }

    /// The `index`-th entry of `alarm_summary`
    pub fn alarm_summary_at(&self, index: usize) -> Option<EventSummary> {
        self.alarm_summary().into_iter().nth(index)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
