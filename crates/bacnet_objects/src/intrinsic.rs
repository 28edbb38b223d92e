//! Intrinsic Reporting State Machine
//!
//! Limit and fault detection for a single object, evaluated once per tick.
//!
//! # Evaluation order
//!
//! 1. A faulty reliability moves the object to `Fault` at once.
//! 2. Otherwise the present value is checked against the enabled limits,
//!    with the deadband holding an active limit state until the value has
//!    cleared the limit by at least the deadband.
//! 3. A limit-driven change has to persist for `time_delay` consecutive
//!    ticks before it commits.
//! 4. A committed transition is time stamped and, when `event_enable`
//!    allows its class, left unacknowledged and staged as a notification.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::AckError;
use crate::types::{
    AckedTransitions, EventEnable, EventState, LimitEnable, NotifyType, Reliability, StatusFlags,
    TimeStamp, TransitionClass,
};

/// Kind of notification handed to the notification-class service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    Alarm,
    Event,
    AckNotification,
}

impl From<NotifyType> for NotificationKind {
    fn from(notify_type: NotifyType) -> Self {
        match notify_type {
            NotifyType::Alarm => NotificationKind::Alarm,
            NotifyType::Event => NotificationKind::Event,
        }
    }
}

/// Event values of an out-of-range transition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutOfRangeValues {
    pub exceeding_value: f32,
    pub status_flags: StatusFlags,
    pub deadband: f32,
    pub exceeded_limit: f32,
}

/// Staged event notification
///
/// Priorities and recipients are resolved by the notification-class service
/// from `notification_class`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNotification {
    pub instance: u32,
    pub notification_class: u32,
    pub kind: NotificationKind,
    pub transition: TransitionClass,
    pub from_state: EventState,
    pub to_state: EventState,
    pub time_stamp: TimeStamp,
    pub ack_required: bool,
    pub message: String,
    pub values: Option<OutOfRangeValues>,
}

/// Object state seen by one evaluation tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInput {
    pub instance: u32,
    pub present_value: f32,
    pub reliability: Reliability,
    pub out_of_service: bool,
}

/// Configurable part of the intrinsic reporting sub-record
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportingSettings {
    #[serde(default)]
    pub time_delay: u32,
    #[serde(default)]
    pub notification_class: u32,
    #[serde(default)]
    pub high_limit: f32,
    #[serde(default)]
    pub low_limit: f32,
    #[serde(default)]
    pub deadband: f32,
    #[serde(default)]
    pub limit_enable: LimitEnable,
    #[serde(default)]
    pub event_enable: EventEnable,
    #[serde(default)]
    pub notify_type: NotifyType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingAck {
    transition: TransitionClass,
    state: EventState,
    time_stamp: TimeStamp,
}

/// Per-object event summary, as listed by event-information and alarm-summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub instance: u32,
    pub event_state: EventState,
    pub acked_transitions: AckedTransitions,
    pub event_time_stamps: [Option<TimeStamp>; 3],
    pub notify_type: NotifyType,
    pub event_enable: EventEnable,
}

/// Intrinsic reporting sub-record of an object
#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicReporting {
    pub settings: ReportingSettings,
    event_state: EventState,
    /// Candidate state waiting out the time delay
    pending_state: Option<EventState>,
    remaining_time_delay: u32,
    acked_transitions: AckedTransitions,
    event_time_stamps: [Option<TimeStamp>; 3],
    /// State entered by the last transition of each class
    transition_states: [EventState; 3],
    /// Acknowledgments waiting for the next tick, oldest first
    pending_acks: VecDeque<PendingAck>,
    staged: VecDeque<EventNotification>,
}

impl Default for IntrinsicReporting {
    fn default() -> Self {
        Self::new(ReportingSettings::default())
    }
}

impl IntrinsicReporting {
    pub fn new(settings: ReportingSettings) -> Self {
        Self {
            settings,
            event_state: EventState::Normal,
            pending_state: None,
            remaining_time_delay: settings.time_delay,
            acked_transitions: AckedTransitions::default(),
            event_time_stamps: [None; 3],
            transition_states: [
                EventState::HighLimit,
                EventState::Fault,
                EventState::Normal,
            ],
            pending_acks: VecDeque::new(),
            staged: VecDeque::new(),
        }
    }

    pub fn event_state(&self) -> EventState {
        self.event_state
    }

    pub fn remaining_time_delay(&self) -> u32 {
        self.remaining_time_delay
    }

    pub fn acked_transitions(&self) -> AckedTransitions {
        self.acked_transitions
    }

    pub fn event_time_stamps(&self) -> [Option<TimeStamp>; 3] {
        self.event_time_stamps
    }

    pub fn event_time_stamp(&self, transition: TransitionClass) -> Option<TimeStamp> {
        self.event_time_stamps[transition.index()]
    }

    /// Replace the settings, cancelling any transition in progress
    pub fn configure(&mut self, settings: ReportingSettings) {
        self.settings = settings;
        self.pending_state = None;
        self.remaining_time_delay = settings.time_delay;
    }

    /// Whether the object belongs in event-information / alarm-summary lists
    pub fn needs_attention(&self) -> bool {
        self.event_state != EventState::Normal || self.acked_transitions.any_unacked()
    }

    pub fn summary(&self, instance: u32) -> EventSummary {
        EventSummary {
            instance,
            event_state: self.event_state,
            acked_transitions: self.acked_transitions,
            event_time_stamps: self.event_time_stamps,
            notify_type: self.settings.notify_type,
            event_enable: self.settings.event_enable,
        }
    }

    /// Staged notifications, oldest first
    pub fn staged(&self) -> impl Iterator<Item = &EventNotification> {
        self.staged.iter()
    }

    /// Hand staged notifications over to the caller
    pub fn take_staged(&mut self) -> Vec<EventNotification> {
        self.staged.drain(..).collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Evaluation
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one evaluation tick
    ///
    /// Returns the new event state when a transition committed.
    pub fn tick(&mut self, input: &TickInput, now: TimeStamp) -> Option<EventState> {
        while let Some(ack) = self.pending_acks.pop_front() {
            self.stage_ack_notification(input.instance, ack);
        }

        let target = self.target_state(input);
        if target == self.event_state {
            self.pending_state = None;
            self.remaining_time_delay = self.settings.time_delay;
            return None;
        }

        // Entering fault skips the time delay
        if target == EventState::Fault {
            self.pending_state = None;
            self.remaining_time_delay = self.settings.time_delay;
            self.commit(input, target, now);
            return Some(target);
        }

        if self.pending_state != Some(target) {
            self.pending_state = Some(target);
            self.remaining_time_delay = self.settings.time_delay;
        }
        self.remaining_time_delay = self.remaining_time_delay.saturating_sub(1);
        if self.remaining_time_delay > 0 {
            return None;
        }

        self.pending_state = None;
        self.remaining_time_delay = self.settings.time_delay;
        self.commit(input, target, now);
        Some(target)
    }

    /// State the object should be in for the given input
    fn target_state(&self, input: &TickInput) -> EventState {
        if input.reliability.is_fault() {
            return EventState::Fault;
        }

        let s = &self.settings;
        let value = input.present_value;
        if s.limit_enable.high && value > s.high_limit {
            return EventState::HighLimit;
        }
        if s.limit_enable.low && value < s.low_limit {
            return EventState::LowLimit;
        }

        match self.event_state {
            EventState::HighLimit if s.limit_enable.high && value > s.high_limit - s.deadband => {
                EventState::HighLimit
            }
            EventState::LowLimit if s.limit_enable.low && value < s.low_limit + s.deadband => {
                EventState::LowLimit
            }
            _ => EventState::Normal,
        }
    }

    fn commit(&mut self, input: &TickInput, to_state: EventState, now: TimeStamp) {
        let from_state = self.event_state;
        let transition = TransitionClass::of(to_state);
        self.event_state = to_state;

        if !self.settings.event_enable.permits(transition) {
            tracing::info!(
                instance = input.instance,
                %from_state,
                %to_state,
                "Event state changed (notification disabled)"
            );
            return;
        }

        self.event_time_stamps[transition.index()] = Some(now);
        self.acked_transitions.set(transition, false);
        self.transition_states[transition.index()] = to_state;

        let status_flags = StatusFlags {
            in_alarm: to_state != EventState::Normal,
            fault: input.reliability.is_fault(),
            overridden: false,
            out_of_service: input.out_of_service,
        };
        let exceeded_limit = match (from_state, to_state) {
            (_, EventState::HighLimit) | (EventState::HighLimit, EventState::Normal) => {
                Some(self.settings.high_limit)
            }
            (_, EventState::LowLimit) | (EventState::LowLimit, EventState::Normal) => {
                Some(self.settings.low_limit)
            }
            _ => None,
        };
        let values = exceeded_limit.map(|exceeded_limit| OutOfRangeValues {
            exceeding_value: input.present_value,
            status_flags,
            deadband: self.settings.deadband,
            exceeded_limit,
        });

        tracing::info!(
            instance = input.instance,
            %from_state,
            %to_state,
            notification_class = self.settings.notification_class,
            "Event state changed"
        );

        self.staged.push_back(EventNotification {
            instance: input.instance,
            notification_class: self.settings.notification_class,
            kind: self.settings.notify_type.into(),
            transition,
            from_state,
            to_state,
            time_stamp: now,
            ack_required: true,
            message: transition_message(from_state, to_state).to_string(),
            values,
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Acknowledgment
    // ─────────────────────────────────────────────────────────────────────────

    /// Acknowledge the transition stamped `time_stamp`
    ///
    /// The acknowledgment notification goes out on the next tick.
    pub fn acknowledge(
        &mut self,
        transition: TransitionClass,
        time_stamp: TimeStamp,
    ) -> Result<(), AckError> {
        if self.acked_transitions.is_acked(transition) {
            return Err(AckError::AlreadyAcked);
        }
        if self.event_time_stamps[transition.index()] != Some(time_stamp) {
            return Err(AckError::NoMatchingEvent);
        }

        self.acked_transitions.set(transition, true);
        self.pending_acks.push_back(PendingAck {
            transition,
            state: self.transition_states[transition.index()],
            time_stamp,
        });
        Ok(())
    }

    fn stage_ack_notification(&mut self, instance: u32, ack: PendingAck) {
        self.staged.push_back(EventNotification {
            instance,
            notification_class: self.settings.notification_class,
            kind: NotificationKind::AckNotification,
            transition: ack.transition,
            from_state: ack.state,
            to_state: ack.state,
            time_stamp: ack.time_stamp,
            ack_required: false,
            message: String::new(),
            values: None,
        });
    }
}

fn transition_message(from: EventState, to: EventState) -> &'static str {
    match (from, to) {
        (_, EventState::HighLimit) => "Goes to high limit",
        (_, EventState::LowLimit) => "Goes to low limit",
        (_, EventState::Fault) => "Goes to fault",
        (EventState::Fault, EventState::Normal) => "Fault cleared",
        (_, EventState::Normal) => "Back to normal state",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
