//! COV Detector
//!
//! Tracks the last-notified baseline of an object and stages a property
//! value list whenever a change is significant. Delivery belongs to the
//! subscription service: it reads the staged list and calls `clear` once
//! the notification went out. `changed` is true exactly while a staged list
//! is waiting to be cleared.

use serde::{Deserialize, Serialize};

use crate::property::{PropertyId, PropertyValue, PropertyValueEntry};
use crate::types::{EventState, Reliability, StatusFlags};

/// State of an object at COV evaluation time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CovSnapshot {
    pub present_value: f32,
    pub status_flags: StatusFlags,
    pub reliability: Reliability,
    /// Present only while intrinsic reporting is enabled
    pub event_state: Option<EventState>,
}

impl CovSnapshot {
    /// Property values carried by a COV notification
    pub fn value_list(&self) -> Vec<PropertyValueEntry> {
        let mut values = vec![
            PropertyValueEntry::new(
                PropertyId::PresentValue,
                PropertyValue::Real(self.present_value),
            ),
            PropertyValueEntry::new(
                PropertyId::StatusFlags,
                PropertyValue::BitString(self.status_flags.to_bits()),
            ),
        ];
        if let Some(state) = self.event_state {
            values.push(PropertyValueEntry::new(
                PropertyId::EventState,
                PropertyValue::Enumerated(state.code()),
            ));
        }
        values
    }
}

/// Staged COV notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovNotification {
    pub instance: u32,
    pub values: Vec<PropertyValueEntry>,
}

/// Per-object COV bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct CovState {
    prior_value: f32,
    increment: f32,
    notified_out_of_service: bool,
    notified_reliability: Reliability,
    staged: Option<Vec<PropertyValueEntry>>,
}

impl CovState {
    pub fn new(prior_value: f32, increment: f32) -> Self {
        Self {
            prior_value,
            increment,
            notified_out_of_service: false,
            notified_reliability: Reliability::NoFaultDetected,
            staged: None,
        }
    }

    pub fn prior_value(&self) -> f32 {
        self.prior_value
    }

    pub fn increment(&self) -> f32 {
        self.increment
    }

    pub fn set_increment(&mut self, increment: f32) {
        self.increment = increment;
    }

    pub fn changed(&self) -> bool {
        self.staged.is_some()
    }

    pub fn staged(&self) -> Option<&[PropertyValueEntry]> {
        self.staged.as_deref()
    }

    /// Whether `value` moved far enough from the baseline
    ///
    /// A non-positive increment reports any bitwise difference.
    pub fn is_significant(&self, value: f32) -> bool {
        if self.increment <= 0.0 {
            value.to_bits() != self.prior_value.to_bits()
        } else {
            (value - self.prior_value).abs() >= self.increment
        }
    }

    /// Compare a snapshot against the baseline, staging a value list on change
    ///
    /// Returns true when this call staged a list.
    pub fn detect(&mut self, snapshot: &CovSnapshot) -> bool {
        let significant = self.is_significant(snapshot.present_value)
            || snapshot.status_flags.out_of_service != self.notified_out_of_service
            || snapshot.reliability != self.notified_reliability;
        if !significant {
            return false;
        }

        self.prior_value = snapshot.present_value;
        self.notified_out_of_service = snapshot.status_flags.out_of_service;
        self.notified_reliability = snapshot.reliability;
        self.staged = Some(snapshot.value_list());
        true
    }

    /// Drop the staged list after delivery
    pub fn clear(&mut self) {
        self.staged = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(value: f32) -> CovSnapshot {
        CovSnapshot {
            present_value: value,
            status_flags: StatusFlags::default(),
            reliability: Reliability::NoFaultDetected,
            event_state: None,
        }
    }

    #[test]
    fn test_increment_threshold() {
        let mut cov = CovState::new(10.0, 2.0);

        assert!(!cov.detect(&snapshot(11.5)));
        assert!(!cov.changed());

        assert!(cov.detect(&snapshot(12.0)));
        assert!(cov.changed());
        assert_eq!(cov.prior_value(), 12.0);

        cov.clear();
        assert!(!cov.changed());
        assert!(cov.staged().is_none());

        // Baseline moved, so a step back to 11.5 is below the increment
        assert!(!cov.detect(&snapshot(11.5)));
        assert!(cov.detect(&snapshot(9.9)));
    }

    #[test]
    fn test_zero_increment_reports_any_difference() {
        let mut cov = CovState::new(1.0, 0.0);
        assert!(!cov.detect(&snapshot(1.0)));
        assert!(cov.detect(&snapshot(1.000_001)));

        let mut negative = CovState::new(0.0, -1.0);
        assert!(negative.detect(&snapshot(-0.0)));
    }

    #[test]
    fn test_flag_changes_are_significant() {
        let mut cov = CovState::new(5.0, 100.0);

        let mut oos = snapshot(5.0);
        oos.status_flags.out_of_service = true;
        assert!(cov.detect(&oos));
        cov.clear();
        assert!(!cov.detect(&oos));

        let mut faulty = oos;
        faulty.reliability = Reliability::OpenLoop;
        assert!(cov.detect(&faulty));
    }

    #[test]
    fn test_staged_list_contents() {
        let mut cov = CovState::new(0.0, 1.0);
        let mut snap = snapshot(3.0);
        snap.event_state = Some(EventState::HighLimit);
        snap.status_flags.in_alarm = true;
        cov.detect(&snap);

        let staged = cov.staged().unwrap();
        assert_eq!(staged.len(), 3);
        assert_eq!(staged[0].value, PropertyValue::Real(3.0));
        assert_eq!(
            staged[1].value,
            PropertyValue::BitString(vec![true, false, false, false])
        );
        assert_eq!(staged[2].value, PropertyValue::Enumerated(3));
    }
}
