//! Enumerations and flag sets shared by the object types
//!
//! Wire codes follow the BACnet enumerations so the codec layer can convert
//! with `code()` / `from_code()` without a lookup table of its own.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time stamp attached to an event transition
pub type TimeStamp = DateTime<Utc>;

// ─────────────────────────────────────────────────────────────────────────────
// Object Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Object types implemented by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectType {
    AnalogOutput,
}

impl ObjectType {
    pub fn code(&self) -> u32 {
        match self {
            ObjectType::AnalogOutput => 1,
        }
    }
}

/// Object type + instance pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectIdentifier {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectIdentifier {
    pub fn new(object_type: ObjectType, instance: u32) -> Self {
        Self {
            object_type,
            instance,
        }
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.object_type, self.instance)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engineering Units
// ─────────────────────────────────────────────────────────────────────────────

/// Engineering units of a point value
///
/// Only the units commonly seen on outputs get a named variant; anything
/// else is carried through unchanged as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineeringUnits {
    Milliamperes,
    Volts,
    Kilowatts,
    Pascals,
    DegreesCelsius,
    DegreesFahrenheit,
    CubicFeetPerMinute,
    LitersPerSecond,
    #[default]
    NoUnits,
    Percent,
    Other(u32),
}

impl EngineeringUnits {
    pub fn code(&self) -> u32 {
        match self {
            EngineeringUnits::Milliamperes => 2,
            EngineeringUnits::Volts => 5,
            EngineeringUnits::Kilowatts => 48,
            EngineeringUnits::Pascals => 53,
            EngineeringUnits::DegreesCelsius => 62,
            EngineeringUnits::DegreesFahrenheit => 64,
            EngineeringUnits::CubicFeetPerMinute => 84,
            EngineeringUnits::LitersPerSecond => 87,
            EngineeringUnits::NoUnits => 95,
            EngineeringUnits::Percent => 98,
            EngineeringUnits::Other(code) => *code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            2 => EngineeringUnits::Milliamperes,
            5 => EngineeringUnits::Volts,
            48 => EngineeringUnits::Kilowatts,
            53 => EngineeringUnits::Pascals,
            62 => EngineeringUnits::DegreesCelsius,
            64 => EngineeringUnits::DegreesFahrenheit,
            84 => EngineeringUnits::CubicFeetPerMinute,
            87 => EngineeringUnits::LitersPerSecond,
            95 => EngineeringUnits::NoUnits,
            98 => EngineeringUnits::Percent,
            other => EngineeringUnits::Other(other),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reliability
// ─────────────────────────────────────────────────────────────────────────────

/// Fault indicator of an object, independent of its limit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reliability {
    #[default]
    NoFaultDetected,
    NoSensor,
    OverRange,
    UnderRange,
    OpenLoop,
    ShortedLoop,
    NoOutput,
    UnreliableOther,
    ProcessError,
    ConfigurationError,
    CommunicationFailure,
}

impl Reliability {
    pub fn code(&self) -> u32 {
        match self {
            Reliability::NoFaultDetected => 0,
            Reliability::NoSensor => 1,
            Reliability::OverRange => 2,
            Reliability::UnderRange => 3,
            Reliability::OpenLoop => 4,
            Reliability::ShortedLoop => 5,
            Reliability::NoOutput => 6,
            Reliability::UnreliableOther => 7,
            Reliability::ProcessError => 8,
            Reliability::ConfigurationError => 10,
            Reliability::CommunicationFailure => 12,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Reliability::NoFaultDetected,
            1 => Reliability::NoSensor,
            2 => Reliability::OverRange,
            3 => Reliability::UnderRange,
            4 => Reliability::OpenLoop,
            5 => Reliability::ShortedLoop,
            6 => Reliability::NoOutput,
            7 => Reliability::UnreliableOther,
            8 => Reliability::ProcessError,
            10 => Reliability::ConfigurationError,
            12 => Reliability::CommunicationFailure,
            _ => return None,
        })
    }

    pub fn is_fault(&self) -> bool {
        *self != Reliability::NoFaultDetected
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event State & Transitions
// ─────────────────────────────────────────────────────────────────────────────

/// Event state of an intrinsically reporting object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventState {
    #[default]
    Normal,
    Fault,
    HighLimit,
    LowLimit,
}

impl EventState {
    pub fn code(&self) -> u32 {
        match self {
            EventState::Normal => 0,
            EventState::Fault => 1,
            EventState::HighLimit => 3,
            EventState::LowLimit => 4,
        }
    }

    pub fn is_offnormal(&self) -> bool {
        matches!(self, EventState::HighLimit | EventState::LowLimit)
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventState::Normal => write!(f, "normal"),
            EventState::Fault => write!(f, "fault"),
            EventState::HighLimit => write!(f, "high-limit"),
            EventState::LowLimit => write!(f, "low-limit"),
        }
    }
}

/// Class of an event-state transition
///
/// The discriminant is the index into `acked_transitions` and
/// `event_time_stamps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionClass {
    ToOffnormal = 0,
    ToFault = 1,
    ToNormal = 2,
}

impl TransitionClass {
    pub const ALL: [TransitionClass; 3] = [
        TransitionClass::ToOffnormal,
        TransitionClass::ToFault,
        TransitionClass::ToNormal,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Classify the transition that ends in `to`
    pub fn of(to: EventState) -> Self {
        match to {
            EventState::Normal => TransitionClass::ToNormal,
            EventState::Fault => TransitionClass::ToFault,
            EventState::HighLimit | EventState::LowLimit => TransitionClass::ToOffnormal,
        }
    }
}

/// Whether notifications are sent as alarms or events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyType {
    #[default]
    Alarm,
    Event,
}

impl NotifyType {
    pub fn code(&self) -> u32 {
        match self {
            NotifyType::Alarm => 0,
            NotifyType::Event => 1,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(NotifyType::Alarm),
            1 => Some(NotifyType::Event),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flag Sets
// ─────────────────────────────────────────────────────────────────────────────

/// Which limits take part in intrinsic reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LimitEnable {
    #[serde(default)]
    pub low: bool,
    #[serde(default)]
    pub high: bool,
}

impl LimitEnable {
    pub const NONE: LimitEnable = LimitEnable {
        low: false,
        high: false,
    };
    pub const LOW: LimitEnable = LimitEnable {
        low: true,
        high: false,
    };
    pub const HIGH: LimitEnable = LimitEnable {
        low: false,
        high: true,
    };
    pub const BOTH: LimitEnable = LimitEnable {
        low: true,
        high: true,
    };

    /// Bit order: low-limit-enable, high-limit-enable
    pub fn to_bits(&self) -> Vec<bool> {
        vec![self.low, self.high]
    }

    pub fn from_bits(bits: &[bool]) -> Self {
        let bit = |i: usize| bits.get(i).copied().unwrap_or(false);
        Self {
            low: bit(0),
            high: bit(1),
        }
    }
}

/// Which transition classes produce notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventEnable {
    #[serde(default)]
    pub to_offnormal: bool,
    #[serde(default)]
    pub to_fault: bool,
    #[serde(default)]
    pub to_normal: bool,
}

impl EventEnable {
    pub const NONE: EventEnable = EventEnable {
        to_offnormal: false,
        to_fault: false,
        to_normal: false,
    };
    pub const ALL: EventEnable = EventEnable {
        to_offnormal: true,
        to_fault: true,
        to_normal: true,
    };

    pub fn permits(&self, transition: TransitionClass) -> bool {
        match transition {
            TransitionClass::ToOffnormal => self.to_offnormal,
            TransitionClass::ToFault => self.to_fault,
            TransitionClass::ToNormal => self.to_normal,
        }
    }

    pub fn with(mut self, transition: TransitionClass) -> Self {
        match transition {
            TransitionClass::ToOffnormal => self.to_offnormal = true,
            TransitionClass::ToFault => self.to_fault = true,
            TransitionClass::ToNormal => self.to_normal = true,
        }
        self
    }

    /// Bit order follows `TransitionClass`
    pub fn to_bits(&self) -> Vec<bool> {
        vec![self.to_offnormal, self.to_fault, self.to_normal]
    }

    pub fn from_bits(bits: &[bool]) -> Self {
        let bit = |i: usize| bits.get(i).copied().unwrap_or(false);
        Self {
            to_offnormal: bit(0),
            to_fault: bit(1),
            to_normal: bit(2),
        }
    }
}

/// Status flags reported with present value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusFlags {
    pub in_alarm: bool,
    pub fault: bool,
    pub overridden: bool,
    pub out_of_service: bool,
}

impl StatusFlags {
    pub fn to_bits(&self) -> Vec<bool> {
        vec![
            self.in_alarm,
            self.fault,
            self.overridden,
            self.out_of_service,
        ]
    }
}

/// Acknowledgment flag per transition class (`true` = acknowledged)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckedTransitions([bool; 3]);

impl Default for AckedTransitions {
    fn default() -> Self {
        Self([true; 3])
    }
}

impl AckedTransitions {
    pub fn is_acked(&self, transition: TransitionClass) -> bool {
        self.0[transition.index()]
    }

    pub fn set(&mut self, transition: TransitionClass, acked: bool) {
        self.0[transition.index()] = acked;
    }

    pub fn any_unacked(&self) -> bool {
        self.0.iter().any(|acked| !acked)
    }

    pub fn to_bits(&self) -> Vec<bool> {
        self.0.to_vec()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_classification() {
        assert_eq!(TransitionClass::of(EventState::HighLimit), TransitionClass::ToOffnormal);
        assert_eq!(TransitionClass::of(EventState::LowLimit), TransitionClass::ToOffnormal);
        assert_eq!(TransitionClass::of(EventState::Fault), TransitionClass::ToFault);
        assert_eq!(TransitionClass::of(EventState::Normal), TransitionClass::ToNormal);

        assert_eq!(TransitionClass::from_index(1), Some(TransitionClass::ToFault));
        assert_eq!(TransitionClass::from_index(3), None);
    }

    #[test]
    fn test_flag_bits() {
        let enable = EventEnable::NONE
            .with(TransitionClass::ToOffnormal)
            .with(TransitionClass::ToNormal);
        assert_eq!(enable.to_bits(), vec![true, false, true]);
        assert_eq!(EventEnable::from_bits(&enable.to_bits()), enable);
        assert!(!enable.permits(TransitionClass::ToFault));

        // Short bit strings leave the missing flags cleared
        assert_eq!(LimitEnable::from_bits(&[true]), LimitEnable::LOW);
    }

    #[test]
    fn test_unit_codes() {
        assert_eq!(EngineeringUnits::from_code(98), EngineeringUnits::Percent);
        assert_eq!(EngineeringUnits::from_code(4000), EngineeringUnits::Other(4000));
        assert_eq!(EngineeringUnits::Other(4000).code(), 4000);
        assert_eq!(Reliability::from_code(9), None);
    }

    #[test]
    fn test_acked_transitions_default_to_acked() {
        let mut acked = AckedTransitions::default();
        assert!(!acked.any_unacked());
        acked.set(TransitionClass::ToFault, false);
        assert!(acked.any_unacked());
        assert_eq!(acked.to_bits(), vec![true, false, true]);
    }
}
