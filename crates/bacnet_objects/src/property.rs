//! Property identifiers, values and request shapes
//!
//! These are the decoded forms exchanged with the Read/Write-Property codec.
//! Encoding them to and from APDUs is the codec's business.

use serde::{Deserialize, Serialize};

use crate::types::{ObjectIdentifier, TimeStamp};

/// Property identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyId {
    AckedTransitions,
    CovIncrement,
    CurrentCommandPriority,
    Deadband,
    Description,
    EventDetectionEnable,
    EventEnable,
    EventState,
    EventTimeStamps,
    HighLimit,
    LimitEnable,
    LowLimit,
    MaxPresValue,
    MinPresValue,
    NotificationClass,
    NotifyType,
    ObjectIdentifier,
    ObjectName,
    ObjectType,
    OutOfService,
    PresentValue,
    PriorityArray,
    Reliability,
    RelinquishDefault,
    StatusFlags,
    TimeDelay,
    Units,
    /// Any identifier without a named variant
    Other(u32),
}

impl PropertyId {
    pub fn code(&self) -> u32 {
        match self {
            PropertyId::AckedTransitions => 0,
            PropertyId::CovIncrement => 22,
            PropertyId::CurrentCommandPriority => 431,
            PropertyId::Deadband => 25,
            PropertyId::Description => 28,
            PropertyId::EventDetectionEnable => 353,
            PropertyId::EventEnable => 35,
            PropertyId::EventState => 36,
            PropertyId::EventTimeStamps => 130,
            PropertyId::HighLimit => 45,
            PropertyId::LimitEnable => 52,
            PropertyId::LowLimit => 59,
            PropertyId::MaxPresValue => 65,
            PropertyId::MinPresValue => 69,
            PropertyId::NotificationClass => 17,
            PropertyId::NotifyType => 72,
            PropertyId::ObjectIdentifier => 75,
            PropertyId::ObjectName => 77,
            PropertyId::ObjectType => 79,
            PropertyId::OutOfService => 81,
            PropertyId::PresentValue => 85,
            PropertyId::PriorityArray => 87,
            PropertyId::Reliability => 103,
            PropertyId::RelinquishDefault => 104,
            PropertyId::StatusFlags => 111,
            PropertyId::TimeDelay => 113,
            PropertyId::Units => 117,
            PropertyId::Other(code) => *code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0 => PropertyId::AckedTransitions,
            17 => PropertyId::NotificationClass,
            22 => PropertyId::CovIncrement,
            25 => PropertyId::Deadband,
            28 => PropertyId::Description,
            35 => PropertyId::EventEnable,
            36 => PropertyId::EventState,
            45 => PropertyId::HighLimit,
            52 => PropertyId::LimitEnable,
            59 => PropertyId::LowLimit,
            65 => PropertyId::MaxPresValue,
            69 => PropertyId::MinPresValue,
            72 => PropertyId::NotifyType,
            75 => PropertyId::ObjectIdentifier,
            77 => PropertyId::ObjectName,
            79 => PropertyId::ObjectType,
            81 => PropertyId::OutOfService,
            85 => PropertyId::PresentValue,
            87 => PropertyId::PriorityArray,
            103 => PropertyId::Reliability,
            104 => PropertyId::RelinquishDefault,
            111 => PropertyId::StatusFlags,
            113 => PropertyId::TimeDelay,
            117 => PropertyId::Units,
            130 => PropertyId::EventTimeStamps,
            353 => PropertyId::EventDetectionEnable,
            431 => PropertyId::CurrentCommandPriority,
            other => PropertyId::Other(other),
        }
    }

    /// Properties that only exist while intrinsic reporting is enabled
    pub fn is_intrinsic(&self) -> bool {
        matches!(
            self,
            PropertyId::TimeDelay
                | PropertyId::NotificationClass
                | PropertyId::HighLimit
                | PropertyId::LowLimit
                | PropertyId::Deadband
                | PropertyId::LimitEnable
                | PropertyId::EventEnable
                | PropertyId::NotifyType
                | PropertyId::AckedTransitions
                | PropertyId::EventTimeStamps
                | PropertyId::EventDetectionEnable
        )
    }
}

/// Decoded application value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Unsigned(u32),
    Real(f32),
    Enumerated(u32),
    CharacterString(String),
    BitString(Vec<bool>),
    ObjectIdentifier(ObjectIdentifier),
    /// `None` is the unspecified (all wildcard) time stamp
    TimeStamp(Option<TimeStamp>),
    Array(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn as_real(&self) -> Option<f32> {
        match self {
            PropertyValue::Real(v) => Some(*v),
            _ => None,
        }
    }
}

/// Property/value pair, as carried in COV notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValueEntry {
    pub property: PropertyId,
    pub value: PropertyValue,
}

impl PropertyValueEntry {
    pub fn new(property: PropertyId, value: PropertyValue) -> Self {
        Self { property, value }
    }
}

/// Decoded Read-Property request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadPropertyRequest {
    pub instance: u32,
    pub property: PropertyId,
    #[serde(default)]
    pub array_index: Option<u32>,
}

impl ReadPropertyRequest {
    pub fn new(instance: u32, property: PropertyId) -> Self {
        Self {
            instance,
            property,
            array_index: None,
        }
    }

    pub fn at(mut self, array_index: u32) -> Self {
        self.array_index = Some(array_index);
        self
    }
}

/// Decoded Write-Property request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritePropertyRequest {
    pub instance: u32,
    pub property: PropertyId,
    pub value: PropertyValue,
    /// Command priority; writes without one land at priority 16
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub array_index: Option<u32>,
}

impl WritePropertyRequest {
    pub fn new(instance: u32, property: PropertyId, value: PropertyValue) -> Self {
        Self {
            instance,
            property,
            value,
            priority: None,
            array_index: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn at(mut self, array_index: u32) -> Self {
        self.array_index = Some(array_index);
        self
    }
}

/// Required / optional / proprietary property lists of an object type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyLists {
    pub required: Vec<PropertyId>,
    pub optional: Vec<PropertyId>,
    pub proprietary: Vec<PropertyId>,
}

impl PropertyLists {
    pub fn contains(&self, property: PropertyId) -> bool {
        self.required.contains(&property)
            || self.optional.contains(&property)
            || self.proprietary.contains(&property)
    }
}
