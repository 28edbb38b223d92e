//! Error types
//!
//! `ObjectError` is what the object operations return. `PropertyError` is the
//! (class, code) pair the Read/Write-Property codec puts on the wire.

use serde::{Deserialize, Serialize};

/// Result type for object operations
pub type ObjectResult<T> = Result<T, ObjectError>;

/// Errors raised by the object operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObjectError {
    #[error("Unknown object instance: {0}")]
    InvalidInstance(u32),

    #[error("Invalid priority: {0}")]
    InvalidPriority(u8),

    #[error("Value {value} outside [{min}, {max}]")]
    OutOfRange { value: f32, min: f32, max: f32 },

    #[error("Text of {len} characters exceeds the {max} character limit")]
    TextTooLong { len: usize, max: usize },

    #[error("Object store is full ({0} instances)")]
    CapacityExceeded(usize),

    #[error("Object instance already exists: {0}")]
    DuplicateInstance(u32),

    #[error("Alarm acknowledgment failed: {0}")]
    Ack(#[from] AckError),
}

/// Errors raised by alarm acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AckError {
    #[error("No event matches the acknowledged time stamp")]
    NoMatchingEvent,

    #[error("Transition already acknowledged")]
    AlreadyAcked,

    #[error("Unrecognized transition class")]
    InvalidTransition,
}

// ─────────────────────────────────────────────────────────────────────────────
// Codec Error Vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// Error class reported to the protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    Object,
    Property,
    Resources,
    Services,
}

/// Error code reported to the protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    UnknownObject,
    UnknownProperty,
    WriteAccessDenied,
    InvalidDataType,
    ValueOutOfRange,
    InvalidArrayIndex,
    PropertyIsNotAnArray,
    NoSpaceToAddObject,
    ObjectIdentifierAlreadyExists,
    InvalidTimeStamp,
    InvalidEventState,
}

/// Error returned by the property access entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{class:?}: {code:?}")]
pub struct PropertyError {
    pub class: ErrorClass,
    pub code: ErrorCode,
}

impl PropertyError {
    pub fn new(class: ErrorClass, code: ErrorCode) -> Self {
        Self { class, code }
    }

    pub fn unknown_object() -> Self {
        Self::new(ErrorClass::Object, ErrorCode::UnknownObject)
    }

    pub fn unknown_property() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::UnknownProperty)
    }

    pub fn write_access_denied() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::WriteAccessDenied)
    }

    pub fn invalid_data_type() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::InvalidDataType)
    }

    pub fn value_out_of_range() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::ValueOutOfRange)
    }

    pub fn invalid_array_index() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::InvalidArrayIndex)
    }

    pub fn not_an_array() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::PropertyIsNotAnArray)
    }
}

impl From<ObjectError> for PropertyError {
    fn from(err: ObjectError) -> Self {
        match err {
            ObjectError::InvalidInstance(_) => PropertyError::unknown_object(),
            // Priority 6 is reserved rather than out of range
            ObjectError::InvalidPriority(6) => PropertyError::write_access_denied(),
            ObjectError::InvalidPriority(_) => PropertyError::value_out_of_range(),
            ObjectError::OutOfRange { .. } => PropertyError::value_out_of_range(),
            ObjectError::TextTooLong { .. } => PropertyError::value_out_of_range(),
            ObjectError::CapacityExceeded(_) => {
                PropertyError::new(ErrorClass::Resources, ErrorCode::NoSpaceToAddObject)
            }
            ObjectError::DuplicateInstance(_) => {
                PropertyError::new(ErrorClass::Object, ErrorCode::ObjectIdentifierAlreadyExists)
            }
            ObjectError::Ack(AckError::NoMatchingEvent) => {
                PropertyError::new(ErrorClass::Services, ErrorCode::InvalidTimeStamp)
            }
            ObjectError::Ack(AckError::AlreadyAcked | AckError::InvalidTransition) => {
                PropertyError::new(ErrorClass::Services, ErrorCode::InvalidEventState)
            }
        }
    }
}
