//! BACnet Objects - Analog Output object model
//!
//! Priority-array command resolution, change-of-value detection and the
//! intrinsic alarm/event state machine, behind a thread-safe object table
//! and a Read/Write-Property facade. Nothing here touches the wire: the
//! protocol codec hands in decoded requests and collects staged
//! notifications.

pub mod analog_output;
pub mod cov;
pub mod error;
pub mod intrinsic;
pub mod priority;
pub mod property;
pub mod store;
pub mod types;

pub use analog_output::{
    AnalogOutput, AnalogOutputOptions, AnalogOutputSettings, AnalogOutputs, TickReport,
};
pub use cov::CovNotification;
pub use error::{AckError, ErrorClass, ErrorCode, ObjectError, ObjectResult, PropertyError};
pub use intrinsic::{EventNotification, EventSummary, NotificationKind, ReportingSettings};
pub use priority::{OutOfRangePolicy, WritePolicy};
pub use property::{PropertyId, PropertyValue, ReadPropertyRequest, WritePropertyRequest};
pub use types::*;
