//! Neo Device
//!
//! Hosts BACnet Analog Output objects on the Neo service runtime.

pub mod config;
pub mod reporting;
pub mod service;

pub use config::{ConfigError, DeviceConfig};
pub use reporting::AnalogOutputService;
