//! Read-Property / Write-Property routing for Analog Output

use tracing::debug;

use super::{AnalogOutput, AnalogOutputs};
use crate::error::PropertyError;
use crate::priority::DEFAULT_WRITE_PRIORITY;
use crate::property::{
    PropertyId, PropertyLists, PropertyValue, ReadPropertyRequest, WritePropertyRequest,
};
use crate::types::{
    EngineeringUnits, EventEnable, EventState, LimitEnable, NotifyType, Reliability,
};

const REQUIRED: &[PropertyId] = &[
    PropertyId::ObjectIdentifier,
    PropertyId::ObjectName,
    PropertyId::ObjectType,
    PropertyId::PresentValue,
    PropertyId::StatusFlags,
    PropertyId::EventState,
    PropertyId::OutOfService,
    PropertyId::Units,
    PropertyId::PriorityArray,
    PropertyId::RelinquishDefault,
    PropertyId::CurrentCommandPriority,
];

const OPTIONAL: &[PropertyId] = &[
    PropertyId::Description,
    PropertyId::Reliability,
    PropertyId::MinPresValue,
    PropertyId::MaxPresValue,
    PropertyId::CovIncrement,
];

const OPTIONAL_INTRINSIC: &[PropertyId] = &[
    PropertyId::TimeDelay,
    PropertyId::NotificationClass,
    PropertyId::HighLimit,
    PropertyId::LowLimit,
    PropertyId::Deadband,
    PropertyId::LimitEnable,
    PropertyId::EventEnable,
    PropertyId::AckedTransitions,
    PropertyId::NotifyType,
    PropertyId::EventTimeStamps,
    PropertyId::EventDetectionEnable,
];

impl AnalogOutputs {
    /// Property lists of the object type under the current options
    pub fn property_lists(&self) -> PropertyLists {
        let mut optional = OPTIONAL.to_vec();
        if self.reporting() {
            optional.extend_from_slice(OPTIONAL_INTRINSIC);
        }
        PropertyLists {
            required: REQUIRED.to_vec(),
            optional,
            proprietary: Vec::new(),
        }
    }

    pub fn read_property(
        &self,
        request: &ReadPropertyRequest,
    ) -> Result<PropertyValue, PropertyError> {
        let property = request.property;
        let store = self.store.lock();
        let object = store.get(request.instance)?;
        if property.is_intrinsic() && !self.reporting() {
            return Err(PropertyError::unknown_property());
        }

        match property {
            PropertyId::PriorityArray => {
                let slots = object
                    .priority_array
                    .slots()
                    .iter()
                    .map(|slot| slot.map_or(PropertyValue::Null, PropertyValue::Real))
                    .collect();
                return read_array(slots, request.array_index);
            }
            PropertyId::EventTimeStamps => {
                let stamps = object
                    .intrinsic
                    .event_time_stamps()
                    .into_iter()
                    .map(PropertyValue::TimeStamp)
                    .collect();
                return read_array(stamps, request.array_index);
            }
            _ if request.array_index.is_some() => return Err(PropertyError::not_an_array()),
            _ => {}
        }

        read_scalar(object, property, self.reporting())
    }

    pub fn write_property(&self, request: &WritePropertyRequest) -> Result<(), PropertyError> {
        let property = request.property;
        let policy = self.options.write_policy;
        let reporting = self.reporting();
        let mut store = self.store.lock();
        let object = store.get_mut(request.instance)?;
        if property.is_intrinsic() && !reporting {
            return Err(PropertyError::unknown_property());
        }

        let is_array = matches!(
            property,
            PropertyId::PriorityArray | PropertyId::EventTimeStamps
        );
        if request.array_index.is_some() && !is_array {
            return Err(PropertyError::not_an_array());
        }

        let value = &request.value;
        match property {
            PropertyId::PresentValue => {
                let priority = request.priority.unwrap_or(DEFAULT_WRITE_PRIORITY);
                let commanded = match value {
                    PropertyValue::Null => None,
                    PropertyValue::Real(v) => Some(*v),
                    _ => return Err(PropertyError::invalid_data_type()),
                };
                object.write_present_value(priority, commanded, &policy)?;
                object.evaluate_cov(reporting);
            }
            PropertyId::ObjectName => object.set_name(expect_string(value)?)?,
            PropertyId::Description => object.set_description(expect_string(value)?)?,
            PropertyId::OutOfService => {
                object.out_of_service = expect_bool(value)?;
                object.evaluate_cov(reporting);
            }
            PropertyId::Reliability => {
                if !object.out_of_service {
                    return Err(PropertyError::write_access_denied());
                }
                object.reliability = Reliability::from_code(expect_enumerated(value)?)
                    .ok_or_else(PropertyError::value_out_of_range)?;
                object.evaluate_cov(reporting);
            }
            PropertyId::Units => {
                object.units = EngineeringUnits::from_code(expect_enumerated(value)?);
            }
            PropertyId::RelinquishDefault => {
                object.set_relinquish_default(expect_real(value)?)?;
                object.evaluate_cov(reporting);
            }
            PropertyId::MinPresValue => {
                let max = object.max_pres_value;
                object.set_pres_value_limits(expect_real(value)?, max)?;
            }
            PropertyId::MaxPresValue => {
                let min = object.min_pres_value;
                object.set_pres_value_limits(min, expect_real(value)?)?;
            }
            PropertyId::CovIncrement => {
                object.set_cov_increment(expect_non_negative(value)?)?;
            }
            PropertyId::TimeDelay => {
                let delay = expect_unsigned(value)?;
                object.update_reporting(|s| s.time_delay = delay);
            }
            PropertyId::NotificationClass => {
                let class = expect_unsigned(value)?;
                object.update_reporting(|s| s.notification_class = class);
            }
            PropertyId::HighLimit => {
                let limit = expect_finite(value)?;
                object.update_reporting(|s| s.high_limit = limit);
            }
            PropertyId::LowLimit => {
                let limit = expect_finite(value)?;
                object.update_reporting(|s| s.low_limit = limit);
            }
            PropertyId::Deadband => {
                let deadband = expect_non_negative(value)?;
                object.update_reporting(|s| s.deadband = deadband);
            }
            PropertyId::LimitEnable => {
                let enable = LimitEnable::from_bits(expect_bits(value)?);
                object.update_reporting(|s| s.limit_enable = enable);
            }
            PropertyId::EventEnable => {
                let enable = EventEnable::from_bits(expect_bits(value)?);
                object.update_reporting(|s| s.event_enable = enable);
            }
            PropertyId::NotifyType => {
                let notify_type = NotifyType::from_code(expect_enumerated(value)?)
                    .ok_or_else(PropertyError::value_out_of_range)?;
                object.update_reporting(|s| s.notify_type = notify_type);
            }
            PropertyId::EventDetectionEnable => {
                object.disable = !expect_bool(value)?;
            }
            PropertyId::ObjectIdentifier
            | PropertyId::ObjectType
            | PropertyId::StatusFlags
            | PropertyId::EventState
            | PropertyId::CurrentCommandPriority
            | PropertyId::AckedTransitions
            | PropertyId::PriorityArray
            | PropertyId::EventTimeStamps => {
                return Err(PropertyError::write_access_denied());
            }
            PropertyId::Other(_) => return Err(PropertyError::unknown_property()),
        }

        debug!(instance = request.instance, ?property, "Property written");
        Ok(())
    }
}

fn read_scalar(
    object: &AnalogOutput,
    property: PropertyId,
    reporting: bool,
) -> Result<PropertyValue, PropertyError> {
    let settings = &object.intrinsic.settings;
    let value = match property {
        PropertyId::ObjectIdentifier => PropertyValue::ObjectIdentifier(object.object_identifier()),
        PropertyId::ObjectName => PropertyValue::CharacterString(object.name.clone()),
        PropertyId::ObjectType => {
            PropertyValue::Enumerated(object.object_identifier().object_type.code())
        }
        PropertyId::Description => PropertyValue::CharacterString(object.description.clone()),
        PropertyId::PresentValue => PropertyValue::Real(object.present_value()),
        PropertyId::StatusFlags => PropertyValue::BitString(object.status_flags().to_bits()),
        PropertyId::EventState => {
            let state = if reporting {
                object.intrinsic.event_state()
            } else {
                EventState::Normal
            };
            PropertyValue::Enumerated(state.code())
        }
        PropertyId::OutOfService => PropertyValue::Boolean(object.out_of_service),
        PropertyId::Reliability => PropertyValue::Enumerated(object.reliability.code()),
        PropertyId::Units => PropertyValue::Enumerated(object.units.code()),
        PropertyId::RelinquishDefault => PropertyValue::Real(object.relinquish_default),
        PropertyId::CurrentCommandPriority => object
            .active_priority()
            .map_or(PropertyValue::Null, |p| PropertyValue::Unsigned(u32::from(p))),
        PropertyId::MinPresValue => PropertyValue::Real(object.min_pres_value),
        PropertyId::MaxPresValue => PropertyValue::Real(object.max_pres_value),
        PropertyId::CovIncrement => PropertyValue::Real(object.cov.increment()),
        PropertyId::TimeDelay => PropertyValue::Unsigned(settings.time_delay),
        PropertyId::NotificationClass => PropertyValue::Unsigned(settings.notification_class),
        PropertyId::HighLimit => PropertyValue::Real(settings.high_limit),
        PropertyId::LowLimit => PropertyValue::Real(settings.low_limit),
        PropertyId::Deadband => PropertyValue::Real(settings.deadband),
        PropertyId::LimitEnable => PropertyValue::BitString(settings.limit_enable.to_bits()),
        PropertyId::EventEnable => PropertyValue::BitString(settings.event_enable.to_bits()),
        PropertyId::NotifyType => PropertyValue::Enumerated(settings.notify_type.code()),
        PropertyId::AckedTransitions => {
            PropertyValue::BitString(object.intrinsic.acked_transitions().to_bits())
        }
        PropertyId::EventDetectionEnable => PropertyValue::Boolean(!object.disable),
        PropertyId::PriorityArray | PropertyId::EventTimeStamps | PropertyId::Other(_) => {
            return Err(PropertyError::unknown_property());
        }
    };
    Ok(value)
}

/// Whole array, its size (index 0) or one 1-based element
fn read_array(
    elements: Vec<PropertyValue>,
    array_index: Option<u32>,
) -> Result<PropertyValue, PropertyError> {
    match array_index {
        None => Ok(PropertyValue::Array(elements)),
        Some(0) => Ok(PropertyValue::Unsigned(elements.len() as u32)),
        Some(index) => elements
            .into_iter()
            .nth(index as usize - 1)
            .ok_or_else(PropertyError::invalid_array_index),
    }
}

fn expect_real(value: &PropertyValue) -> Result<f32, PropertyError> {
    value.as_real().ok_or_else(PropertyError::invalid_data_type)
}

fn expect_finite(value: &PropertyValue) -> Result<f32, PropertyError> {
    let v = expect_real(value)?;
    if !v.is_finite() {
        return Err(PropertyError::value_out_of_range());
    }
    Ok(v)
}

fn expect_non_negative(value: &PropertyValue) -> Result<f32, PropertyError> {
    let v = expect_finite(value)?;
    if v < 0.0 {
        return Err(PropertyError::value_out_of_range());
    }
    Ok(v)
}

fn expect_bool(value: &PropertyValue) -> Result<bool, PropertyError> {
    match value {
        PropertyValue::Boolean(b) => Ok(*b),
        _ => Err(PropertyError::invalid_data_type()),
    }
}

fn expect_unsigned(value: &PropertyValue) -> Result<u32, PropertyError> {
    match value {
        PropertyValue::Unsigned(v) => Ok(*v),
        _ => Err(PropertyError::invalid_data_type()),
    }
}

fn expect_enumerated(value: &PropertyValue) -> Result<u32, PropertyError> {
    match value {
        PropertyValue::Enumerated(v) => Ok(*v),
        _ => Err(PropertyError::invalid_data_type()),
    }
}

fn expect_string(value: &PropertyValue) -> Result<&str, PropertyError> {
    match value {
        PropertyValue::CharacterString(s) => Ok(s),
        _ => Err(PropertyError::invalid_data_type()),
    }
}

fn expect_bits(value: &PropertyValue) -> Result<&[bool], PropertyError> {
    match value {
        PropertyValue::BitString(bits) => Ok(bits),
        _ => Err(PropertyError::invalid_data_type()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::analog_output::{AnalogOutputOptions, AnalogOutputs};
    use crate::error::{ErrorClass, ErrorCode};
    use crate::intrinsic::ReportingSettings;
    use crate::types::TransitionClass;

    fn table() -> AnalogOutputs {
        let table = AnalogOutputs::new(AnalogOutputOptions {
            intrinsic_reporting: true,
            ..AnalogOutputOptions::default()
        });
        table.create(7).unwrap();
        table
    }

    fn read(table: &AnalogOutputs, property: PropertyId) -> Result<PropertyValue, PropertyError> {
        table.read_property(&ReadPropertyRequest::new(7, property))
    }

    fn write(
        table: &AnalogOutputs,
        property: PropertyId,
        value: PropertyValue,
    ) -> Result<(), PropertyError> {
        table.write_property(&WritePropertyRequest::new(7, property, value))
    }

    #[test]
    fn test_read_defaults() {
        let table = table();
        assert_eq!(
            read(&table, PropertyId::ObjectName).unwrap(),
            PropertyValue::CharacterString("ANALOG OUTPUT 7".into())
        );
        assert_eq!(read(&table, PropertyId::ObjectType).unwrap(), PropertyValue::Enumerated(1));
        assert_eq!(read(&table, PropertyId::PresentValue).unwrap(), PropertyValue::Real(0.0));
        assert_eq!(read(&table, PropertyId::Units).unwrap(), PropertyValue::Enumerated(95));
        assert_eq!(
            read(&table, PropertyId::CurrentCommandPriority).unwrap(),
            PropertyValue::Null
        );
        assert_eq!(
            read(&table, PropertyId::AckedTransitions).unwrap(),
            PropertyValue::BitString(vec![true, true, true])
        );
        assert_eq!(
            read(&table, PropertyId::EventDetectionEnable).unwrap(),
            PropertyValue::Boolean(true)
        );
    }

    #[test]
    fn test_present_value_write_and_null_relinquish() {
        let table = table();
        table
            .write_property(
                &WritePropertyRequest::new(7, PropertyId::PresentValue, PropertyValue::Real(42.0))
                    .with_priority(8),
            )
            .unwrap();
        assert_eq!(read(&table, PropertyId::PresentValue).unwrap(), PropertyValue::Real(42.0));
        assert_eq!(
            read(&table, PropertyId::CurrentCommandPriority).unwrap(),
            PropertyValue::Unsigned(8)
        );

        // Without a priority the write lands at 16
        write(&table, PropertyId::PresentValue, PropertyValue::Real(3.0)).unwrap();
        let slot = ReadPropertyRequest::new(7, PropertyId::PriorityArray).at(16);
        assert_eq!(table.read_property(&slot).unwrap(), PropertyValue::Real(3.0));

        table
            .write_property(
                &WritePropertyRequest::new(7, PropertyId::PresentValue, PropertyValue::Null)
                    .with_priority(8),
            )
            .unwrap();
        assert_eq!(read(&table, PropertyId::PresentValue).unwrap(), PropertyValue::Real(3.0));

        let err =
            write(&table, PropertyId::PresentValue, PropertyValue::Boolean(true)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDataType);
    }

    #[test]
    fn test_priority_array_indexing() {
        let table = table();
        table.present_value_set(7, 12.5, 4).unwrap();
        let at = |index| {
            table.read_property(&ReadPropertyRequest::new(7, PropertyId::PriorityArray).at(index))
        };

        assert_eq!(at(0).unwrap(), PropertyValue::Unsigned(16));
        assert_eq!(at(4).unwrap(), PropertyValue::Real(12.5));
        assert_eq!(at(5).unwrap(), PropertyValue::Null);
        assert_eq!(at(17).unwrap_err().code, ErrorCode::InvalidArrayIndex);

        match read(&table, PropertyId::PriorityArray).unwrap() {
            PropertyValue::Array(slots) => assert_eq!(slots.len(), 16),
            other => panic!("expected array, got {other:?}"),
        }

        let err = table
            .read_property(&ReadPropertyRequest::new(7, PropertyId::PresentValue).at(1))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PropertyIsNotAnArray);
    }

    #[test]
    fn test_event_time_stamps_array() {
        let table = table();
        let at = |index| {
            table.read_property(&ReadPropertyRequest::new(7, PropertyId::EventTimeStamps).at(index))
        };
        assert_eq!(at(0).unwrap(), PropertyValue::Unsigned(3));
        assert_eq!(at(1).unwrap(), PropertyValue::TimeStamp(None));
        assert_eq!(at(4).unwrap_err().code, ErrorCode::InvalidArrayIndex);

        table
            .reporting_set(
                7,
                ReportingSettings {
                    event_enable: EventEnable::ALL,
                    ..ReportingSettings::default()
                },
            )
            .unwrap();
        table.reliability_set(7, Reliability::OpenLoop).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        table.intrinsic_reporting(7, now).unwrap();
        assert_eq!(
            at(TransitionClass::ToFault.index() as u32 + 1).unwrap(),
            PropertyValue::TimeStamp(Some(now))
        );
    }

    #[test]
    fn test_reliability_requires_out_of_service() {
        let table = table();
        let value = PropertyValue::Enumerated(Reliability::OverRange.code());
        let err = write(&table, PropertyId::Reliability, value.clone()).unwrap_err();
        assert_eq!(err.class, ErrorClass::Property);
        assert_eq!(err.code, ErrorCode::WriteAccessDenied);

        write(&table, PropertyId::OutOfService, PropertyValue::Boolean(true)).unwrap();
        write(&table, PropertyId::Reliability, value.clone()).unwrap();
        assert_eq!(read(&table, PropertyId::Reliability).unwrap(), value);
        assert_eq!(
            read(&table, PropertyId::StatusFlags).unwrap(),
            PropertyValue::BitString(vec![false, true, false, true])
        );
    }

    #[test]
    fn test_read_only_and_unknown_properties() {
        let table = table();
        for property in [
            PropertyId::ObjectIdentifier,
            PropertyId::StatusFlags,
            PropertyId::EventState,
            PropertyId::PriorityArray,
            PropertyId::CurrentCommandPriority,
        ] {
            let err = write(&table, property, PropertyValue::Null).unwrap_err();
            assert_eq!(err.code, ErrorCode::WriteAccessDenied, "{property:?}");
        }

        // Arrays stay read-only, whole or by element
        let stamps = WritePropertyRequest::new(7, PropertyId::EventTimeStamps, PropertyValue::Null);
        let err = table.write_property(&stamps).unwrap_err();
        assert_eq!(err.code, ErrorCode::WriteAccessDenied);
        let slot = WritePropertyRequest::new(7, PropertyId::PriorityArray, PropertyValue::Real(1.0))
            .at(8);
        let err = table.write_property(&slot).unwrap_err();
        assert_eq!(err.code, ErrorCode::WriteAccessDenied);
        let indexed = WritePropertyRequest::new(7, PropertyId::Units, PropertyValue::Enumerated(98))
            .at(1);
        let err = table.write_property(&indexed).unwrap_err();
        assert_eq!(err.code, ErrorCode::PropertyIsNotAnArray);

        let err = read(&table, PropertyId::Other(9999)).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownProperty);

        let err = table
            .read_property(&ReadPropertyRequest::new(8, PropertyId::PresentValue))
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Object);
        assert_eq!(err.code, ErrorCode::UnknownObject);
    }

    #[test]
    fn test_limit_writes_validate_order() {
        let table = table();
        write(&table, PropertyId::MaxPresValue, PropertyValue::Real(100.0)).unwrap();
        write(&table, PropertyId::MinPresValue, PropertyValue::Real(0.0)).unwrap();
        let err = write(&table, PropertyId::MinPresValue, PropertyValue::Real(150.0)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValueOutOfRange);

        let err = write(&table, PropertyId::CovIncrement, PropertyValue::Real(-1.0)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValueOutOfRange);
    }

    #[test]
    fn test_alarm_settings_round_trip_through_properties() {
        let table = table();
        write(&table, PropertyId::HighLimit, PropertyValue::Real(80.0)).unwrap();
        write(&table, PropertyId::LowLimit, PropertyValue::Real(20.0)).unwrap();
        write(&table, PropertyId::Deadband, PropertyValue::Real(1.5)).unwrap();
        write(&table, PropertyId::TimeDelay, PropertyValue::Unsigned(5)).unwrap();
        write(&table, PropertyId::LimitEnable, PropertyValue::BitString(vec![true, true])).unwrap();
        write(
            &table,
            PropertyId::NotifyType,
            PropertyValue::Enumerated(NotifyType::Event.code()),
        )
        .unwrap();

        let settings = table.snapshot(7).unwrap().intrinsic().settings;
        assert_eq!(
            settings,
            ReportingSettings {
                time_delay: 5,
                high_limit: 80.0,
                low_limit: 20.0,
                deadband: 1.5,
                limit_enable: LimitEnable::BOTH,
                notify_type: NotifyType::Event,
                ..ReportingSettings::default()
            }
        );

        let err = write(&table, PropertyId::NotifyType, PropertyValue::Enumerated(9)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValueOutOfRange);

        write(&table, PropertyId::EventDetectionEnable, PropertyValue::Boolean(false)).unwrap();
        assert!(table.snapshot(7).unwrap().is_reporting_disabled());
    }

    #[test]
    fn test_intrinsic_properties_hidden_when_reporting_off() {
        let table = AnalogOutputs::new(AnalogOutputOptions {
            intrinsic_reporting: false,
            ..AnalogOutputOptions::default()
        });
        table.create(1).unwrap();

        let err = table
            .read_property(&ReadPropertyRequest::new(1, PropertyId::HighLimit))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownProperty);
        let err = table
            .write_property(&WritePropertyRequest::new(
                1,
                PropertyId::TimeDelay,
                PropertyValue::Unsigned(1),
            ))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownProperty);

        // The object lookup comes first
        let err = table
            .read_property(&ReadPropertyRequest::new(2, PropertyId::HighLimit))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownObject);
        let err = table
            .write_property(&WritePropertyRequest::new(
                2,
                PropertyId::TimeDelay,
                PropertyValue::Unsigned(1),
            ))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownObject);

        let lists = table.property_lists();
        assert!(lists.contains(PropertyId::PresentValue));
        assert!(!lists.contains(PropertyId::HighLimit));
    }

    #[test]
    fn test_name_length_limit() {
        let table = table();
        let long = "x".repeat(64);
        let err = write(&table, PropertyId::ObjectName, PropertyValue::CharacterString(long))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValueOutOfRange);
        write(&table, PropertyId::Description, PropertyValue::CharacterString("AHU-1 valve".into()))
            .unwrap();
        assert_eq!(table.description(7).unwrap(), "AHU-1 valve");
    }
}
