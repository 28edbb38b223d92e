//! Priority Resolver
//!
//! Commandable objects carry a 16-slot priority array. The effective present
//! value is the value of the highest-precedence active slot (priority 1 is
//! slot 0), falling back to the relinquish default when every slot is
//! relinquished.

use serde::{Deserialize, Serialize};

use crate::error::{ObjectError, ObjectResult};

/// Number of command priorities
pub const BACNET_MAX_PRIORITY: u8 = 16;

/// Priority reserved for minimum on/off in the wider protocol family
pub const RESERVED_PRIORITY: u8 = 6;

/// Priority used when a write does not name one
pub const DEFAULT_WRITE_PRIORITY: u8 = BACNET_MAX_PRIORITY;

/// What to do with a written value outside the present-value bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfRangePolicy {
    /// Store the nearest bound
    #[default]
    Clamp,
    /// Fail the write with `OutOfRange`
    Reject,
}

/// Validation rules applied to commanded writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WritePolicy {
    #[serde(default)]
    pub out_of_range: OutOfRangePolicy,
    /// Refuse writes and relinquishes at priority 6
    #[serde(default)]
    pub reject_reserved_priority: bool,
}

impl WritePolicy {
    /// Validate a 1-based command priority
    pub fn check_priority(&self, priority: u8) -> ObjectResult<()> {
        if !(1..=BACNET_MAX_PRIORITY).contains(&priority) {
            return Err(ObjectError::InvalidPriority(priority));
        }
        if self.reject_reserved_priority && priority == RESERVED_PRIORITY {
            return Err(ObjectError::InvalidPriority(priority));
        }
        Ok(())
    }

    /// Apply the out-of-range policy to a written value
    pub fn bound(&self, value: f32, min: f32, max: f32) -> ObjectResult<f32> {
        if !value.is_finite() {
            return Err(ObjectError::OutOfRange { value, min, max });
        }
        if value >= min && value <= max {
            return Ok(value);
        }
        match self.out_of_range {
            OutOfRangePolicy::Clamp => Ok(value.clamp(min, max)),
            OutOfRangePolicy::Reject => Err(ObjectError::OutOfRange { value, min, max }),
        }
    }
}

/// The 16-slot command table
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriorityArray {
    slots: [Option<f32>; BACNET_MAX_PRIORITY as usize],
}

impl PriorityArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` at a 1-based priority
    pub fn command(&mut self, priority: u8, value: f32) -> ObjectResult<()> {
        let slot = Self::slot_index(priority)?;
        self.slots[slot] = Some(value);
        Ok(())
    }

    /// Clear a 1-based priority, returning what was there
    pub fn relinquish(&mut self, priority: u8) -> ObjectResult<Option<f32>> {
        let slot = Self::slot_index(priority)?;
        Ok(self.slots[slot].take())
    }

    /// Value held at a 1-based priority
    pub fn get(&self, priority: u8) -> ObjectResult<Option<f32>> {
        Ok(self.slots[Self::slot_index(priority)?])
    }

    pub fn slots(&self) -> &[Option<f32>] {
        &self.slots
    }

    /// Value of the highest-precedence active slot, or `relinquish_default`
    pub fn effective(&self, relinquish_default: f32) -> f32 {
        self.slots
            .iter()
            .find_map(|slot| *slot)
            .unwrap_or(relinquish_default)
    }

    /// 1-based priority currently in control, if any
    pub fn active_priority(&self) -> Option<u8> {
        self.slots
            .iter()
            .position(Option::is_some)
            .map(|slot| slot as u8 + 1)
    }

    pub fn is_relinquished(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    fn slot_index(priority: u8) -> ObjectResult<usize> {
        if (1..=BACNET_MAX_PRIORITY).contains(&priority) {
            Ok(priority as usize - 1)
        } else {
            Err(ObjectError::InvalidPriority(priority))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
