//! Sensor identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one of the sensor slots of a base station (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SensorId(u8);

impl SensorId {
    /// Number of sensor slots on a base station.
    pub const COUNT: usize = 16;

    /// Lowest valid identifier.
    pub const FIRST: SensorId = SensorId(1);

    /// Highest valid identifier.
    pub const LAST: SensorId = SensorId(Self::COUNT as u8);

    /// Create an identifier, returning `None` outside `1..=16`.
    pub fn new(id: u8) -> Option<Self> {
        (1..=Self::COUNT as u8).contains(&id).then_some(Self(id))
    }

    /// Identifier for a zero-based slot index.
    pub fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index + 1).ok().and_then(Self::new)
    }

    /// 1-based identifier value.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based slot index.
    pub fn index(self) -> usize {
        usize::from(self.0) - 1
    }

    /// All sensor identifiers in slot order.
    pub fn all() -> impl Iterator<Item = SensorId> + Clone {
        (1..=Self::COUNT as u8).map(SensorId)
    }

    /// All sensor identifiers collected into a list.
    pub fn all_list() -> Vec<SensorId> {
        Self::all().collect()
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for SensorId {
    type Error = crate::error::DaqError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            crate::error::DaqError::Configuration(format!("Invalid sensor id {}", value))
        })
    }
}
