//! Per-sensor sample values.

use super::SensorId;
use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric type carried on the binary data channels.
pub type Value = f32;

/// Size in bytes of a single channel value on the wire.
pub const VALUE_SIZE: usize = std::mem::size_of::<Value>();

/// Fixed-length list of channel values owned by one sensor.
///
/// The number of channels is set at construction and never changes; values can be
/// overwritten in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    id: SensorId,
    values: Vec<Value>,
}

impl Sample {
    /// Sample with `channels` zeroed values.
    pub fn zeroed(id: SensorId, channels: usize) -> Self {
        Self {
            id,
            values: vec![0.0; channels],
        }
    }

    /// Sample holding the given values.
    pub fn new(id: SensorId, values: Vec<Value>) -> Self {
        Self { id, values }
    }

    /// Decode `channels` native-endian values from `raw`.
    ///
    /// Fails with [`DaqError::Layout`] when `raw` is shorter than required.
    pub fn from_bytes(id: SensorId, channels: usize, raw: &[u8]) -> AppResult<Self> {
        let mut sample = Self::zeroed(id, channels);
        sample.load_bytes(raw)?;
        Ok(sample)
    }

    /// Overwrite every channel from native-endian bytes.
    pub fn load_bytes(&mut self, raw: &[u8]) -> AppResult<()> {
        let needed = self.values.len() * VALUE_SIZE;
        if raw.len() < needed {
            return Err(DaqError::Layout(format!(
                "sensor {} needs {} bytes, {} available",
                self.id,
                needed,
                raw.len()
            )));
        }
        for (value, chunk) in self.values.iter_mut().zip(raw.chunks_exact(VALUE_SIZE)) {
            let mut bytes = [0u8; VALUE_SIZE];
            bytes.copy_from_slice(chunk);
            *value = Value::from_ne_bytes(bytes);
        }
        Ok(())
    }

    /// Owning sensor.
    pub fn id(&self) -> SensorId {
        self.id
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the sample has no channels.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a channel.
    pub fn get(&self, channel: usize) -> AppResult<Value> {
        self.values
            .get(channel)
            .copied()
            .ok_or_else(|| self.channel_error(channel))
    }

    /// Mutable access to a channel.
    pub fn get_mut(&mut self, channel: usize) -> AppResult<&mut Value> {
        let id = self.id;
        let channels = self.values.len();
        self.values.get_mut(channel).ok_or(DaqError::Channel {
            sensor: id,
            channel,
            channels,
        })
    }

    /// The single value of a one-channel sample.
    pub fn scalar(&self) -> Option<Value> {
        match self.values.as_slice() {
            [value] => Some(*value),
            _ => None,
        }
    }

    /// Mean of all channels, or `None` on an empty sample.
    pub fn average(&self) -> Option<Value> {
        if self.values.is_empty() {
            return None;
        }
        let sum: f64 = self.values.iter().map(|v| f64::from(*v)).sum();
        Some((sum / self.values.len() as f64) as Value)
    }

    /// Set every channel to `value`.
    pub fn fill(&mut self, value: Value) {
        self.values.iter_mut().for_each(|v| *v = value);
    }

    /// Channel values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Mutable channel values (length is fixed).
    pub fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    /// Iterate over channel values.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    fn channel_error(&self, channel: usize) -> DaqError {
        DaqError::Channel {
            sensor: self.id,
            channel,
            channels: self.values.len(),
        }
    }
}

impl<'a> IntoIterator for &'a Sample {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl TryFrom<&Sample> for Value {
    type Error = DaqError;

    fn try_from(sample: &Sample) -> Result<Self, Self::Error> {
        sample.scalar().ok_or_else(|| {
            DaqError::Layout(format!(
                "sensor {} has {} channels, expected a single value",
                sample.id,
                sample.len()
            ))
        })
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for value in &self.values {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(id: u8) -> SensorId {
        SensorId::new(id).unwrap()
    }

    #[test]
    fn test_from_bytes_native_endian() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1.5f32.to_ne_bytes());
        raw.extend_from_slice(&(-2.25f32).to_ne_bytes());
        let sample = Sample::from_bytes(sensor(3), 2, &raw).unwrap();
        assert_eq!(sample.values(), &[1.5, -2.25]);
        assert_eq!(sample.id(), sensor(3));
    }

    #[test]
    fn test_from_bytes_short_buffer() {
        let raw = 1.0f32.to_ne_bytes();
        let err = Sample::from_bytes(sensor(1), 2, &raw).unwrap_err();
        assert!(matches!(err, DaqError::Layout(_)));
    }

    #[test]
    fn test_scalar_only_for_single_channel() {
        assert_eq!(Sample::new(sensor(1), vec![4.0]).scalar(), Some(4.0));
        assert_eq!(Sample::new(sensor(1), vec![4.0, 5.0]).scalar(), None);
        let single = Sample::new(sensor(1), vec![7.0]);
        assert_eq!(Value::try_from(&single).unwrap(), 7.0);
    }

    #[test]
    fn test_channel_out_of_range() {
        let mut sample = Sample::zeroed(sensor(2), 3);
        assert!(sample.get(2).is_ok());
        assert!(matches!(
            sample.get(3),
            Err(DaqError::Channel { channel: 3, channels: 3, .. })
        ));
        *sample.get_mut(1).unwrap() = 9.0;
        assert_eq!(sample.values(), &[0.0, 9.0, 0.0]);
    }

    #[test]
    fn test_average() {
        let sample = Sample::new(sensor(1), vec![1.0, 2.0, 3.0]);
        assert_eq!(sample.average(), Some(2.0));
        assert_eq!(Sample::zeroed(sensor(1), 0).average(), None);
    }
}
