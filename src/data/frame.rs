//! Cross-sensor frames and timestamped values.

use super::{Sample, SensorId, Value};
use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};

/// Default label assigned to a sensor that was not given one.
pub fn default_label(id: SensorId) -> String {
    format!("sensor{}", id)
}

/// A sample paired with its stable label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Labeled {
    /// Label of the sensor, stable across frames of a session.
    pub label: String,
    /// Channel values.
    pub sample: Sample,
}

/// One synchronized cross-sensor sample at a single instant.
///
/// Entries keep insertion order. Lookups are linear since a frame holds at most
/// [`SensorId::COUNT`] samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    entries: Vec<Labeled>,
}

impl Frame {
    /// Empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Full-width frame with one zeroed sample per sensor slot.
    pub fn full(channels: usize) -> Self {
        Self::with_sensors(&SensorId::all_list(), channels)
    }

    /// Frame narrowed to a subset of sensors, each with `channels` zeroed values.
    pub fn with_sensors(sensors: &[SensorId], channels: usize) -> Self {
        let entries = sensors
            .iter()
            .map(|&id| Labeled {
                label: default_label(id),
                sample: Sample::zeroed(id, channels),
            })
            .collect();
        Self { entries }
    }

    /// Append a sample under `label`.
    pub fn push(&mut self, label: impl Into<String>, sample: Sample) {
        self.entries.push(Labeled {
            label: label.into(),
            sample,
        });
    }

    /// Position of the sample belonging to `id`.
    pub fn find(&self, id: SensorId) -> Option<usize> {
        self.entries.iter().position(|e| e.sample.id() == id)
    }

    /// Position of the sample carrying `label`.
    pub fn find_label(&self, label: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.label == label)
    }

    /// Sample of sensor `id`.
    pub fn get(&self, id: SensorId) -> Option<&Sample> {
        self.find(id).map(|i| &self.entries[i].sample)
    }

    /// Mutable sample of sensor `id`.
    pub fn get_mut(&mut self, id: SensorId) -> Option<&mut Sample> {
        self.find(id).map(move |i| &mut self.entries[i].sample)
    }

    /// Sample carrying `label`.
    pub fn get_by_label(&self, label: &str) -> Option<&Sample> {
        self.find_label(label).map(|i| &self.entries[i].sample)
    }

    /// Value of one channel of one sensor.
    pub fn value(&self, id: SensorId, channel: usize) -> Option<Value> {
        self.get(id).and_then(|s| s.get(channel).ok())
    }

    /// Sensors in insertion order.
    pub fn sensors(&self) -> Vec<SensorId> {
        self.entries.iter().map(|e| e.sample.id()).collect()
    }

    /// Labels in insertion order.
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    /// Whether the two frames carry the same sensors in the same order.
    pub fn same_sensors(&self, other: &Frame) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(a, b)| a.sample.id() == b.sample.id())
    }

    /// Copy of this frame restricted to `sensors`, in the order they are given.
    ///
    /// Sensors not present in the frame are skipped.
    pub fn subset(&self, sensors: &[SensorId]) -> Frame {
        let entries = sensors
            .iter()
            .filter_map(|&id| self.find(id).map(|i| self.entries[i].clone()))
            .collect();
        Frame { entries }
    }

    /// Copy of this frame restricted to the given labels.
    pub fn subset_by_labels<S: AsRef<str>>(&self, labels: &[S]) -> Frame {
        let entries = labels
            .iter()
            .filter_map(|l| self.find_label(l.as_ref()).map(|i| self.entries[i].clone()))
            .collect();
        Frame { entries }
    }

    /// Total number of channel values across all sensors.
    pub fn dim(&self) -> usize {
        self.entries.iter().map(|e| e.sample.len()).sum()
    }

    /// Number of sensors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the frame has no samples.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Set every channel of every sample to `value`.
    pub fn fill(&mut self, value: Value) {
        for entry in &mut self.entries {
            entry.sample.fill(value);
        }
    }

    /// Overwrite all channel values from a flat list of length [`Frame::dim`].
    pub fn reset(&mut self, values: &[Value]) -> AppResult<()> {
        if values.len() != self.dim() {
            return Err(DaqError::Layout(format!(
                "frame holds {} values, {} given",
                self.dim(),
                values.len()
            )));
        }
        let mut offset = 0;
        for entry in &mut self.entries {
            let n = entry.sample.len();
            entry
                .sample
                .values_mut()
                .copy_from_slice(&values[offset..offset + n]);
            offset += n;
        }
        Ok(())
    }

    /// Rename the sample of sensor `id`.
    pub fn set_label(&mut self, id: SensorId, label: impl Into<String>) -> bool {
        match self.find(id) {
            Some(i) => {
                self.entries[i].label = label.into();
                true
            }
            None => false,
        }
    }

    /// Labeled samples in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Labeled> {
        self.entries.iter()
    }

    /// Mutable labeled samples in insertion order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Labeled> {
        self.entries.iter_mut()
    }

    /// Remove every sample.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a> IntoIterator for &'a Frame {
    type Item = &'a Labeled;
    type IntoIter = std::slice::Iter<'a, Labeled>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<Sample> for Frame {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|sample| Labeled {
                label: default_label(sample.id()),
                sample,
            })
            .collect();
        Self { entries }
    }
}

/// A value paired with a timestamp key in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamped<T> {
    /// Sort key.
    pub timestamp: f64,
    /// Payload.
    pub value: T,
}

impl<T> Stamped<T> {
    /// Pair `value` with `timestamp`.
    pub fn new(timestamp: f64, value: T) -> Self {
        Self { timestamp, value }
    }

    /// Split into timestamp and payload.
    pub fn into_parts(self) -> (f64, T) {
        (self.timestamp, self.value)
    }
}

/// A frame paired with its timestamp.
pub type StampedFrame = Stamped<Frame>;
