//! Time-sorted container of stamped frames.
//!
//! [`Sequence`] is backed by a [`VecDeque`], giving amortized O(1) insertion at both
//! ends without moving existing elements on growth, which matters for unbounded
//! high-frequency capture. Elements are kept non-decreasing by timestamp when appends
//! are checked; unchecked appends are allowed for throughput, after which
//! [`Sequence::sort`] restores the order.
//!
//! # Sharing
//!
//! A live acquisition shares its sequence between one writer (the recorder) and any
//! number of readers through [`SharedSequence`]. Writers take the write lock only
//! around the mutation itself.

use super::range::{ConstRange, Window};
use super::{Frame, SensorId, Stamped, StampedFrame, Value};
use crate::error::{AppResult, DaqError};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// Sequence shared between a producer and its consumers.
pub type SharedSequence = Arc<RwLock<Sequence>>;

/// Convert a physical duration to an element count: `round(|duration * rate|)`.
pub fn samples(duration: f64, sample_rate: f64) -> usize {
    let count = (duration * sample_rate).abs().round();
    if count.is_finite() {
        count as usize
    } else {
        0
    }
}

/// Time-sorted collection of stamped frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence {
    frames: VecDeque<StampedFrame>,
}

impl Sequence {
    /// Empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty sequence with room for `capacity` frames.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
        }
    }

    /// Wrap into a shared handle.
    pub fn into_shared(self) -> SharedSequence {
        Arc::new(RwLock::new(self))
    }

    /// Append `frame` at the back.
    ///
    /// With `enforce_monotonic` the timestamp must be strictly greater than the last
    /// one; with `enforce_same_sensors` the frame must carry the same sensors as the
    /// last element. Checks run before any mutation.
    pub fn append(
        &mut self,
        frame: StampedFrame,
        enforce_monotonic: bool,
        enforce_same_sensors: bool,
    ) -> AppResult<()> {
        if let Some(last) = self.frames.back() {
            if enforce_monotonic && frame.timestamp <= last.timestamp {
                return Err(DaqError::Ordering {
                    timestamp: frame.timestamp,
                    last: last.timestamp,
                });
            }
            if enforce_same_sensors && !frame.value.same_sensors(&last.value) {
                return Err(DaqError::SensorMismatch {
                    expected: last.value.sensors(),
                    found: frame.value.sensors(),
                });
            }
        }
        self.frames.push_back(frame);
        Ok(())
    }

    /// Append a copy of `frame`.
    pub fn append_ref(
        &mut self,
        frame: &StampedFrame,
        enforce_monotonic: bool,
        enforce_same_sensors: bool,
    ) -> AppResult<()> {
        self.append(frame.clone(), enforce_monotonic, enforce_same_sensors)
    }

    /// Pair `frame` with `timestamp` and append it with the given checks.
    pub fn append_frame(
        &mut self,
        timestamp: f64,
        frame: Frame,
        enforce_monotonic: bool,
        enforce_same_sensors: bool,
    ) -> AppResult<()> {
        self.append(
            Stamped::new(timestamp, frame),
            enforce_monotonic,
            enforce_same_sensors,
        )
    }

    /// Unchecked append at the back.
    pub fn push(&mut self, frame: StampedFrame) {
        self.frames.push_back(frame);
    }

    /// Unchecked insertion at the front.
    pub fn push_front(&mut self, frame: StampedFrame) {
        self.frames.push_front(frame);
    }

    /// Append every frame of `other` with the given checks, stopping at the first failure.
    pub fn extend_checked<I>(
        &mut self,
        other: I,
        enforce_monotonic: bool,
        enforce_same_sensors: bool,
    ) -> AppResult<()>
    where
        I: IntoIterator<Item = StampedFrame>,
    {
        for frame in other {
            self.append(frame, enforce_monotonic, enforce_same_sensors)?;
        }
        Ok(())
    }

    /// Position of the first element with timestamp `>= timestamp`.
    pub fn find(&self, timestamp: f64) -> usize {
        self.frames.partition_point(|f| f.timestamp < timestamp)
    }

    /// Position one past the last element with timestamp `<= timestamp`.
    pub fn find_after(&self, timestamp: f64) -> usize {
        self.frames.partition_point(|f| f.timestamp <= timestamp)
    }

    /// Element with the exact timestamp, if present.
    pub fn at_time(&self, timestamp: f64) -> Option<&StampedFrame> {
        self.frames
            .get(self.find(timestamp))
            .filter(|f| f.timestamp == timestamp)
    }

    /// Stable sort by timestamp.
    pub fn sort(&mut self) {
        self.frames
            .make_contiguous()
            .sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    }

    /// Whether timestamps are non-decreasing.
    pub fn is_sorted(&self) -> bool {
        self.frames
            .iter()
            .zip(self.frames.iter().skip(1))
            .all(|(a, b)| a.timestamp <= b.timestamp)
    }

    /// Drop up to `n` oldest elements; returns how many were dropped.
    pub fn discard(&mut self, n: usize) -> usize {
        let n = n.min(self.frames.len());
        self.frames.drain(..n);
        n
    }

    /// Drop elements older than `timestamp`; returns how many were dropped.
    pub fn discard_before(&mut self, timestamp: f64) -> usize {
        let n = self.find(timestamp);
        self.discard(n)
    }

    /// Remove up to `count` elements starting at `start`; returns how many were removed.
    pub fn erase(&mut self, start: usize, count: usize) -> usize {
        let start = start.min(self.frames.len());
        let end = start.saturating_add(count).min(self.frames.len());
        self.frames.drain(start..end);
        end - start
    }

    /// Remove every element.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> Option<&StampedFrame> {
        self.frames.get(index)
    }

    /// Oldest element.
    pub fn first(&self) -> Option<&StampedFrame> {
        self.frames.front()
    }

    /// Newest element.
    pub fn last(&self) -> Option<&StampedFrame> {
        self.frames.back()
    }

    /// Iterate over all elements.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, StampedFrame> {
        self.frames.iter()
    }

    /// Iterate over up to `len` elements starting at `start`.
    pub fn iter_range(
        &self,
        start: usize,
        len: usize,
    ) -> std::collections::vec_deque::Iter<'_, StampedFrame> {
        let start = start.min(self.frames.len());
        let end = start.saturating_add(len).min(self.frames.len());
        self.frames.range(start..end)
    }

    /// Timestamps of all elements.
    pub fn timestamps(&self) -> Vec<f64> {
        self.frames.iter().map(|f| f.timestamp).collect()
    }

    /// Sensors of the newest element.
    pub fn sensors(&self) -> Vec<SensorId> {
        self.last().map(|f| f.value.sensors()).unwrap_or_default()
    }

    /// Read-only view of `width` elements at position `start`.
    pub fn range(&self, start: usize, width: usize, overlap: usize) -> ConstRange<'_> {
        ConstRange::new(self, Window::new(start, width, overlap))
    }

    /// Read-only view starting at the first element with timestamp `>= timestamp`.
    pub fn range_at(&self, timestamp: f64, width: usize, overlap: usize) -> ConstRange<'_> {
        self.range(self.find(timestamp), width, overlap)
    }

    /// Read-only view covering timestamps in `[from, to]`.
    pub fn range_between(&self, from: f64, to: f64, overlap: usize) -> ConstRange<'_> {
        let start = self.find(from);
        let end = self.find_after(to).max(start);
        self.range(start, end - start, overlap)
    }

    /// Read-only view starting at `from` spanning `duration` seconds at `sample_rate`.
    ///
    /// Both the width and the overlap are converted with [`samples`].
    pub fn window(
        &self,
        from: f64,
        duration: f64,
        sample_rate: f64,
        overlap: f64,
    ) -> ConstRange<'_> {
        self.range_at(
            from,
            samples(duration, sample_rate),
            samples(overlap, sample_rate),
        )
    }

    /// View over the whole sequence.
    pub fn all(&self) -> ConstRange<'_> {
        self.range(0, self.len(), 0)
    }

    /// One channel of one sensor as a time series.
    pub fn signal(&self, sensor: SensorId, channel: usize) -> Vec<Stamped<Value>> {
        self.all().signal(sensor, channel)
    }
}

impl FromIterator<StampedFrame> for Sequence {
    fn from_iter<I: IntoIterator<Item = StampedFrame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl Extend<StampedFrame> for Sequence {
    fn extend<I: IntoIterator<Item = StampedFrame>>(&mut self, iter: I) {
        self.frames.extend(iter);
    }
}

impl IntoIterator for Sequence {
    type Item = StampedFrame;
    type IntoIter = std::collections::vec_deque::IntoIter<StampedFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a StampedFrame;
    type IntoIter = std::collections::vec_deque::Iter<'a, StampedFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Sample;

    fn frame(sensors: &[u8], value: Value) -> Frame {
        sensors
            .iter()
            .map(|&n| Sample::new(SensorId::new(n).unwrap(), vec![value]))
            .collect()
    }

    fn stamped(t: f64) -> StampedFrame {
        Stamped::new(t, frame(&[1], t as Value))
    }

    fn filled(timestamps: &[f64]) -> Sequence {
        timestamps.iter().map(|&t| stamped(t)).collect()
    }

    #[test]
    fn test_monotonic_append_rejects_without_mutation() {
        let mut seq = filled(&[1.0, 2.0]);
        let err = seq.append(stamped(2.0), true, false).unwrap_err();
        assert!(matches!(err, DaqError::Ordering { .. }));
        assert_eq!(seq.len(), 2);
        seq.append(stamped(2.0), false, false).unwrap();
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn test_same_sensor_append() {
        let mut seq = filled(&[1.0]);
        let other = Stamped::new(2.0, frame(&[1, 2], 0.0));
        let err = seq.append(other.clone(), false, true).unwrap_err();
        assert!(matches!(err, DaqError::SensorMismatch { .. }));
        assert_eq!(seq.len(), 1);
        seq.append_ref(&other, true, false).unwrap();
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn test_find_lower_bound() {
        let seq = filled(&[1.0, 2.0, 3.0]);
        assert_eq!(seq.find(0.5), 0);
        assert_eq!(seq.find(1.0), 0);
        assert_eq!(seq.find(1.5), 1);
        assert_eq!(seq.find(3.0), 2);
        assert_eq!(seq.find(4.0), 3);
        assert_eq!(seq.at_time(2.0).unwrap().timestamp, 2.0);
        assert!(seq.at_time(2.5).is_none());
    }

    #[test]
    fn test_range_from_timestamp() {
        let seq = filled(&[1.0, 2.0, 3.0]);
        let range = seq.range_at(2.0, 2, 0);
        assert_eq!(range.timestamps(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_range_between_is_inclusive() {
        let seq = filled(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(seq.range_between(1.5, 3.0, 0).timestamps(), vec![2.0, 3.0]);
        assert!(seq.range_between(3.5, 1.0, 0).is_empty());
    }

    #[test]
    fn test_window_converts_time_to_samples() {
        assert_eq!(samples(0.25, 10.0), 3);
        assert_eq!(samples(-0.5, 4.0), 2);
        let seq = filled(&[0.0, 0.1, 0.2, 0.3, 0.4, 0.5]);
        let range = seq.window(0.1, 0.3, 10.0, 0.1);
        assert_eq!(range.len(), 3);
        assert_eq!(range.window().overlap(), 1);
    }

    #[test]
    fn test_discard_and_erase_clamp() {
        let mut seq = filled(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(seq.discard(1), 1);
        assert_eq!(seq.first().unwrap().timestamp, 2.0);
        assert_eq!(seq.erase(1, 10), 2);
        assert_eq!(seq.timestamps(), vec![2.0]);
        assert_eq!(seq.discard(5), 1);
        assert!(seq.is_empty());
    }

    #[test]
    fn test_sort_restores_order() {
        let mut seq = filled(&[3.0, 1.0, 2.0]);
        assert!(!seq.is_sorted());
        seq.sort();
        assert!(seq.is_sorted());
        assert_eq!(seq.timestamps(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_signal_skips_missing_sensor() {
        let mut seq = filled(&[1.0]);
        seq.push(Stamped::new(2.0, frame(&[2], 5.0)));
        seq.push(stamped(3.0));
        let signal = seq.signal(SensorId::FIRST, 0);
        let times: Vec<f64> = signal.iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![1.0, 3.0]);
    }
}
