//! Windowed views over a [`Sequence`].
//!
//! A [`Window`] is a pair of numeric bounds (`start`, `width`) plus the overlap kept
//! between successive advances. Views never copy data:
//!
//! - [`ConstRange`] borrows a sequence and is the read-only view handed to
//!   side-effect-free algorithms.
//! - [`Range`] keeps a [`SharedSequence`] handle and its bounds, so a consumer observes
//!   a live view of a sequence that a producer may still be appending to. The view
//!   length is always recomputed against the current sequence length.

use super::sequence::{Sequence, SharedSequence};
use super::{SensorId, Stamped, StampedFrame, Value};
use std::sync::Arc;

/// Positional bounds of a range view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    start: usize,
    width: usize,
    overlap: usize,
}

impl Window {
    /// Window of `width` elements at `start`; `overlap` is clamped below `width`.
    pub fn new(start: usize, width: usize, overlap: usize) -> Self {
        Self {
            start,
            width,
            overlap: clamp_overlap(overlap, width),
        }
    }

    /// First position covered.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Nominal number of elements.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Elements shared by two successive windows.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// One past the last nominal position.
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.width)
    }

    /// Number of elements actually covered in a container of `total` elements.
    pub fn len_within(&self, total: usize) -> usize {
        if self.start >= total {
            0
        } else {
            self.width.min(total - self.start)
        }
    }

    /// Distance the start moves for an advance of `step` elements, `|step| - overlap`.
    pub fn shift(&self, step: isize) -> usize {
        step.unsigned_abs().saturating_sub(self.overlap)
    }

    /// Window moved by `step` elements inside a container of `total` elements.
    ///
    /// The start moves by `|step| - overlap` in the direction of `step`: the overlap is
    /// taken off the magnitude in both directions, so with an overlap of 1 a step of
    /// `3` moves forward by 2 and a step of `-3` moves back by 2. Moving forward
    /// past the end parks the start at `total` and keeps the nominal width, so the view
    /// fills up again when elements are appended. Moving backward past the front clamps
    /// the width to what remains.
    pub fn advanced(&self, step: isize, total: usize) -> Window {
        let shift = self.shift(step);
        if step >= 0 {
            let start = self.start.saturating_add(shift).min(total.max(self.start));
            Window::new(start, self.width, self.overlap)
        } else if shift <= self.start {
            Window::new(self.start - shift, self.width, self.overlap)
        } else {
            let deficit = shift - self.start;
            let width = self.width.saturating_sub(deficit);
            Window::new(0, width, self.overlap)
        }
    }
}

fn clamp_overlap(overlap: usize, width: usize) -> usize {
    overlap.min(width.saturating_sub(1))
}

/// Read-only view over a borrowed sequence.
#[derive(Debug, Clone, Copy)]
pub struct ConstRange<'a> {
    source: &'a Sequence,
    window: Window,
}

impl<'a> ConstRange<'a> {
    /// View of `window` inside `source`.
    pub fn new(source: &'a Sequence, window: Window) -> Self {
        Self { source, window }
    }

    /// Bounds of this view.
    pub fn window(&self) -> Window {
        self.window
    }

    /// First covered position.
    pub fn start(&self) -> usize {
        self.window.start
    }

    /// Number of covered elements.
    pub fn len(&self) -> usize {
        self.window.len_within(self.source.len())
    }

    /// Whether the view covers nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index` relative to the view start.
    pub fn get(&self, index: usize) -> Option<&'a StampedFrame> {
        if index < self.len() {
            self.source.get(self.window.start + index)
        } else {
            None
        }
    }

    /// First covered element.
    pub fn first(&self) -> Option<&'a StampedFrame> {
        self.get(0)
    }

    /// Last covered element.
    pub fn last(&self) -> Option<&'a StampedFrame> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Iterate over covered elements.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'a, StampedFrame> {
        self.source.iter_range(self.window.start, self.len())
    }

    /// Timestamps of covered elements.
    pub fn timestamps(&self) -> Vec<f64> {
        self.iter().map(|f| f.timestamp).collect()
    }

    /// One channel of one sensor as a time series; frames without the sensor are skipped.
    pub fn signal(&self, sensor: SensorId, channel: usize) -> Vec<Stamped<Value>> {
        self.iter()
            .filter_map(|f| {
                f.value
                    .value(sensor, channel)
                    .map(|v| Stamped::new(f.timestamp, v))
            })
            .collect()
    }

    /// Sensors of the first covered element.
    pub fn sensors(&self) -> Vec<SensorId> {
        self.first().map(|f| f.value.sensors()).unwrap_or_default()
    }

    /// Move the view by `step` elements.
    pub fn advance(&mut self, step: isize) {
        self.window = self.window.advanced(step, self.source.len());
    }

    /// Copy of the covered elements.
    pub fn to_sequence(&self) -> Sequence {
        self.iter().cloned().collect()
    }
}

/// Live view over a shared sequence.
#[derive(Debug, Clone)]
pub struct Range {
    source: SharedSequence,
    window: Window,
}

impl Range {
    /// View of `window` inside `source`.
    pub fn new(source: SharedSequence, window: Window) -> Self {
        Self { source, window }
    }

    /// View of `width` elements at position `start`.
    pub fn at(source: SharedSequence, start: usize, width: usize, overlap: usize) -> Self {
        Self::new(source, Window::new(start, width, overlap))
    }

    /// View of `width` elements starting at the first element with key `>= timestamp`.
    pub fn at_time(source: SharedSequence, timestamp: f64, width: usize, overlap: usize) -> Self {
        let start = source.read().find(timestamp);
        Self::at(source, start, width, overlap)
    }

    /// Sequence observed by this view.
    pub fn source(&self) -> &SharedSequence {
        &self.source
    }

    /// Bounds of this view.
    pub fn window(&self) -> Window {
        self.window
    }

    /// Number of elements currently covered.
    pub fn len(&self) -> usize {
        self.window.len_within(self.source.read().len())
    }

    /// Whether the view currently covers nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over a read-only snapshot of the view.
    ///
    /// The sequence read lock is held for the duration of `f`.
    pub fn read<R>(&self, f: impl FnOnce(ConstRange<'_>) -> R) -> R {
        let guard = self.source.read();
        f(ConstRange::new(&guard, self.window))
    }

    /// Owned copy of the covered elements.
    pub fn snapshot(&self) -> Sequence {
        self.read(|r| r.to_sequence())
    }

    /// This view moved by `step` elements against the current sequence length.
    ///
    /// See [`Window::advanced`]; backward steps also move by `|step| - overlap`.
    pub fn advanced(&self, step: isize) -> Range {
        let total = self.source.read().len();
        Range::new(Arc::clone(&self.source), self.window.advanced(step, total))
    }

    /// Move this view by `step` elements.
    pub fn advance(&mut self, step: isize) {
        let total = self.source.read().len();
        self.window = self.window.advanced(step, total);
    }

    /// Remove the covered elements from the source sequence.
    ///
    /// The view keeps its bounds, so it then covers the elements that followed.
    pub fn erase(&self) -> usize {
        let mut guard = self.source.write();
        let len = self.window.len_within(guard.len());
        guard.erase(self.window.start, len)
    }
}

impl PartialEq for Range {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.source, &other.source) && self.window == other.window
    }
}
