//! Data model for acquired biosignal streams.
//!
//! - [`Sample`]: channel values of one sensor.
//! - [`Frame`]: one labeled sample per active sensor at a single instant.
//! - [`Stamped`]: a value paired with its timestamp key.
//! - [`Sequence`]: time-sorted container of stamped frames with windowed [`Range`] views.
pub mod frame;
pub mod range;
pub mod sample;
pub mod sensor;
pub mod sequence;

pub use frame::{default_label, Frame, Labeled, Stamped, StampedFrame};
pub use range::{ConstRange, Range, Window};
pub use sample::{Sample, Value, VALUE_SIZE};
pub use sensor::SensorId;
pub use sequence::{samples, Sequence, SharedSequence};
