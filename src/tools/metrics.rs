//! Window metrics computed per sensor and channel.
//!
//! A [`Metric`] reduces every channel of every sensor across a window to one value and
//! returns the result as a [`Frame`] laid out like the first frame of the window.
//! Frames missing a sensor are skipped for that sensor.

use crate::data::{ConstRange, Frame, Sample, Value};

/// Reduction of a window to a single frame.
pub trait Metric: Send + 'static {
    /// Short name used in logs.
    const NAME: &'static str;

    /// Reduce the values of one channel. Never called with an empty slice.
    fn reduce(&self, values: &[Value]) -> Value;

    /// Reduce every sensor and channel of `range`. `None` for an empty window.
    fn compute(&self, range: &ConstRange<'_>) -> Option<Frame> {
        let layout = &range.first()?.value;
        let mut result = Frame::new();
        let mut column = Vec::with_capacity(range.len());
        for entry in layout {
            let id = entry.sample.id();
            let mut values = Vec::with_capacity(entry.sample.len());
            for channel in 0..entry.sample.len() {
                column.clear();
                column.extend(range.iter().filter_map(|f| f.value.value(id, channel)));
                values.push(self.reduce(&column));
            }
            result.push(entry.label.clone(), Sample::new(id, values));
        }
        Some(result)
    }
}

/// Largest value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Maximum;

impl Metric for Maximum {
    const NAME: &'static str = "maximum";

    fn reduce(&self, values: &[Value]) -> Value {
        values.iter().copied().fold(Value::NEG_INFINITY, Value::max)
    }
}

/// Smallest value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Minimum;

impl Metric for Minimum {
    const NAME: &'static str = "minimum";

    fn reduce(&self, values: &[Value]) -> Value {
        values.iter().copied().fold(Value::INFINITY, Value::min)
    }
}

/// Arithmetic mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct Average;

impl Metric for Average {
    const NAME: &'static str = "average";

    fn reduce(&self, values: &[Value]) -> Value {
        let sum: f64 = values.iter().map(|&v| f64::from(v)).sum();
        (sum / values.len() as f64) as Value
    }
}

/// Root mean square.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rms;

impl Metric for Rms {
    const NAME: &'static str = "rms";

    fn reduce(&self, values: &[Value]) -> Value {
        let squares: f64 = values.iter().map(|&v| f64::from(v).powi(2)).sum();
        (squares / values.len() as f64).sqrt() as Value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SensorId, Sequence, Stamped};

    fn sequence() -> Sequence {
        let a = SensorId::FIRST;
        let b = SensorId::new(2).unwrap();
        [[1.0, -3.0], [3.0, 4.0], [-2.0, 5.0]]
            .iter()
            .enumerate()
            .map(|(i, &[x, y])| {
                let frame: Frame = [Sample::new(a, vec![x, 10.0 * x]), Sample::new(b, vec![y])]
                    .into_iter()
                    .collect();
                Stamped::new(i as f64, frame)
            })
            .collect()
    }

    #[test]
    fn test_extrema_per_channel() {
        let seq = sequence();
        let all = seq.all();
        let max = Maximum.compute(&all).unwrap();
        assert_eq!(max.get(SensorId::FIRST).unwrap().values(), &[3.0, 30.0]);
        assert_eq!(max.value(SensorId::new(2).unwrap(), 0), Some(5.0));
        let min = Minimum.compute(&all).unwrap();
        assert_eq!(min.get(SensorId::FIRST).unwrap().values(), &[-2.0, -20.0]);
        assert_eq!(min.labels(), vec!["sensor1", "sensor2"]);
    }

    #[test]
    fn test_average_and_rms() {
        let seq = sequence();
        let window = seq.range(0, 2, 0);
        let avg = Average.compute(&window).unwrap();
        assert_eq!(avg.value(SensorId::new(2).unwrap(), 0), Some(0.5));
        let rms = Rms.compute(&window).unwrap();
        let expected = ((9.0f32 + 16.0) / 2.0).sqrt();
        let got = rms.value(SensorId::new(2).unwrap(), 0).unwrap();
        assert!((got - expected).abs() < 1e-5);
    }

    #[test]
    fn test_empty_window_has_no_metric() {
        let seq = sequence();
        assert!(Average.compute(&seq.range(10, 2, 0)).is_none());
    }
}
