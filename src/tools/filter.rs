//! Windowed metric filter.

use super::metrics::Metric;
use crate::data::{Range, SharedSequence};
use crate::error::AppResult;
use crate::experiment::Processor;

/// Processor appending the metric of each window to an output sequence.
///
/// The result is stamped with the timestamp of the last frame of the window. The
/// source read lock is released before the output write lock is taken for the append.
#[derive(Debug)]
pub struct Filter<M> {
    metric: M,
    output: SharedSequence,
    enforce_monotonic: bool,
    produced: usize,
}

impl<M: Metric> Filter<M> {
    /// Filter appending `metric` results to `output`.
    pub fn new(metric: M, output: SharedSequence) -> Self {
        Self {
            metric,
            output,
            enforce_monotonic: true,
            produced: 0,
        }
    }

    /// Accept results whose timestamps do not increase, e.g. for overlapping windows
    /// sharing their last element.
    pub fn allow_unordered(mut self) -> Self {
        self.enforce_monotonic = false;
        self
    }

    /// Output sequence.
    pub fn output(&self) -> &SharedSequence {
        &self.output
    }

    /// Results appended so far.
    pub fn produced(&self) -> usize {
        self.produced
    }
}

impl<M: Metric> Processor for Filter<M> {
    fn process(&mut self, range: &Range) -> AppResult<()> {
        let result = range.read(|window| {
            let timestamp = window.last()?.timestamp;
            self.metric.compute(&window).map(|frame| (timestamp, frame))
        });
        let Some((timestamp, frame)) = result else {
            return Ok(());
        };
        self.output
            .write()
            .append_frame(timestamp, frame, self.enforce_monotonic, true)?;
        self.produced += 1;
        tracing::trace!(metric = M::NAME, timestamp, "Filter result appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Frame, Sample, SensorId, Sequence, Stamped};
    use crate::experiment::{Executor, Iterative};
    use crate::tools::metrics::{Average, Maximum};
    use std::sync::Arc;
    use std::time::Duration;

    fn source(values: &[f32]) -> SharedSequence {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let frame: Frame = std::iter::once(Sample::new(SensorId::FIRST, vec![v])).collect();
                Stamped::new(i as f64 * 0.5, frame)
            })
            .collect::<Sequence>()
            .into_shared()
    }

    #[tokio::test]
    async fn test_moving_average_over_windows() {
        let input = source(&[1.0, 3.0, 5.0, 7.0]);
        let output = Sequence::new().into_shared();
        let range = Range::at(Arc::clone(&input), 0, 2, 0);
        let filter = Filter::new(Average, Arc::clone(&output));
        let task = Iterative::new(filter, range, 2).with_idle(Duration::from_millis(10));
        let mut executor = Executor::new(task);
        executor.run().await.unwrap();

        let out = output.read();
        assert_eq!(out.timestamps(), vec![0.5, 1.5]);
        let values: Vec<f32> = out
            .signal(SensorId::FIRST, 0)
            .into_iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(values, vec![2.0, 6.0]);
    }

    #[test]
    fn test_empty_window_appends_nothing() {
        let input = source(&[]);
        let output = Sequence::new().into_shared();
        let mut filter = Filter::new(Maximum, Arc::clone(&output));
        filter.process(&Range::at(input, 0, 3, 0)).unwrap();
        assert_eq!(filter.produced(), 0);
        assert!(output.read().is_empty());
    }
}
