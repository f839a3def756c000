//! Processing steps over sequence ranges.
//!
//! A [`Processor`] is a synchronous algorithm applied to a [`Range`]. Two tasks drive
//! it through the [`Executor`](super::Executor):
//!
//! - [`Single`] processes one range once.
//! - [`Iterative`] processes a range window by window, moving it according to an
//!   [`Advance`] strategy. Against a live producer the next window may not be filled
//!   yet; the task then sleeps for its idle duration and checks once more before
//!   giving up.

use super::executor::Task;
use crate::config::AcquisitionConfig;
use crate::data::Range;
use crate::error::AppResult;
use async_trait::async_trait;
use std::time::Duration;

/// Default idle wait before an iterative task gives up.
pub const DEFAULT_IDLE: Duration = Duration::from_secs(2);

/// Algorithm applied to a range.
pub trait Processor: Send + 'static {
    /// Called once before the first window.
    fn begin(&mut self, _range: &Range) -> AppResult<()> {
        Ok(())
    }

    /// Process one window.
    fn process(&mut self, range: &Range) -> AppResult<()>;

    /// Called once after the last window.
    fn end(&mut self, _range: &Range) -> AppResult<()> {
        Ok(())
    }
}

/// How an [`Iterative`] task moves its window between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Move by `step` elements (minus the window overlap); negative steps go back.
    Slide {
        /// Signed step in elements.
        step: isize,
    },
    /// Keep the window in place. For processors that erase what they processed, so
    /// the following elements move into the window.
    Consume,
}

/// One-shot task processing a single range.
#[derive(Debug)]
pub struct Single<P> {
    processor: P,
    range: Range,
    done: bool,
}

impl<P: Processor> Single<P> {
    /// Process `range` once with `processor`.
    pub fn new(processor: P, range: Range) -> Self {
        Self {
            processor,
            range,
            done: false,
        }
    }

    /// Wrapped processor.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Unwrap the processor.
    pub fn into_processor(self) -> P {
        self.processor
    }
}

#[async_trait]
impl<P: Processor> Task for Single<P> {
    async fn start(&mut self) -> AppResult<()> {
        self.done = false;
        self.processor.begin(&self.range)
    }

    async fn active(&mut self) -> bool {
        !self.done
    }

    async fn execute(&mut self) -> AppResult<()> {
        self.done = true;
        self.processor.process(&self.range)
    }

    async fn stop(&mut self) -> AppResult<()> {
        self.processor.end(&self.range)
    }
}

/// Task processing a range window by window.
#[derive(Debug)]
pub struct Iterative<P> {
    processor: P,
    range: Range,
    advance: Advance,
    idle: Duration,
    first: bool,
    steps: usize,
}

impl<P: Processor> Iterative<P> {
    /// Slide `range` by `step` elements after each window.
    pub fn new(processor: P, range: Range, step: isize) -> Self {
        Self::with_advance(processor, range, Advance::Slide { step })
    }

    /// Move `range` with an explicit strategy.
    pub fn with_advance(processor: P, range: Range, advance: Advance) -> Self {
        Self {
            processor,
            range,
            advance,
            idle: DEFAULT_IDLE,
            first: true,
            steps: 0,
        }
    }

    /// Set the idle wait used when the next window is not ready.
    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Apply the acquisition settings.
    pub fn with_config(self, config: &AcquisitionConfig) -> Self {
        self.with_idle(config.idle)
    }

    /// Idle wait used when the next window is not ready.
    pub fn idle(&self) -> Duration {
        self.idle
    }

    /// Current window.
    pub fn range(&self) -> &Range {
        &self.range
    }

    /// Number of processed windows.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Wrapped processor.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Mutable wrapped processor.
    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    /// Unwrap the processor.
    pub fn into_processor(self) -> P {
        self.processor
    }

    /// Window the next step would process.
    fn candidate(&self) -> Option<Range> {
        match self.advance {
            _ if self.first => Some(self.range.clone()),
            Advance::Consume => Some(self.range.clone()),
            Advance::Slide { step } => {
                let next = self.range.advanced(step);
                // No movement would process the same window forever.
                (next != self.range).then_some(next)
            }
        }
    }

    /// Whether `range` can be processed: full before idling, non-empty after.
    fn ready(range: &Range, after_idle: bool) -> bool {
        let len = range.len();
        if after_idle {
            len > 0
        } else {
            len > 0 && len == range.window().width()
        }
    }
}

#[async_trait]
impl<P: Processor> Task for Iterative<P> {
    async fn start(&mut self) -> AppResult<()> {
        self.first = true;
        self.steps = 0;
        self.processor.begin(&self.range)
    }

    async fn active(&mut self) -> bool {
        let Some(candidate) = self.candidate() else {
            return false;
        };
        if !Self::ready(&candidate, false) {
            tracing::trace!(idle = ?self.idle, "Window not ready, idling");
            tokio::time::sleep(self.idle).await;
            if !Self::ready(&candidate, true) {
                tracing::debug!(steps = self.steps, "No new data after idle wait");
                return false;
            }
        }
        self.range = candidate;
        true
    }

    async fn execute(&mut self) -> AppResult<()> {
        self.processor.process(&self.range)?;
        self.first = false;
        self.steps += 1;
        Ok(())
    }

    async fn stop(&mut self) -> AppResult<()> {
        self.processor.end(&self.range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Frame, Sample, SensorId, Sequence, SharedSequence, Stamped};
    use crate::experiment::Executor;
    use std::sync::Arc;

    fn stamped(t: f64) -> Stamped<Frame> {
        Stamped::new(t, std::iter::once(Sample::new(SensorId::FIRST, vec![t as f32])).collect())
    }

    fn shared(n: usize) -> SharedSequence {
        (0..n).map(|i| stamped(i as f64)).collect::<Sequence>().into_shared()
    }

    #[derive(Default)]
    struct Collect {
        firsts: Vec<f64>,
        ended: bool,
    }

    impl Processor for Collect {
        fn process(&mut self, range: &Range) -> AppResult<()> {
            if let Some(t) = range.read(|r| r.first().map(|f| f.timestamp)) {
                self.firsts.push(t);
            }
            Ok(())
        }

        fn end(&mut self, _range: &Range) -> AppResult<()> {
            self.ended = true;
            Ok(())
        }
    }

    #[test]
    fn test_idle_from_acquisition_config() {
        let config = AcquisitionConfig {
            idle: Duration::from_millis(250),
            ..Default::default()
        };
        let range = Range::at(shared(1), 0, 1, 0);
        let task = Iterative::new(Collect::default(), range, 1);
        assert_eq!(task.idle(), DEFAULT_IDLE);
        assert_eq!(task.with_config(&config).idle(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_slides_over_static_sequence() {
        let source = shared(6);
        let range = Range::at(Arc::clone(&source), 0, 2, 0);
        let task = Iterative::new(Collect::default(), range, 2).with_idle(Duration::from_millis(10));
        let mut executor = Executor::new(task);
        executor.run().await.unwrap();
        let task = executor.into_task().unwrap();
        assert_eq!(task.steps(), 3);
        let collect = task.into_processor();
        assert_eq!(collect.firsts, vec![0.0, 2.0, 4.0]);
        assert!(collect.ended);
    }

    #[tokio::test]
    async fn test_overlap_reduces_shift() {
        let source = shared(5);
        let range = Range::at(Arc::clone(&source), 0, 3, 1);
        let task = Iterative::new(Collect::default(), range, 3).with_idle(Duration::from_millis(10));
        let mut executor = Executor::new(task);
        executor.run().await.unwrap();
        let collect = executor.into_task().unwrap().into_processor();
        // Full windows at 0 and 2, then the partial tail at 4 after the idle wait.
        assert_eq!(collect.firsts, vec![0.0, 2.0, 4.0]);
    }

    #[tokio::test]
    async fn test_partial_tail_processed_after_idle() {
        let source = shared(3);
        let range = Range::at(Arc::clone(&source), 0, 2, 0);
        let task = Iterative::new(Collect::default(), range, 2).with_idle(Duration::from_millis(20));
        let started = std::time::Instant::now();
        let mut executor = Executor::new(task);
        executor.run().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
        let collect = executor.into_task().unwrap().into_processor();
        assert_eq!(collect.firsts, vec![0.0, 2.0]);
    }

    #[tokio::test]
    async fn test_empty_source_gives_up_after_idle() {
        let source = shared(0);
        let range = Range::at(source, 0, 1, 0);
        let task = Iterative::new(Collect::default(), range, 1).with_idle(Duration::from_millis(20));
        let started = std::time::Instant::now();
        let mut executor = Executor::new(task);
        executor.run().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(executor.into_task().unwrap().steps(), 0);
    }

    fn spawn_writer(
        source: SharedSequence,
        bursts: Vec<usize>,
        pause: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut t = 0.0;
            for burst in bursts {
                for _ in 0..burst {
                    source.write().push(stamped(t));
                    t += 1.0;
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                tokio::time::sleep(pause).await;
            }
        })
    }

    #[tokio::test]
    async fn test_stops_one_idle_cycle_after_writer() {
        let source = shared(0);
        let writer = spawn_writer(Arc::clone(&source), vec![5], Duration::ZERO);
        let range = Range::at(Arc::clone(&source), 0, 1, 0);
        let task = Iterative::new(Collect::default(), range, 1).with_idle(Duration::from_millis(60));
        let mut executor = Executor::new(task);
        executor.run().await.unwrap();
        writer.await.unwrap();
        let collect = executor.into_task().unwrap().into_processor();
        assert_eq!(collect.firsts, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_writer_resuming_during_idle_keeps_engine_alive() {
        let source = shared(0);
        let writer = spawn_writer(
            Arc::clone(&source),
            vec![2, 2],
            Duration::from_millis(30),
        );
        let range = Range::at(Arc::clone(&source), 0, 1, 0);
        let task = Iterative::new(Collect::default(), range, 1).with_idle(Duration::from_millis(150));
        let mut executor = Executor::new(task);
        executor.run().await.unwrap();
        writer.await.unwrap();
        let collect = executor.into_task().unwrap().into_processor();
        assert_eq!(collect.firsts, vec![0.0, 1.0, 2.0, 3.0]);
    }

    struct Drain;

    impl Processor for Drain {
        fn process(&mut self, range: &Range) -> AppResult<()> {
            range.erase();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_consume_keeps_window_in_place() {
        let source = shared(4);
        let range = Range::at(Arc::clone(&source), 0, 2, 0);
        let task = Iterative::with_advance(Drain, range, Advance::Consume)
            .with_idle(Duration::from_millis(10));
        let mut executor = Executor::new(task);
        executor.run().await.unwrap();
        assert!(source.read().is_empty());
        assert_eq!(executor.into_task().unwrap().steps(), 2);
    }

    #[tokio::test]
    async fn test_single_runs_once() {
        let source = shared(3);
        let range = Range::at(source, 1, 2, 0);
        let mut executor = Executor::new(Single::new(Collect::default(), range));
        executor.run().await.unwrap();
        let collect = executor.into_task().unwrap().into_processor();
        assert_eq!(collect.firsts, vec![1.0]);
        assert!(collect.ended);
    }
}
