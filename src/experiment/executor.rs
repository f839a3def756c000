//! Start/loop/stop execution engine.
//!
//! An [`Executor`] drives a [`Task`] through
//!
//! ```text
//! start(); while active() { execute(); if killed { break } }; stop()
//! ```
//!
//! either on the calling task ([`Executor::run`]) or on a spawned tokio task
//! ([`Executor::launch`] then [`Executor::wait`]). Killing is cooperative: the flag is
//! checked once per iteration and never interrupts an in-flight `execute()`. A
//! [`KillSwitch`] sets it from outside, including while [`Executor::run`] holds the
//! executor. A kill requested between runs ends the next run before its first
//! iteration; the flag is cleared when a run finishes.
//!
//! `stop()` is called on every exit path, including a failing `execute()` and a kill;
//! the first error is still returned to the caller.

use super::state::EngineState;
use crate::error::{AppResult, DaqError};
use async_trait::async_trait;
use futures::future::try_join_all;
use parking_lot::Mutex as StateLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A unit of work driven by an [`Executor`].
#[async_trait]
pub trait Task: Send + 'static {
    /// Called once before the loop.
    async fn start(&mut self) -> AppResult<()> {
        Ok(())
    }

    /// Whether the loop should run another iteration.
    async fn active(&mut self) -> bool;

    /// One loop iteration.
    async fn execute(&mut self) -> AppResult<()>;

    /// Called once after the loop, on every exit path.
    async fn stop(&mut self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: Task + ?Sized> Task for Box<T> {
    async fn start(&mut self) -> AppResult<()> {
        (**self).start().await
    }

    async fn active(&mut self) -> bool {
        (**self).active().await
    }

    async fn execute(&mut self) -> AppResult<()> {
        (**self).execute().await
    }

    async fn stop(&mut self) -> AppResult<()> {
        (**self).stop().await
    }
}

/// Task whose `active()` is "a deadline has not elapsed yet".
///
/// The deadline is armed in `start()`.
#[derive(Debug)]
pub struct Timed<T> {
    inner: T,
    duration: Duration,
    deadline: Option<Instant>,
}

impl<T: Task> Timed<T> {
    /// Run `inner` for `duration` once started.
    pub fn new(inner: T, duration: Duration) -> Self {
        Self {
            inner,
            duration,
            deadline: None,
        }
    }

    /// Wrapped task.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Mutable wrapped task.
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwrap the task.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Time left until the deadline, or the full duration when not started.
    pub fn remaining(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => self.duration,
        }
    }
}

#[async_trait]
impl<T: Task> Task for Timed<T> {
    async fn start(&mut self) -> AppResult<()> {
        self.inner.start().await?;
        self.deadline = Some(Instant::now() + self.duration);
        Ok(())
    }

    async fn active(&mut self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() < d)
    }

    async fn execute(&mut self) -> AppResult<()> {
        self.inner.execute().await
    }

    async fn stop(&mut self) -> AppResult<()> {
        self.deadline = None;
        self.inner.stop().await
    }
}

/// Cloneable handle setting the kill flag of an [`Executor`].
#[derive(Debug, Clone)]
pub struct KillSwitch {
    flag: Arc<AtomicBool>,
}

impl KillSwitch {
    /// Ask the loop to end after the current iteration.
    pub fn kill(&self) {
        self.flag.store(true, Ordering::Release);
        tracing::debug!("Kill requested");
    }

    /// Whether a kill is pending.
    pub fn is_killed(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Drives one task synchronously or on a background tokio task.
#[derive(Debug)]
pub struct Executor<T: Task> {
    task: Arc<Mutex<T>>,
    state: Arc<StateLock<EngineState>>,
    kill: Arc<AtomicBool>,
    handle: Option<JoinHandle<AppResult<()>>>,
}

impl<T: Task> Executor<T> {
    /// Idle engine around `task`.
    pub fn new(task: T) -> Self {
        Self {
            task: Arc::new(Mutex::new(task)),
            state: Arc::new(StateLock::new(EngineState::Idle)),
            kill: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Run the task to completion on the calling task.
    pub async fn run(&mut self) -> AppResult<()> {
        self.ensure_startable()?;
        drive(&self.task, &self.state, &self.kill).await
    }

    /// Run the task on a background tokio task and return immediately.
    pub fn launch(&mut self) -> AppResult<()> {
        self.ensure_startable()?;
        *self.state.lock() = EngineState::Running;
        let task = Arc::clone(&self.task);
        let state = Arc::clone(&self.state);
        let kill = Arc::clone(&self.kill);
        self.handle = Some(tokio::spawn(async move { drive(&task, &state, &kill).await }));
        Ok(())
    }

    /// Wait for a launched task to finish. Does nothing if never launched.
    pub async fn wait(&mut self) -> AppResult<()> {
        match self.handle.take() {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }

    /// Ask the loop to end after the current iteration, then wait for it.
    pub async fn kill(&mut self) -> AppResult<()> {
        self.kill_switch().kill();
        self.wait().await
    }

    /// Handle that can kill this executor from another task.
    pub fn kill_switch(&self) -> KillSwitch {
        KillSwitch {
            flag: Arc::clone(&self.kill),
        }
    }

    /// Whether a kill is pending.
    pub fn is_killed(&self) -> bool {
        self.kill.load(Ordering::Acquire)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Whether a launched task has finished (or none was launched).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Shared handle to the task. Locked for the whole run.
    pub fn task(&self) -> Arc<Mutex<T>> {
        Arc::clone(&self.task)
    }

    /// Unwrap the task once no run is in progress.
    pub fn into_task(self) -> AppResult<T> {
        if self.handle.is_some() {
            return Err(DaqError::Task("task is still launched".into()));
        }
        Arc::try_unwrap(self.task)
            .map(Mutex::into_inner)
            .map_err(|_| DaqError::Task("task is still shared".into()))
    }

    fn ensure_startable(&self) -> AppResult<()> {
        let launched = self.handle.as_ref().is_some_and(|h| !h.is_finished());
        if launched || !self.state().can_start() {
            return Err(DaqError::Task(format!(
                "task cannot start while {}",
                self.state()
            )));
        }
        Ok(())
    }
}

async fn drive<T: Task>(
    task: &Mutex<T>,
    state: &StateLock<EngineState>,
    kill: &AtomicBool,
) -> AppResult<()> {
    let mut task = task.lock().await;
    *state.lock() = EngineState::Running;
    tracing::debug!("Engine running");

    let mut iterations = 0usize;
    let result = async {
        task.start().await?;
        loop {
            if kill.load(Ordering::Acquire) {
                tracing::debug!(iterations, "Engine killed");
                break;
            }
            if !task.active().await {
                break;
            }
            task.execute().await?;
            iterations += 1;
        }
        Ok::<(), DaqError>(())
    }
    .await;
    let stopped = task.stop().await;
    kill.store(false, Ordering::Release);

    *state.lock() = EngineState::Stopped;
    tracing::debug!(iterations, ok = result.is_ok(), "Engine stopped");
    result.and(stopped)
}

/// Launch every executor, then wait for all of them.
pub async fn launch_all<T: Task>(executors: &mut [Executor<T>]) -> AppResult<()> {
    for executor in executors.iter_mut() {
        executor.launch()?;
    }
    wait_all(executors).await
}

/// Wait for every launched executor; the first error is returned.
pub async fn wait_all<T: Task>(executors: &mut [Executor<T>]) -> AppResult<()> {
    try_join_all(executors.iter_mut().map(|e| e.wait())).await?;
    Ok(())
}

/// Run executors one after the other, stopping at the first error.
pub async fn chain<T: Task>(executors: &mut [Executor<T>]) -> AppResult<()> {
    for executor in executors.iter_mut() {
        executor.run().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter {
        limit: usize,
        count: usize,
        started: bool,
        stopped: bool,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl Task for Counter {
        async fn start(&mut self) -> AppResult<()> {
            self.started = true;
            Ok(())
        }

        async fn active(&mut self) -> bool {
            self.count < self.limit
        }

        async fn execute(&mut self) -> AppResult<()> {
            self.count += 1;
            if self.fail_at == Some(self.count) {
                return Err(DaqError::Task("step failed".into()));
            }
            Ok(())
        }

        async fn stop(&mut self) -> AppResult<()> {
            self.stopped = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_calls_start_loop_stop() {
        let mut executor = Executor::new(Counter {
            limit: 3,
            ..Default::default()
        });
        assert_eq!(executor.state(), EngineState::Idle);
        executor.run().await.unwrap();
        assert_eq!(executor.state(), EngineState::Stopped);
        let task = executor.into_task().unwrap();
        assert!(task.started && task.stopped);
        assert_eq!(task.count, 3);
    }

    #[tokio::test]
    async fn test_failing_step_still_stops() {
        let mut executor = Executor::new(Counter {
            limit: 10,
            fail_at: Some(2),
            ..Default::default()
        });
        let err = executor.run().await.unwrap_err();
        assert!(matches!(err, DaqError::Task(_)));
        let task = executor.into_task().unwrap();
        assert_eq!(task.count, 2);
        assert!(task.stopped);
    }

    #[tokio::test]
    async fn test_wait_without_launch_is_noop() {
        let mut executor = Executor::new(Counter::default());
        executor.wait().await.unwrap();
        assert_eq!(executor.state(), EngineState::Idle);
    }

    struct Forever {
        iterations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Task for Forever {
        async fn active(&mut self) -> bool {
            true
        }

        async fn execute(&mut self) -> AppResult<()> {
            self.iterations.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_kill_ends_launched_loop() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let mut executor = Executor::new(Forever {
            iterations: Arc::clone(&iterations),
        });
        executor.launch().unwrap();
        assert!(executor.launch().is_err());
        tokio::time::sleep(Duration::from_millis(30)).await;
        executor.kill().await.unwrap();
        assert_eq!(executor.state(), EngineState::Stopped);
        let seen = iterations.load(Ordering::SeqCst);
        assert!(seen > 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(iterations.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_kill_switch_ends_synchronous_run() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let mut executor = Executor::new(Forever {
            iterations: Arc::clone(&iterations),
        });
        let switch = executor.kill_switch();
        let killer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            switch.kill();
        });
        tokio::time::timeout(Duration::from_secs(2), executor.run())
            .await
            .expect("run should end after the kill")
            .unwrap();
        killer.await.unwrap();
        assert_eq!(executor.state(), EngineState::Stopped);
        assert!(iterations.load(Ordering::SeqCst) > 0);
        assert!(!executor.is_killed());
    }

    #[tokio::test]
    async fn test_kill_before_run_skips_loop() {
        let mut executor = Executor::new(Counter {
            limit: 5,
            ..Default::default()
        });
        executor.kill_switch().kill();
        executor.run().await.unwrap();
        let task = executor.into_task().unwrap();
        assert!(task.started && task.stopped);
        assert_eq!(task.count, 0);
    }

    #[tokio::test]
    async fn test_running_engine_cannot_start_again() {
        let mut executor = Executor::new(Forever {
            iterations: Arc::new(AtomicUsize::new(0)),
        });
        executor.launch().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(executor.state().is_running());
        assert!(matches!(executor.run().await, Err(DaqError::Task(_))));
        executor.kill().await.unwrap();
        assert!(executor.state().can_start());
    }

    #[tokio::test]
    async fn test_timed_runs_until_deadline() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let timed = Timed::new(
            Forever {
                iterations: Arc::clone(&iterations),
            },
            Duration::from_millis(50),
        );
        let started = std::time::Instant::now();
        let mut executor = Executor::new(timed);
        executor.run().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(iterations.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_wait_all_and_chain() {
        let mut executors: Vec<Executor<Box<dyn Task>>> = (1..=3)
            .map(|limit| {
                Executor::new(Box::new(Counter {
                    limit,
                    ..Default::default()
                }) as Box<dyn Task>)
            })
            .collect();
        launch_all(&mut executors).await.unwrap();
        assert!(executors.iter().all(|e| e.state() == EngineState::Stopped));
        chain(&mut executors).await.unwrap();
    }
}
