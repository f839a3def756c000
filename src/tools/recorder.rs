//! Acquisition task appending decoded frames to a shared sequence.

use crate::config::AcquisitionConfig;
use crate::data::{SensorId, SharedSequence};
use crate::error::AppResult;
use crate::experiment::Task;
use crate::network::client::SharedDataClient;
use crate::network::data_client::{DataClient, SensorKind};
use async_trait::async_trait;
use std::time::Duration;

/// Reads stamped frames from a data client into a [`SharedSequence`].
///
/// Each iteration reads one record. A read that misses its deadline is counted and the
/// channel reopened; any other failure ends the run. The sequence write lock is taken
/// only for the append. Wrap the recorder in [`Timed`](crate::experiment::Timed) to
/// record for a fixed duration, or bound it with [`Recorder::with_limit`].
pub struct Recorder<K: SensorKind> {
    client: SharedDataClient<DataClient<K>>,
    output: SharedSequence,
    sensors: Option<Vec<SensorId>>,
    timeout: Duration,
    enforce_monotonic: bool,
    limit: Option<usize>,
    recorded: usize,
    missed: usize,
}

impl<K: SensorKind> std::fmt::Debug for Recorder<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("kind", &K::NAME)
            .field("sensors", &self.sensors)
            .field("timeout", &self.timeout)
            .field("recorded", &self.recorded)
            .field("missed", &self.missed)
            .finish()
    }
}

impl<K: SensorKind> Recorder<K> {
    /// Record the client's active sensors into `output`.
    pub fn new(
        client: SharedDataClient<DataClient<K>>,
        output: SharedSequence,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            output,
            sensors: None,
            timeout,
            enforce_monotonic: true,
            limit: None,
            recorded: 0,
            missed: 0,
        }
    }

    /// Apply the acquisition settings.
    pub fn with_config(mut self, config: &AcquisitionConfig) -> Self {
        self.enforce_monotonic = config.enforce_monotonic;
        self
    }

    /// Record only these sensors.
    pub fn with_sensors(mut self, sensors: Vec<SensorId>) -> Self {
        self.sensors = Some(sensors);
        self
    }

    /// Stop after `frames` recorded frames.
    pub fn with_limit(mut self, frames: usize) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Accept frames whose timestamps do not increase.
    pub fn allow_unordered(mut self) -> Self {
        self.enforce_monotonic = false;
        self
    }

    /// Sequence receiving the frames.
    pub fn output(&self) -> &SharedSequence {
        &self.output
    }

    /// Frames appended so far.
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Reads that missed their deadline.
    pub fn missed(&self) -> usize {
        self.missed
    }
}

#[async_trait]
impl<K: SensorKind> Task for Recorder<K> {
    async fn start(&mut self) -> AppResult<()> {
        self.recorded = 0;
        self.missed = 0;
        if self.sensors.is_none() {
            self.sensors = Some(self.client.lock().await.sensors());
        }
        tracing::debug!(kind = K::NAME, sensors = ?self.sensors, "Recorder started");
        Ok(())
    }

    async fn active(&mut self) -> bool {
        self.limit.map_or(true, |limit| self.recorded < limit)
    }

    async fn execute(&mut self) -> AppResult<()> {
        let sensors = self.sensors.as_deref().unwrap_or_default();
        let frame = {
            let mut client = self.client.lock().await;
            match client.read_stamped(sensors, self.timeout).await {
                Ok(frame) => frame,
                Err(e) if e.is_timeout() => {
                    self.missed += 1;
                    tracing::trace!(kind = K::NAME, missed = self.missed, "Record missed deadline");
                    client.reconnect().await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        };
        self.output.write().append(frame, self.enforce_monotonic, true)?;
        self.recorded += 1;
        Ok(())
    }

    async fn stop(&mut self) -> AppResult<()> {
        tracing::debug!(
            kind = K::NAME,
            recorded = self.recorded,
            missed = self.missed,
            "Recorder stopped"
        );
        Ok(())
    }
}
