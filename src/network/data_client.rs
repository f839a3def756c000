//! Streaming frame decoder for the binary data channels.
//!
//! A [`DataClient`] performs one fixed-size read per frame and slices the record into
//! per-sensor samples. Where each sensor's values live in the record is the only
//! thing that differs between data channels; it is captured by [`SensorKind`].
//!
//! ```text
//!  EMG record (16 values)     | s1 | s2 | s3 | ... | s16 |
//!  AUX record (144 values)    | s1: 9 values | s2: 9 values | ... | s16 |
//! ```
//!
//! With a shared [`Configuration`] the layout follows what the base station reported,
//! and sensors that are not active are skipped. Without one the fixed slot layout of
//! the kind is used.

use super::configuration::{Configuration, SensorConfiguration, SharedConfiguration};
use super::transport::Transport;
use crate::data::{default_label, Frame, Sample, SensorId, Stamped, StampedFrame, VALUE_SIZE};
use crate::error::{AppResult, DaqError};
use std::marker::PhantomData;
use std::time::Duration;

/// Default EMG data port.
pub const EMG_DATA_PORT: u16 = 50043;

/// Default auxiliary data port.
pub const AUX_DATA_PORT: u16 = 50044;

/// Default timeout for a single record read.
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_millis(15);

/// Position of one sensor's values in a record, in values (not bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Index of the first value.
    pub offset: usize,
    /// Number of consecutive values.
    pub channels: usize,
}

/// Record layout of a data channel.
pub trait SensorKind: Send + Sync + 'static {
    /// Short name used in logs.
    const NAME: &'static str;

    /// Values in one record.
    const RECORD_CHANNELS: usize;

    /// Default port of the data channel.
    const DEFAULT_PORT: u16;

    /// Slot of `sensor`, or `None` when it contributes no values.
    fn slot(sensor: SensorId, config: Option<&SensorConfiguration>) -> AppResult<Option<Slot>>;

    /// Sample rate of the channel according to `config`.
    fn sample_rate(config: &Configuration) -> Option<f64>;
}

/// EMG data channel: one value slot per sensor, positioned by its start index.
#[derive(Debug, Clone, Copy, Default)]
pub struct Emg;

impl SensorKind for Emg {
    const NAME: &'static str = "emg";
    const RECORD_CHANNELS: usize = SensorId::COUNT;
    const DEFAULT_PORT: u16 = EMG_DATA_PORT;

    fn slot(sensor: SensorId, config: Option<&SensorConfiguration>) -> AppResult<Option<Slot>> {
        let Some(config) = config else {
            return Ok(Some(Slot {
                offset: sensor.index(),
                channels: 1,
            }));
        };
        if !config.is_active() || config.emg_channels() == 0 {
            return Ok(None);
        }
        // Start indices are 1-based.
        let offset = config.start_index().checked_sub(1).ok_or_else(|| {
            DaqError::Layout(format!("sensor {} reports start index 0", sensor))
        })?;
        Ok(Some(Slot {
            offset,
            channels: config.emg_channels(),
        }))
    }

    fn sample_rate(config: &Configuration) -> Option<f64> {
        // All channels of a port share one rate.
        config
            .iter()
            .filter(|s| s.is_active())
            .find_map(SensorConfiguration::emg_rate)
    }
}

/// Auxiliary data channel: nine value slots per sensor, in sensor order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aux;

impl Aux {
    /// Value slots reserved per sensor.
    pub const SLOTS_PER_SENSOR: usize = 9;
}

impl SensorKind for Aux {
    const NAME: &'static str = "aux";
    const RECORD_CHANNELS: usize = SensorId::COUNT * Aux::SLOTS_PER_SENSOR;
    const DEFAULT_PORT: u16 = AUX_DATA_PORT;

    fn slot(sensor: SensorId, config: Option<&SensorConfiguration>) -> AppResult<Option<Slot>> {
        let offset = sensor.index() * Self::SLOTS_PER_SENSOR;
        match config {
            None => Ok(Some(Slot {
                offset,
                channels: Self::SLOTS_PER_SENSOR,
            })),
            Some(c) if !c.is_active() || c.aux_channels() == 0 => Ok(None),
            Some(c) => Ok(Some(Slot {
                offset,
                channels: c.aux_channels(),
            })),
        }
    }

    fn sample_rate(config: &Configuration) -> Option<f64> {
        config
            .iter()
            .filter(|s| s.is_active())
            .find_map(SensorConfiguration::aux_rate)
    }
}

/// Decoder bound to one binary data channel.
#[derive(Debug)]
pub struct DataClient<K: SensorKind> {
    transport: Transport,
    buffer: Vec<u8>,
    frame_index: u64,
    sample_rate: f64,
    configuration: Option<SharedConfiguration>,
    endpoint: Option<(String, u16, Duration)>,
    kind: PhantomData<K>,
}

/// Decoder for the EMG data channel.
pub type EmgDataClient = DataClient<Emg>;

/// Decoder for the auxiliary data channel.
pub type AuxDataClient = DataClient<Aux>;

impl<K: SensorKind> DataClient<K> {
    /// Decoder sized for a full record of its kind.
    pub fn new(configuration: Option<SharedConfiguration>) -> Self {
        Self::with_channels(K::RECORD_CHANNELS, configuration)
    }

    /// Decoder whose records hold `channels` values.
    pub fn with_channels(channels: usize, configuration: Option<SharedConfiguration>) -> Self {
        let mut client = Self {
            transport: Transport::new(),
            buffer: vec![0; channels * VALUE_SIZE],
            frame_index: 0,
            sample_rate: 0.0,
            configuration,
            endpoint: None,
            kind: PhantomData,
        };
        client.reset();
        client
    }

    /// Connect the data channel and reset the frame counter.
    pub async fn connect(&mut self, address: &str, port: u16, timeout: Duration) -> AppResult<()> {
        self.transport.connect(address, port, timeout).await?;
        self.endpoint = Some((address.to_string(), port, timeout));
        self.reset();
        tracing::info!(kind = K::NAME, port, sample_rate = self.sample_rate, "Data channel connected");
        Ok(())
    }

    /// Close the data channel. Calling it twice is harmless.
    pub async fn disconnect(&mut self) {
        self.transport.disconnect().await;
    }

    /// Whether the data channel is open.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Zero the frame counter and take the sample rate from the configuration.
    pub fn reset(&mut self) {
        self.frame_index = 0;
        if let Some(config) = &self.configuration {
            if let Some(rate) = K::sample_rate(&config.read()) {
                self.sample_rate = rate;
            }
        }
    }

    /// Override the sample rate used for timestamps.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// Sample rate used for timestamps, in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of stamped frames read since the last reset.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Values per record.
    pub fn channels(&self) -> usize {
        self.buffer.len() / VALUE_SIZE
    }

    /// Configuration used for decoding.
    pub fn configuration(&self) -> Option<&SharedConfiguration> {
        self.configuration.as_ref()
    }

    /// Sensors a full-width read decodes.
    pub fn sensors(&self) -> Vec<SensorId> {
        match &self.configuration {
            Some(config) => config.read().active(),
            None => SensorId::all_list(),
        }
    }

    /// Read one record and decode the requested sensors.
    pub async fn read(&mut self, sensors: &[SensorId], timeout: Duration) -> AppResult<Frame> {
        self.receive(timeout).await?;
        self.decode(sensors)
    }

    /// Read one record and stamp it with `frame_index / sample_rate`.
    pub async fn read_stamped(
        &mut self,
        sensors: &[SensorId],
        timeout: Duration,
    ) -> AppResult<StampedFrame> {
        self.check_rate()?;
        self.receive(timeout).await?;
        let frame = self.decode(sensors)?;
        Ok(Stamped::new(self.next_timestamp(), frame))
    }

    /// Read one record into a caller-owned frame.
    ///
    /// Samples are overwritten in place when `out` already has the decoded shape.
    pub async fn read_into(
        &mut self,
        out: &mut Frame,
        sensors: &[SensorId],
        timeout: Duration,
    ) -> AppResult<()> {
        self.receive(timeout).await?;
        self.decode_into(out, sensors)
    }

    /// Stamped variant of [`DataClient::read_into`].
    pub async fn read_stamped_into(
        &mut self,
        out: &mut StampedFrame,
        sensors: &[SensorId],
        timeout: Duration,
    ) -> AppResult<()> {
        self.check_rate()?;
        self.receive(timeout).await?;
        self.decode_into(&mut out.value, sensors)?;
        out.timestamp = self.next_timestamp();
        Ok(())
    }

    /// Whether a full record arrives within `timeout`.
    ///
    /// Never fails: read and decode errors report `false`. A deadline closes the
    /// channel, so it is reopened on the last endpoint before returning.
    pub async fn wait_for_data(&mut self, timeout: Duration) -> bool {
        match self.receive(timeout).await {
            Ok(()) => {
                let sensors = self.sensors();
                if let Err(e) = self.decode(&sensors) {
                    tracing::debug!(kind = K::NAME, error = %e, "Record not decodable yet");
                }
                true
            }
            Err(e) => {
                tracing::debug!(kind = K::NAME, error = %e, "No data yet");
                if !self.transport.is_connected() {
                    self.reopen().await;
                }
                false
            }
        }
    }

    /// Slice the last record into a frame holding the requested sensors.
    pub fn decode(&self, sensors: &[SensorId]) -> AppResult<Frame> {
        let config = self.configuration.as_ref().map(|c| c.read());
        let mut frame = Frame::new();
        for &sensor in sensors {
            let sensor_config = config.as_ref().map(|c| c.sensor(sensor));
            let Some(slot) = K::slot(sensor, sensor_config)? else {
                continue;
            };
            let raw = self.slot_bytes(sensor, slot)?;
            let label = sensor_config
                .map(|c| c.label().to_string())
                .unwrap_or_else(|| default_label(sensor));
            frame.push(label, Sample::from_bytes(sensor, slot.channels, raw)?);
        }
        Ok(frame)
    }

    /// Decode into `out`, reusing its samples when the layout matches.
    pub fn decode_into(&self, out: &mut Frame, sensors: &[SensorId]) -> AppResult<()> {
        let config = self.configuration.as_ref().map(|c| c.read());
        let mut slots = Vec::with_capacity(sensors.len());
        for &sensor in sensors {
            let sensor_config = config.as_ref().map(|c| c.sensor(sensor));
            if let Some(slot) = K::slot(sensor, sensor_config)? {
                slots.push((sensor, slot));
            }
        }
        drop(config);

        let same_shape = out.len() == slots.len()
            && out
                .iter()
                .zip(&slots)
                .all(|(e, (id, slot))| e.sample.id() == *id && e.sample.len() == slot.channels);
        if !same_shape {
            *out = self.decode(sensors)?;
            return Ok(());
        }
        for (entry, (sensor, slot)) in out.iter_mut().zip(slots) {
            let raw = self.slot_bytes(sensor, slot)?;
            entry.sample.load_bytes(raw)?;
        }
        Ok(())
    }

    /// Raw bytes of the last record.
    pub fn raw(&self) -> &[u8] {
        &self.buffer
    }

    fn slot_bytes(&self, sensor: SensorId, slot: Slot) -> AppResult<&[u8]> {
        let start = slot.offset * VALUE_SIZE;
        let end = start + slot.channels * VALUE_SIZE;
        self.buffer.get(start..end).ok_or_else(|| {
            DaqError::Layout(format!(
                "sensor {} needs bytes {}..{} of a {}-byte record",
                sensor,
                start,
                end,
                self.buffer.len()
            ))
        })
    }

    async fn receive(&mut self, timeout: Duration) -> AppResult<()> {
        self.transport.read(&mut self.buffer, timeout).await
    }

    fn check_rate(&self) -> AppResult<()> {
        if self.sample_rate > 0.0 {
            Ok(())
        } else {
            Err(DaqError::Configuration(format!(
                "{} data client has no sample rate",
                K::NAME
            )))
        }
    }

    fn next_timestamp(&mut self) -> f64 {
        let timestamp = self.frame_index as f64 / self.sample_rate;
        self.frame_index += 1;
        timestamp
    }

    async fn reopen(&mut self) {
        if self.endpoint.is_none() {
            return;
        }
        if let Err(e) = self.reconnect().await {
            tracing::warn!(kind = K::NAME, error = %e, "Failed to reopen data channel");
        }
    }

    /// Reopen the data channel on the last connected endpoint, keeping the frame
    /// counter.
    pub async fn reconnect(&mut self) -> AppResult<()> {
        let (address, port, timeout) = self.endpoint.clone().ok_or(DaqError::NotConnected)?;
        self.transport.connect(&address, port, timeout).await
    }
}
