//! Base station configuration queried over the command session.
//!
//! Each configuration kind implements [`Configurator`]: it holds plain values, and
//! reads or writes them through a [`ProtocolSession`] passed in per call. Queries the
//! base station rejects (for example on an unpaired sensor) leave the field at its
//! reset value. Transport failures propagate.

use super::session::{ProtocolSession, DEFAULT_COMMAND_TIMEOUT};
use crate::data::{default_label, SensorId};
use crate::error::{AppResult, DaqError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration shared by a client and its data clients.
pub type SharedConfiguration = Arc<RwLock<Configuration>>;

/// Capability shared by every configuration kind.
#[async_trait]
pub trait Configurator: Send {
    /// Restore the values a freshly connected base station would report.
    fn reset(&mut self);

    /// Refresh values from the base station.
    async fn get(&mut self, session: &mut ProtocolSession) -> AppResult<bool>;

    /// Push values to the base station.
    async fn set(&mut self, session: &mut ProtocolSession) -> AppResult<bool>;

    /// Human-readable summary.
    fn to_text(&self) -> String;
}

/// Query that tolerates protocol rejections and empty replies.
async fn query_field(
    session: &mut ProtocolSession,
    text: &str,
    timeout: Duration,
) -> AppResult<Option<String>> {
    match session.query(text, timeout).await {
        Ok(reply) if reply.trim().is_empty() => Ok(None),
        Ok(reply) => Ok(Some(reply.trim().to_string())),
        Err(e) if e.is_protocol() => {
            tracing::debug!(query = %text, error = %e, "Query rejected");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn parse_yes(reply: &str) -> bool {
    reply == "YES"
}

/// Configuration of one sensor slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfiguration {
    id: SensorId,
    label: String,
    timeout: Duration,
    paired: bool,
    active: bool,
    kind: Option<char>,
    mode: u32,
    channels: usize,
    emg_channels: usize,
    aux_channels: usize,
    start_index: usize,
    firmware: String,
    serial: String,
    samples_per_frame: Vec<usize>,
    sample_rates: Vec<f64>,
    gains: Vec<f64>,
    units: Vec<String>,
    low_range: bool,
    narrow_bandwidth: bool,
}

impl SensorConfiguration {
    /// Unpaired configuration for sensor `id`.
    pub fn new(id: SensorId) -> Self {
        let mut config = Self {
            id,
            label: default_label(id),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            paired: false,
            active: false,
            kind: None,
            mode: 0,
            channels: 0,
            emg_channels: 0,
            aux_channels: 0,
            start_index: 0,
            firmware: String::new(),
            serial: String::new(),
            samples_per_frame: Vec::new(),
            sample_rates: Vec::new(),
            gains: Vec::new(),
            units: Vec::new(),
            low_range: true,
            narrow_bandwidth: true,
        };
        config.reset();
        config
    }

    /// Paired, active configuration with a known channel layout.
    ///
    /// Every channel runs at `sample_rate`. `start_index` is the 1-based position of
    /// the first EMG value in the data record.
    pub fn active(
        id: SensorId,
        start_index: usize,
        emg_channels: usize,
        aux_channels: usize,
        sample_rate: f64,
    ) -> Self {
        let channels = emg_channels + aux_channels;
        let mut config = Self::new(id);
        config.paired = true;
        config.active = true;
        config.channels = channels;
        config.emg_channels = emg_channels;
        config.aux_channels = aux_channels;
        config.start_index = start_index;
        config.samples_per_frame = vec![1; channels];
        config.sample_rates = vec![sample_rate; channels];
        config.gains = vec![1.0; channels];
        config.units = vec![String::from("V"); channels];
        config
    }

    /// Timeout used for each query.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Sensor slot.
    pub fn id(&self) -> SensorId {
        self.id
    }

    /// Label used for this sensor's samples.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Rename the sensor.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Whether a sensor is paired to this slot.
    pub fn is_paired(&self) -> bool {
        self.paired
    }

    /// Whether the paired sensor is streaming.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Sensor type code.
    pub fn kind(&self) -> Option<char> {
        self.kind
    }

    /// Operating mode.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Total channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// EMG channel count.
    pub fn emg_channels(&self) -> usize {
        self.emg_channels
    }

    /// Auxiliary channel count.
    pub fn aux_channels(&self) -> usize {
        self.aux_channels
    }

    /// 1-based position of the first EMG value in the data record.
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Firmware version.
    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    /// Serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Samples per frame for each channel.
    pub fn samples_per_frame(&self) -> &[usize] {
        &self.samples_per_frame
    }

    /// Sample rate in Hz for each channel.
    pub fn sample_rates(&self) -> &[f64] {
        &self.sample_rates
    }

    /// Gain for each channel.
    pub fn gains(&self) -> &[f64] {
        &self.gains
    }

    /// Units for each channel.
    pub fn units(&self) -> &[String] {
        &self.units
    }

    /// Whether the sensor is in its low input range.
    pub fn low_range(&self) -> bool {
        self.low_range
    }

    /// Whether the sensor uses its narrow bandwidth filter.
    pub fn narrow_bandwidth(&self) -> bool {
        self.narrow_bandwidth
    }

    /// Rate of the first EMG channel.
    pub fn emg_rate(&self) -> Option<f64> {
        if self.emg_channels == 0 {
            return None;
        }
        self.sample_rates.first().copied()
    }

    /// Rate of the first auxiliary channel.
    pub fn aux_rate(&self) -> Option<f64> {
        if self.aux_channels == 0 {
            return None;
        }
        self.sample_rates.get(self.emg_channels).copied()
    }

    fn query_text(&self, field: &str) -> String {
        format!("SENSOR {} {}?", self.id, field)
    }

    fn channel_query_text(&self, channel: usize, field: &str) -> String {
        format!("SENSOR {} CHANNEL {} {}?", self.id, channel + 1, field)
    }

    async fn field(&self, session: &mut ProtocolSession, name: &str) -> AppResult<Option<String>> {
        query_field(session, &self.query_text(name), self.timeout).await
    }

    /// Pair a sensor to this slot and wait for the `COMPLETE` event.
    pub async fn pair(
        &mut self,
        session: &mut ProtocolSession,
        timeout: Duration,
        max_attempts: usize,
    ) -> AppResult<bool> {
        let reply = session
            .query(&format!("SENSOR {} PAIR", self.id), self.timeout)
            .await?;
        let complete =
            reply.contains("COMPLETE") || session.wait_for("COMPLETE", timeout, max_attempts).await?;
        if complete {
            self.paired = true;
            tracing::info!(sensor = %self.id, "Sensor paired");
        }
        Ok(complete)
    }

    /// Change the operating mode.
    pub async fn set_mode(&mut self, session: &mut ProtocolSession, mode: u32) -> AppResult<bool> {
        let text = format!("SENSOR {} SETMODE {}", self.id, mode);
        let ok = session.query(&text, self.timeout).await?.contains("OK");
        if ok {
            self.mode = mode;
        }
        Ok(ok)
    }

    /// Switch between low and high input range.
    pub async fn set_range(&mut self, session: &mut ProtocolSession, low: bool) -> AppResult<bool> {
        let value = if low { "LOW" } else { "HIGH" };
        let text = format!("SENSOR {} SETRANGE {}", self.id, value);
        let ok = session.query(&text, self.timeout).await?.contains("OK");
        if ok {
            self.low_range = low;
        }
        Ok(ok)
    }

    /// Switch between narrow and wide bandwidth.
    pub async fn set_bandwidth(
        &mut self,
        session: &mut ProtocolSession,
        narrow: bool,
    ) -> AppResult<bool> {
        let value = if narrow { "NARROW" } else { "WIDE" };
        let text = format!("SENSOR {} SETBANDWIDTH {}", self.id, value);
        let ok = session.query(&text, self.timeout).await?.contains("OK");
        if ok {
            self.narrow_bandwidth = narrow;
        }
        Ok(ok)
    }

    async fn parsed<T: FromStr>(
        &self,
        session: &mut ProtocolSession,
        text: &str,
    ) -> AppResult<Option<T>> {
        let reply = query_field(session, text, self.timeout).await?;
        Ok(reply.and_then(|r| r.parse().ok()))
    }

    async fn get_channels(&mut self, session: &mut ProtocolSession) -> AppResult<()> {
        let n = self.channels;
        self.samples_per_frame = vec![0; n];
        self.sample_rates = vec![0.0; n];
        self.gains = vec![0.0; n];
        self.units = vec![String::new(); n];
        // Channel numbers on the wire are 1-based.
        for ch in 0..n {
            let text = self.channel_query_text(ch, "SAMPLES");
            if let Some(v) = self.parsed(session, &text).await? {
                self.samples_per_frame[ch] = v;
            }
            let text = self.channel_query_text(ch, "RATE");
            if let Some(v) = self.parsed(session, &text).await? {
                self.sample_rates[ch] = v;
            }
            let text = self.channel_query_text(ch, "GAIN");
            if let Some(v) = self.parsed(session, &text).await? {
                self.gains[ch] = v;
            }
            let text = self.channel_query_text(ch, "UNITS");
            if let Some(v) = query_field(session, &text, self.timeout).await? {
                self.units[ch] = v;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Configurator for SensorConfiguration {
    fn reset(&mut self) {
        self.active = false;
        self.kind = None;
        self.mode = 0;
        self.channels = 0;
        self.emg_channels = 0;
        self.aux_channels = 0;
        self.start_index = 0;
        self.firmware = String::from("UNKNOWN");
        self.serial = String::from("UNKNOWN");
        self.samples_per_frame.clear();
        self.sample_rates.clear();
        self.gains.clear();
        self.units.clear();
        self.low_range = true;
        self.narrow_bandwidth = true;
    }

    async fn get(&mut self, session: &mut ProtocolSession) -> AppResult<bool> {
        if let Some(reply) = self.field(session, "PAIRED").await? {
            self.paired = parse_yes(&reply);
        }
        // Further queries on an unpaired slot return garbage.
        if !self.paired {
            self.reset();
            return Ok(false);
        }
        if let Some(reply) = self.field(session, "ACTIVE").await? {
            self.active = parse_yes(&reply);
        }
        if !self.active {
            self.reset();
            return Ok(false);
        }

        if let Some(reply) = self.field(session, "TYPE").await? {
            self.kind = reply.chars().next();
        }
        if let Some(v) = self.parsed(session, &self.query_text("MODE")).await? {
            self.mode = v;
        }
        if let Some(v) = self.parsed(session, &self.query_text("CHANNELCOUNT")).await? {
            self.channels = v;
        }
        if let Some(v) = self.parsed(session, &self.query_text("EMGCHANNELCOUNT")).await? {
            self.emg_channels = v;
        }
        if let Some(v) = self.parsed(session, &self.query_text("AUXCHANNELCOUNT")).await? {
            self.aux_channels = v;
        }
        if let Some(v) = self.parsed(session, &self.query_text("STARTINDEX")).await? {
            self.start_index = v;
        }
        if let Some(v) = self.field(session, "FIRMWARE").await? {
            self.firmware = v;
        }
        if let Some(v) = self.field(session, "SERIAL").await? {
            self.serial = v;
        }
        self.get_channels(session).await?;
        match self.field(session, "RANGE").await?.as_deref() {
            Some("LOW") => self.low_range = true,
            Some("HIGH") => self.low_range = false,
            _ => {}
        }
        match self.field(session, "BANDWIDTH").await?.as_deref() {
            Some("NARROW") => self.narrow_bandwidth = true,
            Some("WIDE") => self.narrow_bandwidth = false,
            _ => {}
        }
        Ok(true)
    }

    async fn set(&mut self, session: &mut ProtocolSession) -> AppResult<bool> {
        if !self.paired {
            return Ok(false);
        }
        let mode = self.set_mode(session, self.mode).await?;
        let range = self.set_range(session, self.low_range).await?;
        let bandwidth = self.set_bandwidth(session, self.narrow_bandwidth).await?;
        Ok(mode && range && bandwidth)
    }

    fn to_text(&self) -> String {
        let mut text = format!("SENSOR #{} ({})", self.id, self.label);
        if !self.paired {
            text.push_str(": not paired");
            return text;
        }
        let _ = write!(
            text,
            ": {} type={} mode={} channels={} (emg={}, aux={}) start={} rates={:?} firmware={} serial={}",
            if self.active { "active" } else { "inactive" },
            self.kind.map(String::from).unwrap_or_else(|| "?".into()),
            self.mode,
            self.channels,
            self.emg_channels,
            self.aux_channels,
            self.start_index,
            self.sample_rates,
            self.firmware,
            self.serial,
        );
        text
    }
}

/// Configuration of every sensor slot of a base station.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    sensors: Vec<SensorConfiguration>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    /// One unpaired configuration per sensor slot.
    pub fn new() -> Self {
        Self {
            sensors: SensorId::all().map(SensorConfiguration::new).collect(),
        }
    }

    /// Configuration built from known sensor layouts; other slots stay unpaired.
    pub fn from_sensors(sensors: impl IntoIterator<Item = SensorConfiguration>) -> Self {
        let mut config = Self::new();
        for sensor in sensors {
            let index = sensor.id().index();
            config.sensors[index] = sensor;
        }
        config
    }

    /// Wrap into a shared handle.
    pub fn into_shared(self) -> SharedConfiguration {
        Arc::new(RwLock::new(self))
    }

    /// Configuration of sensor `id`.
    pub fn sensor(&self, id: SensorId) -> &SensorConfiguration {
        &self.sensors[id.index()]
    }

    /// Mutable configuration of sensor `id`.
    pub fn sensor_mut(&mut self, id: SensorId) -> &mut SensorConfiguration {
        &mut self.sensors[id.index()]
    }

    /// All sensor configurations in slot order.
    pub fn iter(&self) -> std::slice::Iter<'_, SensorConfiguration> {
        self.sensors.iter()
    }

    /// Sensors that are currently streaming.
    pub fn active(&self) -> Vec<SensorId> {
        self.sensors
            .iter()
            .filter(|s| s.is_active())
            .map(SensorConfiguration::id)
            .collect()
    }

    /// Sensors that are paired.
    pub fn paired(&self) -> Vec<SensorId> {
        self.sensors
            .iter()
            .filter(|s| s.is_paired())
            .map(SensorConfiguration::id)
            .collect()
    }

    /// Label of sensor `id`.
    pub fn label(&self, id: SensorId) -> &str {
        self.sensor(id).label()
    }

    /// Rename sensor `id`.
    pub fn set_label(&mut self, id: SensorId, label: impl Into<String>) {
        self.sensor_mut(id).set_label(label);
    }

    /// Set the query timeout on every sensor.
    pub fn set_timeout(&mut self, timeout: Duration) {
        for sensor in &mut self.sensors {
            sensor.set_timeout(timeout);
        }
    }
}

#[async_trait]
impl Configurator for Configuration {
    fn reset(&mut self) {
        for sensor in &mut self.sensors {
            sensor.reset();
        }
    }

    async fn get(&mut self, session: &mut ProtocolSession) -> AppResult<bool> {
        for sensor in &mut self.sensors {
            sensor.get(session).await?;
        }
        tracing::info!(active = ?self.active(), "Sensor configuration refreshed");
        Ok(true)
    }

    async fn set(&mut self, session: &mut ProtocolSession) -> AppResult<bool> {
        let mut ok = true;
        for sensor in self.sensors.iter_mut().filter(|s| s.is_paired()) {
            ok &= sensor.set(session).await?;
        }
        Ok(ok)
    }

    fn to_text(&self) -> String {
        self.sensors
            .iter()
            .map(SensorConfiguration::to_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Acquisition start/stop and trigger state.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemControl {
    timeout: Duration,
    running: bool,
    trigger_start: bool,
    trigger_stop: bool,
}

impl Default for SystemControl {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
            running: false,
            trigger_start: false,
            trigger_stop: false,
        }
    }
}

impl SystemControl {
    /// Timeout used for each command.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Whether acquisition was started by this control.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether acquisition starts on an external trigger.
    pub fn trigger_start(&self) -> bool {
        self.trigger_start
    }

    /// Whether acquisition stops on an external trigger.
    pub fn trigger_stop(&self) -> bool {
        self.trigger_stop
    }

    async fn ensure_master(&self, session: &mut ProtocolSession) -> AppResult<()> {
        let reply = session.query("MASTER?", self.timeout).await?;
        if reply != "YES" {
            return Err(DaqError::Protocol {
                command: "MASTER?".into(),
                response: reply,
            });
        }
        Ok(())
    }

    /// Start streaming. Requires a master connection.
    pub async fn start(&mut self, session: &mut ProtocolSession) -> AppResult<()> {
        self.ensure_master(session).await?;
        session.command("START", "", self.timeout).await?;
        self.running = true;
        tracing::info!("Acquisition started");
        Ok(())
    }

    /// Stop streaming. Requires a master connection.
    pub async fn stop(&mut self, session: &mut ProtocolSession) -> AppResult<()> {
        self.ensure_master(session).await?;
        session.command("STOP", "", self.timeout).await?;
        self.running = false;
        tracing::info!("Acquisition stopped");
        Ok(())
    }
}

#[async_trait]
impl Configurator for SystemControl {
    fn reset(&mut self) {
        self.running = false;
        self.trigger_start = false;
        self.trigger_stop = false;
    }

    async fn get(&mut self, session: &mut ProtocolSession) -> AppResult<bool> {
        if let Some(reply) = query_field(session, "TRIGGER?", self.timeout).await? {
            self.trigger_start = reply.contains("START ON");
            self.trigger_stop = reply.contains("STOP ON");
        }
        Ok(true)
    }

    async fn set(&mut self, session: &mut ProtocolSession) -> AppResult<bool> {
        let start = if self.trigger_start { "ON" } else { "OFF" };
        let stop = if self.trigger_stop { "ON" } else { "OFF" };
        let a = session
            .command(&format!("TRIGGER START {}", start), "OK", self.timeout)
            .await?;
        let b = session
            .command(&format!("TRIGGER STOP {}", stop), "OK", self.timeout)
            .await?;
        Ok(a && b)
    }

    fn to_text(&self) -> String {
        format!(
            "SYSTEM: running={} trigger start={} stop={}",
            self.running, self.trigger_start, self.trigger_stop
        )
    }
}

/// Firmware and serial number of the base station.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseInformation {
    timeout: Duration,
    firmware: String,
    serial: String,
}

impl Default for BaseInformation {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
            firmware: String::from("UNKNOWN"),
            serial: String::from("UNKNOWN"),
        }
    }
}

impl BaseInformation {
    /// Base firmware version.
    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    /// Base serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }
}

#[async_trait]
impl Configurator for BaseInformation {
    fn reset(&mut self) {
        self.firmware = String::from("UNKNOWN");
        self.serial = String::from("UNKNOWN");
    }

    async fn get(&mut self, session: &mut ProtocolSession) -> AppResult<bool> {
        if let Some(v) = query_field(session, "BASE FIRMWARE?", self.timeout).await? {
            self.firmware = v;
        }
        if let Some(v) = query_field(session, "BASE SERIAL?", self.timeout).await? {
            self.serial = v;
        }
        Ok(true)
    }

    /// Read-only on the base station.
    async fn set(&mut self, _session: &mut ProtocolSession) -> AppResult<bool> {
        Ok(false)
    }

    fn to_text(&self) -> String {
        format!("BASE: firmware={} serial={}", self.firmware, self.serial)
    }
}

/// Properties of the command connection itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfiguration {
    timeout: Duration,
    version: String,
    master: bool,
    backwards_compatibility: bool,
    upsampling: bool,
    big_endian: bool,
    max_emg_samples: usize,
    max_aux_samples: usize,
    frame_interval: f64,
}

impl Default for ConnectionConfiguration {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
            version: String::from("UNKNOWN"),
            master: false,
            backwards_compatibility: false,
            upsampling: false,
            big_endian: false,
            max_emg_samples: 0,
            max_aux_samples: 0,
            frame_interval: 0.0,
        }
    }
}

impl ConnectionConfiguration {
    /// Protocol version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether this connection controls acquisition.
    pub fn is_master(&self) -> bool {
        self.master
    }

    /// Whether fixed legacy sample rates are used.
    pub fn backwards_compatibility(&self) -> bool {
        self.backwards_compatibility
    }

    /// Whether upsampling is enabled.
    pub fn upsampling(&self) -> bool {
        self.upsampling
    }

    /// Whether the data channels are big-endian.
    pub fn big_endian(&self) -> bool {
        self.big_endian
    }

    /// Samples per EMG frame.
    pub fn max_emg_samples(&self) -> usize {
        self.max_emg_samples
    }

    /// Samples per auxiliary frame.
    pub fn max_aux_samples(&self) -> usize {
        self.max_aux_samples
    }

    /// Frame interval in seconds.
    pub fn frame_interval(&self) -> f64 {
        self.frame_interval
    }

    /// Request master status for this connection.
    pub async fn set_master(&mut self, session: &mut ProtocolSession) -> AppResult<bool> {
        let reply = session.query("MASTER", self.timeout).await?;
        if reply.contains("NEW MASTER") {
            self.master = true;
        }
        Ok(self.master)
    }

    /// Toggle legacy fixed sample rates.
    pub async fn set_backwards_compatibility(
        &mut self,
        session: &mut ProtocolSession,
        enabled: bool,
    ) -> AppResult<bool> {
        let text = format!("BACKWARDS COMPATIBILITY {}", if enabled { "ON" } else { "OFF" });
        let ok = session.query(&text, self.timeout).await?.contains("OK");
        if ok {
            self.backwards_compatibility = enabled;
        }
        Ok(ok)
    }

    /// Toggle upsampling.
    pub async fn set_upsampling(
        &mut self,
        session: &mut ProtocolSession,
        enabled: bool,
    ) -> AppResult<bool> {
        let text = format!("UPSAMPLE {}", if enabled { "ON" } else { "OFF" });
        let ok = session.query(&text, self.timeout).await?.contains("OK");
        if ok {
            self.upsampling = enabled;
        }
        Ok(ok)
    }
}

#[async_trait]
impl Configurator for ConnectionConfiguration {
    fn reset(&mut self) {
        let timeout = self.timeout;
        *self = Self {
            timeout,
            ..Self::default()
        };
    }

    async fn get(&mut self, session: &mut ProtocolSession) -> AppResult<bool> {
        let t = self.timeout;
        if let Some(v) = query_field(session, "VERSION?", t).await? {
            self.version = v;
        }
        if let Some(v) = query_field(session, "MASTER?", t).await? {
            self.master = parse_yes(&v);
        }
        if let Some(v) = query_field(session, "BACKWARDS COMPATIBILITY?", t).await? {
            self.backwards_compatibility = parse_yes(&v);
        }
        if let Some(v) = query_field(session, "UPSAMPLING?", t).await? {
            self.upsampling = parse_yes(&v);
        }
        if let Some(v) = query_field(session, "ENDIANESS?", t).await? {
            self.big_endian = v == "BIG";
        }
        let reply = query_field(session, "MAX SAMPLES EMG?", t).await?;
        if let Some(v) = reply.and_then(|r| r.parse().ok()) {
            self.max_emg_samples = v;
        }
        let reply = query_field(session, "MAX SAMPLES AUX?", t).await?;
        if let Some(v) = reply.and_then(|r| r.parse().ok()) {
            self.max_aux_samples = v;
        }
        let reply = query_field(session, "FRAME INTERVAL?", t).await?;
        if let Some(v) = reply.and_then(|r| r.parse().ok()) {
            self.frame_interval = v;
        }
        Ok(true)
    }

    async fn set(&mut self, session: &mut ProtocolSession) -> AppResult<bool> {
        let compat = self.backwards_compatibility;
        let upsampling = self.upsampling;
        let a = self.set_backwards_compatibility(session, compat).await?;
        let b = self.set_upsampling(session, upsampling).await?;
        Ok(a && b)
    }

    fn to_text(&self) -> String {
        format!(
            "CONNECTION: version={} master={} backwards_compatibility={} upsampling={} endianess={} \
             max_samples(emg={}, aux={}) frame_interval={}",
            self.version,
            self.master,
            self.backwards_compatibility,
            self.upsampling,
            if self.big_endian { "BIG" } else { "LITTLE" },
            self.max_emg_samples,
            self.max_aux_samples,
            self.frame_interval,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> SensorId {
        SensorId::new(n).unwrap()
    }

    #[test]
    fn test_default_configuration_has_all_slots() {
        let config = Configuration::new();
        assert_eq!(config.iter().count(), SensorId::COUNT);
        assert!(config.active().is_empty());
        assert_eq!(config.label(id(4)), "sensor4");
    }

    #[test]
    fn test_from_sensors_places_by_slot() {
        let config = Configuration::from_sensors([
            SensorConfiguration::active(id(2), 2, 1, 0, 2000.0),
            SensorConfiguration::active(id(5), 5, 1, 6, 2000.0),
        ]);
        assert_eq!(config.active(), vec![id(2), id(5)]);
        assert_eq!(config.sensor(id(5)).aux_channels(), 6);
        assert_eq!(config.sensor(id(5)).aux_rate(), Some(2000.0));
        assert_eq!(config.sensor(id(2)).aux_rate(), None);
    }

    #[test]
    fn test_reset_keeps_pairing_and_label() {
        let mut sensor = SensorConfiguration::active(id(1), 1, 1, 0, 1000.0);
        sensor.set_label("biceps");
        sensor.reset();
        assert!(sensor.is_paired());
        assert!(!sensor.is_active());
        assert_eq!(sensor.label(), "biceps");
        assert_eq!(sensor.firmware(), "UNKNOWN");
    }

    #[test]
    fn test_to_text() {
        let config = Configuration::from_sensors([SensorConfiguration::active(id(1), 1, 1, 0, 2.0)]);
        let text = config.to_text();
        assert!(text.starts_with("SENSOR #1 (sensor1): active"));
        assert!(text.contains("SENSOR #2 (sensor2): not paired"));
    }
}
