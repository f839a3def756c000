//! Loopback base station for tests and demos.
//!
//! [`MockBaseStation`] is a script: a version banner, a query → reply table and the
//! binary records each data channel replays. [`MockBaseStation::bind`] opens loopback
//! listeners for the command and both data channels and serves the script until the
//! returned [`RunningBaseStation`] is dropped.
//!
//! Queries missing from the table are answered with `INVALID COMMAND`. Unless
//! scripted, `MASTER` and `MASTER?` claim master status and `START`/`STOP` are
//! accepted without a reply.

use super::configuration::SensorConfiguration;
use crate::data::VALUE_SIZE;
use crate::error::AppResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Banner sent on every command connection.
pub const DEFAULT_VERSION: &str = "Delsys Trigno System Digital Protocol Version 3.6.0";

const REPLY_TERMINATION: &str = "\r\n\r\n";

/// Records replayed by one data channel.
#[derive(Debug, Clone, Default)]
struct DataScript {
    records: Vec<Vec<f32>>,
    interval: Duration,
}

/// Scripted base station.
#[derive(Debug, Clone)]
pub struct MockBaseStation {
    version: String,
    replies: HashMap<String, Vec<String>>,
    emg: DataScript,
    aux: DataScript,
    stream_on_start: bool,
    start_delay: Duration,
}

impl Default for MockBaseStation {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBaseStation {
    /// Base station with no sensors and silent data channels.
    pub fn new() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            replies: HashMap::new(),
            emg: DataScript::default(),
            aux: DataScript::default(),
            stream_on_start: false,
            start_delay: Duration::ZERO,
        }
    }

    /// Replace the version banner.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Answer `query` with a single line.
    pub fn with_reply(self, query: impl Into<String>, reply: impl Into<String>) -> Self {
        self.with_lines(query, [reply.into()])
    }

    /// Answer `query` with several lines, sent in order.
    pub fn with_lines<I, S>(mut self, query: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies
            .insert(query.into(), lines.into_iter().map(Into::into).collect());
        self
    }

    /// Answer the configuration queries of a sensor.
    pub fn with_sensor(mut self, sensor: &SensorConfiguration) -> Self {
        let id = sensor.id();
        let yes_no = |b: bool| if b { "YES" } else { "NO" };
        let mut add = |field: &str, reply: String| {
            self.replies
                .insert(format!("SENSOR {} {}?", id, field), vec![reply]);
        };
        add("PAIRED", yes_no(sensor.is_paired()).into());
        add("ACTIVE", yes_no(sensor.is_active()).into());
        add("TYPE", sensor.kind().unwrap_or('D').to_string());
        add("MODE", sensor.mode().to_string());
        add("CHANNELCOUNT", sensor.channels().to_string());
        add("EMGCHANNELCOUNT", sensor.emg_channels().to_string());
        add("AUXCHANNELCOUNT", sensor.aux_channels().to_string());
        add("STARTINDEX", sensor.start_index().to_string());
        add("FIRMWARE", "40.45".into());
        add("SERIAL", format!("SN-{:04}", id.get()));
        add("RANGE", if sensor.low_range() { "LOW" } else { "HIGH" }.into());
        add(
            "BANDWIDTH",
            if sensor.narrow_bandwidth() { "NARROW" } else { "WIDE" }.into(),
        );
        for ch in 0..sensor.channels() {
            let channel = |field: &str| format!("SENSOR {} CHANNEL {} {}?", id, ch + 1, field);
            let rate = sensor.sample_rates().get(ch).copied().unwrap_or_default();
            let gain = sensor.gains().get(ch).copied().unwrap_or(1.0);
            let units = sensor.units().get(ch).cloned().unwrap_or_else(|| "V".into());
            self.replies.insert(channel("SAMPLES"), vec!["1".into()]);
            self.replies.insert(channel("RATE"), vec![rate.to_string()]);
            self.replies.insert(channel("GAIN"), vec![gain.to_string()]);
            self.replies.insert(channel("UNITS"), vec![units]);
        }
        self
    }

    /// Records replayed on every EMG data connection, `interval` apart.
    pub fn with_emg_records(mut self, records: Vec<Vec<f32>>, interval: Duration) -> Self {
        self.emg = DataScript { records, interval };
        self
    }

    /// Records replayed on every auxiliary data connection, `interval` apart.
    pub fn with_aux_records(mut self, records: Vec<Vec<f32>>, interval: Duration) -> Self {
        self.aux = DataScript { records, interval };
        self
    }

    /// Hold data back until `START` is received, then wait `delay` more.
    pub fn stream_after_start(mut self, delay: Duration) -> Self {
        self.stream_on_start = true;
        self.start_delay = delay;
        self
    }

    /// Open loopback listeners and serve the script.
    pub async fn bind(self) -> AppResult<RunningBaseStation> {
        let command = TcpListener::bind("127.0.0.1:0").await?;
        let emg = TcpListener::bind("127.0.0.1:0").await?;
        let aux = TcpListener::bind("127.0.0.1:0").await?;
        let command_port = command.local_addr()?.port();
        let emg_port = emg.local_addr()?.port();
        let aux_port = aux.local_addr()?.port();

        let (started_tx, started_rx) = watch::channel(!self.stream_on_start);
        let shared = Arc::new(Shared {
            version: self.version,
            replies: self.replies,
            received: Mutex::new(Vec::new()),
            started: started_tx,
        });

        let mut tasks = Vec::with_capacity(3);
        tasks.push(tokio::spawn(serve_commands(command, Arc::clone(&shared))));
        for (listener, script) in [(emg, self.emg), (aux, self.aux)] {
            tasks.push(tokio::spawn(serve_data(
                listener,
                script,
                started_rx.clone(),
                self.start_delay,
            )));
        }

        tracing::debug!(command_port, emg_port, aux_port, "Mock base station listening");
        Ok(RunningBaseStation {
            command_port,
            emg_port,
            aux_port,
            shared,
            tasks,
        })
    }
}

#[derive(Debug)]
struct Shared {
    version: String,
    replies: HashMap<String, Vec<String>>,
    received: Mutex<Vec<String>>,
    started: watch::Sender<bool>,
}

impl Shared {
    fn reply(&self, query: &str) -> Vec<String> {
        if let Some(lines) = self.replies.get(query) {
            if query == "START" {
                self.started.send_replace(true);
            }
            return lines.clone();
        }
        let line = match query {
            "MASTER" => "NEW MASTER",
            "MASTER?" => "YES",
            "START" => {
                self.started.send_replace(true);
                return Vec::new();
            }
            "STOP" => return Vec::new(),
            _ => "INVALID COMMAND",
        };
        vec![line.to_string()]
    }
}

/// Base station served on loopback; stops when dropped.
#[derive(Debug)]
pub struct RunningBaseStation {
    command_port: u16,
    emg_port: u16,
    aux_port: u16,
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningBaseStation {
    /// Loopback address of every channel.
    pub fn address(&self) -> &'static str {
        "127.0.0.1"
    }

    /// Command channel port.
    pub fn command_port(&self) -> u16 {
        self.command_port
    }

    /// EMG data channel port.
    pub fn emg_port(&self) -> u16 {
        self.emg_port
    }

    /// Auxiliary data channel port.
    pub fn aux_port(&self) -> u16 {
        self.aux_port
    }

    /// Commands received so far, in order.
    pub fn received(&self) -> Vec<String> {
        self.shared.received.lock().clone()
    }

    /// Whether `START` has been received.
    pub fn is_streaming(&self) -> bool {
        *self.shared.started.borrow()
    }
}

impl Drop for RunningBaseStation {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn serve_commands(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(command_connection(socket, Arc::clone(&shared)));
    }
}

async fn command_connection(socket: TcpStream, shared: Arc<Shared>) {
    let mut socket = BufReader::new(socket);
    let banner = format!("{}{}", shared.version, REPLY_TERMINATION);
    if socket.get_mut().write_all(banner.as_bytes()).await.is_err() {
        return;
    }
    let mut line = String::new();
    loop {
        line.clear();
        match socket.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        shared.received.lock().push(query.to_string());
        for reply in shared.reply(query) {
            let message = format!("{}{}", reply, REPLY_TERMINATION);
            if socket.get_mut().write_all(message.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

async fn serve_data(
    listener: TcpListener,
    script: DataScript,
    started: watch::Receiver<bool>,
    delay: Duration,
) {
    let script = Arc::new(script);
    loop {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(data_connection(
            socket,
            Arc::clone(&script),
            started.clone(),
            delay,
        ));
    }
}

async fn data_connection(
    mut socket: TcpStream,
    script: Arc<DataScript>,
    mut started: watch::Receiver<bool>,
    delay: Duration,
) {
    if started.wait_for(|s| *s).await.is_err() {
        return;
    }
    tokio::time::sleep(delay).await;
    for record in &script.records {
        let mut bytes = Vec::with_capacity(record.len() * VALUE_SIZE);
        for value in record {
            bytes.extend_from_slice(&value.to_ne_bytes());
        }
        if socket.write_all(&bytes).await.is_err() {
            return;
        }
        tokio::time::sleep(script.interval).await;
    }
    // Hold the connection open until the client leaves.
    let mut sink = [0u8; 64];
    while matches!(socket.read(&mut sink).await, Ok(n) if n > 0) {}
}
