//! # Trigno DAQ Client Library
//!
//! Asynchronous client runtime for Delsys Trigno wireless biosignal base stations. The
//! base station exposes a text command channel and binary data channels over TCP; this
//! crate connects to them, decodes the streamed records into timestamped frames and
//! drives processing tasks over the resulting time series, possibly while acquisition
//! is still appending to it.
//!
//! ## Crate Structure
//!
//! - **`network`**: Deadline-bounded TCP transport, the command [`ProtocolSession`],
//!   sensor configuration queries, the EMG/AUX frame decoders and the [`Client`]
//!   aggregate. Also hosts a scripted loopback base station for tests.
//! - **`data`**: Samples, frames and the time-sorted [`Sequence`] with its windowed
//!   range views.
//! - **`experiment`**: The start/loop/stop [`Executor`] and the iterative adapter that
//!   moves a range over a live sequence.
//! - **`tools`**: Recorder, metric filters and CSV export built on the engine.
//! - **`config`**: TOML/environment configuration loaded with `figment`.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: The crate-wide `DaqError` enum.
//!
//! ## Example
//!
//! ```no_run
//! use trigno_daq::config::ClientConfig;
//! use trigno_daq::data::Sequence;
//! use trigno_daq::experiment::{Executor, Timed};
//! use trigno_daq::network::Client;
//! use trigno_daq::tools::Recorder;
//! use std::time::Duration;
//!
//! # async fn demo() -> trigno_daq::error::AppResult<()> {
//! let config = ClientConfig::from_env()?;
//! let mut client = Client::new(config.connection.clone());
//! client.initialize().await?;
//! client.start().await?;
//!
//! let sequence = Sequence::new().into_shared();
//! let recorder = Recorder::new(client.emg(), sequence.clone(), config.connection.data_timeout)
//!     .with_config(&config.acquisition);
//! Executor::new(Timed::new(recorder, Duration::from_secs(5))).run().await?;
//!
//! client.shutdown().await;
//! println!("recorded {} frames", sequence.read().len());
//! # Ok(())
//! # }
//! ```
//!
//! [`ProtocolSession`]: network::ProtocolSession
//! [`Client`]: network::Client
//! [`Sequence`]: data::Sequence
//! [`Executor`]: experiment::Executor

pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod logging;
pub mod network;
pub mod tools;
