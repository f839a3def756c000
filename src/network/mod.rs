//! Network layer: deadline transport, command session and data channel decoders.
//!
//! - [`transport`]: TCP wrapper where every operation is bounded by a timeout.
//! - [`session`]: line-oriented command/query protocol.
//! - [`configuration`]: sensor and base station configuration over the session.
//! - [`data_client`]: binary record decoding for the EMG and auxiliary channels.
//! - [`client`]: aggregate owning all of the above for one base station.
//! - [`mock`]: scripted loopback base station.
pub mod client;
pub mod configuration;
pub mod data_client;
pub mod mock;
pub mod session;
pub mod transport;

pub use client::{Client, SharedDataClient};
pub use configuration::{
    BaseInformation, Configuration, Configurator, ConnectionConfiguration, SensorConfiguration,
    SharedConfiguration, SystemControl,
};
pub use data_client::{Aux, AuxDataClient, DataClient, Emg, EmgDataClient, SensorKind, Slot};
pub use mock::{MockBaseStation, RunningBaseStation};
pub use session::ProtocolSession;
pub use transport::Transport;
