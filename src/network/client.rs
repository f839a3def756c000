//! Base station client aggregate.
//!
//! [`Client`] owns the command session and the shared sensor configuration, and hands
//! out its two data clients behind `Arc<tokio::sync::Mutex<_>>` so recorders can read
//! them from background tasks.

use super::configuration::{
    BaseInformation, Configuration, Configurator, ConnectionConfiguration, SharedConfiguration,
    SystemControl,
};
use super::data_client::{AuxDataClient, EmgDataClient};
use super::session::ProtocolSession;
use crate::config::ConnectionConfig;
use crate::data::SensorId;
use crate::error::AppResult;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Data client shared between a client and its recorders.
pub type SharedDataClient<T> = Arc<Mutex<T>>;

/// Command session, configuration and data channels of one base station.
#[derive(Debug)]
pub struct Client {
    settings: ConnectionConfig,
    session: ProtocolSession,
    configuration: SharedConfiguration,
    connection: ConnectionConfiguration,
    base: BaseInformation,
    system: SystemControl,
    emg: SharedDataClient<EmgDataClient>,
    aux: SharedDataClient<AuxDataClient>,
}

impl Client {
    /// Disconnected client for the given endpoints.
    pub fn new(settings: ConnectionConfig) -> Self {
        let mut configuration = Configuration::new();
        configuration.set_timeout(settings.command_timeout);
        let configuration = configuration.into_shared();
        let mut system = SystemControl::default();
        system.set_timeout(settings.command_timeout);
        Self {
            emg: Arc::new(Mutex::new(EmgDataClient::new(Some(Arc::clone(&configuration))))),
            aux: Arc::new(Mutex::new(AuxDataClient::new(Some(Arc::clone(&configuration))))),
            settings,
            session: ProtocolSession::new(),
            configuration,
            connection: ConnectionConfiguration::default(),
            base: BaseInformation::default(),
            system,
        }
    }

    /// Connect every channel, read the configuration and claim master status.
    pub async fn initialize(&mut self) -> AppResult<()> {
        let s = &self.settings;
        self.session
            .connect(&s.address, s.command_port, s.connect_timeout)
            .await?;
        self.emg
            .lock()
            .await
            .connect(&s.address, s.emg_port, s.connect_timeout)
            .await?;
        self.aux
            .lock()
            .await
            .connect(&s.address, s.aux_port, s.connect_timeout)
            .await?;

        self.connection.get(&mut self.session).await?;
        if !self.connection.is_master() {
            self.connection.set_master(&mut self.session).await?;
        }
        self.base.get(&mut self.session).await?;
        self.system.get(&mut self.session).await?;
        self.refresh().await?;
        tracing::info!(
            version = %self.session.version(),
            active = ?self.active_sensors(),
            "Client initialized"
        );
        Ok(())
    }

    /// Re-read the sensor configuration and reset both data clients.
    pub async fn refresh(&mut self) -> AppResult<()> {
        // The lock is not held across the queries.
        let mut fresh = self.configuration.read().clone();
        fresh.get(&mut self.session).await?;
        *self.configuration.write() = fresh;
        self.emg.lock().await.reset();
        self.aux.lock().await.reset();
        Ok(())
    }

    /// Start streaming on the data channels.
    pub async fn start(&mut self) -> AppResult<()> {
        self.emg.lock().await.reset();
        self.aux.lock().await.reset();
        self.system.start(&mut self.session).await
    }

    /// Stop streaming.
    pub async fn stop(&mut self) -> AppResult<()> {
        self.system.stop(&mut self.session).await
    }

    /// Stop streaming if needed and disconnect every channel. Calling it twice is
    /// harmless.
    pub async fn shutdown(&mut self) {
        if self.system.is_running() && self.session.is_connected() {
            if let Err(e) = self.system.stop(&mut self.session).await {
                tracing::warn!(error = %e, "Failed to stop acquisition on shutdown");
            }
        }
        self.emg.lock().await.disconnect().await;
        self.aux.lock().await.disconnect().await;
        self.session.disconnect().await;
    }

    /// Send a raw query on the command channel.
    pub async fn query(&mut self, text: &str) -> AppResult<String> {
        let timeout = self.settings.command_timeout;
        self.session.query(text, timeout).await
    }

    /// Whether the command channel is open.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Protocol version banner.
    pub fn version(&self) -> &str {
        self.session.version()
    }

    /// Endpoints and deadlines.
    pub fn settings(&self) -> &ConnectionConfig {
        &self.settings
    }

    /// Command session.
    pub fn session_mut(&mut self) -> &mut ProtocolSession {
        &mut self.session
    }

    /// Shared sensor configuration.
    pub fn configuration(&self) -> &SharedConfiguration {
        &self.configuration
    }

    /// Sensors that are streaming.
    pub fn active_sensors(&self) -> Vec<SensorId> {
        self.configuration.read().active()
    }

    /// Command connection properties.
    pub fn connection(&self) -> &ConnectionConfiguration {
        &self.connection
    }

    /// Base station firmware and serial number.
    pub fn base(&self) -> &BaseInformation {
        &self.base
    }

    /// Acquisition control state.
    pub fn system(&self) -> &SystemControl {
        &self.system
    }

    /// EMG data client.
    pub fn emg(&self) -> SharedDataClient<EmgDataClient> {
        Arc::clone(&self.emg)
    }

    /// Auxiliary data client.
    pub fn aux(&self) -> SharedDataClient<AuxDataClient> {
        Arc::clone(&self.aux)
    }
}
