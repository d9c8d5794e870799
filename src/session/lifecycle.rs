//! Bridge session
//!
//! Drives both peripherals through discovery, connection, subscription and
//! (for Mario) calibration, then leaves the receive path and the sender loop
//! running side by side until one of the links goes away.
//!
//! ```text
//!  Mario notification ──► SignalConditioner ──► CommandState
//!                                                    │ (atomic load)
//!                           SenderLoop (100 ms) ◄────┘ ──► micro:bit UART
//! ```
//!
//! Any failure before streaming is fatal: whatever was already connected is
//! released and the error is returned. There is no reconnect.

use crate::domain::calibration::{self, CalibrationConfig};
use crate::domain::command::CommandState;
use crate::domain::conditioner::SignalConditioner;
use crate::domain::models::{BridgeTuning, DiscoveredDevice, PeripheralRole};
use crate::domain::settings::Settings;
use crate::error::BridgeError;
use crate::infrastructure::bluetooth::protocol;
use crate::session::link::{Link, LinkState};
use crate::session::sender::{SenderConfig, SenderLoop, SenderReport};
use crate::session::transport::{
    CommandSink, DeviceFilter, Discovery, NotificationHandler, TelemetrySource, WriteMode,
};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How often the session checks that Mario is still connected
const LIVENESS_POLL: Duration = Duration::from_millis(500);

/// Upper bound on each disconnect during teardown
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub tuning: BridgeTuning,
    pub scan_timeout: Duration,
    /// Delay before each enable command
    pub command_delay: Duration,
    /// Wait after the last enable command so the EMA settles before calibration
    pub settle_delay: Duration,
    pub calibration: CalibrationConfig,
    pub sender: SenderConfig,
    pub controller_filter: DeviceFilter,
    pub actuator_filter: DeviceFilter,
    pub enable_commands: Vec<Vec<u8>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tuning: BridgeTuning::default(),
            scan_timeout: Duration::from_secs(8),
            command_delay: Duration::from_millis(protocol::COMMAND_DELAY_MS),
            settle_delay: Duration::from_millis(300),
            calibration: CalibrationConfig::default(),
            sender: SenderConfig::default(),
            controller_filter: protocol::controller_filter(),
            actuator_filter: protocol::actuator_filter(),
            enable_commands: protocol::ENABLE_SEQUENCE
                .iter()
                .map(|c| c.to_vec())
                .collect(),
        }
    }
}

impl SessionConfig {
    /// Session parameters from loaded settings; protocol constants stay at
    /// their defaults
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            tuning: settings.tuning(),
            scan_timeout: Duration::from_millis(settings.scan_timeout_ms),
            settle_delay: Duration::from_millis(settings.settle_ms),
            calibration: settings.calibration(),
            sender: SenderConfig {
                tick: Duration::from_millis(settings.tick_ms.max(1)),
                write_timeout: Duration::from_millis(settings.write_timeout_ms.max(1)),
            },
            ..Self::default()
        }
    }
}

/// Why a streaming session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The sender loop finished on its own (micro:bit disconnected)
    ActuatorLost,
    /// Mario stopped being connected
    ControllerLost,
    /// Shutdown was requested by the caller
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub ended_by: SessionEnd,
    pub sender: Option<SenderReport>,
}

/// Explicit context shared by the receive handler and the sender loop
pub struct BridgeSession {
    discovery: Arc<dyn Discovery>,
    telemetry: Arc<dyn TelemetrySource>,
    sink: Arc<dyn CommandSink>,
    config: SessionConfig,
    command: Arc<CommandState>,
    conditioner: Arc<Mutex<SignalConditioner>>,
    controller: Link,
    actuator: Link,
    shutdown_tx: watch::Sender<bool>,
    sender: Option<JoinHandle<SenderReport>>,
}

impl BridgeSession {
    pub fn new(
        discovery: Arc<dyn Discovery>,
        telemetry: Arc<dyn TelemetrySource>,
        sink: Arc<dyn CommandSink>,
        config: SessionConfig,
    ) -> Self {
        let command = Arc::new(CommandState::new());
        let conditioner = Arc::new(Mutex::new(SignalConditioner::new(
            config.tuning,
            Arc::clone(&command),
        )));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            discovery,
            telemetry,
            sink,
            config,
            command,
            conditioner,
            controller: Link::new(PeripheralRole::Controller),
            actuator: Link::new(PeripheralRole::Actuator),
            shutdown_tx,
            sender: None,
        }
    }

    pub fn command_state(&self) -> Arc<CommandState> {
        Arc::clone(&self.command)
    }

    pub fn controller_state(&self) -> LinkState {
        self.controller.state()
    }

    pub fn actuator_state(&self) -> LinkState {
        self.actuator.state()
    }

    pub fn is_streaming(&self) -> bool {
        self.controller.state() == LinkState::Streaming
            && self.actuator.state() == LinkState::Streaming
    }

    /// Bring both links up. On error everything established is torn down.
    pub async fn start(&mut self) -> Result<(), BridgeError> {
        let result = self.setup().await;
        if let Err(e) = &result {
            error!("Session setup failed: {}", e);
            self.teardown().await;
        }
        result
    }

    async fn setup(&mut self) -> Result<(), BridgeError> {
        self.connect_controller().await?;
        self.connect_actuator().await?;
        info!(
            "Streaming analog values every {}ms. Ctrl+C to quit.",
            self.config.sender.tick.as_millis()
        );
        Ok(())
    }

    async fn connect_controller(&mut self) -> Result<(), BridgeError> {
        let role = PeripheralRole::Controller;

        self.controller.advance(LinkState::Discovering)?;
        let device = self.discover(role, &self.config.controller_filter).await?;
        info!("{}: {}", role, device);

        self.controller.advance(LinkState::Connecting)?;
        self.telemetry
            .connect(&device)
            .await
            .map_err(|source| BridgeError::ConnectFailure { role, source })?;
        self.controller.advance(LinkState::Connected)?;
        info!("{} connected.", role);

        self.controller.advance(LinkState::Subscribing)?;
        let conditioner = Arc::clone(&self.conditioner);
        let handler: NotificationHandler =
            Arc::new(move |bytes: &[u8]| conditioner.lock().on_notification(bytes));
        self.telemetry
            .subscribe(handler)
            .await
            .map_err(|source| BridgeError::SubscribeFailure { role, source })?;

        for command in &self.config.enable_commands {
            tokio::time::sleep(self.config.command_delay).await;
            debug!("Enable command: {:02X?}", command);
            self.telemetry
                .write_command(command)
                .await
                .map_err(|source| BridgeError::SubscribeFailure { role, source })?;
        }
        info!("{} subscribed for IMU.", role);
        tokio::time::sleep(self.config.settle_delay).await;

        self.controller.advance(LinkState::Calibrating)?;
        let outcome = calibration::calibrate(&self.conditioner, &self.config.calibration).await;
        self.conditioner.lock().arm(outcome.bias);

        self.controller.advance(LinkState::Streaming)
    }

    async fn connect_actuator(&mut self) -> Result<(), BridgeError> {
        let role = PeripheralRole::Actuator;

        self.actuator.advance(LinkState::Discovering)?;
        let device = self.discover(role, &self.config.actuator_filter).await?;
        info!("{}: {}", role, device);

        self.actuator.advance(LinkState::Connecting)?;
        let caps = self
            .sink
            .connect(&device)
            .await
            .map_err(|source| BridgeError::ConnectFailure { role, source })?;
        self.actuator.advance(LinkState::Connected)?;

        self.actuator.advance(LinkState::Subscribing)?;
        let mode = WriteMode::select(caps).ok_or(BridgeError::NoWritableChannel { role })?;
        info!("Using UART write mode {:?} ({:?})", mode, caps);
        info!("{} connected.", role);

        self.actuator.advance(LinkState::Streaming)?;
        let sender = SenderLoop::new(
            Arc::clone(&self.sink),
            Arc::clone(&self.command),
            mode,
            self.config.sender,
        );
        self.sender = Some(tokio::spawn(sender.run(self.shutdown_tx.subscribe())));
        Ok(())
    }

    async fn discover(
        &self,
        role: PeripheralRole,
        filter: &DeviceFilter,
    ) -> Result<DiscoveredDevice, BridgeError> {
        let timeout = self.config.scan_timeout;
        info!("Scanning for {}... (<= {:.0}s)", role, timeout.as_secs_f64());

        match self.discovery.find(filter, timeout).await {
            Ok(Some(device)) => Ok(device),
            Ok(None) => Err(BridgeError::DiscoveryFailure { role, timeout }),
            Err(source) => Err(BridgeError::Discovery { role, source }),
        }
    }

    /// Stream until a link drops or `shutdown` completes, then tear down
    pub async fn run_until<F>(&mut self, shutdown: F) -> SessionReport
    where
        F: Future<Output = ()>,
    {
        let Some(mut sender) = self.sender.take() else {
            warn!("Session is not streaming");
            self.teardown().await;
            return SessionReport {
                ended_by: SessionEnd::Shutdown,
                sender: None,
            };
        };

        enum Stop {
            SenderDone(Result<SenderReport, tokio::task::JoinError>),
            Requested,
            ControllerLost,
        }

        tokio::pin!(shutdown);
        let mut watchdog = tokio::time::interval(LIVENESS_POLL);

        let stop = loop {
            tokio::select! {
                joined = &mut sender => break Stop::SenderDone(joined),
                _ = &mut shutdown => break Stop::Requested,
                _ = watchdog.tick() => {
                    if !self.telemetry.is_connected() {
                        break Stop::ControllerLost;
                    }
                }
            }
        };

        let (ended_by, joined) = match stop {
            Stop::SenderDone(joined) => (SessionEnd::ActuatorLost, joined),
            Stop::Requested => {
                info!("Shutdown requested");
                self.shutdown_tx.send_replace(true);
                (SessionEnd::Shutdown, sender.await)
            }
            Stop::ControllerLost => {
                warn!("Mario disconnected, stopping stream");
                self.shutdown_tx.send_replace(true);
                (SessionEnd::ControllerLost, sender.await)
            }
        };

        let report = joined
            .map_err(|e| error!("Sender task failed: {}", e))
            .ok();
        if let Some(r) = &report {
            info!(
                "Sent {} frames ({} write errors)",
                r.frames_sent, r.write_failures
            );
        }

        self.teardown().await;
        SessionReport {
            ended_by,
            sender: report,
        }
    }

    /// Stop the sender and release both peripherals
    ///
    /// Safe to call in any state; links that never connected are skipped and
    /// disconnect errors are only logged.
    pub async fn teardown(&mut self) {
        self.shutdown_tx.send_replace(true);
        if let Some(sender) = self.sender.take() {
            let _ = sender.await;
        }

        if self.controller.holds_connection() {
            let telemetry = Arc::clone(&self.telemetry);
            release(PeripheralRole::Controller, async move {
                telemetry.disconnect().await
            })
            .await;
        }
        self.controller.close();

        if self.actuator.holds_connection() {
            let sink = Arc::clone(&self.sink);
            release(PeripheralRole::Actuator, async move { sink.disconnect().await }).await;
        }
        self.actuator.close();
    }
}

async fn release<F>(role: PeripheralRole, disconnect: F)
where
    F: Future<Output = Result<(), crate::error::TransportError>>,
{
    match tokio::time::timeout(DISCONNECT_TIMEOUT, disconnect).await {
        Ok(Ok(())) => info!("{} disconnected", role),
        Ok(Err(e)) => debug!("{} disconnect: {}", role, e),
        Err(_) => warn!("{} disconnect timed out", role),
    }
}
