//! In-memory collaborators for session tests

use crate::domain::models::DiscoveredDevice;
use crate::error::TransportError;
use crate::session::transport::{
    CommandSink, DeviceFilter, Discovery, NotificationHandler, TelemetrySource,
    WriteCapabilities, WriteMode,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing_subscriber::fmt::MakeWriter;

pub fn device(name: &str, address: u64, services: Vec<u128>) -> DiscoveredDevice {
    DiscoveredDevice {
        name: name.to_string(),
        address,
        services,
        signal_strength: -55,
    }
}

/// Discovery over a fixed list of advertisements
#[derive(Default)]
pub struct MockDiscovery {
    pub devices: Vec<DiscoveredDevice>,
    pub fail: bool,
}

#[async_trait]
impl Discovery for MockDiscovery {
    async fn find(
        &self,
        filter: &DeviceFilter,
        timeout: Duration,
    ) -> Result<Option<DiscoveredDevice>, TransportError> {
        if self.fail {
            return Err(TransportError::Backend("adapter off".to_string()));
        }
        match self.devices.iter().find(|d| filter.matches(d)) {
            Some(d) => Ok(Some(d.clone())),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
        tokio::time::sleep(timeout).await;
        Ok(self.devices.clone())
    }
}

/// Telemetry source that records commands and lets tests push notifications
#[derive(Default)]
pub struct MockTelemetry {
    pub fail_connect: bool,
    pub fail_subscribe: bool,
    pub connected: AtomicBool,
    pub handler: Mutex<Option<NotificationHandler>>,
    pub commands: Mutex<Vec<Vec<u8>>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl MockTelemetry {
    /// Deliver one payload as if the peripheral notified it
    pub fn notify(&self, bytes: &[u8]) -> bool {
        let handler = self.handler.lock().clone();
        match handler {
            Some(h) => {
                h(bytes);
                true
            }
            None => false,
        }
    }

    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl TelemetrySource for MockTelemetry {
    async fn connect(&self, _device: &DiscoveredDevice) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(TransportError::Gatt("Unreachable".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, handler: NotificationHandler) -> Result<(), TransportError> {
        if self.fail_subscribe {
            return Err(TransportError::Gatt("AccessDenied".to_string()));
        }
        *self.handler.lock() = Some(handler);
        Ok(())
    }

    async fn write_command(&self, command: &[u8]) -> Result<(), TransportError> {
        self.commands.lock().push(command.to_vec());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }
}

/// Command sink recording every write attempt
pub struct MockSink {
    pub caps: WriteCapabilities,
    pub fail_connect: bool,
    /// Attempt numbers (0-based) that fail
    pub failing_attempts: HashSet<usize>,
    /// Attempt numbers that never complete
    pub stalling_attempts: HashSet<usize>,
    /// Liveness turns false after this many attempts
    pub live_for: Option<usize>,
    pub connected: AtomicBool,
    pub attempts: AtomicUsize,
    pub frames: Mutex<Vec<(Instant, Vec<u8>, WriteMode)>>,
    pub disconnects: AtomicUsize,
}

impl Default for MockSink {
    fn default() -> Self {
        Self {
            caps: WriteCapabilities {
                without_response: true,
                with_response: true,
            },
            fail_connect: false,
            failing_attempts: HashSet::new(),
            stalling_attempts: HashSet::new(),
            live_for: None,
            connected: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            frames: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        }
    }
}

impl MockSink {
    /// A sink that is already connected, for driving the sender directly
    pub fn connected() -> Self {
        let sink = Self::default();
        sink.connected.store(true, Ordering::SeqCst);
        sink
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn frame_text(&self) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .map(|(_, bytes, _)| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandSink for MockSink {
    async fn connect(
        &self,
        _device: &DiscoveredDevice,
    ) -> Result<WriteCapabilities, TransportError> {
        if self.fail_connect {
            return Err(TransportError::Gatt("Unreachable".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(self.caps)
    }

    fn is_connected(&self) -> bool {
        let alive = self
            .live_for
            .map_or(true, |limit| self.attempts() < limit);
        alive && self.connected.load(Ordering::SeqCst)
    }

    async fn write(&self, bytes: &[u8], mode: WriteMode) -> Result<(), TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.stalling_attempts.contains(&attempt) {
            std::future::pending::<()>().await;
        }
        if self.failing_attempts.contains(&attempt) {
            return Err(TransportError::Gatt("Unreachable".to_string()));
        }
        self.frames
            .lock()
            .push((Instant::now(), bytes.to_vec(), mode));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Formatted log output captured on the current thread
///
/// `#[tokio::test]` runs spawned tasks on the test thread, so their events are
/// captured too.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Lines at `level` that contain `needle`
    pub fn count(&self, level: &str, needle: &str) -> usize {
        String::from_utf8_lossy(&self.buffer.lock())
            .lines()
            .filter(|line| line.contains(level) && line.contains(needle))
            .count()
    }
}

pub struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter(Arc::clone(&self.buffer))
    }
}
