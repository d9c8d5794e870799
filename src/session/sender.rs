//! Fixed-rate command sender
//!
//! Ticks independently of telemetry arrival. Each tick writes the latest
//! command pair as one text frame. A failed or stalled write is reported and
//! skipped; the next tick carries fresher data anyway.

use crate::domain::command::CommandState;
use crate::domain::frame;
use crate::session::transport::{CommandSink, WriteMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderConfig {
    /// Frame period
    pub tick: Duration,
    /// Upper bound on a single write, never more than one tick
    pub write_timeout: Duration,
}

impl SenderConfig {
    /// Write deadline actually applied; a write may not outlive its tick
    pub fn effective_write_timeout(&self) -> Duration {
        self.write_timeout.min(self.tick)
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            write_timeout: Duration::from_millis(80),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderExit {
    /// The sink's liveness predicate turned false
    SinkDisconnected,
    /// External shutdown was requested
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReport {
    pub frames_sent: u64,
    pub write_failures: u64,
    pub exit: SenderExit,
}

pub struct SenderLoop {
    sink: Arc<dyn CommandSink>,
    command: Arc<CommandState>,
    mode: WriteMode,
    config: SenderConfig,
}

impl SenderLoop {
    pub fn new(
        sink: Arc<dyn CommandSink>,
        command: Arc<CommandState>,
        mode: WriteMode,
        config: SenderConfig,
    ) -> Self {
        Self {
            sink,
            command,
            mode,
            config,
        }
    }

    /// Stream frames until the sink disconnects or `shutdown` fires
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> SenderReport {
        // Skip keeps ticks on the original grid after a slow write
        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut frames_sent = 0u64;
        let mut write_failures = 0u64;

        let exit = loop {
            if *shutdown.borrow() {
                break SenderExit::Shutdown;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break SenderExit::Shutdown,
                _ = ticker.tick() => {}
            }

            if !self.sink.is_connected() {
                break SenderExit::SinkDisconnected;
            }

            if self.send_frame().await {
                frames_sent += 1;
            } else {
                write_failures += 1;
            }
        };

        match exit {
            SenderExit::SinkDisconnected => info!("micro:bit disconnected, sender stopped"),
            SenderExit::Shutdown => info!("Sender stopped"),
        }

        SenderReport {
            frames_sent,
            write_failures,
            exit,
        }
    }

    async fn send_frame(&self) -> bool {
        let value = self.command.load();
        let line = frame::format_frame(&value);

        let deadline = self.config.effective_write_timeout();
        match tokio::time::timeout(deadline, self.sink.write(line.as_bytes(), self.mode)).await {
            Ok(Ok(())) => {
                debug!(">> {}", line.trim_end());
                true
            }
            Ok(Err(e)) => {
                warn!("Write error: {}", e);
                false
            }
            Err(_) => {
                warn!("Write error: timed out after {:?}", deadline);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command::CommandValue;
    use crate::session::testing::{CapturedLogs, MockSink};

    fn start(
        sink: Arc<MockSink>,
        command: Arc<CommandState>,
    ) -> (watch::Sender<bool>, tokio::task::JoinHandle<SenderReport>) {
        let (tx, rx) = watch::channel(false);
        let sender = SenderLoop::new(
            sink,
            command,
            WriteMode::WithoutResponse,
            SenderConfig::default(),
        );
        (tx, tokio::spawn(sender.run(rx)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_carry_latest_command() {
        let sink = Arc::new(MockSink {
            live_for: Some(2),
            ..MockSink::connected()
        });
        let command = Arc::new(CommandState::new());
        command.publish(CommandValue {
            throttle: 0.5,
            steer: -0.25,
        });

        let (_tx, handle) = start(Arc::clone(&sink), command);
        let report = handle.await.unwrap();

        assert_eq!(report.exit, SenderExit::SinkDisconnected);
        assert_eq!(report.frames_sent, 2);
        assert_eq!(sink.frame_text(), vec!["0.50,-0.25:\n", "0.50,-0.25:\n"]);
        assert!(sink
            .frames
            .lock()
            .iter()
            .all(|(_, _, mode)| *mode == WriteMode::WithoutResponse));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_cadence() {
        let sink = Arc::new(MockSink {
            live_for: Some(5),
            ..MockSink::connected()
        });
        let (_tx, handle) = start(Arc::clone(&sink), Arc::new(CommandState::new()));
        handle.await.unwrap();

        let frames = sink.frames.lock();
        assert_eq!(frames.len(), 5);
        for pair in frames.windows(2) {
            assert_eq!(pair[1].0 - pair[0].0, Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_write_failure_warns_once_and_continues() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let sink = Arc::new(MockSink {
            failing_attempts: [0].into_iter().collect(),
            live_for: Some(3),
            ..MockSink::connected()
        });
        let (_tx, handle) = start(Arc::clone(&sink), Arc::new(CommandState::new()));
        let report = handle.await.unwrap();

        assert_eq!(report.write_failures, 1);
        assert_eq!(report.frames_sent, 2);
        assert_eq!(sink.attempts(), 3);
        assert_eq!(logs.count("WARN", "Write error"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_keeps_cadence() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let sink = Arc::new(MockSink {
            stalling_attempts: [1].into_iter().collect(),
            live_for: Some(4),
            ..MockSink::connected()
        });
        let (_tx, handle) = start(Arc::clone(&sink), Arc::new(CommandState::new()));
        let origin = tokio::time::Instant::now();
        let report = handle.await.unwrap();

        assert_eq!(report.write_failures, 1);
        assert_eq!(report.frames_sent, 3);
        let offsets: Vec<_> = sink
            .frames
            .lock()
            .iter()
            .map(|(at, _, _)| *at - origin)
            .collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_millis(200),
                Duration::from_millis(300)
            ]
        );
        assert_eq!(logs.count("WARN", "timed out"), 1);
    }

    #[test]
    fn test_write_timeout_never_exceeds_tick() {
        let config = SenderConfig {
            tick: Duration::from_millis(100),
            write_timeout: Duration::from_millis(250),
        };
        assert_eq!(config.effective_write_timeout(), Duration::from_millis(100));
        assert!(SenderConfig::default().effective_write_timeout() < SenderConfig::default().tick);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_promptly() {
        let sink = Arc::new(MockSink::connected());
        let (tx, handle) = start(Arc::clone(&sink), Arc::new(CommandState::new()));

        tokio::time::sleep(Duration::from_millis(350)).await;
        tx.send(true).unwrap();
        let report = handle.await.unwrap();

        assert_eq!(report.exit, SenderExit::Shutdown);
        assert_eq!(report.frames_sent, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_sink_sends_nothing() {
        let sink = Arc::new(MockSink::default());
        let (_tx, handle) = start(Arc::clone(&sink), Arc::new(CommandState::new()));
        let report = handle.await.unwrap();

        assert_eq!(report.exit, SenderExit::SinkDisconnected);
        assert_eq!(sink.attempts(), 0);
    }
}
