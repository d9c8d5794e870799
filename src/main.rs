mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use mario_bridge::domain::models::{format_address, PeripheralRole};
use mario_bridge::domain::settings::{Settings, SettingsService};
use mario_bridge::infrastructure::bluetooth::protocol;
use mario_bridge::infrastructure::bluetooth::BleBackend;
use mario_bridge::infrastructure::logging;
use mario_bridge::session::{BridgeSession, SessionConfig, SessionEnd};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings_service = match &cli.config {
        Some(path) => SettingsService::from_path(path)?,
        None => SettingsService::new()?,
    };

    let run_args = match &cli.command {
        Some(Commands::Run(args)) => args.clone(),
        _ => cli.run.clone(),
    };
    run_args.apply(settings_service.get_mut());
    let settings = settings_service.get().clone();

    let _logging_guard = match logging::init_logger(&settings.log_settings, cli.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };
    info!("Settings: {}", settings_service.path().display());

    match cli.command {
        Some(Commands::Scan { timeout }) => {
            scan(Duration::from_millis(cli::seconds_to_ms(timeout))).await
        }
        Some(Commands::Run(_)) | None => run(settings).await,
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    settings.tuning().validate()?;
    let backend = BleBackend::platform()?;
    let mut session = BridgeSession::new(
        backend.discovery,
        backend.telemetry,
        backend.sink,
        SessionConfig::from_settings(&settings),
    );

    let started = tokio::select! {
        result = session.start() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    match started {
        None => {
            info!("Interrupted during setup");
            session.teardown().await;
            return Ok(());
        }
        Some(Err(e)) => return Err(e.into()),
        Some(Ok(())) => {}
    }

    let report = session
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl+C handler failed: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    match report.ended_by {
        SessionEnd::Shutdown => info!("Stopped"),
        SessionEnd::ActuatorLost => warn!("{} disconnected", PeripheralRole::Actuator),
        SessionEnd::ControllerLost => warn!("{} disconnected", PeripheralRole::Controller),
    }
    Ok(())
}

async fn scan(timeout: Duration) -> anyhow::Result<()> {
    let backend = BleBackend::platform()?;
    let devices = backend.discovery.scan(timeout).await?;

    for device in &devices {
        let name = if device.name.is_empty() {
            "<no name>"
        } else {
            device.name.as_str()
        };
        println!(
            "{:<32} {}  {:>4} dBm",
            name,
            format_address(device.address),
            device.signal_strength
        );
        for uuid in &device.services {
            println!("    {}", protocol::format_uuid(*uuid));
        }
    }

    let mario = devices
        .iter()
        .find(|d| protocol::controller_filter().matches(d));
    let microbit = devices
        .iter()
        .find(|d| protocol::actuator_filter().matches(d));

    println!();
    println!("{} device(s) found", devices.len());
    for (role, found) in [
        (PeripheralRole::Controller, mario),
        (PeripheralRole::Actuator, microbit),
    ] {
        match found {
            Some(device) => println!("{}: {}", role, device),
            None => println!("{}: not seen. {}", role, role.remediation_hint()),
        }
    }
    Ok(())
}
