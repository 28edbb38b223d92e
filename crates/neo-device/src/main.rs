//! Neo Device
//!
//! Runs the Analog Output objects of one device and logs the notifications
//! they produce.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bacnet_objects::AnalogOutputs;
use neo_device::config::{self, DeviceConfig};
use neo_device::reporting::{AnalogOutputService, topics};
use neo_device::service::ServiceManager;

/// Neo BACnet device
#[derive(Parser, Debug)]
#[command(name = "neo-device")]
#[command(about = "BACnet Analog Output device", long_about = None)]
struct Args {
    /// Configuration file (falls back to $NEO_CONFIG, then ./neo-device.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Intrinsic reporting period in milliseconds, overriding the file and $NEO_TICK_MS
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("neo_device=info,bacnet_objects=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Starting neo-device v{}", env!("CARGO_PKG_VERSION"));

    let path = config::resolve_path(args.config);
    let mut config = DeviceConfig::load(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.apply_env()?;
    if let Some(ms) = args.tick_ms {
        config.apply_tick_override(Some(&ms.to_string()))?;
    }
    info!(
        device_id = config.device.id,
        name = %config.device.name,
        tick_ms = config.runtime.tick_interval_ms,
        "Device configured"
    );

    let objects = Arc::new(AnalogOutputs::new(config.runtime.object_options()));
    objects
        .init(&config.analog_outputs)
        .context("initializing analog outputs")?;

    let manager = ServiceManager::new();
    let mut bus = manager.subscribe();
    manager
        .spawn(AnalogOutputService::new(
            Arc::clone(&objects),
            config.runtime.tick_interval(),
        ))
        .await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            received = bus.recv() => match received {
                Ok(event) if event.event_type == topics::EVENT_NOTIFICATION
                    || event.event_type == topics::COV_NOTIFICATION =>
                {
                    info!(topic = %event.event_type, data = %event.data, "Notification");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Notification log lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.shutdown_all().await?;
    objects.cleanup();
    Ok(())
}
