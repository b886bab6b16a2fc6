use anyhow::{Context, Result};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use pizservo::config::{Config, OutputKind};
use pizservo::{ControlServer, Pca9685, ServoHandle, SimulatedServo};

const DEFAULT_CONFIG_PATH: &str = "pizservo.json";

fn open_output(config: &Config) -> Result<ServoHandle> {
    let handle = match config.output.kind {
        OutputKind::Pca9685 => {
            let pca = Pca9685::new(
                config.output.i2c_bus,
                config.output.address,
                config.pulse.resolution,
            )
            .context("Could not open PCA9685")?;
            ServoHandle::new(pca, config.pulse)
        }
        OutputKind::Simulated => {
            ServoHandle::new(SimulatedServo::new(config.output.channels), config.pulse)
        }
    };
    handle.configure().context("Could not set PWM frequency")?;
    Ok(handle)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = Config::load_or_create(&config_path)
        .with_context(|| format!("Could not load {}", config_path.display()))?;
    config.validate().context("Invalid configuration")?;
    info!("Starting servo server with {}", config_path.display());

    let servo = open_output(&config)?;

    let server = ControlServer::bind(&config, servo)
        .with_context(|| format!("Could not bind {}", config.bind_address()))?;

    let shutdown = server.shutdown_flag();
    ctrlc::set_handler(move || {
        if shutdown.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested");
        }
    })
    .context("Could not install interrupt handler")?;

    let served = server.run()?;
    info!("Server stopped after {} session(s)", served);
    Ok(())
}
