//! DriveWatch — detector of removable drives.
//!
//! Thin binary entry point. All logic lives in the `drivewatch-core`
//! and `drivewatch-host` crates.

fn main() -> anyhow::Result<()> {
    let config = drivewatch_host::HostConfig::from_env()?;

    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    tracing::info!("DriveWatch starting");

    drivewatch_host::run(config)
}
