//! NAS SNMP Monitor binary
//!
//! Polls the devices listed in a monitor file and serves their snapshots.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use nas_snmp_monitor::metrics::catalogue;
use nas_snmp_monitor::{
    self_test, start_web_server, Coordinator, DeviceRegistry, EngineConnector, MonitorFile,
    SessionConfig, Snapshot,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "nas_snmp_monitor")]
#[command(about = "SNMP health monitor for WD My Cloud NAS devices")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Austin Couch")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Monitor file listing devices and coordinator settings
    #[arg(short, long, default_value = "monitor.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every device and serve snapshots over HTTP (default)
    Serve(ServeArgs),

    /// Poll one device once, print the snapshot and exit
    Snapshot(SnapshotArgs),

    /// Check that a device answers with its configured credentials
    Test(TestArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Override the bind host from the monitor file
    #[arg(long)]
    host: Option<String>,

    /// Override the port from the monitor file
    #[arg(short, long)]
    port: Option<u16>,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[derive(Args)]
struct SnapshotArgs {
    /// Device name; defaults to the first device in the file
    device: Option<String>,

    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

#[derive(Args)]
struct TestArgs {
    /// Device name; defaults to the first device in the file
    device: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match &cli.command {
        Some(Commands::Serve(args)) => serve_command(&cli, args).await,
        Some(Commands::Snapshot(args)) => snapshot_command(&cli, args).await,
        Some(Commands::Test(args)) => test_command(&cli, args).await,
        None => serve_command(&cli, &ServeArgs::default()).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn load_monitor_file(cli: &Cli) -> anyhow::Result<MonitorFile> {
    MonitorFile::load(&cli.config)
        .with_context(|| format!("failed to load monitor file {}", cli.config.display()))
}

/// Resolve a device by name, or the first device when no name is given.
fn select_device(file: &MonitorFile, name: Option<&str>) -> anyhow::Result<(String, SessionConfig)> {
    let entry = match name {
        Some(name) => file
            .device(name)
            .with_context(|| format!("no device named {:?} in monitor file", name))?,
        None => file
            .devices
            .first()
            .context("monitor file does not list any device")?,
    };
    let config = entry
        .session
        .validate()
        .with_context(|| format!("invalid configuration for device {:?}", entry.name))?;
    Ok((entry.name.clone(), config))
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    let file = load_monitor_file(cli)?;
    if file.devices.is_empty() {
        bail!("monitor file does not list any device");
    }

    let mut web_config = file.web.clone();
    if let Some(host) = &args.host {
        web_config = web_config.with_host(host.clone());
    }
    if let Some(port) = args.port {
        web_config = web_config.with_port(port);
    }
    if args.no_cors {
        web_config = web_config.with_cors(false);
    }

    let connector = Arc::new(EngineConnector::new(file.coordinator.scalar_timeout()));
    let registry = Arc::new(DeviceRegistry::start(&file, connector)?);
    info!(devices = registry.len(), "poll loops started");
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", web_config.enable_cors);
    info!(
        "  - Stale after: {} failed polls",
        file.coordinator.stale_after_failures
    );

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
        }
    };
    start_web_server(web_config, registry.clone(), shutdown).await?;

    registry.shutdown().await;
    Ok(())
}

async fn snapshot_command(cli: &Cli, args: &SnapshotArgs) -> anyhow::Result<()> {
    let file = load_monitor_file(cli)?;
    let (name, config) = select_device(&file, args.device.as_deref())?;
    let connector = Arc::new(EngineConnector::new(file.coordinator.scalar_timeout()));

    let mut coordinator = Coordinator::new(name.clone(), config, file.coordinator, connector);
    let snapshot = coordinator
        .poll_once()
        .await
        .with_context(|| format!("poll of {} failed", name))?;

    match args.format.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(snapshot.as_ref())?;
            println!("{}", json);
        }
        "pretty" => print_pretty_snapshot(&name, &snapshot),
        other => bail!("Unsupported format: {}. Use 'json' or 'pretty'", other),
    }

    Ok(())
}

async fn test_command(cli: &Cli, args: &TestArgs) -> anyhow::Result<()> {
    let file = load_monitor_file(cli)?;
    let (name, config) = select_device(&file, args.device.as_deref())?;
    let connector = EngineConnector::new(file.coordinator.scalar_timeout());

    match self_test(&config, &file.coordinator, &connector).await {
        Ok(snapshot) => {
            println!(
                "{}: ok ({} sensors, {} disks, {} volumes)",
                name,
                snapshot.sensors.len(),
                snapshot.disks.len(),
                snapshot.volumes.len()
            );
            Ok(())
        }
        Err(err) => {
            println!("{}: {} ({})", name, err.kind(), err);
            Err(err.into())
        }
    }
}

fn print_pretty_snapshot(name: &str, snapshot: &Snapshot) {
    println!(
        "{} ({})",
        name,
        chrono::DateTime::from_timestamp_millis(snapshot.timestamp)
            .unwrap_or_default()
            .format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("==========================================");
    println!();

    println!("Sensors:");
    for def in catalogue::SENSORS {
        let value = snapshot.sensor(def.key);
        if value.is_available() && !def.unit.is_empty() {
            println!("  {}: {} {}", def.name, value, def.unit);
        } else {
            println!("  {}: {}", def.name, value);
        }
    }
    println!();

    if !snapshot.disks.is_empty() {
        println!("Disks:");
        for disk in snapshot.disks.values() {
            println!(
                "  {}: {} °C, {} GB",
                disk.label(),
                disk.temperature,
                disk.capacity
            );
        }
        println!();
    }

    if !snapshot.volumes.is_empty() {
        println!("Volumes:");
        for volume in snapshot.volumes.values() {
            println!(
                "  {} ({}, {}): {} free of {}",
                volume.name, volume.raid_level, volume.filesystem, volume.free_space, volume.size
            );
        }
        println!();
    }

    for table in &snapshot.unavailable_tables {
        println!("  {} table unavailable", table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli::try_parse_from(["nas_snmp_monitor"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("monitor.toml"));
    }

    #[test]
    fn test_snapshot_arguments() {
        let cli = Cli::try_parse_from([
            "nas_snmp_monitor",
            "--config",
            "/etc/nas.toml",
            "snapshot",
            "office",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/nas.toml"));
        match cli.command {
            Some(Commands::Snapshot(args)) => {
                assert_eq!(args.device.as_deref(), Some("office"));
                assert_eq!(args.format, "json");
            }
            _ => panic!("expected snapshot command"),
        }
    }

    #[test]
    fn test_select_device_defaults_to_first() {
        let file = MonitorFile::from_toml(
            r#"
            [[device]]
            name = "first"
            host = "192.0.2.1"

            [[device]]
            name = "second"
            host = "192.0.2.2"
            "#,
        )
        .unwrap();
        let (name, _) = select_device(&file, None).unwrap();
        assert_eq!(name, "first");
        assert!(select_device(&file, Some("third")).is_err());
    }
}
