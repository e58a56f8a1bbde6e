use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use presence_player::config::{Config, ConfigLoader};
use presence_player::logging::{self, LoggingConfig};
use presence_player::presence::{PresenceSensor, SignalSource};
use presence_player::service::{PresenceService, ServiceManager};
use presence_player::system::StandardFileSystem;
use presence_player::Decision;

#[derive(Parser)]
#[command(name = "presence-player")]
#[command(about = "Plays a chosen clip when a known WiFi network or Bluetooth device is nearby")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Source {
    Wifi,
    Bluetooth,
}

impl From<Source> for SignalSource {
    fn from(source: Source) -> Self {
        match source {
            Source::Wifi => SignalSource::Wifi,
            Source::Bluetooth => SignalSource::Bluetooth,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BackgroundAction {
    On,
    Off,
    Status,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll both radios and play mapped clips until stopped
    Daemon,
    /// Run a single poll of one radio, as a background scheduler would
    Tick {
        #[arg(short, long, value_enum)]
        source: Source,
    },
    /// List saved mappings
    List {
        #[arg(short, long, value_enum)]
        source: Option<Source>,
    },
    /// Create or replace a mapping
    Save {
        #[arg(short, long, value_enum)]
        source: Source,
        /// BSSID, `ssid:<name>` or Bluetooth address
        #[arg(long)]
        id: String,
        /// Network or device name to display
        #[arg(short, long)]
        name: String,
        /// Audio file path or file:// URI
        #[arg(short, long)]
        audio: String,
        #[arg(short, long)]
        label: Option<String>,
    },
    /// Delete a mapping
    Delete {
        #[arg(short, long, value_enum)]
        source: Source,
        #[arg(long)]
        id: String,
    },
    /// Play a mapping's clip now
    Test {
        #[arg(short, long, value_enum)]
        source: Source,
        #[arg(long)]
        id: String,
    },
    /// Enable, disable or show scheduled background monitoring
    Background {
        #[arg(value_enum)]
        action: BackgroundAction,
    },
    /// Validate configuration file
    CheckConfig,
    /// Print what the radios currently report
    Scan,
}

type Service = PresenceService<
    presence_player::system::NmcliWifiAdapter,
    presence_player::system::BluetoothctlAdapter,
    presence_player::system::FileKeyValueStore,
    presence_player::system::CommandAudioSink,
>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::new_production(path.clone()),
        None => ConfigLoader::new_with_default_path()?,
    };
    let config = loader.load_config()?;

    let daemon = matches!(cli.command, None | Some(Commands::Daemon));
    let (_guard, log_dir) = logging::initialize_logging(LoggingConfig::from_general(
        &config.general,
        cli.verbose,
        daemon,
    ))?;
    if let Some(dir) = &log_dir {
        info!("Writing logs to {}", dir.display());
        if let Err(e) = logging::cleanup_old_logs(dir, config.general.log_retention_days) {
            warn!("Failed to clean up old logs: {}", e);
        }
    }
    info!("Configuration loaded from {}", loader.config_path().display());

    let service = Arc::new(Service::new_production(config)?);

    match cli.command {
        None | Some(Commands::Daemon) => {
            let config = service.config().clone();
            drop(service);
            run_daemon(loader, config).await?
        }
        Some(Commands::Tick { source }) => run_tick(&service, source.into()).await?,
        Some(Commands::List { source }) => list_mappings(&service, source.map(Into::into)).await?,
        Some(Commands::Save {
            source,
            id,
            name,
            audio,
            label,
        }) => {
            let label = label.unwrap_or_else(|| audio_label(&audio));
            service
                .mappings()
                .save_mapping(source.into(), &id, &name, &audio, &label)
                .await
                .context("Failed to save mapping")?;
            println!("✓ Saved {} -> {}", name, label);
        }
        Some(Commands::Delete { source, id }) => {
            service
                .mappings()
                .delete_mapping(source.into(), &id)
                .await
                .context("Failed to delete mapping")?;
            println!("✓ Deleted mapping for {}", id);
        }
        Some(Commands::Test { source, id }) => {
            let found = service
                .mappings()
                .test_mapping(source.into(), &id)
                .await
                .context("Failed to play mapping")?;
            if !found {
                bail!("No {} mapping for {}", SignalSource::from(source), id);
            }
            wait_for_clip(&service).await?;
        }
        Some(Commands::Background { action }) => background(&service, action).await?,
        Some(Commands::CheckConfig) => check_config(service.config()),
        Some(Commands::Scan) => scan(&service).await,
    }

    Ok(())
}

async fn run_daemon(loader: ConfigLoader<StandardFileSystem>, config: Config) -> Result<()> {
    let mut manager = ServiceManager::new(loader, config, Service::new_production)?;

    if !manager
        .service()
        .mappings()
        .background_enabled()
        .await
        .unwrap_or(false)
    {
        info!("Background monitoring is disabled; running in the foreground only");
    }

    println!("Presence player daemon started");
    println!("  Press Ctrl+C to stop, send SIGHUP to reload the configuration");

    manager.run_until_signalled().await?;

    println!("Daemon stopped");
    Ok(())
}

async fn run_tick(service: &Arc<Service>, source: SignalSource) -> Result<()> {
    let enabled = service
        .mappings()
        .background_enabled()
        .await
        .context("Failed to read background monitoring flag")?;
    if !enabled {
        println!("Background monitoring is disabled, nothing to do");
        return Ok(());
    }

    let decision = match source {
        SignalSource::Wifi => service.run_wifi_tick().await,
        SignalSource::Bluetooth => service.run_bluetooth_tick().await,
    };
    println!("{} tick: {:?}", source, decision);

    if matches!(decision, Decision::Played(_)) {
        wait_for_clip(service).await?;
    }
    Ok(())
}

/// Keep the process alive until the clip ends or Ctrl+C
async fn wait_for_clip(service: &Arc<Service>) -> Result<()> {
    let playback = service.engine().playback().clone();
    let finished = async {
        while playback.is_playing(None) {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    };

    tokio::select! {
        _ = finished => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            playback.stop().await;
        }
    }
    Ok(())
}

async fn list_mappings(service: &Arc<Service>, source: Option<SignalSource>) -> Result<()> {
    let sources = match source {
        Some(source) => vec![source],
        None => vec![SignalSource::Wifi, SignalSource::Bluetooth],
    };

    for source in sources {
        let mappings = service
            .mappings()
            .load_mappings(source)
            .await
            .with_context(|| format!("Failed to load {} mappings", source))?;

        println!("{} mappings:", source);
        if mappings.is_empty() {
            println!("  (none)");
        }
        for mapping in mappings {
            println!("  {}", mapping);
        }
    }
    Ok(())
}

async fn background(service: &Arc<Service>, action: BackgroundAction) -> Result<()> {
    let mappings = service.mappings();
    match action {
        BackgroundAction::On => mappings.set_background_enabled(true).await?,
        BackgroundAction::Off => mappings.set_background_enabled(false).await?,
        BackgroundAction::Status => {}
    }
    let enabled = mappings.background_enabled().await?;
    println!(
        "Background monitoring: {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn check_config(config: &Config) {
    println!("Configuration validation:");
    println!("  ✓ Configuration file parsed successfully");
    println!(
        "  ✓ WiFi: {} (every {:?})",
        if config.wifi.enabled { "enabled" } else { "disabled" },
        config.wifi.poll_interval()
    );
    println!(
        "  ✓ Bluetooth: {} (every {:?}, {:?} scan, mode {:?})",
        if config.bluetooth.enabled { "enabled" } else { "disabled" },
        config.bluetooth.poll_interval(),
        config.bluetooth.scan_window(),
        config.bluetooth.mode
    );
    println!("  ✓ Player: {}", config.playback.player_command.join(" "));
}

async fn scan(service: &Arc<Service>) {
    let wifi = service.wifi_monitor().sensor().read().await;
    match wifi {
        Ok(Some(presence)) => println!("WiFi: {} ({})", presence.display_name, presence.identity),
        Ok(None) => println!("WiFi: not connected"),
        Err(e) => println!("WiFi: unavailable ({})", e),
    }

    println!("Scanning for Bluetooth devices...");
    let bluetooth = service.bluetooth_monitor().sensor().read().await;
    match bluetooth {
        Ok(Some(presence)) => {
            println!("Bluetooth: {} ({})", presence.display_name, presence.identity)
        }
        Ok(None) => println!("Bluetooth: no device nearby"),
        Err(e) => println!("Bluetooth: unavailable ({})", e),
    }
}

/// File name without extension, used when no label is given
fn audio_label(audio: &str) -> String {
    let path = std::path::Path::new(audio.strip_prefix("file://").unwrap_or(audio));
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| audio.to_string())
}
