use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::config::{GeneralConfig, LogFormat};

/// Daily-rotated files are named `<prefix>.<date>`
const LOG_FILE_PREFIX: &str = "presence-player.log";

pub struct LoggingConfig {
    pub level: Level,
    pub json_format: bool,
    /// Daemon mode also writes rotated files under `log_dir`
    pub file_output: bool,
    pub log_dir: Option<PathBuf>,
}

impl LoggingConfig {
    /// Settings from `[general]`; `verbose` forces debug output
    pub fn from_general(general: &GeneralConfig, verbose: bool, file_output: bool) -> Self {
        Self {
            level: if verbose {
                Level::DEBUG
            } else {
                parse_level(&general.log_level)
            },
            json_format: general.log_format == LogFormat::Json,
            file_output,
            log_dir: None,
        }
    }
}

/// Install the global subscriber. Console output is always on; the returned
/// guard must live as long as file output is wanted.
pub fn initialize_logging(config: LoggingConfig) -> Result<(Option<WorkerGuard>, Option<PathBuf>)> {
    // Other crates log at warn and above
    let env_filter = EnvFilter::new(format!(
        "warn,presence_player={}",
        config.level.as_str().to_lowercase()
    ));

    let mut layers = vec![if config.json_format {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    }];

    let mut guard = None;
    let log_dir = match (config.file_output, config.log_dir) {
        (false, _) => None,
        (true, dir) => {
            let dir = match dir {
                Some(dir) => dir,
                None => default_log_dir()?,
            };
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

            let (writer, worker_guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX));
            guard = Some(worker_guard);
            layers.push(if config.json_format {
                fmt::layer().json().with_writer(writer).boxed()
            } else {
                fmt::layer()
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(writer)
                    .boxed()
            });
            Some(dir)
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .init();

    Ok((guard, log_dir))
}

/// Map a configured level name to a tracing level, defaulting to INFO
pub fn parse_level(name: &str) -> Level {
    name.parse().unwrap_or_else(|_| {
        tracing::warn!("Unknown log level '{}', using info", name);
        Level::INFO
    })
}

pub fn default_log_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home_dir.join(".local/share/presence-player/logs"))
}

/// Remove rotated daemon logs last written more than `keep_days` ago.
/// Returns how many files were removed.
pub fn cleanup_old_logs(log_dir: &Path, keep_days: u64) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }
    let cutoff = SystemTime::now() - Duration::from_secs(60 * 60 * 24 * keep_days);

    let mut removed = 0;
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let is_daemon_log = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !is_daemon_log {
            continue;
        }

        let modified = entry.metadata().and_then(|metadata| metadata.modified());
        match modified {
            Ok(modified) if modified < cutoff => match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove {}: {}", entry.path().display(), e),
            },
            Ok(_) => {}
            Err(e) => tracing::debug!("Skipping {}: {}", entry.path().display(), e),
        }
    }

    if removed > 0 {
        tracing::info!("Removed {} old log files from {}", removed, log_dir.display());
    }
    Ok(removed)
}
