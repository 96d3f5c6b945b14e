use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "mastery-engine.log";

/// Keeps the background file writer alive; drop it only at shutdown.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
    /// Daily-rotated file output directory, if file logs are enabled.
    pub file_dir: Option<PathBuf>,
}

impl LogSettings {
    pub fn from_env(log_level: &str) -> Self {
        Self::from_values(
            log_level,
            std::env::var("ENABLE_FILE_LOGS").ok().as_deref(),
            std::env::var("LOG_DIR").ok().as_deref(),
        )
    }

    fn from_values(log_level: &str, enable_file_logs: Option<&str>, log_dir: Option<&str>) -> Self {
        let enabled = matches!(
            enable_file_logs.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("true" | "1")
        );
        let file_dir = enabled.then(|| {
            PathBuf::from(
                log_dir
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or("./logs"),
            )
        });
        Self {
            filter: log_level.to_string(),
            file_dir,
        }
    }
}

pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    let settings = LogSettings::from_env(log_level);
    let env_filter =
        EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true));

    let Some(dir) = settings.file_dir else {
        registry.init();
        return None;
    };

    if let Err(err) = std::fs::create_dir_all(&dir) {
        registry.init();
        tracing::warn!(error = %err, dir = %dir.display(), "file logging disabled");
        return None;
    }

    let appender = RollingFileAppender::new(Rotation::DAILY, &dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    registry
        .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
        .init();

    Some(FileLogGuard { _guard: guard })
}
