use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Overrides the computed filter, e.g. `camlink_peer=trace,warn`.
pub const LOG_FILTER_ENV: &str = "CAMLINK_LOG";

/// Targets that log at the requested level; everything else is capped at warn.
const CAMLINK_TARGETS: [&str; 4] = [
    "camlink",
    "camlink_transport",
    "camlink_frame",
    "camlink_peer",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Link crates at `level`, third-party crates no chattier than warn.
pub fn link_filter(level: LogLevel) -> Targets {
    let level = level.as_filter();
    Targets::new()
        .with_default(level.min(LevelFilter::WARN))
        .with_targets(CAMLINK_TARGETS.map(|target| (target, level)))
}

/// An unparsable override falls back to the level-derived filter.
fn resolve_filter(level: LogLevel, spec: Option<&str>) -> Targets {
    spec.and_then(|spec| spec.parse::<Targets>().ok())
        .unwrap_or_else(|| link_filter(level))
}

/// Logs go to stderr so stdout stays clean for call results.
///
/// Thread names are kept: each link runs on its own named worker.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let spec = std::env::var(LOG_FILTER_ENV).ok();
    let filter = resolve_filter(level, spec.as_deref());
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = tracing_subscriber::registry()
                .with(layer.with_filter(filter))
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::registry()
                .with(layer.json().with_filter(filter))
                .try_init();
        }
    }
}
