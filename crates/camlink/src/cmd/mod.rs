use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camlink_peer::{LinkConfig, UnroutablePolicy};
use clap::{Args, Subcommand, ValueEnum};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod camera;
pub mod ctl;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the camera side: dial the web process and answer its calls.
    Camera(CameraArgs),
    /// Run the web side for one call against a connecting camera.
    Ctl(CtlArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Camera(args) => camera::run(args),
        Command::Ctl(args) => ctl::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Link tuning shared by both roles.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Idle wait per worker iteration (e.g. 100ms).
    #[arg(long, env = "CAMLINK_POLL_INTERVAL", default_value = "100ms", value_parser = parse_duration)]
    pub poll_interval: Duration,
    /// Send a heartbeat after this much outbound silence.
    #[arg(long, env = "CAMLINK_HEARTBEAT_INTERVAL", default_value = "1s", value_parser = parse_duration)]
    pub heartbeat_interval: Duration,
    /// Drop the peer after this much inbound silence.
    #[arg(long, env = "CAMLINK_HEARTBEAT_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub heartbeat_timeout: Duration,
    /// Pause between reconnect attempts.
    #[arg(long, env = "CAMLINK_RETRY_INTERVAL", default_value = "1s", value_parser = parse_duration)]
    pub retry_interval: Duration,
    /// Bound on a single dial attempt.
    #[arg(long, env = "CAMLINK_CONNECT_TIMEOUT", default_value = "1s", value_parser = parse_duration)]
    pub connect_timeout: Duration,
    /// Largest accepted frame payload, in bytes.
    #[arg(long, env = "CAMLINK_MAX_FRAME_SIZE", default_value_t = camlink_frame::DEFAULT_MAX_PAYLOAD)]
    pub max_frame_size: usize,
    /// Unmatched messages kept before the oldest is dropped.
    #[arg(long, env = "CAMLINK_MAX_UNMATCHED", default_value_t = 256)]
    pub max_unmatched: usize,
    /// How long a call waits for its response.
    #[arg(long, env = "CAMLINK_REQUEST_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub request_timeout: Duration,
    /// What the camera does with requests it cannot route.
    #[arg(long, env = "CAMLINK_UNROUTABLE", value_enum, default_value_t = Unroutable::Reply)]
    pub unroutable: Unroutable,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Unroutable {
    /// Answer with an error envelope.
    Reply,
    /// Leave the request unanswered.
    Ignore,
}

impl From<Unroutable> for UnroutablePolicy {
    fn from(value: Unroutable) -> Self {
        match value {
            Unroutable::Reply => UnroutablePolicy::Reply,
            Unroutable::Ignore => UnroutablePolicy::Ignore,
        }
    }
}

impl LinkArgs {
    pub fn to_config(&self) -> CliResult<LinkConfig> {
        let config = LinkConfig {
            poll_interval: self.poll_interval,
            heartbeat_interval: self.heartbeat_interval,
            heartbeat_timeout: self.heartbeat_timeout,
            retry_interval: self.retry_interval,
            connect_timeout: self.connect_timeout,
            max_frame_size: self.max_frame_size,
            max_unmatched: self.max_unmatched,
            request_timeout: self.request_timeout,
            unroutable: self.unroutable.into(),
        };
        config
            .validate()
            .map_err(|err| crate::exit::peer_error("invalid link settings", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct CameraArgs {
    /// Address of the web process (HOST:PORT).
    #[arg(long, env = "CAMLINK_CONNECT", value_name = "HOST:PORT")]
    pub connect: String,
    /// Image file served as the current frame.
    #[arg(long, value_name = "FILE")]
    pub frame_file: Option<PathBuf>,
    /// Directory of finished segments; the newest by name is served.
    #[arg(long, value_name = "DIR")]
    pub segments_dir: Option<PathBuf>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct CtlArgs {
    /// Address to listen on for the camera (HOST:PORT).
    #[arg(long, env = "CAMLINK_BIND", value_name = "HOST:PORT")]
    pub bind: String,
    /// How long to wait for the camera to connect.
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub wait: Duration,
    #[command(flatten)]
    pub link: LinkArgs,
    #[command(subcommand)]
    pub call: CtlCall,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CtlCall {
    /// Ask whether the camera is recording.
    Status,
    /// Start recording.
    Start,
    /// Stop recording.
    Stop,
    /// Fetch the current frame.
    Frame {
        /// Image encoding requested from the camera.
        #[arg(long, default_value = ".jpg")]
        ext: String,
    },
    /// Fetch the newest finished segment.
    Segment {
        /// Name of the segment already held; nothing is returned if it is still the newest.
        #[arg(long, value_name = "NAME")]
        last: Option<String>,
        /// Write the segment bytes here.
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

/// Flag cleared by Ctrl-C.
pub fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}
