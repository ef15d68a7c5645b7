mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "camlink", version, about = "Camera control link CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level for the link crates (stderr). CAMLINK_LOG overrides.
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cmd::{CtlCall, Unroutable};

    #[test]
    fn parses_camera_subcommand() {
        let cli = Cli::try_parse_from([
            "camlink",
            "camera",
            "--connect",
            "127.0.0.1:5050",
            "--frame-file",
            "/tmp/still.jpg",
            "--heartbeat-timeout",
            "3s",
        ])
        .expect("camera args should parse");

        let Command::Camera(args) = cli.command else {
            panic!("expected camera command");
        };
        assert_eq!(args.connect, "127.0.0.1:5050");
        assert_eq!(args.link.heartbeat_timeout, Duration::from_secs(3));
        assert_eq!(args.link.heartbeat_interval, Duration::from_secs(1));
        assert!(args.segments_dir.is_none());
    }

    #[test]
    fn parses_ctl_segment_call() {
        let cli = Cli::try_parse_from([
            "camlink",
            "--format",
            "json",
            "ctl",
            "--bind",
            "0.0.0.0:5050",
            "--wait",
            "500ms",
            "segment",
            "--last",
            "2024-05-01-10-00-00.avi",
        ])
        .expect("ctl args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        let Command::Ctl(args) = cli.command else {
            panic!("expected ctl command");
        };
        assert_eq!(args.wait, Duration::from_millis(500));
        assert_eq!(
            args.call,
            CtlCall::Segment {
                last: Some("2024-05-01-10-00-00.avi".to_string()),
                output: None,
            }
        );
    }

    #[test]
    fn frame_call_defaults_to_jpeg() {
        let cli = Cli::try_parse_from(["camlink", "ctl", "--bind", "127.0.0.1:0", "frame"])
            .expect("frame args should parse");
        let Command::Ctl(args) = cli.command else {
            panic!("expected ctl command");
        };
        assert_eq!(
            args.call,
            CtlCall::Frame {
                ext: ".jpg".to_string()
            }
        );
        assert_eq!(args.link.unroutable, Unroutable::Reply);
    }

    #[test]
    fn rejects_zero_duration() {
        let err = Cli::try_parse_from([
            "camlink",
            "camera",
            "--connect",
            "127.0.0.1:5050",
            "--poll-interval",
            "0ms",
        ])
        .expect_err("zero poll interval should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn ctl_requires_a_call() {
        let err = Cli::try_parse_from(["camlink", "ctl", "--bind", "127.0.0.1:0"])
            .expect_err("missing call should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingSubcommand);
    }
}
