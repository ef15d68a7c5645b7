use std::fs;
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use camlink_peer::CameraServer;
use serde_json::{json, Value};
use tracing::info;

use crate::cmd::{CtlArgs, CtlCall};
use crate::exit::{io_error, peer_error, CliError, CliResult, DATA_INVALID, SUCCESS, TIMEOUT};
use crate::output::{print_call, print_raw, CallReport, OutputFormat};

/// Result of one call: printable value plus the decoded bytes, if any.
struct Outcome {
    result: Value,
    bytes: Option<Vec<u8>>,
}

pub fn run(args: CtlArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.to_config()?;
    let mut server =
        CameraServer::bind(&args.bind, config).map_err(|err| peer_error("bind failed", err))?;
    let addr = server
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| args.bind.clone());
    info!(%addr, wait = ?args.wait, "waiting for camera");

    if !server.wait_connected(args.wait) {
        server.stop();
        return Err(CliError::new(
            TIMEOUT,
            format!("no camera connected to {addr} within {:?}", args.wait),
        ));
    }

    let started = Instant::now();
    let outcome = call(&server, &args.call);
    let elapsed_ms = started.elapsed().as_millis();
    server.stop();
    let outcome = outcome?;

    if format == OutputFormat::Raw {
        if let Some(bytes) = &outcome.bytes {
            print_raw(bytes);
            return Ok(SUCCESS);
        }
    }

    print_call(
        &CallReport {
            call: call_name(&args.call),
            addr: &addr,
            result: outcome.result,
            elapsed_ms,
        },
        format,
    );
    Ok(SUCCESS)
}

fn call_name(call: &CtlCall) -> &'static str {
    match call {
        CtlCall::Status => "status",
        CtlCall::Start => "start",
        CtlCall::Stop => "stop",
        CtlCall::Frame { .. } => "frame",
        CtlCall::Segment { .. } => "segment",
    }
}

fn call(server: &CameraServer, call: &CtlCall) -> CliResult<Outcome> {
    let context = format!("{} failed", call_name(call));
    let fail = |err| peer_error(&context, err);

    let outcome = match call {
        CtlCall::Status => plain(json!(server.is_recording().map_err(fail)?)),
        CtlCall::Start => plain(json!(server.start_recording().map_err(fail)?)),
        CtlCall::Stop => plain(json!(server.stop_recording().map_err(fail)?)),
        CtlCall::Frame { ext } => match server.current_frame_base64(ext).map_err(fail)? {
            Some(encoded) => {
                let bytes = BASE64.decode(&encoded).map_err(|err| {
                    CliError::new(DATA_INVALID, format!("frame is not valid base64: {err}"))
                })?;
                Outcome {
                    result: Value::String(encoded),
                    bytes: Some(bytes),
                }
            }
            None => plain(Value::Null),
        },
        CtlCall::Segment { last, output } => match server.segment(last.as_deref()).map_err(fail)? {
            Some(segment) => {
                if let Some(path) = output {
                    fs::write(path, &segment.data).map_err(|err| {
                        io_error(&format!("failed writing {}", path.display()), err)
                    })?;
                    info!(path = %path.display(), name = %segment.name, "segment written");
                }
                Outcome {
                    result: json!({
                        "name": segment.name,
                        "bytes": segment.data.len(),
                        "path": output.as_ref().map(|path| path.display().to_string()),
                    }),
                    bytes: Some(segment.data),
                }
            }
            None => plain(Value::Null),
        },
    };
    Ok(outcome)
}

fn plain(result: Value) -> Outcome {
    Outcome {
        result,
        bytes: None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn call_names_are_stable() {
        assert_eq!(call_name(&CtlCall::Status), "status");
        assert_eq!(
            call_name(&CtlCall::Frame {
                ext: ".png".to_string()
            }),
            "frame"
        );
        assert_eq!(
            call_name(&CtlCall::Segment {
                last: None,
                output: Some(PathBuf::from("/tmp/x.avi"))
            }),
            "segment"
        );
    }
}
