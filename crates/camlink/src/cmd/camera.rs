use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use camlink_peer::{CameraClient, LinkState, Recorder, RecorderError, Segment};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, CameraArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};

/// Recorder backed by files on disk, for exercising a web process without a camera.
#[derive(Debug, Default)]
pub struct DemoRecorder {
    recording: bool,
    frame_file: Option<PathBuf>,
    segments_dir: Option<PathBuf>,
}

impl DemoRecorder {
    pub fn new(frame_file: Option<PathBuf>, segments_dir: Option<PathBuf>) -> Self {
        Self {
            recording: false,
            frame_file,
            segments_dir,
        }
    }
}

impl Recorder for DemoRecorder {
    fn is_recording(&self) -> bool {
        self.recording
    }

    fn start_recording(&mut self) -> Result<(), RecorderError> {
        if !self.recording {
            info!("recording started");
        }
        self.recording = true;
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), RecorderError> {
        if self.recording {
            info!("recording stopped");
        }
        self.recording = false;
        Ok(())
    }

    fn current_frame_base64(&mut self, format: &str) -> Result<Option<String>, RecorderError> {
        let Some(path) = &self.frame_file else {
            return Ok(None);
        };
        let wanted = format.trim_start_matches('.');
        let actual = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        if !actual.eq_ignore_ascii_case(wanted) {
            warn!(requested = %format, file = %path.display(), "frame file has a different encoding");
        }
        let bytes = read(path)?;
        Ok(Some(BASE64.encode(bytes)))
    }

    fn latest_segment(&mut self) -> Result<Option<Segment>, RecorderError> {
        let Some(dir) = &self.segments_dir else {
            return Ok(None);
        };
        let Some(path) = newest_file(dir)? else {
            return Ok(None);
        };
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let data = read(&path)?;
        Ok(Some(Segment { name, data }))
    }
}

fn read(path: &Path) -> Result<Vec<u8>, RecorderError> {
    fs::read(path).map_err(|err| RecorderError::new(format!("read {}: {err}", path.display())))
}

/// Segment names are timestamps, so the greatest name is the newest.
fn newest_file(dir: &Path) -> Result<Option<PathBuf>, RecorderError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| RecorderError::new(format!("list {}: {err}", dir.display())))?;
    let newest = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .max();
    Ok(newest)
}

pub fn run(args: CameraArgs) -> CliResult<i32> {
    let config = args.link.to_config()?;
    let poll_interval = config.poll_interval;
    let running = install_ctrlc_handler()?;

    let recorder = DemoRecorder::new(args.frame_file, args.segments_dir);
    let mut client = CameraClient::connect(&args.connect, recorder, config)
        .map_err(|err| peer_error("camera link failed", err))?;
    info!(addr = %args.connect, "camera link started");

    let mut last_state = LinkState::Disconnected;
    while running.load(Ordering::SeqCst) {
        let state = client.state();
        if state != last_state {
            info!(%state, "link state changed");
            last_state = state;
        }
        thread::sleep(poll_interval.max(Duration::from_millis(50)));
    }

    client.stop();
    info!("camera link stopped");
    Ok(SUCCESS)
}
