//! Both roles in one process: a web-side server and an in-memory camera.
//!
//! Run with:
//!   cargo run --example loopback
//!
//! Against a real camera process instead:
//!   cargo run --features cli -- ctl --bind 127.0.0.1:5050 status
//!   cargo run --features cli -- camera --connect 127.0.0.1:5050

use std::time::Duration;

use camlink::peer::{CameraClient, CameraServer, LinkConfig, Recorder, RecorderError};

#[derive(Default)]
struct Toy {
    recording: bool,
}

impl Recorder for Toy {
    fn is_recording(&self) -> bool {
        self.recording
    }

    fn start_recording(&mut self) -> Result<(), RecorderError> {
        self.recording = true;
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), RecorderError> {
        self.recording = false;
        Ok(())
    }

    fn current_frame_base64(&mut self, _format: &str) -> Result<Option<String>, RecorderError> {
        Ok(None)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = CameraServer::bind("127.0.0.1:0", LinkConfig::default())?;
    let addr = server.local_addr().ok_or("server has no address")?;
    eprintln!("Listening on {addr}");

    let _camera = CameraClient::connect(&addr.to_string(), Toy::default(), LinkConfig::default())?;
    if !server.wait_connected(Duration::from_secs(5)) {
        return Err("camera never connected".into());
    }

    eprintln!("recording: {}", server.is_recording()?);
    server.start_recording()?;
    eprintln!("recording: {}", server.is_recording()?);
    server.stop_recording()?;
    eprintln!("recording: {}", server.is_recording()?);
    Ok(())
}
