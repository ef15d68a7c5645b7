use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use camlink_frame::{
    decode_frames, encode_frame, is_heartbeat, CorrelationId, Envelope, HEADER_SIZE,
};
use camlink_peer::{
    CameraClient, CameraServer, LinkConfig, LinkState, PeerError, Recorder, RecorderError,
    Segment, UnroutablePolicy,
};
use serde_json::json;

#[derive(Debug, Default)]
struct Studio {
    recording: bool,
    frame: Option<String>,
    segment: Option<Segment>,
}

/// Recorder handle whose clones share one studio, so tests can look inside.
#[derive(Debug, Clone, Default)]
struct SharedRecorder(Arc<Mutex<Studio>>);

impl Recorder for SharedRecorder {
    fn is_recording(&self) -> bool {
        self.0.lock().unwrap().recording
    }

    fn start_recording(&mut self) -> Result<(), RecorderError> {
        self.0.lock().unwrap().recording = true;
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), RecorderError> {
        self.0.lock().unwrap().recording = false;
        Ok(())
    }

    fn current_frame_base64(&mut self, _format: &str) -> Result<Option<String>, RecorderError> {
        Ok(self.0.lock().unwrap().frame.clone())
    }

    fn latest_segment(&mut self) -> Result<Option<Segment>, RecorderError> {
        Ok(self.0.lock().unwrap().segment.clone())
    }
}

fn fast_config() -> LinkConfig {
    LinkConfig {
        poll_interval: Duration::from_millis(10),
        heartbeat_interval: Duration::from_millis(50),
        heartbeat_timeout: Duration::from_millis(400),
        retry_interval: Duration::from_millis(25),
        connect_timeout: Duration::from_millis(200),
        request_timeout: Duration::from_secs(5),
        ..LinkConfig::default()
    }
}

fn server() -> CameraServer {
    CameraServer::bind("127.0.0.1:0", fast_config()).expect("server should bind")
}

fn server_addr(server: &CameraServer) -> String {
    server.local_addr().expect("server has address").to_string()
}

fn connected_pair() -> (CameraServer, CameraClient, SharedRecorder) {
    let server = server();
    let recorder = SharedRecorder::default();
    let client = CameraClient::connect(&server_addr(&server), recorder.clone(), fast_config())
        .expect("client should start");
    assert!(server.wait_connected(Duration::from_secs(5)));
    assert!(client.wait_connected(Duration::from_secs(5)));
    (server, client, recorder)
}

fn read_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> bytes::Bytes {
    loop {
        let mut frames = decode_frames(buf, usize::MAX).unwrap();
        if !frames.is_empty() {
            // Only ever called when a single frame is expected at a time.
            let frame = frames.remove(0);
            assert!(frames.is_empty(), "unexpected extra frames");
            return frame;
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).expect("read should succeed");
        assert!(n > 0, "peer closed unexpectedly");
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Next frame that is not a heartbeat.
fn read_envelope(stream: &mut TcpStream, buf: &mut BytesMut) -> Envelope {
    loop {
        let frame = read_frame(stream, buf);
        if !is_heartbeat(&frame) {
            return Envelope::parse(frame).expect("request should carry an id");
        }
    }
}

fn write_frame(stream: &mut TcpStream, payload: &[u8]) {
    let mut wire = BytesMut::new();
    encode_frame(payload, &mut wire).unwrap();
    stream.write_all(&wire).unwrap();
}

/// Read until the server closes the connection on us.
fn wait_for_close(stream: &mut TcpStream) {
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(_) => continue,
            Err(err) if err.kind() == ErrorKind::ConnectionReset => return,
            Err(err) => panic!("server never closed the connection: {err}"),
        }
    }
}

#[test]
fn not_recording_before_start() {
    let (server, _client, _recorder) = connected_pair();
    assert!(!server.is_recording().unwrap());
}

#[test]
fn start_then_stop_recording() {
    let (server, _client, recorder) = connected_pair();

    assert!(server.start_recording().unwrap());
    assert!(server.is_recording().unwrap());
    assert!(recorder.is_recording());

    assert!(server.stop_recording().unwrap());
    assert!(!server.is_recording().unwrap());
}

#[test]
fn frame_and_segment_calls() {
    let (server, _client, recorder) = connected_pair();

    assert_eq!(server.current_frame_base64(".jpg").unwrap(), None);
    recorder.0.lock().unwrap().frame = Some("iVBORw0KGgo=".to_string());
    assert_eq!(
        server.current_frame_base64(".jpg").unwrap().as_deref(),
        Some("iVBORw0KGgo=")
    );

    assert_eq!(server.segment(None).unwrap(), None);
    let segment = Segment {
        name: "2024-05-01-10-00-00.avi".to_string(),
        data: vec![0, 1, 2, 250, 251, 252],
    };
    recorder.0.lock().unwrap().segment = Some(segment.clone());
    assert_eq!(server.segment(None).unwrap(), Some(segment.clone()));
    assert_eq!(server.segment(Some(&segment.name)).unwrap(), None);
}

#[test]
fn link_recovers_after_forced_disconnect() {
    let (server, client, _recorder) = connected_pair();
    assert!(server.start_recording().unwrap());

    server.link().disconnect();
    // Both sides notice and come back without being restarted.
    assert!(server.wait_connected(Duration::from_secs(5)));
    assert!(client.wait_connected(Duration::from_secs(5)));
    assert!(server.is_recording().unwrap());

    client.link().disconnect();
    assert!(client.wait_connected(Duration::from_secs(5)));
    assert!(server.stop_recording().unwrap());
    assert!(!server.is_recording().unwrap());
}

#[test]
fn request_during_outage_completes_after_reconnect() {
    let server = server();
    let addr = server_addr(&server);

    let starter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        CameraClient::connect(&addr, SharedRecorder::default(), fast_config()).unwrap()
    });

    // Issued before any camera is connected: queued, then answered.
    assert!(!server.is_recording().unwrap());
    let _client = starter.join().unwrap();
}

#[test]
fn request_during_outage_times_out() {
    let mut server = server();
    server.set_request_timeout(Duration::from_millis(300));

    let start = Instant::now();
    let err = server.is_recording().unwrap_err();
    assert!(matches!(err, PeerError::Timeout(_)));
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[test]
fn silent_peer_is_dropped_by_server() {
    let server = server();
    let mut raw = TcpStream::connect(server.local_addr().unwrap()).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    assert!(server.wait_connected(Duration::from_secs(5)));

    // Never answer; heartbeats arrive until the server gives up on us.
    let start = Instant::now();
    wait_for_close(&mut raw);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(300), "dropped after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4));
}

#[test]
fn silent_server_is_redialed_by_client() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let client = CameraClient::connect(&addr, SharedRecorder::default(), fast_config()).unwrap();

    let (_first, _) = listener.accept().unwrap();
    assert!(client.wait_connected(Duration::from_secs(5)));
    let dropped_at = Instant::now();

    // No heartbeat from us: the client must give up and dial again.
    let (_second, _) = listener.accept().unwrap();
    assert!(dropped_at.elapsed() >= Duration::from_millis(300));
    assert!(client.wait_connected(Duration::from_secs(5)));
    assert_ne!(client.state(), LinkState::Stopped);
}

#[test]
fn new_camera_replaces_current_peer() {
    let server = server();
    let mut stale = TcpStream::connect(server.local_addr().unwrap()).unwrap();
    stale.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    assert!(server.wait_connected(Duration::from_secs(5)));

    let fresh = SharedRecorder::default();
    fresh.0.lock().unwrap().recording = true;
    let _client = CameraClient::connect(&server_addr(&server), fresh, fast_config()).unwrap();

    // A request can still go to the stale peer before the switch.
    let mut server = server;
    server.set_request_timeout(Duration::from_millis(300));
    let deadline = Instant::now() + Duration::from_secs(5);
    while !matches!(server.is_recording(), Ok(true)) {
        assert!(Instant::now() < deadline, "never switched to the new camera");
    }

    // The replaced peer is closed, not left dangling.
    wait_for_close(&mut stale);
}

#[test]
fn request_cut_short_is_resent_after_reconnect() {
    let server = server();
    let addr = server_addr(&server);

    // Connects but never reads, so a large request stalls part way.
    let stalled = TcpStream::connect(&addr).unwrap();
    assert!(server.wait_connected(Duration::from_secs(5)));

    let body = serde_json::to_vec(&json!({
        "request": "current_frame_base64",
        "format": ".".repeat(15 * 1024 * 1024),
    }))
    .unwrap();
    let total = HEADER_SIZE + 16 + body.len();
    let requester = {
        let correlator = server.correlator().clone();
        thread::spawn(move || correlator.request(&body, Duration::from_secs(30)))
    };

    let outbound = server.link().handle();
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut last = usize::MAX;
    loop {
        thread::sleep(Duration::from_millis(100));
        let queued = outbound.queued_bytes();
        if queued > 0 && queued < total && queued == last {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "request never stalled part way ({queued} of {total} bytes queued)"
        );
        last = queued;
    }
    drop(stalled);

    let recorder = SharedRecorder::default();
    recorder.0.lock().unwrap().frame = Some("c3RpbGw=".to_string());
    let _client = CameraClient::connect(&addr, recorder, fast_config()).unwrap();

    let reply = requester.join().unwrap().expect("request should survive the reconnect");
    let frame: Option<String> = camlink_peer::parse_reply(&reply).unwrap();
    assert_eq!(frame.as_deref(), Some("c3RpbGw="));
    assert_eq!(outbound.queued_bytes(), 0);
}

#[test]
fn oversized_prefix_drops_connection_and_link_recovers() {
    let config = LinkConfig {
        max_frame_size: 1024,
        heartbeat_interval: Duration::from_secs(1),
        heartbeat_timeout: Duration::from_secs(5),
        ..fast_config()
    };
    let server = CameraServer::bind("127.0.0.1:0", config.clone()).unwrap();
    let addr = server_addr(&server);
    let mut raw = TcpStream::connect(&addr).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    assert!(server.wait_connected(Duration::from_secs(5)));

    // One valid message, then a length prefix past the limit.
    let stray = Envelope::new(CorrelationId::random(), &b"sent before the bad prefix"[..]);
    let mut wire = BytesMut::new();
    encode_frame(&stray.to_payload(), &mut wire).unwrap();
    wire.extend_from_slice(&2048u32.to_be_bytes());
    raw.write_all(&wire).unwrap();

    let start = Instant::now();
    wait_for_close(&mut raw);
    assert!(
        start.elapsed() < Duration::from_secs(3),
        "dropped by heartbeat timeout, not by the bad prefix"
    );

    let routed = server
        .correlator()
        .take_unmatched()
        .expect("frame ahead of the bad prefix should be routed");
    assert_eq!(&routed[16..], b"sent before the bad prefix");

    let _client = CameraClient::connect(&addr, SharedRecorder::default(), config).unwrap();
    assert!(!server.is_recording().unwrap());
    assert_eq!(server.state(), LinkState::Connected);
}

#[test]
fn response_under_other_id_does_not_match() {
    let mut server = server();
    server.set_request_timeout(Duration::from_millis(400));
    let mut raw = TcpStream::connect(server.local_addr().unwrap()).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let responder = thread::spawn(move || {
        let mut buf = BytesMut::new();
        let request = read_envelope(&mut raw, &mut buf);
        let wrong = Envelope::new(CorrelationId::random(), &br#"{"value":true}"#[..]);
        write_frame(&mut raw, &wrong.to_payload());
        (request.id, raw)
    });

    let err = server.is_recording().unwrap_err();
    assert!(matches!(err, PeerError::Timeout(_)));
    let (_request_id, _raw) = responder.join().unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    let stray = loop {
        if let Some(stray) = server.correlator().take_unmatched() {
            break stray;
        }
        assert!(Instant::now() < deadline, "mismatched response was lost");
        thread::sleep(Duration::from_millis(10));
    };
    assert_eq!(&stray[16..], br#"{"value":true}"#);
}

#[test]
fn response_trickled_byte_by_byte_is_reassembled() {
    let server = server();
    let mut raw = TcpStream::connect(server.local_addr().unwrap()).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    raw.set_nodelay(true).unwrap();

    let responder = thread::spawn(move || {
        let mut buf = BytesMut::new();
        let request = read_envelope(&mut raw, &mut buf);
        let reply = Envelope::new(request.id, &br#"{"value":true}"#[..]);
        let mut wire = BytesMut::new();
        encode_frame(&reply.to_payload(), &mut wire).unwrap();
        for byte in wire.iter() {
            raw.write_all(&[*byte]).unwrap();
            thread::sleep(Duration::from_millis(2));
        }
        raw
    });

    assert!(server.is_recording().unwrap());
    let _raw = responder.join().unwrap();
}

#[test]
fn unroutable_request_gets_error_reply() {
    let (server, _client, _) = connected_pair();
    let body = server
        .correlator()
        .request(br#"{"request":"zoom"}"#, Duration::from_secs(5))
        .unwrap();
    let err = camlink_peer::parse_reply::<bool>(&body).unwrap_err();
    assert!(matches!(err, PeerError::Remote(msg) if msg == "unknown request: zoom"));
}

#[test]
fn unroutable_request_ignored_when_configured() {
    let server = server();
    let config = LinkConfig {
        unroutable: UnroutablePolicy::Ignore,
        ..fast_config()
    };
    let client =
        CameraClient::connect(&server_addr(&server), SharedRecorder::default(), config).unwrap();
    assert!(client.wait_connected(Duration::from_secs(5)));

    let err = server
        .correlator()
        .request(br#"{"request":"zoom"}"#, Duration::from_millis(300))
        .unwrap_err();
    assert!(matches!(err, PeerError::Timeout(_)));
}

#[test]
fn stop_closes_listener() {
    let mut server = server();
    let addr = server.local_addr().unwrap();
    server.stop();
    assert_eq!(server.state(), LinkState::Stopped);
    assert!(TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_err());
}
