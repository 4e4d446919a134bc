//! End-to-end tests for the fret monitor pipeline.
//!
//! These run the real shell on its own thread:
//!   simulated device → ShellEvent channel → Shell → FretboardFrame channel → assertions
//! with commands sent on the same channel the console and web page use.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use fret_monitor::render::CellMark;
use fret_monitor::shell::{event_channel, Shell, ShellHandle};
use fret_monitor::simulator::{release, strum, SimDevice, SimStep, SimulatedBackend};
use fret_monitor::types::*;
use fret_monitor::ws_server::WsServer;

// ─── Helpers ───────────────────────────────────────────────────────────────

struct Pipeline {
    tx: Sender<ShellEvent>,
    frames: Receiver<FretboardFrame>,
    shell: ShellHandle,
}

impl Pipeline {
    fn start(devices: Vec<SimDevice>) -> Self {
        let (tx, rx) = event_channel();
        let (frame_tx, frames) = bounded::<FretboardFrame>(4096);
        let shell_tx = tx.clone();
        let shell = ShellHandle::spawn(tx.clone(), move || {
            let backend = Box::new(SimulatedBackend::new(devices));
            Shell::new(backend, shell_tx, rx, vec![frame_tx])
        })
        .unwrap();
        Self { tx, frames, shell }
    }

    fn send(&self, line: &str) {
        self.tx.send(ShellEvent::Command(line.parse().unwrap())).unwrap();
    }

    /// First frame satisfying `pred`, or panic after a few seconds.
    fn wait_for(&self, what: &str, pred: impl Fn(&FretboardFrame) -> bool) -> FretboardFrame {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.frames.recv_timeout(left) {
                Ok(frame) if pred(&frame) => return frame,
                Ok(_) => {}
                Err(_) => panic!("timed out waiting for {}", what),
            }
        }
    }

    fn stop(self) {
        self.shell.quit();
    }
}

fn connected(frame: &FretboardFrame) -> bool {
    matches!(frame.status, ConnectionStatus::Connected(_))
}

fn hold(notes: &[Note]) -> Vec<SimStep> {
    let mut steps = strum(notes, 100, 5);
    steps.push(SimStep::Wait { ms: 60_000 });
    steps
}

// ─── Shell scenarios ───────────────────────────────────────────────────────

#[test]
fn test_low_e_against_e_major_marks_both() {
    let p = Pipeline::start(vec![SimDevice::new("Guitar", hold(&[40]))]);
    p.send("chord E Major");
    p.send("connect 0");

    let frame = p.wait_for("low E held", |f| f.pressed == vec![40]);
    assert!(connected(&frame));
    assert_eq!(frame.view.mark(Position::new(0, 0)), CellMark::Both);
    assert_eq!(frame.view.active_positions(), vec![Position::new(0, 0)]);
    // the rest of the shape is still drawn as target
    assert_eq!(frame.view.target_positions().len(), 6);
    p.stop();
}

#[test]
fn test_connect_failure_leaves_disconnected() {
    let p = Pipeline::start(vec![SimDevice::new("Busy", hold(&[40])).failing_on_open("in use")]);
    p.send("connect");

    let frame = p.wait_for("connect error", |f| f.notice.is_some());
    assert_eq!(frame.status, ConnectionStatus::Disconnected);
    assert!(frame.notice.unwrap().contains("unavailable"));
    assert!(frame.pressed.is_empty());
    assert!(frame.view.active_positions().is_empty());
    p.stop();
}

#[test]
fn test_note_on_then_off_clears() {
    let script = vec![
        SimStep::NoteOn { note: 57, velocity: 80 },
        SimStep::Wait { ms: 20 },
        SimStep::NoteOff { note: 57 },
        SimStep::Wait { ms: 60_000 },
    ];
    let p = Pipeline::start(vec![SimDevice::new("Guitar", script)]);
    p.send("connect Guitar");

    p.wait_for("A3 held", |f| f.pressed == vec![57]);
    let frame = p.wait_for("A3 released", |f| f.pressed.is_empty());
    assert!(connected(&frame));
    assert!(frame.view.active_positions().is_empty());
    p.stop();
}

#[test]
fn test_disconnect_while_held() {
    let p = Pipeline::start(vec![SimDevice::new("Guitar", hold(&[45, 52]))]);
    p.send("chord Am");
    p.send("connect 0");
    p.wait_for("two notes held", |f| f.pressed.len() == 2);

    p.send("disconnect");
    let frame = p.wait_for("disconnect", |f| !connected(f));
    assert!(frame.pressed.is_empty());
    assert!(frame.view.active_positions().is_empty());
    assert_eq!(frame.view.target_positions().len(), 5);

    // nothing from the old connection shows up afterwards
    thread::sleep(Duration::from_millis(50));
    p.send("help");
    let frame = p.wait_for("help", |f| {
        f.notice.as_deref().map_or(false, |n| n.contains("disconnect"))
    });
    assert!(frame.pressed.is_empty());
    p.stop();
}

#[test]
fn test_device_failure_disconnects() {
    let script = vec![
        SimStep::NoteOn { note: 40, velocity: 90 },
        SimStep::Wait { ms: 20 },
        SimStep::Fail { reason: "cable pulled".into() },
    ];
    let p = Pipeline::start(vec![SimDevice::new("Flaky", script)]);
    p.send("connect");
    p.wait_for("note", |f| f.pressed == vec![40]);

    let frame = p.wait_for("device error", |f| !connected(f));
    assert!(frame.pressed.is_empty());
    assert!(frame.notice.unwrap().contains("cable pulled"));
    p.stop();
}

#[test]
fn test_practice_queue_advances_on_played_chord() {
    let em: [Note; 6] = [40, 47, 52, 55, 59, 64];
    let am: [Note; 5] = [45, 52, 57, 60, 64];
    let mut script = strum(&em, 100, 5);
    script.push(SimStep::Wait { ms: 50 });
    script.extend(release(&em));
    script.extend(strum(&am, 100, 5));
    script.push(SimStep::Wait { ms: 60_000 });

    let p = Pipeline::start(vec![SimDevice::new("Guitar", script)]);
    p.send("practice Minors");
    p.send("connect 0");

    let played = |n: usize| {
        move |f: &FretboardFrame| f.practice.as_ref().map_or(false, |pr| pr.completed == n)
    };
    let frame = p.wait_for("Em played", played(1));
    assert_eq!(frame.chord.as_deref(), Some("Am"));

    let frame = p.wait_for("Am played", played(2));
    assert_eq!(frame.chord.as_deref(), Some("Dm"));
    assert_eq!(frame.practice.unwrap().remaining, 2);
    p.stop();
}

#[test]
fn test_quit_releases_connection() {
    let p = Pipeline::start(vec![SimDevice::new("Guitar", hold(&[40, 45]))]);
    p.send("connect 0");
    p.wait_for("notes held", |f| f.pressed.len() == 2);

    let frames = p.frames.clone();
    p.stop();
    let last = frames.try_iter().last().expect("a closing frame");
    assert_eq!(last.status, ConnectionStatus::Disconnected);
    assert!(last.pressed.is_empty());
}

#[test]
fn test_reconnect_replaces_connection() {
    let p = Pipeline::start(vec![
        SimDevice::new("First", hold(&[40])),
        SimDevice::new("Second", hold(&[64])),
    ]);
    p.send("connect First");
    p.wait_for("first device note", |f| f.pressed == vec![40]);

    p.send("connect Second");
    let frame = p.wait_for("second device note", |f| f.pressed == vec![64]);
    match frame.status {
        ConnectionStatus::Connected(d) => assert_eq!(d.name, "Second"),
        other => panic!("unexpected {:?}", other),
    }
    p.stop();
}

// ─── Web server ─────────────────────────────────────────────────────────────

fn start_server() -> (std::net::SocketAddr, Sender<FretboardFrame>, Receiver<ShellEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (frame_tx, frame_rx) = bounded(16);
    let (cmd_tx, cmd_rx) = bounded(16);
    thread::spawn(move || WsServer::new(frame_rx, cmd_tx, addr.to_string()).serve(listener));
    (addr, frame_tx, cmd_rx)
}

fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    write!(stream, "GET {} HTTP/1.1\r\nHost: test\r\n\r\n", path).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

fn sample_frame(seq: u64) -> FretboardFrame {
    let tuning = fret_monitor::tuning::standard_tuning();
    let pressed = [40].into_iter().collect();
    FretboardFrame {
        seq,
        timestamp_us: 0,
        status: ConnectionStatus::Disconnected,
        devices: vec![],
        chords: vec!["E Major".into()],
        collections: vec![],
        chord: None,
        pressed: vec![40],
        view: fret_monitor::render::render(&tuning, &pressed, None).unwrap(),
        verdict: None,
        practice: None,
        notice: None,
    }
}

#[test]
fn test_http_page_and_command_endpoint() {
    let (addr, _frames, commands) = start_server();

    let page = http_get(addr, "/");
    assert!(page.starts_with("HTTP/1.1 200"));
    assert!(page.contains("FRET MONITOR"));
    assert!(page.contains("v.strings"));

    let reply = http_get(addr, "/command?c=chord%20E%20Major");
    assert!(reply.starts_with("HTTP/1.1 202"));
    match commands.recv_timeout(Duration::from_secs(2)).unwrap() {
        ShellEvent::Command(c) => assert_eq!(c, Command::SelectChord(Some("E Major".into()))),
        other => panic!("unexpected {:?}", other),
    }

    let reply = http_get(addr, "/command?c=tune%20up");
    assert!(reply.starts_with("HTTP/1.1 400"));
    assert!(http_get(addr, "/nope").starts_with("HTTP/1.1 404"));
}

#[test]
fn test_websocket_streams_frames_as_json() {
    let (addr, frames, _commands) = start_server();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    write!(
        stream,
        "GET /ws HTTP/1.1\r\nHost: test\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n"
    )
    .unwrap();

    let mut reader = BufReader::new(stream);
    let mut status = String::new();
    reader.read_line(&mut status).unwrap();
    assert!(status.starts_with("HTTP/1.1 101"));
    let mut saw_accept = false;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        if line.trim().is_empty() {
            break;
        }
        saw_accept |= line.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }
    assert!(saw_accept);

    frames.send(sample_frame(7)).unwrap();

    let mut header = [0u8; 2];
    reader.read_exact(&mut header).unwrap();
    assert_eq!(header[0], 0x81);
    let len = match header[1] {
        126 => {
            let mut ext = [0u8; 2];
            reader.read_exact(&mut ext).unwrap();
            u16::from_be_bytes(ext) as usize
        }
        127 => {
            let mut ext = [0u8; 8];
            reader.read_exact(&mut ext).unwrap();
            u64::from_be_bytes(ext) as usize
        }
        n => n as usize,
    };
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).unwrap();

    let frame: FretboardFrame = serde_json::from_slice(&payload).unwrap();
    assert_eq!(frame.seq, 7);
    assert_eq!(frame.pressed, vec![40]);
    assert_eq!(frame.view.mark(Position::new(0, 0)), CellMark::Active);
}
