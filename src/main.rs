use fret_monitor::console_display;
use fret_monitor::console_input;
use fret_monitor::listener::MidiBackend;
#[cfg(feature = "midi")]
use fret_monitor::midi_input::MidirBackend;
use fret_monitor::chords::ChordLibrary;
use fret_monitor::practice::PracticeLibrary;
use fret_monitor::shell::{self, Shell, ShellHandle};
use fret_monitor::simulator::{demo_device, SimDevice, SimulatedBackend};
use fret_monitor::types::*;
#[cfg(feature = "gui")]
use fret_monitor::webview_app;
use fret_monitor::ws_server;

use clap::Parser;
use crossbeam_channel::{bounded, Sender};
use log::{error, info};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

#[derive(Parser)]
#[command(name = "fret-monitor")]
#[command(about = "Live guitar fretboard for MIDI guitars, with chord practice overlay")]
struct Cli {
    /// Use the built-in simulated guitar instead of system MIDI inputs
    #[arg(long)]
    simulate: bool,

    /// Simulator script: "strum" (default), "scale" or "silent"
    #[arg(long, default_value = "strum")]
    demo: String,

    /// Simulator: the device refuses to open (exercises the error path)
    #[arg(long)]
    fail_open: bool,

    /// Connect at startup to this device (index or part of its name)
    #[arg(long)]
    device: Option<String>,

    /// Practice chord selected at startup (e.g. "E Major")
    #[arg(long)]
    chord: Option<String>,

    /// Practice collection started at startup
    #[arg(long)]
    practice: Option<String>,

    /// Practice collections file: [["Name", ["E Major", "Am", ...]], ...]
    #[arg(long)]
    library: Option<PathBuf>,

    /// Print the available MIDI inputs and exit
    #[arg(long)]
    list_devices: bool,

    /// Show the terminal fretboard even when a window or browser is used
    #[arg(long)]
    console: bool,

    /// Never show the terminal fretboard
    #[arg(long, conflicts_with = "console")]
    no_console: bool,

    /// Terminal fretboard: append frames instead of redrawing in place
    #[arg(long)]
    scroll: bool,

    /// Do not read commands from stdin
    #[arg(long)]
    no_input: bool,

    /// Disable the native GUI window
    #[arg(long)]
    no_gui: bool,

    /// Enable the HTTP/WebSocket server for the browser page
    #[arg(long)]
    ws: bool,

    /// Server bind address
    #[arg(long, default_value = "127.0.0.1:8080")]
    ws_addr: String,

    /// Suppress auto-opening the browser when --ws is active.
    #[arg(long)]
    no_open: bool,
}

impl Cli {
    /// The terminal is the display when no window or browser page is.
    fn console_enabled(&self, serve: bool) -> bool {
        !self.no_console && (self.console || !serve)
    }
}

fn simulated_backend(cli: &Cli) -> Box<dyn MidiBackend> {
    if !cli.fail_open {
        return Box::new(SimulatedBackend::demo(&cli.demo));
    }
    // device 0 refuses to open; the demo guitar stays reachable as device 1
    let busy = SimDevice::new("Simulated Guitar (busy)", vec![]).failing_on_open("port in use");
    Box::new(SimulatedBackend::new(vec![busy]).with_device(demo_device(&cli.demo)))
}

fn make_backend(cli: &Cli) -> Box<dyn MidiBackend> {
    if cli.simulate {
        return simulated_backend(cli);
    }
    #[cfg(feature = "midi")]
    let backend: Box<dyn MidiBackend> = Box::new(MidirBackend::default());
    #[cfg(not(feature = "midi"))]
    let backend: Box<dyn MidiBackend> = {
        error!("MIDI input requires the 'midi' feature. Falling back to simulator.");
        simulated_backend(cli)
    };
    backend
}

fn spawn_named<F>(name: &str, f: F) -> io::Result<thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.into()).spawn(f)
}

/// Commands implied by the startup flags, in the order the shell should see them.
fn startup_commands(cli: &Cli) -> Vec<Command> {
    let mut commands = vec![Command::ListDevices];
    if let Some(device) = &cli.device {
        commands.push(Command::Connect(match device.parse::<usize>() {
            Ok(i) => DeviceSelector::Index(i),
            Err(_) => DeviceSelector::Name(device.clone()),
        }));
    }
    if let Some(chord) = &cli.chord {
        commands.push(Command::SelectChord(Some(chord.clone())));
    }
    if let Some(collection) = &cli.practice {
        commands.push(Command::Practice(collection.clone()));
    }
    commands
}

fn queue_commands(tx: &Sender<ShellEvent>, commands: Vec<Command>) {
    for command in commands {
        if tx.send(ShellEvent::Command(command)).is_err() {
            break;
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();
    let backend = make_backend(&cli);

    if cli.list_devices {
        return match backend.list_devices() {
            Ok(devices) if devices.is_empty() => {
                println!("No MIDI input devices found.");
                ExitCode::SUCCESS
            }
            Ok(devices) => {
                for d in devices {
                    println!("{}", d);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let chords = ChordLibrary::standard();
    let library = match &cli.library {
        Some(path) => match PracticeLibrary::load(path, &chords) {
            Ok(lib) => lib,
            Err(e) => {
                error!("Cannot load practice library {:?}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => PracticeLibrary::builtin(&chords),
    };

    let gui_enabled = cfg!(feature = "gui") && !cli.no_gui;
    let serve = gui_enabled || cli.ws;
    let console = cli.console_enabled(serve);
    let url = format!("http://{}", cli.ws_addr.replace("0.0.0.0", "localhost"));

    info!("═══════════════════════════════════════════════");
    info!("  FRET MONITOR v{}", env!("CARGO_PKG_VERSION"));
    info!("  Input: {}", backend.name());
    info!("  Practice: {} collections, {} chords", library.len(), chords.len());
    if gui_enabled {
        info!("  UI: WebView (wry) → {}", url);
    }
    if cli.ws {
        info!("  UI: HTTP/WebSocket on {}", cli.ws_addr);
    }
    if console {
        info!("  UI: Console fretboard");
    }
    if !cli.no_input {
        info!("  Commands on stdin (type 'help')");
    }
    info!("═══════════════════════════════════════════════");

    let (event_tx, event_rx) = shell::event_channel();
    let mut frame_txs: Vec<Sender<FretboardFrame>> = Vec::new();
    let mut handles = Vec::new();

    // ─── Console display ────────────────────────────────────────────
    if console {
        let (tx, rx) = bounded::<FretboardFrame>(256);
        frame_txs.push(tx);
        let display = console_display::ConsoleDisplay::new(rx);
        let display = if cli.scroll { display.scrolling() } else { display };
        match spawn_named("display", move || display.run()) {
            Ok(h) => handles.push(h),
            Err(e) => error!("Cannot start console display: {}", e),
        }
    }

    // ─── HTTP / WebSocket server ────────────────────────────────────
    // Always started for the webview, which loads the page from it.
    if serve {
        let (tx, rx) = bounded::<FretboardFrame>(1024);
        frame_txs.push(tx);
        let command_tx = event_tx.clone();
        let addr = cli.ws_addr.clone();
        match spawn_named("ws-server", move || {
            if let Err(e) = ws_server::WsServer::new(rx, command_tx, addr).run() {
                error!("Server stopped: {}", e);
            }
        }) {
            Ok(h) => handles.push(h),
            Err(e) => error!("Cannot start server: {}", e),
        }

        // The webview is the browser when it runs; otherwise open a tab.
        if cli.ws && !gui_enabled && !cli.no_open {
            let url = url.clone();
            let _ = spawn_named("browser-open", move || {
                thread::sleep(std::time::Duration::from_millis(800));
                #[cfg(target_os = "macos")]
                let _ = std::process::Command::new("open").arg(&url).spawn();
                #[cfg(target_os = "linux")]
                let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
                info!("Browser opened at {}", url);
            });
        }
    }

    // ─── Shell ──────────────────────────────────────────────────────
    let shell_tx = event_tx.clone();
    let shell = match ShellHandle::spawn(event_tx.clone(), move || {
        Shell::new(backend, shell_tx, event_rx, frame_txs).with_practice_library(library)
    }) {
        Ok(h) => h,
        Err(e) => {
            error!("Cannot start shell: {}", e);
            return ExitCode::FAILURE;
        }
    };

    queue_commands(&shell.sender(), startup_commands(&cli));

    // ─── Command line ───────────────────────────────────────────────
    if !cli.no_input {
        let tx = event_tx.clone();
        if let Err(e) = spawn_named("console-input", move || {
            console_input::ConsoleInput::new(io::stdin().lock(), tx).run();
        }) {
            error!("Cannot read stdin: {}", e);
        }
    }
    drop(event_tx);

    // ─── Launch WebView on main thread (blocks until window closes) ──
    //
    // WKWebView (via wry/tao) MUST run on the main thread on macOS.
    #[cfg(feature = "gui")]
    if gui_enabled {
        // Give the server a moment to bind before the WebView tries to load.
        thread::sleep(std::time::Duration::from_millis(600));
        info!("Launching WebView at {}", url);
        // closing the window quits the shell first, so the device is released
        webview_app::run(&url, move || shell.quit());
    }

    if cli.no_input {
        info!("Running headless. Press Ctrl+C to stop.");
    }
    shell.join();
    // Display and server threads end once the shell drops its frame senders.
    for h in handles {
        let _ = h.join();
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fret-monitor").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_console_is_default_display() {
        assert!(cli(&[]).console_enabled(false));
        assert!(!cli(&["--no-console"]).console_enabled(false));
    }

    #[test]
    fn test_console_yields_to_served_page() {
        assert!(!cli(&["--ws"]).console_enabled(true));
        assert!(cli(&["--ws", "--console"]).console_enabled(true));
    }

    #[test]
    fn test_console_flags_conflict() {
        let args = ["fret-monitor", "--console", "--no-console"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_startup_commands_follow_flags() {
        let commands = startup_commands(&cli(&["--device", "2", "--chord", "Am"]));
        assert_eq!(
            commands,
            vec![
                Command::ListDevices,
                Command::Connect(DeviceSelector::Index(2)),
                Command::SelectChord(Some("Am".into())),
            ]
        );
    }
}
