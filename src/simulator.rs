use crate::error::{FretError, Result};
use crate::listener::{Connection, EventSink, MidiBackend};
use crate::midi::encode_note_message;
use crate::types::*;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One step of a scripted performance.
#[derive(Debug, Clone, PartialEq)]
pub enum SimStep {
    NoteOn { note: Note, velocity: u8 },
    NoteOff { note: Note },
    Wait { ms: u64 },
    /// Report a device failure and stop playing.
    Fail { reason: String },
}

/// A fake input port that plays a script once connected.
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub name: String,
    pub script: Vec<SimStep>,
    /// Start over when the script ends.
    pub repeat: bool,
    /// When set, `connect` fails with this reason (port busy, unplugged...).
    pub fail_on_open: Option<String>,
}

impl SimDevice {
    pub fn new(name: impl Into<String>, script: Vec<SimStep>) -> Self {
        Self {
            name: name.into(),
            script,
            repeat: false,
            fail_on_open: None,
        }
    }

    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    pub fn failing_on_open(mut self, reason: impl Into<String>) -> Self {
        self.fail_on_open = Some(reason.into());
        self
    }
}

/// Backend serving simulated devices, for running without hardware.
pub struct SimulatedBackend {
    devices: Vec<SimDevice>,
}

impl SimulatedBackend {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        Self { devices }
    }

    /// A single looping guitar playing one of the demo scripts:
    /// "strum" (E major then A minor), "scale" (E minor pentatonic) or
    /// "silent" (connects, never plays).
    pub fn demo(name: &str) -> Self {
        Self::new(vec![demo_device(name)])
    }

    pub fn with_device(mut self, device: SimDevice) -> Self {
        self.devices.push(device);
        self
    }
}

impl MidiBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulator"
    }

    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(self
            .devices
            .iter()
            .enumerate()
            .map(|(index, d)| DeviceDescriptor {
                index,
                name: d.name.clone(),
            })
            .collect())
    }

    fn connect(
        &mut self,
        device: &DeviceDescriptor,
        sink: EventSink,
    ) -> Result<Box<dyn Connection>> {
        let sim = self
            .devices
            .get(device.index)
            .filter(|d| d.name == device.name)
            .ok_or_else(|| FretError::DeviceUnavailable {
                device: device.name.clone(),
                reason: "no such simulated port".into(),
            })?;
        if let Some(reason) = &sim.fail_on_open {
            return Err(FretError::DeviceUnavailable {
                device: device.name.clone(),
                reason: reason.clone(),
            });
        }

        let stop = Arc::new(AtomicBool::new(false));
        let player = Player {
            script: sim.script.clone(),
            repeat: sim.repeat,
            sink,
            stop: stop.clone(),
        };
        let handle = thread::Builder::new()
            .name("sim-midi".into())
            .spawn(move || player.run())?;

        info!("Simulated port {} opened", device);
        Ok(Box::new(SimConnection {
            device: device.clone(),
            stop,
            handle: Some(handle),
        }))
    }
}

struct SimConnection {
    device: DeviceDescriptor,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Connection for SimConnection {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }
}

impl Drop for SimConnection {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!("Simulated port {} closed", self.device);
    }
}

/// Plays a script on its own thread, the way a driver callback would.
struct Player {
    script: Vec<SimStep>,
    repeat: bool,
    sink: EventSink,
    stop: Arc<AtomicBool>,
}

impl Player {
    fn run(&self) {
        loop {
            for step in &self.script {
                if self.stopped() {
                    return;
                }
                let delivered = match step {
                    SimStep::NoteOn { note, velocity } => {
                        self.sink.raw(&encode_note_message(&NoteEvent::on(*note, *velocity)))
                    }
                    SimStep::NoteOff { note } => {
                        self.sink.raw(&encode_note_message(&NoteEvent::off(*note)))
                    }
                    SimStep::Wait { ms } => {
                        self.sleep(*ms);
                        true
                    }
                    SimStep::Fail { reason } => {
                        debug!("  simulated failure: {}", reason);
                        self.sink.device_error(reason.clone());
                        return;
                    }
                };
                if !delivered {
                    return;
                }
            }
            if !self.repeat || self.script.is_empty() {
                return;
            }
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Sleep in short slices so a disconnect never waits out a long pause.
    fn sleep(&self, ms: u64) {
        let mut left = ms;
        while left > 0 && !self.stopped() {
            let slice = left.min(10);
            thread::sleep(Duration::from_millis(slice));
            left -= slice;
        }
    }
}

// ─── Script building ────────────────────────────────────────────────────────

/// Notes struck low to high, `gap_ms` apart.
pub fn strum(notes: &[Note], velocity: u8, gap_ms: u64) -> Vec<SimStep> {
    let mut steps = Vec::with_capacity(notes.len() * 2);
    for &note in notes {
        steps.push(SimStep::NoteOn { note, velocity });
        if gap_ms > 0 {
            steps.push(SimStep::Wait { ms: gap_ms });
        }
    }
    steps
}

pub fn release(notes: &[Note]) -> Vec<SimStep> {
    notes.iter().map(|&note| SimStep::NoteOff { note }).collect()
}

/// The guitar behind `SimulatedBackend::demo`.
pub fn demo_device(name: &str) -> SimDevice {
    let device = SimDevice::new(format!("Simulated Guitar ({})", name), demo_script(name));
    if name == "silent" {
        device
    } else {
        device.repeating()
    }
}

pub fn demo_script(name: &str) -> Vec<SimStep> {
    match name {
        "silent" => Vec::new(),
        "scale" => {
            // E minor pentatonic, open position, up and back down
            let up: [Note; 12] = [40, 43, 45, 47, 50, 52, 55, 57, 59, 62, 64, 67];
            let mut steps = Vec::new();
            for &note in up.iter().chain(up.iter().rev().skip(1)) {
                steps.push(SimStep::NoteOn { note, velocity: 90 });
                steps.push(SimStep::Wait { ms: 250 });
                steps.push(SimStep::NoteOff { note });
            }
            steps.push(SimStep::Wait { ms: 1000 });
            steps
        }
        _ => {
            let e_major: [Note; 6] = [40, 47, 52, 56, 59, 64];
            let a_minor: [Note; 5] = [45, 52, 57, 60, 64];
            let mut steps = strum(&e_major, 100, 40);
            steps.push(SimStep::Wait { ms: 1500 });
            steps.extend(release(&e_major));
            steps.push(SimStep::Wait { ms: 500 });
            steps.extend(strum(&a_minor, 100, 40));
            steps.push(SimStep::Wait { ms: 1500 });
            steps.extend(release(&a_minor));
            steps.push(SimStep::Wait { ms: 500 });
            steps
        }
    }
}
