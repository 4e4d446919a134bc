use crate::error::{FretError, Result};
use crate::listener::{Connection, EventSink, MidiBackend};
use crate::types::*;
use log::{debug, info};
use midir::{Ignore, MidiInput, MidiInputConnection};

/// System MIDI inputs through midir (ALSA, CoreMIDI, WinMM).
pub struct MidirBackend {
    client_name: String,
}

impl MidirBackend {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn client(&self) -> std::result::Result<MidiInput, midir::InitError> {
        MidiInput::new(&self.client_name)
    }
}

impl Default for MidirBackend {
    fn default() -> Self {
        Self::new("fret-monitor")
    }
}

struct MidirConnection {
    device: DeviceDescriptor,
    conn: Option<MidiInputConnection<()>>,
}

impl Connection for MidirConnection {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }
}

impl Drop for MidirConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close();
            info!("Closed MIDI port {}", self.device);
        }
    }
}

impl MidiBackend for MidirBackend {
    fn name(&self) -> &str {
        "midir"
    }

    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let midi_in = self.client().map_err(|e| FretError::Backend(e.to_string()))?;
        let devices = midi_in
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                midi_in
                    .port_name(port)
                    .ok()
                    .map(|name| DeviceDescriptor { index, name })
            })
            .collect();
        Ok(devices)
    }

    fn connect(
        &mut self,
        device: &DeviceDescriptor,
        sink: EventSink,
    ) -> Result<Box<dyn Connection>> {
        let unavailable = |reason: String| FretError::DeviceUnavailable {
            device: device.name.clone(),
            reason,
        };

        let mut midi_in = self.client().map_err(|e| unavailable(e.to_string()))?;
        midi_in.ignore(Ignore::All);

        // The listing may be stale: the port at this index has to still be
        // the one the user picked.
        let ports = midi_in.ports();
        let port = ports
            .get(device.index)
            .ok_or_else(|| unavailable("port disappeared since listing".into()))?;
        let name = midi_in.port_name(port).map_err(|e| unavailable(e.to_string()))?;
        if name != device.name {
            return Err(unavailable(format!("port {} is now '{}'", device.index, name)));
        }

        debug!("Opening MIDI port {} (session {})", device, sink.session());
        let conn = midi_in
            .connect(
                port,
                "fret-monitor-in",
                move |_timestamp, bytes, _| {
                    sink.raw(bytes);
                },
                (),
            )
            .map_err(|e| unavailable(e.to_string()))?;

        info!("Opened MIDI port {}", device);
        Ok(Box::new(MidirConnection {
            device: device.clone(),
            conn: Some(conn),
        }))
    }
}
