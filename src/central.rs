use heapless::Vec;
use log::{debug, info};

use crate::backlight::Backlight;
use crate::check::{CheckError, check};
use crate::engine::Engine;
use crate::hid::HidSink;
use crate::interface::{PeripheryInterface, Transport};
use crate::message::Message;
use crate::status_led::LayerStatusLed;
use crate::{DeviceId, FRAME_INTERVAL_MS, KeyPos, MAX_INTERFACES, action::Keymap};

/// The central half: merges key traffic from every interface, runs the
/// key engine, and fans layer state back out. Interface 0 is by
/// convention the central's own matrix behind a loopback transport.
pub struct Central<T, H, L = (), B = ()>
where
    T: Transport,
    H: HidSink,
    L: LayerStatusLed,
    B: Backlight,
{
    engine: Engine,
    hid: H,
    interfaces: Vec<PeripheryInterface<T>, MAX_INTERFACES>,
    status_led: Option<L>,
    backlight: Option<B>,
    last_frame: Option<u64>,
    last_layer: u8,
}

impl<T, H, L, B> Central<T, H, L, B>
where
    T: Transport,
    H: HidSink,
    L: LayerStatusLed,
    B: Backlight,
{
    pub fn new(keymap: Keymap, hid: H) -> Self {
        Self {
            engine: Engine::new(keymap),
            hid,
            interfaces: Vec::new(),
            status_led: None,
            backlight: None,
            last_frame: None,
            last_layer: 0,
        }
    }

    /// Registers an interface and assigns its device id. A missing
    /// coordinate map is generated from the coverage rectangle.
    pub fn add_interface(
        &mut self,
        mut interface: PeripheryInterface<T>,
    ) -> Result<DeviceId, PeripheryInterface<T>> {
        let device = DeviceId(self.interfaces.len() as u8);
        let name = interface.name;
        interface.device = device;
        if interface.coord_map().is_empty() {
            interface.generate_rect_map(self.engine.keymap().cols);
        }
        self.interfaces.push(interface)?;
        info!("registered interface {name} as device {}", device.0);
        Ok(device)
    }

    pub fn set_status_led(&mut self, led: L) {
        self.status_led = Some(led);
    }

    pub fn set_backlight(&mut self, backlight: B) {
        self.backlight = Some(backlight);
    }

    pub fn hid(&self) -> &H {
        &self.hid
    }

    pub fn hid_mut(&mut self) -> &mut H {
        &mut self.hid
    }

    pub fn top_layer(&self) -> u8 {
        self.engine.top_layer()
    }

    pub fn interface_transport_mut(&mut self, device: DeviceId) -> Option<&mut T> {
        self.interfaces
            .iter_mut()
            .find(|i| i.device == device)
            .map(|i| i.transport_mut())
    }

    /// Validates the keymap against every registered interface. Run
    /// once at startup before the frame loop.
    pub fn check(&self) -> Result<(), CheckError> {
        check(
            self.engine.keymap(),
            self.interfaces
                .iter()
                .map(|i| (i.name, i.rect(), i.coord_map())),
        )
    }

    /// One frame of work. Returns false when called again before the
    /// frame interval elapsed.
    pub fn run_frame(&mut self, now: u64) -> bool {
        if let Some(last) = self.last_frame
            && now.saturating_sub(last) < FRAME_INTERVAL_MS
        {
            return false;
        }
        self.last_frame = Some(now);

        let Self {
            engine,
            hid,
            interfaces,
            status_led,
            backlight,
            last_layer,
            ..
        } = self;

        for iface in interfaces.iter_mut() {
            if !iface.transport.ensure_connection() {
                continue;
            }
            let mut buf = [0u8; 64];
            loop {
                match iface.transport.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => iface.parser.push_bytes(&buf[..n]),
                    Err(err) => {
                        debug!("[{}] read error: {err:?}", iface.name);
                        break;
                    }
                }
            }

            while let Some(message) = iface.parser.next_message() {
                match message {
                    Message::KeyEvent {
                        col,
                        row,
                        pressed,
                        timestamp_ms,
                    } => {
                        let timestamp = iface.sync.to_local(u64::from(timestamp_ms));
                        let local = iface.local_index(col, row);
                        if !iface.debounce.update(local, pressed, timestamp) {
                            continue;
                        }
                        let Some(index) = iface.logical_index(col, row) else {
                            continue;
                        };
                        engine.process_key_event(
                            hid,
                            KeyPos::new(iface.device, index),
                            pressed,
                            timestamp,
                        );
                    }
                    Message::TimeSync { timestamp_ms } => {
                        iface.sync.update(u64::from(timestamp_ms), now);
                    }
                    Message::Battery { millivolts } => {
                        info!("[{}] battery at {millivolts} mV", iface.name);
                    }
                    other => {
                        debug!("[{}] unexpected message: {other:?}", iface.name);
                    }
                }
            }
        }

        engine.tick(hid, now);

        let top = engine.top_layer();
        if top != *last_layer {
            *last_layer = top;
            if let Some(led) = status_led {
                led.update(top);
            }
            for iface in interfaces.iter_mut() {
                if iface.transport.send(&Message::LayerState { layer: top }).is_err() {
                    debug!("[{}] layer broadcast failed", iface.name);
                }
            }
        }

        if let Some(light) = backlight {
            light.shine();
        }
        true
    }
}
