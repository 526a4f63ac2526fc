use heapless::Deque;
use log::warn;
use usbd_hid::descriptor::{KeyboardReport, MediaKeyboardReport, MouseReport};

use crate::keycodes::{ConsumerCode, KeyCode, MouseButton};

/// Where the engine sends key activity. Mirrors the split between the
/// keyboard, consumer-control and mouse endpoints.
pub trait HidSink {
    fn press(&mut self, code: KeyCode);
    fn release(&mut self, code: KeyCode);
    /// Consumer-control tap (press immediately followed by release).
    fn media(&mut self, code: ConsumerCode);
    fn mouse(&mut self, event: MouseEvent);
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MouseEvent {
    Press(MouseButton),
    Release(MouseButton),
    Move { x: i8, y: i8, wheel: i8 },
}

/// One report ready to go out over an endpoint.
pub enum OutputReport {
    Keyboard(KeyboardReport),
    Media(MediaKeyboardReport),
    Mouse(MouseReport),
}

const REPORT_QUEUE: usize = 32;
const KEY_SLOTS: usize = 6;

/// Boot-keyboard report state. Each state transition queues the report
/// it produced so the transport can replay every intermediate state,
/// which keeps taps inside a single frame visible to the host.
pub struct HidState {
    modifier: u8,
    keys: [u8; KEY_SLOTS],
    buttons: u8,
    queue: Deque<OutputReport, REPORT_QUEUE>,
}

impl HidState {
    pub const fn new() -> Self {
        Self {
            modifier: 0,
            keys: [0; KEY_SLOTS],
            buttons: 0,
            queue: Deque::new(),
        }
    }

    pub fn is_pressed(&self, code: KeyCode) -> bool {
        if code.is_modifier() {
            self.modifier & (1 << code.modifier_bit()) != 0
        } else {
            self.keys.contains(&(code as u8))
        }
    }

    /// Next report to write out, oldest first.
    pub fn pop_report(&mut self) -> Option<OutputReport> {
        self.queue.pop_front()
    }

    fn queue_report(&mut self, report: OutputReport) {
        if self.queue.push_back(report).is_err() {
            warn!("hid report queue overflow, dropping report");
        }
    }

    fn queue_key_report(&mut self) {
        let report = KeyboardReport {
            modifier: self.modifier,
            reserved: 0,
            leds: 0,
            keycodes: self.keys,
        };
        self.queue_report(OutputReport::Keyboard(report));
    }

    fn queue_mouse_report(&mut self, x: i8, y: i8, wheel: i8) {
        let report = MouseReport {
            buttons: self.buttons,
            x,
            y,
            wheel,
            pan: 0,
        };
        self.queue_report(OutputReport::Mouse(report));
    }
}

impl Default for HidState {
    fn default() -> Self {
        Self::new()
    }
}

impl HidSink for HidState {
    fn press(&mut self, code: KeyCode) {
        if code == KeyCode::Undefined {
            return;
        }
        if code.is_modifier() {
            self.modifier |= 1 << code.modifier_bit();
        } else {
            if self.keys.contains(&(code as u8)) {
                return;
            }
            match self.keys.iter_mut().find(|slot| **slot == 0) {
                Some(slot) => *slot = code as u8,
                None => {
                    warn!("boot report full, dropping {code:?}");
                    return;
                }
            }
        }
        self.queue_key_report();
    }

    fn release(&mut self, code: KeyCode) {
        if code == KeyCode::Undefined {
            return;
        }
        if code.is_modifier() {
            self.modifier &= !(1 << code.modifier_bit());
        } else {
            match self.keys.iter_mut().find(|slot| **slot == code as u8) {
                Some(slot) => *slot = 0,
                None => return,
            }
        }
        self.queue_key_report();
    }

    fn media(&mut self, code: ConsumerCode) {
        self.queue_report(OutputReport::Media(MediaKeyboardReport {
            usage_id: code.into(),
        }));
        self.queue_report(OutputReport::Media(MediaKeyboardReport { usage_id: 0 }));
    }

    fn mouse(&mut self, event: MouseEvent) {
        match event {
            MouseEvent::Press(button) => {
                self.buttons |= button.mask();
                self.queue_mouse_report(0, 0, 0);
            }
            MouseEvent::Release(button) => {
                self.buttons &= !button.mask();
                self.queue_mouse_report(0, 0, 0);
            }
            MouseEvent::Move { x, y, wheel } => {
                self.queue_mouse_report(x, y, wheel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_keyboard(hid: &mut HidState) -> Vec<(u8, [u8; 6])> {
        let mut out = Vec::new();
        while let Some(report) = hid.pop_report() {
            if let OutputReport::Keyboard(rep) = report {
                out.push((rep.modifier, rep.keycodes));
            }
        }
        out
    }

    #[test]
    fn press_and_release_update_slots() {
        let mut hid = HidState::new();
        hid.press(KeyCode::A);
        assert!(hid.is_pressed(KeyCode::A));
        hid.release(KeyCode::A);
        assert!(!hid.is_pressed(KeyCode::A));

        let reports = drain_keyboard(&mut hid);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].1[0], KeyCode::A as u8);
        assert_eq!(reports[1].1[0], 0);
    }

    #[test]
    fn modifiers_set_the_modifier_byte() {
        let mut hid = HidState::new();
        hid.press(KeyCode::LeftShift);
        hid.press(KeyCode::RightControl);
        let reports = drain_keyboard(&mut hid);
        assert_eq!(reports[1].0, 0b0001_0010);
    }

    #[test]
    fn duplicate_press_is_not_requeued() {
        let mut hid = HidState::new();
        hid.press(KeyCode::A);
        hid.press(KeyCode::A);
        assert_eq!(drain_keyboard(&mut hid).len(), 1);
    }

    #[test]
    fn boot_report_overflow_drops_seventh_key() {
        let mut hid = HidState::new();
        for code in [
            KeyCode::A,
            KeyCode::B,
            KeyCode::C,
            KeyCode::D,
            KeyCode::E,
            KeyCode::F,
            KeyCode::G,
        ] {
            hid.press(code);
        }
        assert!(!hid.is_pressed(KeyCode::G));
        assert_eq!(drain_keyboard(&mut hid).len(), 6);
    }

    #[test]
    fn media_taps_queue_press_then_release() {
        let mut hid = HidState::new();
        hid.media(ConsumerCode::PlayPause);
        match hid.pop_report() {
            Some(OutputReport::Media(rep)) => assert_eq!(rep.usage_id, 0xCD),
            _ => panic!("expected media report"),
        }
        match hid.pop_report() {
            Some(OutputReport::Media(rep)) => assert_eq!(rep.usage_id, 0),
            _ => panic!("expected media release"),
        }
    }

    #[test]
    fn mouse_buttons_persist_across_moves() {
        let mut hid = HidState::new();
        hid.mouse(MouseEvent::Press(MouseButton::Left));
        hid.mouse(MouseEvent::Move { x: 3, y: -2, wheel: 0 });
        hid.mouse(MouseEvent::Release(MouseButton::Left));

        let mut reports = Vec::new();
        while let Some(OutputReport::Mouse(rep)) = hid.pop_report() {
            reports.push(rep);
        }
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].buttons, 1);
        assert_eq!((reports[1].x, reports[1].y), (3, -2));
        assert_eq!(reports[1].buttons, 1);
        assert_eq!(reports[2].buttons, 0);
    }
}
