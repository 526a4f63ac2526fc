use embedded_hal_1::digital::{InputPin, OutputPin};
use heapless::Vec;
use log::debug;

use crate::backlight::Backlight;
use crate::interface::Transport;
use crate::matrix::{KeyChange, MatrixScanner};
use crate::message::{BacklightMode, FrameParser, Message};
use crate::status_led::LayerStatusLed;
use crate::SYNC_INTERVAL_MS;

const SCAN_EVENTS: usize = 16;

/// A satellite half: scans its matrix, streams state changes to the
/// central with local timestamps, and mirrors the central's layer
/// state on its own status LED.
pub struct Periphery<T, O, I, L, B, const OUTPUTS: usize, const INPUTS: usize>
where
    T: Transport,
    O: OutputPin,
    I: InputPin,
    L: LayerStatusLed,
    B: Backlight,
{
    scanner: MatrixScanner<O, I, OUTPUTS, INPUTS>,
    transport: T,
    parser: FrameParser,
    status_led: Option<L>,
    backlight: Option<B>,
    backlight_on: bool,
    last_sync: Option<u64>,
}

impl<T, O, I, E, L, B, const OUTPUTS: usize, const INPUTS: usize>
    Periphery<T, O, I, L, B, OUTPUTS, INPUTS>
where
    T: Transport,
    O: OutputPin<Error = E>,
    I: InputPin<Error = E>,
    L: LayerStatusLed,
    B: Backlight,
{
    pub fn new(scanner: MatrixScanner<O, I, OUTPUTS, INPUTS>, transport: T) -> Self {
        Self {
            scanner,
            transport,
            parser: FrameParser::new(),
            status_led: None,
            backlight: None,
            backlight_on: true,
            last_sync: None,
        }
    }

    pub fn set_status_led(&mut self, led: L) {
        self.status_led = Some(led);
    }

    pub fn set_backlight(&mut self, backlight: B) {
        self.backlight = Some(backlight);
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Reports a battery measurement up to the central.
    pub fn send_battery(&mut self, millivolts: u16) {
        if self.transport.send(&Message::Battery { millivolts }).is_err() {
            debug!("battery report send failed");
        }
    }

    /// One scan cycle: publish matrix changes, keep the clock sync
    /// fresh, apply anything the central sent down.
    pub fn run_once(&mut self, now: u64) -> Result<(), E> {
        let mut events: Vec<KeyChange, SCAN_EVENTS> = Vec::new();
        self.scanner.scan_events(&mut events)?;

        if self.transport.ensure_connection() {
            for change in &events {
                let message = Message::KeyEvent {
                    col: change.col,
                    row: change.row,
                    pressed: change.pressed,
                    timestamp_ms: now as u32,
                };
                if self.transport.send(&message).is_err() {
                    debug!("key event send failed, dropping ({}, {})", change.col, change.row);
                }
            }

            let sync_due = self
                .last_sync
                .is_none_or(|t| now.saturating_sub(t) >= SYNC_INTERVAL_MS);
            if sync_due
                && self
                    .transport
                    .send(&Message::TimeSync { timestamp_ms: now as u32 })
                    .is_ok()
            {
                self.last_sync = Some(now);
            }

            let mut buf = [0u8; 64];
            loop {
                match self.transport.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => self.parser.push_bytes(&buf[..n]),
                    Err(err) => {
                        debug!("central link read error: {err:?}");
                        break;
                    }
                }
            }
            while let Some(message) = self.parser.next_message() {
                self.handle_message(message);
            }
        }

        if self.backlight_on
            && let Some(light) = &mut self.backlight
        {
            light.shine();
        }
        Ok(())
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::LayerState { layer } => {
                if let Some(led) = &mut self.status_led {
                    led.update(layer);
                }
            }
            Message::BacklightCmd { mode } => {
                self.backlight_on = mode != BacklightMode::Off;
            }
            other => debug!("unexpected message from central: {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::LoopbackTransport;
    use crate::matrix::{DiodeOrientation, Pull};
    use core::convert::Infallible;
    use embedded_hal_1::digital::ErrorType;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Crossbar {
        driven: Option<usize>,
        closed: std::vec::Vec<(usize, usize)>,
    }

    struct MockOutput {
        idx: usize,
        bar: Rc<RefCell<Crossbar>>,
    }

    struct MockInput {
        idx: usize,
        bar: Rc<RefCell<Crossbar>>,
    }

    impl ErrorType for MockOutput {
        type Error = Infallible;
    }

    impl OutputPin for MockOutput {
        fn set_low(&mut self) -> Result<(), Infallible> {
            let mut bar = self.bar.borrow_mut();
            if bar.driven == Some(self.idx) {
                bar.driven = None;
            }
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.bar.borrow_mut().driven = Some(self.idx);
            Ok(())
        }
    }

    impl ErrorType for MockInput {
        type Error = Infallible;
    }

    impl InputPin for MockInput {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            let bar = self.bar.borrow();
            Ok(match bar.driven {
                Some(out) => bar.closed.contains(&(out, self.idx)),
                None => false,
            })
        }
        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|v| !v)
        }
    }

    type TestPeriphery =
        Periphery<LoopbackTransport, MockOutput, MockInput, (), (), 2, 2>;

    fn periphery(bar: &Rc<RefCell<Crossbar>>) -> TestPeriphery {
        let outputs = [
            MockOutput { idx: 0, bar: bar.clone() },
            MockOutput { idx: 1, bar: bar.clone() },
        ];
        let inputs = [
            MockInput { idx: 0, bar: bar.clone() },
            MockInput { idx: 1, bar: bar.clone() },
        ];
        let scanner =
            MatrixScanner::new(outputs, inputs, DiodeOrientation::Col2Row, Pull::Down);
        Periphery::new(scanner, LoopbackTransport::new())
    }

    fn sent_messages(periphery: &mut TestPeriphery) -> std::vec::Vec<Message> {
        let mut bytes = std::vec::Vec::new();
        while let Some(byte) = periphery.transport_mut().pop_tx() {
            bytes.push(byte);
        }
        let mut parser = FrameParser::new();
        parser.push_bytes(&bytes);
        let mut out = std::vec::Vec::new();
        while let Some(message) = parser.next_message() {
            out.push(message);
        }
        out
    }

    #[test]
    fn first_cycle_announces_the_clock() {
        let bar = Rc::new(RefCell::new(Crossbar::default()));
        let mut periphery = periphery(&bar);
        periphery.run_once(1000).unwrap();
        assert_eq!(
            sent_messages(&mut periphery),
            [Message::TimeSync { timestamp_ms: 1000 }]
        );
    }

    #[test]
    fn key_changes_are_streamed_with_timestamps() {
        let bar = Rc::new(RefCell::new(Crossbar::default()));
        let mut periphery = periphery(&bar);
        periphery.run_once(0).unwrap();
        sent_messages(&mut periphery);

        bar.borrow_mut().closed.push((0, 1));
        periphery.run_once(100).unwrap();
        assert_eq!(
            sent_messages(&mut periphery),
            [Message::KeyEvent {
                col: 0,
                row: 1,
                pressed: true,
                timestamp_ms: 100
            }]
        );

        bar.borrow_mut().closed.clear();
        periphery.run_once(150).unwrap();
        assert_eq!(
            sent_messages(&mut periphery),
            [Message::KeyEvent {
                col: 0,
                row: 1,
                pressed: false,
                timestamp_ms: 150
            }]
        );
    }

    #[test]
    fn sync_repeats_on_the_interval() {
        let bar = Rc::new(RefCell::new(Crossbar::default()));
        let mut periphery = periphery(&bar);
        periphery.run_once(0).unwrap();
        periphery.run_once(1000).unwrap();
        periphery.run_once(5000).unwrap();
        let syncs: std::vec::Vec<Message> = sent_messages(&mut periphery)
            .into_iter()
            .filter(|m| matches!(m, Message::TimeSync { .. }))
            .collect();
        assert_eq!(
            syncs,
            [
                Message::TimeSync { timestamp_ms: 0 },
                Message::TimeSync { timestamp_ms: 5000 }
            ]
        );
    }

    #[test]
    fn battery_reports_go_out_on_demand() {
        let bar = Rc::new(RefCell::new(Crossbar::default()));
        let mut periphery = periphery(&bar);
        periphery.send_battery(3730);
        assert_eq!(
            sent_messages(&mut periphery),
            [Message::Battery { millivolts: 3730 }]
        );
    }
}
