use heapless::{Deque, Vec};
use log::{debug, warn};

use crate::debounce::Debouncer;
use crate::message::{FrameParser, MAX_WIRE_LENGTH, Message};
use crate::time_sync::TimeSync;
use crate::{DeviceId, MAX_INTERFACE_KEYS};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    Disconnected,
    Bus,
}

/// Byte link between the halves. `read` is non-blocking and returns 0
/// when nothing is pending.
pub trait Transport {
    fn is_connected(&self) -> bool {
        true
    }

    fn reconnect(&mut self) {}

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    fn write(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    fn ensure_connection(&mut self) -> bool {
        if !self.is_connected() {
            self.reconnect();
            if !self.is_connected() {
                return false;
            }
        }
        true
    }

    fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let mut buf = [0u8; MAX_WIRE_LENGTH];
        let len = message
            .serialize_into(&mut buf)
            .map_err(|_| TransportError::Bus)?;
        self.write(&buf[..len])
    }
}

const LOOPBACK_CAPACITY: usize = 256;

/// In-memory transport for the central's own matrix (and for tests):
/// the scan side pushes frames in, the interface side reads them out.
pub struct LoopbackTransport {
    rx: Deque<u8, LOOPBACK_CAPACITY>,
    tx: Deque<u8, LOOPBACK_CAPACITY>,
}

impl LoopbackTransport {
    pub const fn new() -> Self {
        Self {
            rx: Deque::new(),
            tx: Deque::new(),
        }
    }

    /// Queue bytes for the reading side.
    pub fn push_rx(&mut self, data: &[u8]) {
        for &byte in data {
            if self.rx.push_back(byte).is_err() {
                warn!("loopback rx full, dropping byte");
            }
        }
    }

    pub fn push_message(&mut self, message: &Message) {
        let mut buf = [0u8; MAX_WIRE_LENGTH];
        if let Ok(len) = message.serialize_into(&mut buf) {
            self.push_rx(&buf[..len]);
        }
    }

    /// Drain bytes written by the other side.
    pub fn pop_tx(&mut self) -> Option<u8> {
        self.tx.pop_front()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LoopbackTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        for &byte in buf {
            self.tx.push_back(byte).map_err(|_| TransportError::Bus)?;
        }
        Ok(())
    }
}

/// The rectangle of the keymap grid a half covers. Reversed bounds
/// express mirrored halves and flip the generated coordinate map.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CoverageRect {
    pub col_min: u8,
    pub row_min: u8,
    pub col_max: u8,
    pub row_max: u8,
}

impl CoverageRect {
    pub const fn new(col_min: u8, row_min: u8, col_max: u8, row_max: u8) -> Self {
        Self {
            col_min,
            row_min,
            col_max,
            row_max,
        }
    }

    pub const fn num_cols(&self) -> usize {
        self.col_max.abs_diff(self.col_min) as usize + 1
    }

    pub const fn num_rows(&self) -> usize {
        self.row_max.abs_diff(self.row_min) as usize + 1
    }
}

fn walk(from: u8, to: u8, mut f: impl FnMut(u8)) {
    if from <= to {
        for v in from..=to {
            f(v);
        }
    } else {
        for v in (to..=from).rev() {
            f(v);
        }
    }
}

/// One remote half as the central sees it: its transport, its clock
/// offset, its debounce state, and the mapping from local matrix
/// coordinates to flat keymap indices.
pub struct PeripheryInterface<T: Transport> {
    pub name: &'static str,
    pub device: DeviceId,
    rect: CoverageRect,
    coord_map: Vec<u16, MAX_INTERFACE_KEYS>,
    pub(crate) parser: FrameParser,
    pub(crate) sync: TimeSync,
    pub(crate) debounce: Debouncer<MAX_INTERFACE_KEYS>,
    pub(crate) transport: T,
}

impl<T: Transport> PeripheryInterface<T> {
    pub fn new(name: &'static str, transport: T, rect: CoverageRect) -> Self {
        Self {
            name,
            device: DeviceId(0),
            rect,
            coord_map: Vec::new(),
            parser: FrameParser::new(),
            sync: TimeSync::new(),
            debounce: Debouncer::new(),
            transport,
        }
    }

    pub fn rect(&self) -> CoverageRect {
        self.rect
    }

    pub fn coord_map(&self) -> &[u16] {
        &self.coord_map
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Installs an explicit local-to-flat coordinate map. The length
    /// must cover the interface rectangle exactly.
    pub fn set_coord_map(&mut self, coords: &[u16]) -> Result<(), usize> {
        let expected = self.rect.num_cols() * self.rect.num_rows();
        if coords.len() != expected {
            return Err(expected);
        }
        self.coord_map.clear();
        // length was checked against MAX via expected <= capacity
        if self.coord_map.extend_from_slice(coords).is_err() {
            return Err(expected);
        }
        Ok(())
    }

    /// Fills the coordinate map row-major over the coverage rectangle,
    /// honoring reversed bounds.
    pub fn generate_rect_map(&mut self, keymap_cols: usize) {
        self.coord_map.clear();
        let rect = self.rect;
        walk(rect.row_min, rect.row_max, |r| {
            walk(rect.col_min, rect.col_max, |c| {
                let flat = r as usize * keymap_cols + c as usize;
                if self.coord_map.push(flat as u16).is_err() {
                    warn!("[{}] coordinate map overflow", self.name);
                }
            });
        });
    }

    /// Flat keymap index for a local (col, row), if in bounds.
    pub fn logical_index(&self, local_col: u8, local_row: u8) -> Option<u16> {
        let cols = self.rect.num_cols();
        let idx = local_row as usize * cols + local_col as usize;
        match self.coord_map.get(idx) {
            Some(&flat) => Some(flat),
            None => {
                debug!(
                    "[{}] local ({}, {}) outside interface bounds",
                    self.name, local_col, local_row
                );
                None
            }
        }
    }

    /// Flat local index used for per-interface debouncing.
    pub(crate) fn local_index(&self, local_col: u8, local_row: u8) -> u16 {
        local_row as u16 * self.rect.num_cols() as u16 + local_col as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_round_trips_messages() {
        let mut transport = LoopbackTransport::new();
        transport.push_message(&Message::LayerState { layer: 3 });
        let mut buf = [0u8; 16];
        let n = transport.read(&mut buf).unwrap();
        let (msg, _) = Message::deserialize_from(&buf[..n]).unwrap();
        assert_eq!(msg, Message::LayerState { layer: 3 });
    }

    #[test]
    fn rect_map_covers_rows_then_cols() {
        let rect = CoverageRect::new(0, 0, 2, 1);
        let mut iface = PeripheryInterface::new("left", LoopbackTransport::new(), rect);
        iface.generate_rect_map(6);
        assert_eq!(iface.coord_map(), &[0, 1, 2, 6, 7, 8]);
    }

    #[test]
    fn reversed_bounds_mirror_the_map() {
        // right half of a 6-wide board, columns mirrored
        let rect = CoverageRect::new(5, 0, 3, 1);
        let mut iface = PeripheryInterface::new("right", LoopbackTransport::new(), rect);
        iface.generate_rect_map(6);
        assert_eq!(iface.coord_map(), &[5, 4, 3, 11, 10, 9]);
    }

    #[test]
    fn logical_index_translates_local_coords() {
        let rect = CoverageRect::new(0, 0, 2, 1);
        let mut iface = PeripheryInterface::new("left", LoopbackTransport::new(), rect);
        iface.generate_rect_map(6);
        assert_eq!(iface.logical_index(0, 0), Some(0));
        assert_eq!(iface.logical_index(2, 1), Some(8));
        assert_eq!(iface.logical_index(0, 2), None);
    }

    #[test]
    fn explicit_coord_map_length_is_checked() {
        let rect = CoverageRect::new(0, 0, 1, 0);
        let mut iface = PeripheryInterface::new("pad", LoopbackTransport::new(), rect);
        assert_eq!(iface.set_coord_map(&[4]), Err(2));
        assert!(iface.set_coord_map(&[4, 5]).is_ok());
        assert_eq!(iface.logical_index(1, 0), Some(5));
    }
}
