#![no_std]

pub mod error;
pub mod keymap;
pub mod link;

pub const LINK_BAUD: embassy_nrf::uarte::Baudrate = embassy_nrf::uarte::Baudrate::BAUD115200;

/// Columns scanned by each half of the reference board.
pub const HALF_COLS: usize = keymap::COLS / 2;
pub const ROWS: usize = keymap::ROWS;
