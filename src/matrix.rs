use embedded_hal_1::digital::{InputPin, OutputPin};
use heapless::Vec;

/// Orientation of the diodes on handwired boards. `Col2Row` means the
/// driven (output) pins are the columns, as in QMK's COL2ROW.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiodeOrientation {
    Col2Row,
    Row2Col,
}

/// Pull direction on the input pins; decides the active level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    Up,
    Down,
}

/// One observed key state change in local matrix coordinates.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyChange {
    pub col: u8,
    pub row: u8,
    pub pressed: bool,
}

/// Scans a driven/sensed pin matrix and reports state changes. The
/// output group is the columns for `Col2Row` and the rows for
/// `Row2Col`; coordinates in the reported events are translated
/// accordingly.
pub struct MatrixScanner<O, I, const OUTPUTS: usize, const INPUTS: usize> {
    outputs: [O; OUTPUTS],
    inputs: [I; INPUTS],
    orientation: DiodeOrientation,
    pull: Pull,
    // one bit per input, per output line
    state: [u32; OUTPUTS],
}

impl<O, I, E, const OUTPUTS: usize, const INPUTS: usize> MatrixScanner<O, I, OUTPUTS, INPUTS>
where
    O: OutputPin<Error = E>,
    I: InputPin<Error = E>,
{
    pub fn new(
        outputs: [O; OUTPUTS],
        inputs: [I; INPUTS],
        orientation: DiodeOrientation,
        pull: Pull,
    ) -> Self {
        const {
            assert!(INPUTS <= 32, "input group wider than the state bitmap");
        }
        Self {
            outputs,
            inputs,
            orientation,
            pull,
            state: [0; OUTPUTS],
        }
    }

    /// Drives each output line in turn and pushes every changed key
    /// onto `events` as (col, row, pressed).
    pub fn scan_events<const M: usize>(
        &mut self,
        events: &mut Vec<KeyChange, M>,
    ) -> Result<(), E> {
        let active_high = self.pull == Pull::Down;
        let orientation = self.orientation;
        for (oidx, output) in self.outputs.iter_mut().enumerate() {
            if active_high {
                output.set_high()?;
            } else {
                output.set_low()?;
            }

            for (iidx, input) in self.inputs.iter_mut().enumerate() {
                let pressed = input.is_high()? == active_high;
                let bit = 1u32 << iidx;
                let was_pressed = self.state[oidx] & bit != 0;
                if pressed != was_pressed {
                    self.state[oidx] ^= bit;
                    let (col, row) = match orientation {
                        DiodeOrientation::Col2Row => (oidx as u8, iidx as u8),
                        DiodeOrientation::Row2Col => (iidx as u8, oidx as u8),
                    };
                    if events.push(KeyChange { col, row, pressed }).is_err() {
                        // caller's buffer is full; the state bitmap
                        // keeps the change so nothing is lost, the
                        // event just reappears next scan
                        self.state[oidx] ^= bit;
                    }
                }
            }

            if active_high {
                output.set_low()?;
            } else {
                output.set_high()?;
            }
        }
        Ok(())
    }

    /// Current pressed state of a matrix position in output/input
    /// coordinates.
    pub fn is_pressed(&self, output_idx: usize, input_idx: usize) -> bool {
        self.state[output_idx] & (1 << input_idx) != 0
    }
}
