use core::fmt;

use heapless::Vec;
use log::error;

use crate::action::Keymap;
use crate::interface::CoverageRect;

const MAX_VIOLATIONS: usize = 16;

/// One problem found while validating a keymap/interface layout.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CheckViolation {
    /// A layer's slot count does not match cols * rows.
    NonRectangularLayer {
        layer: usize,
        len: usize,
        expected: usize,
    },
    /// An interface rectangle reaches outside the keymap grid.
    RectOutOfBounds { name: &'static str, rect: CoverageRect },
    /// A coordinate-map entry points outside the flat keymap.
    CoordOutOfRange {
        name: &'static str,
        index: usize,
        value: u16,
        size: usize,
    },
    /// An interface has no coordinate map at all.
    EmptyCoordMap { name: &'static str },
}

/// Collected configuration errors. The firmware halts on these rather
/// than resetting, so the board stays flashable while the user fixes
/// the keymap.
#[derive(Debug, Default)]
pub struct CheckError {
    violations: Vec<CheckViolation, MAX_VIOLATIONS>,
}

impl CheckError {
    pub fn violations(&self) -> &[CheckViolation] {
        &self.violations
    }

    fn push(&mut self, violation: CheckViolation) {
        error!("keymap check: {violation:?}");
        let _ = self.violations.push(violation);
    }

    fn into_result(self) -> Result<(), CheckError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "keymap check failed with {} violation(s)",
            self.violations.len()
        )
    }
}

/// Validates the keymap shape and every interface's coverage against
/// it. `interfaces` supplies (name, rect, coord_map) triples.
pub fn check<'a>(
    keymap: &Keymap,
    interfaces: impl IntoIterator<Item = (&'static str, CoverageRect, &'a [u16])>,
) -> Result<(), CheckError> {
    let mut errors = CheckError::default();
    let size = keymap.size();

    for (layer, slots) in keymap.layers.iter().enumerate() {
        if slots.len() != size {
            errors.push(CheckViolation::NonRectangularLayer {
                layer,
                len: slots.len(),
                expected: size,
            });
        }
    }

    for (name, rect, coord_map) in interfaces {
        let cols_ok = (rect.col_min as usize) < keymap.cols
            && (rect.col_max as usize) < keymap.cols;
        let rows_ok = (rect.row_min as usize) < keymap.rows
            && (rect.row_max as usize) < keymap.rows;
        if !cols_ok || !rows_ok {
            errors.push(CheckViolation::RectOutOfBounds { name, rect });
        }

        if coord_map.is_empty() {
            errors.push(CheckViolation::EmptyCoordMap { name });
            continue;
        }
        for (index, &value) in coord_map.iter().enumerate() {
            if value as usize >= size {
                errors.push(CheckViolation::CoordOutOfRange {
                    name,
                    index,
                    value,
                    size,
                });
            }
        }
    }

    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, kc};
    use crate::keycodes::KeyCode;

    static FULL: &[Option<Action>] = &[
        Some(kc(KeyCode::A)),
        Some(kc(KeyCode::B)),
        Some(kc(KeyCode::C)),
        Some(kc(KeyCode::D)),
    ];
    static SHORT: &[Option<Action>] = &[None];

    #[test]
    fn accepts_a_consistent_layout() {
        let keymap = Keymap::new(&[FULL], 2, 2);
        let map = [0u16, 1, 2, 3];
        let iface = ("left", CoverageRect::new(0, 0, 1, 1), &map[..]);
        assert!(check(&keymap, [iface]).is_ok());
    }

    #[test]
    fn flags_non_rectangular_layers() {
        let keymap = Keymap::new(&[FULL, SHORT], 2, 2);
        let err = check(&keymap, []).unwrap_err();
        assert_eq!(
            err.violations(),
            &[CheckViolation::NonRectangularLayer {
                layer: 1,
                len: 1,
                expected: 4
            }]
        );
    }

    #[test]
    fn flags_rect_outside_the_grid() {
        let keymap = Keymap::new(&[FULL], 2, 2);
        let map = [0u16];
        let iface = ("right", CoverageRect::new(0, 0, 5, 0), &map[..]);
        let err = check(&keymap, [iface]).unwrap_err();
        assert!(matches!(
            err.violations()[0],
            CheckViolation::RectOutOfBounds { name: "right", .. }
        ));
    }

    #[test]
    fn flags_coordinates_beyond_the_keymap() {
        let keymap = Keymap::new(&[FULL], 2, 2);
        let map = [0u16, 9];
        let iface = ("left", CoverageRect::new(0, 0, 1, 0), &map[..]);
        let err = check(&keymap, [iface]).unwrap_err();
        assert_eq!(
            err.violations(),
            &[CheckViolation::CoordOutOfRange {
                name: "left",
                index: 1,
                value: 9,
                size: 4
            }]
        );
    }

    #[test]
    fn flags_missing_coordinate_maps() {
        let keymap = Keymap::new(&[FULL], 2, 2);
        let iface = ("pad", CoverageRect::new(0, 0, 0, 0), &[][..]);
        let err = check(&keymap, [iface]).unwrap_err();
        assert_eq!(
            err.violations(),
            &[CheckViolation::EmptyCoordMap { name: "pad" }]
        );
    }
}
