use crate::keycodes::{ConsumerCode, KeyCode, Modifiers, MouseButton};

/// Default tap/hold decision window, matching the stock key timings.
pub const DEFAULT_TIMEOUT_MS: u16 = 200;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MouseAction {
    Click(MouseButton),
    Press(MouseButton),
    Release(MouseButton),
    Move { x: i8, y: i8, wheel: i8 },
}

/// What a keymap slot does. Slots hold `Option<Action>`; a `None` slot
/// is transparent and defers to the next active layer below, while
/// `NoOp` swallows the key.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    NoOp,
    /// Plain key held for as long as the switch is down.
    Key(KeyCode),
    /// Modifier-wrapped tap: mods down, key tapped, mods up.
    Chord(Modifiers, KeyCode),
    /// Consumer-control tap on press.
    Media(ConsumerCode),
    Mouse(MouseAction),
    /// Taps each sub-action in order on press.
    Sequence(&'static [Action]),
    /// Set the default layer; `jump` collapses the stack onto it.
    DefaultLayer { layer: u8, jump: bool },
    /// Replace the top of the layer stack.
    ReplaceLayer(u8),
    /// Layer active while held.
    MomentaryLayer(u8),
    /// Tap within the window taps `tap`; holding past it activates the
    /// layer until release.
    LayerTap {
        layer: u8,
        tap: &'static Action,
        timeout_ms: u16,
    },
    ToggleLayer(u8),
    /// Make the layer the sole active layer.
    ToLayer(u8),
    /// Hold for momentary, double-tap to toggle.
    TapToggle { layer: u8, timeout_ms: u16 },
    HoldTap {
        tap: &'static Action,
        hold: &'static Action,
        timeout_ms: u16,
    },
    /// Tap count picks the action once the window closes.
    TapDance {
        actions: &'static [Action],
        timeout_ms: u16,
    },
    /// Stays pressed past its own release until the next non-sticky
    /// key is released.
    Sticky {
        action: &'static Action,
        retap_cancel: bool,
        defer_release: bool,
    },
}

impl Action {
    pub const fn is_sticky(&self) -> bool {
        matches!(self, Action::Sticky { .. })
    }

    pub const fn is_timed(&self) -> bool {
        matches!(
            self,
            Action::LayerTap { .. }
                | Action::TapToggle { .. }
                | Action::HoldTap { .. }
                | Action::TapDance { .. }
        )
    }
}

pub const fn kc(code: KeyCode) -> Action {
    Action::Key(code)
}

pub const fn ctrl(code: KeyCode) -> Action {
    Action::Chord(Modifiers::LCTRL, code)
}

pub const fn shift(code: KeyCode) -> Action {
    Action::Chord(Modifiers::LSHIFT, code)
}

pub const fn alt(code: KeyCode) -> Action {
    Action::Chord(Modifiers::LALT, code)
}

pub const fn gui(code: KeyCode) -> Action {
    Action::Chord(Modifiers::LGUI, code)
}

pub const fn ctrl_shift(code: KeyCode) -> Action {
    Action::Chord(Modifiers::LCTRL.with(Modifiers::LSHIFT), code)
}

pub const fn mo(layer: u8) -> Action {
    Action::MomentaryLayer(layer)
}

pub const fn lt(layer: u8, tap: &'static Action) -> Action {
    Action::LayerTap {
        layer,
        tap,
        timeout_ms: DEFAULT_TIMEOUT_MS,
    }
}

pub const fn tg(layer: u8) -> Action {
    Action::ToggleLayer(layer)
}

pub const fn to(layer: u8) -> Action {
    Action::ToLayer(layer)
}

pub const fn tt(layer: u8) -> Action {
    Action::TapToggle {
        layer,
        timeout_ms: DEFAULT_TIMEOUT_MS,
    }
}

pub const fn df(layer: u8) -> Action {
    Action::DefaultLayer { layer, jump: true }
}

pub const fn ht(tap: &'static Action, hold: &'static Action) -> Action {
    Action::HoldTap {
        tap,
        hold,
        timeout_ms: DEFAULT_TIMEOUT_MS,
    }
}

pub const fn td(actions: &'static [Action]) -> Action {
    Action::TapDance {
        actions,
        timeout_ms: DEFAULT_TIMEOUT_MS,
    }
}

pub const fn sk(action: &'static Action) -> Action {
    Action::Sticky {
        action,
        retap_cancel: true,
        defer_release: false,
    }
}

/// Media taps named after the stock consumer keys.
pub mod media {
    use super::{Action, ConsumerCode};

    pub const PLAY_PAUSE: Action = Action::Media(ConsumerCode::PlayPause);
    pub const STOP: Action = Action::Media(ConsumerCode::Stop);
    pub const MUTE: Action = Action::Media(ConsumerCode::Mute);
    pub const VOLUME_UP: Action = Action::Media(ConsumerCode::VolumeIncrement);
    pub const VOLUME_DOWN: Action = Action::Media(ConsumerCode::VolumeDecrement);
    pub const BRIGHTNESS_UP: Action = Action::Media(ConsumerCode::BrightnessIncrement);
    pub const BRIGHTNESS_DOWN: Action = Action::Media(ConsumerCode::BrightnessDecrement);
    pub const NEXT_TRACK: Action = Action::Media(ConsumerCode::ScanNextTrack);
    pub const PREV_TRACK: Action = Action::Media(ConsumerCode::ScanPreviousTrack);
    pub const EJECT: Action = Action::Media(ConsumerCode::Eject);
    pub const FAST_FORWARD: Action = Action::Media(ConsumerCode::FastForward);
    pub const REWIND: Action = Action::Media(ConsumerCode::Rewind);
    pub const RECORD: Action = Action::Media(ConsumerCode::Record);
}

pub mod mouse {
    use super::{Action, MouseAction, MouseButton};

    pub const LEFT_CLICK: Action = Action::Mouse(MouseAction::Click(MouseButton::Left));
    pub const RIGHT_CLICK: Action = Action::Mouse(MouseAction::Click(MouseButton::Right));
    pub const MIDDLE_CLICK: Action = Action::Mouse(MouseAction::Click(MouseButton::Middle));
    pub const BACK_CLICK: Action = Action::Mouse(MouseAction::Click(MouseButton::Back));
    pub const FORWARD_CLICK: Action = Action::Mouse(MouseAction::Click(MouseButton::Forward));
    pub const LEFT_PRESS: Action = Action::Mouse(MouseAction::Press(MouseButton::Left));
    pub const LEFT_RELEASE: Action = Action::Mouse(MouseAction::Release(MouseButton::Left));
    pub const MOVE_LEFT: Action = Action::Mouse(MouseAction::Move { x: -1, y: 0, wheel: 0 });
    pub const MOVE_RIGHT: Action = Action::Mouse(MouseAction::Move { x: 1, y: 0, wheel: 0 });
    pub const MOVE_UP: Action = Action::Mouse(MouseAction::Move { x: 0, y: -1, wheel: 0 });
    pub const MOVE_DOWN: Action = Action::Mouse(MouseAction::Move { x: 0, y: 1, wheel: 0 });
    pub const SCROLL_UP: Action = Action::Mouse(MouseAction::Move { x: 0, y: 0, wheel: 1 });
    pub const SCROLL_DOWN: Action = Action::Mouse(MouseAction::Move { x: 0, y: 0, wheel: -1 });
}

/// Editor-style macros over the host's usual shortcuts. The modal keys
/// (insert/append/visual) compose these with `to(layer)` in the user
/// keymap, e.g. a normal-mode `i` slot holding
/// `Sequence(&[to(INSERT_LAYER)])`.
pub mod vim {
    use super::{Action, ctrl, ctrl_shift, kc, shift, td};
    use crate::keycodes::KeyCode;

    pub const HIGHLIGHT_WORD: Action = Action::Sequence(&[
        ctrl(KeyCode::Left),
        ctrl_shift(KeyCode::Right),
    ]);
    pub const HIGHLIGHT_LINE: Action =
        Action::Sequence(&[kc(KeyCode::Home), shift(KeyCode::End)]);
    pub const YANK_WORD: Action = Action::Sequence(&[
        ctrl(KeyCode::Left),
        ctrl_shift(KeyCode::Right),
        ctrl(KeyCode::C),
        kc(KeyCode::Right),
    ]);
    pub const YANK_LINE: Action = Action::Sequence(&[
        kc(KeyCode::Home),
        shift(KeyCode::End),
        ctrl(KeyCode::C),
        kc(KeyCode::Right),
    ]);
    pub const CUT_WORD: Action = Action::Sequence(&[
        HIGHLIGHT_WORD,
        ctrl(KeyCode::X),
        kc(KeyCode::Right),
    ]);
    pub const CUT_LINE: Action = Action::Sequence(&[HIGHLIGHT_LINE, ctrl(KeyCode::X)]);

    pub const PREV_LINE: Action = Action::Sequence(&[kc(KeyCode::Up), kc(KeyCode::Home)]);
    pub const NEXT_LINE: Action = Action::Sequence(&[kc(KeyCode::Down), kc(KeyCode::Home)]);
    pub const NEXT_WORD: Action = Action::Sequence(&[ctrl(KeyCode::Right)]);
    pub const PREV_WORD: Action = Action::Sequence(&[ctrl(KeyCode::Left)]);

    pub const YANK: Action = Action::Sequence(&[ctrl(KeyCode::C)]);
    pub const PASTE: Action = Action::Sequence(&[ctrl(KeyCode::V)]);
    pub const UNDO: Action = Action::Sequence(&[ctrl(KeyCode::Z)]);
    pub const FIND: Action = Action::Sequence(&[ctrl(KeyCode::F)]);
    pub const REPLACE: Action = Action::Sequence(&[kc(KeyCode::Insert)]);
    pub const OPEN_LINE: Action = Action::Sequence(&[kc(KeyCode::End), kc(KeyCode::Enter)]);
    pub const SUBSTITUTE: Action = Action::Sequence(&[CUT_LINE]);

    /// Tap deletes a character, double-tap cuts the whole line.
    pub const DELETE: Action = td(&[kc(KeyCode::Delete), CUT_LINE]);
}

/// A compiled-in keymap: per layer, one `Option<Action>` per grid slot
/// in row-major order.
#[derive(Copy, Clone, Debug)]
pub struct Keymap {
    pub layers: &'static [&'static [Option<Action>]],
    pub cols: usize,
    pub rows: usize,
}

impl Keymap {
    pub const fn new(
        layers: &'static [&'static [Option<Action>]],
        cols: usize,
        rows: usize,
    ) -> Self {
        Self { layers, cols, rows }
    }

    pub const fn size(&self) -> usize {
        self.cols * self.rows
    }

    pub fn action_at(&self, layer: u8, index: u16) -> Option<Action> {
        self.layers
            .get(layer as usize)
            .and_then(|l| l.get(index as usize))
            .copied()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keymap_lookup_handles_bounds() {
        static LAYER0: &[Option<Action>] = &[Some(kc(KeyCode::A)), None];
        static KEYMAP: Keymap = Keymap::new(&[LAYER0], 2, 1);

        assert_eq!(KEYMAP.action_at(0, 0), Some(kc(KeyCode::A)));
        assert_eq!(KEYMAP.action_at(0, 1), None);
        assert_eq!(KEYMAP.action_at(0, 2), None);
        assert_eq!(KEYMAP.action_at(1, 0), None);
    }

    #[test]
    fn vim_macros_expand_to_sequences() {
        match vim::CUT_WORD {
            Action::Sequence(steps) => {
                assert_eq!(steps.len(), 3);
                assert_eq!(steps[0], vim::HIGHLIGHT_WORD);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }
}
