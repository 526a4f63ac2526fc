//! Stock keymap for the reference split board: 12x4 grid, six columns
//! per half. Layer 1 is navigation with the editor macros, layer 2 is
//! media and mouse.

use mkx::action::{
    Action, Keymap, ht, kc, lt, media, mouse, sk, tg, vim,
};
use mkx::keycodes::KeyCode::*;

pub const COLS: usize = 12;
pub const ROWS: usize = 4;

const STICKY_SHIFT_INNER: Action = kc(LeftShift);
const STICKY_SHIFT: Action = sk(&STICKY_SHIFT_INNER);

const SPACE_TAP: Action = kc(Space);
const NAV_SPACE: Action = lt(1, &SPACE_TAP);

const ESC_TAP: Action = kc(Escape);
const CTRL_HOLD: Action = kc(LeftControl);
const ESC_CTRL: Action = ht(&ESC_TAP, &CTRL_HOLD);

#[rustfmt::skip]
static LAYER_BASE: &[Option<Action>] = &[
    Some(kc(Tab)),      Some(kc(Q)), Some(kc(W)), Some(kc(E)),    Some(kc(R)), Some(kc(T)),
    Some(kc(Y)),        Some(kc(U)), Some(kc(I)), Some(kc(O)),    Some(kc(P)), Some(kc(Backspace)),

    Some(ESC_CTRL),     Some(kc(A)), Some(kc(S)), Some(kc(D)),    Some(kc(F)), Some(kc(G)),
    Some(kc(H)),        Some(kc(J)), Some(kc(K)), Some(kc(L)),    Some(kc(Semicolon)), Some(kc(Quote)),

    Some(STICKY_SHIFT), Some(kc(Z)), Some(kc(X)), Some(kc(C)),    Some(kc(V)), Some(kc(B)),
    Some(kc(N)),        Some(kc(M)), Some(kc(Comma)), Some(kc(Period)), Some(kc(ForwardSlash)), Some(kc(Enter)),

    None,               None,        Some(kc(LeftGui)), Some(kc(LeftAlt)), Some(NAV_SPACE), Some(kc(Space)),
    Some(kc(Space)),    Some(NAV_SPACE), Some(tg(2)), Some(kc(RightAlt)), None,            None,
];

#[rustfmt::skip]
static LAYER_NAV: &[Option<Action>] = &[
    Some(kc(GraveAccent)), Some(kc(One)), Some(kc(Two)), Some(kc(Three)), Some(kc(Four)), Some(kc(Five)),
    Some(kc(Six)),         Some(kc(Seven)), Some(kc(Eight)), Some(kc(Nine)), Some(kc(Zero)), Some(kc(Delete)),

    None,                  Some(vim::PREV_WORD), Some(vim::NEXT_WORD), Some(vim::FIND), Some(vim::YANK), Some(vim::PASTE),
    Some(kc(Left)),        Some(kc(Down)), Some(kc(Up)), Some(kc(Right)), Some(vim::PREV_LINE), Some(vim::NEXT_LINE),

    None,                  Some(vim::UNDO), Some(vim::CUT_WORD), Some(vim::CUT_LINE), Some(vim::YANK_WORD), Some(vim::YANK_LINE),
    Some(kc(Home)),        Some(kc(PageDown)), Some(kc(PageUp)), Some(kc(End)), Some(vim::DELETE), Some(vim::OPEN_LINE),

    None,                  None, None, None, None, None,
    None,                  None, None, None, None, None,
];

#[rustfmt::skip]
static LAYER_MEDIA: &[Option<Action>] = &[
    None,                  Some(kc(F1)), Some(kc(F2)), Some(kc(F3)), Some(kc(F4)), Some(kc(F5)),
    Some(kc(F6)),          Some(kc(F7)), Some(kc(F8)), Some(kc(F9)), Some(kc(F10)), Some(kc(F11)),

    None,                  Some(media::PREV_TRACK), Some(media::PLAY_PAUSE), Some(media::NEXT_TRACK), Some(media::VOLUME_DOWN), Some(media::VOLUME_UP),
    Some(mouse::MOVE_LEFT), Some(mouse::MOVE_DOWN), Some(mouse::MOVE_UP), Some(mouse::MOVE_RIGHT), Some(media::BRIGHTNESS_DOWN), Some(media::BRIGHTNESS_UP),

    None,                  Some(media::MUTE), Some(media::STOP), Some(media::REWIND), Some(media::FAST_FORWARD), Some(media::RECORD),
    Some(mouse::LEFT_CLICK), Some(mouse::MIDDLE_CLICK), Some(mouse::RIGHT_CLICK), Some(mouse::SCROLL_UP), Some(mouse::SCROLL_DOWN), Some(kc(F12)),

    None,                  None, None, None, None, None,
    None,                  None, Some(tg(2)), None, None, None,
];

pub static KEYMAP: Keymap = Keymap::new(&[LAYER_BASE, LAYER_NAV, LAYER_MEDIA], COLS, ROWS);
