use heapless::{FnvIndexMap, Vec};
use log::{debug, error, warn};

use crate::action::{Action, Keymap, MouseAction};
use crate::hid::{HidSink, MouseEvent};
use crate::keycodes::{KeyCode, Modifiers};
use crate::layers::LayerManager;
use crate::{KeyPos, MAX_PRESSED_KEYS, MAX_STICKY_KEYS, MAX_TIMED_KEYS};

/// Per-key state for the timed behaviors. Tap counters live here so
/// they survive across press/release cycles of the same slot.
#[derive(Copy, Clone, Debug)]
enum TimedState {
    LayerTap {
        layer: u8,
        tap: &'static Action,
        timeout: u16,
        pressed_at: Option<u64>,
        hold: bool,
    },
    TapToggle {
        layer: u8,
        timeout: u16,
        pressed_at: Option<u64>,
        hold: bool,
        taps: u8,
        last_tap: u64,
    },
    HoldTap {
        tap: &'static Action,
        hold: &'static Action,
        timeout: u16,
        pressed_at: Option<u64>,
        held_past: bool,
        hold_sent: bool,
    },
    TapDance {
        actions: &'static [Action],
        timeout: u16,
        pressed_at: Option<u64>,
        taps: u8,
        last_press: u64,
    },
}

#[derive(Copy, Clone, Debug)]
struct TimedEntry {
    pos: KeyPos,
    action: Action,
    state: TimedState,
    /// Timer running; swept out once the state machine resolves.
    active: bool,
    /// Switch physically down right now.
    held: bool,
}

impl TimedEntry {
    fn new(pos: KeyPos, action: Action) -> Option<Self> {
        let state = match action {
            Action::LayerTap {
                layer,
                tap,
                timeout_ms,
            } => TimedState::LayerTap {
                layer,
                tap,
                timeout: timeout_ms,
                pressed_at: None,
                hold: false,
            },
            Action::TapToggle { layer, timeout_ms } => TimedState::TapToggle {
                layer,
                timeout: timeout_ms,
                pressed_at: None,
                hold: false,
                taps: 0,
                last_tap: 0,
            },
            Action::HoldTap {
                tap,
                hold,
                timeout_ms,
            } => TimedState::HoldTap {
                tap,
                hold,
                timeout: timeout_ms,
                pressed_at: None,
                held_past: false,
                hold_sent: false,
            },
            Action::TapDance {
                actions,
                timeout_ms,
            } => TimedState::TapDance {
                actions,
                timeout: timeout_ms,
                pressed_at: None,
                taps: 0,
                last_press: 0,
            },
            _ => return None,
        };
        Some(Self {
            pos,
            action,
            state,
            active: false,
            held: false,
        })
    }
}

#[derive(Copy, Clone, Debug)]
struct StickyEntry {
    pos: KeyPos,
    inner: &'static Action,
}

/// The key-event state machine: routes presses through the layer
/// stack, tracks releases per position, and drives the timed and
/// sticky behaviors from a millisecond tick.
pub struct Engine {
    keymap: Keymap,
    layers: LayerManager,
    pressed: FnvIndexMap<KeyPos, Action, MAX_PRESSED_KEYS>,
    timed: Vec<TimedEntry, MAX_TIMED_KEYS>,
    stickies: Vec<StickyEntry, MAX_STICKY_KEYS>,
}

impl Engine {
    pub fn new(keymap: Keymap) -> Self {
        Self {
            keymap,
            layers: LayerManager::new(0),
            pressed: FnvIndexMap::new(),
            timed: Vec::new(),
            stickies: Vec::new(),
        }
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn layers(&self) -> &LayerManager {
        &self.layers
    }

    pub fn top_layer(&self) -> u8 {
        self.layers.top_layer()
    }

    /// Feed one debounced key event in. `now` is the central's
    /// monotonic clock in milliseconds.
    pub fn process_key_event(
        &mut self,
        hid: &mut impl HidSink,
        pos: KeyPos,
        pressed: bool,
        now: u64,
    ) {
        if pressed {
            self.handle_press(hid, pos, now);
        } else {
            self.handle_release(hid, pos, now);
        }
    }

    /// Run the timed-key state machines. Call once per frame.
    pub fn tick(&mut self, hid: &mut impl HidSink, now: u64) {
        for i in 0..self.timed.len() {
            let mut entry = self.timed[i];
            if !entry.active {
                continue;
            }
            match &mut entry.state {
                TimedState::LayerTap {
                    layer,
                    timeout,
                    pressed_at,
                    hold,
                    ..
                } => {
                    if let Some(t0) = *pressed_at
                        && !*hold
                        && now.saturating_sub(t0) >= u64::from(*timeout)
                    {
                        self.layers.activate_layer(*layer, false);
                        *hold = true;
                    }
                }
                TimedState::TapToggle {
                    layer,
                    timeout,
                    pressed_at,
                    hold,
                    taps,
                    ..
                } => {
                    if let Some(t0) = *pressed_at
                        && !*hold
                        && now.saturating_sub(t0) >= u64::from(*timeout)
                    {
                        if *taps >= 2 {
                            self.layers.toggle_layer(*layer, false);
                            *taps = 0;
                            *pressed_at = None;
                            entry.active = false;
                        } else if *taps == 1 && entry.held {
                            self.layers.activate_layer(*layer, false);
                            *hold = true;
                            *taps = 0;
                        } else {
                            // lone tap that was already released: no-op
                            *taps = 0;
                            *pressed_at = None;
                            entry.active = false;
                        }
                    }
                }
                TimedState::HoldTap {
                    hold,
                    timeout,
                    pressed_at,
                    held_past,
                    hold_sent,
                    ..
                } => {
                    if let Some(t0) = *pressed_at
                        && !*held_past
                        && now.saturating_sub(t0) >= u64::from(*timeout)
                    {
                        execute_press(&mut self.layers, hid, hold);
                        *held_past = true;
                        *hold_sent = true;
                    }
                }
                TimedState::TapDance {
                    actions,
                    timeout,
                    pressed_at,
                    taps,
                    ..
                } => {
                    if let Some(t0) = *pressed_at
                        && now.saturating_sub(t0) >= u64::from(*timeout)
                    {
                        let count = *taps as usize;
                        if count >= 1 && count <= actions.len() {
                            execute_tap(&mut self.layers, hid, &actions[count - 1]);
                        } else {
                            warn!("tap dance count {count} exceeds defined actions");
                        }
                        *taps = 0;
                        *pressed_at = None;
                        entry.active = false;
                    }
                }
            }
            self.timed[i] = entry;
        }
        self.timed.retain(|e| e.active);
    }

    fn resolve(&self, index: u16) -> Option<Action> {
        for &layer in self.layers.active_layers().iter().rev() {
            if let Some(action) = self.keymap.action_at(layer, index) {
                return Some(action);
            }
        }
        None
    }

    fn handle_press(&mut self, hid: &mut impl HidSink, pos: KeyPos, now: u64) {
        if usize::from(pos.index) >= self.keymap.size() {
            debug!(
                "key index {} out of bounds on device {}",
                pos.index, pos.device.0
            );
            return;
        }
        let Some(action) = self.resolve(pos.index) else {
            return;
        };

        // Track so the release finds the same action even if the layer
        // stack changed in between.
        if self.pressed.insert(pos, action).is_err() {
            error!("pressed-key table full, release routing may fall back");
        }

        if action.is_timed() {
            self.timed_press(pos, action, now);
        } else if action.is_sticky() {
            self.sticky_press(hid, pos, &action);
        } else {
            execute_press(&mut self.layers, hid, &action);
        }
    }

    fn handle_release(&mut self, hid: &mut impl HidSink, pos: KeyPos, now: u64) {
        let action = match self.pressed.remove(&pos) {
            Some(action) => action,
            None => {
                // Untracked release: fall back to whatever the top
                // layer currently maps there.
                let Some(action) = self
                    .keymap
                    .action_at(self.layers.top_layer(), pos.index)
                else {
                    return;
                };
                action
            }
        };

        match action {
            Action::LayerTap { .. } | Action::TapToggle { .. } => {
                self.timed_release(hid, pos, now);
            }
            Action::HoldTap { .. } | Action::TapDance { .. } => {
                self.timed_release(hid, pos, now);
                self.clear_stickies(hid);
            }
            Action::Sticky { .. } => {}
            Action::DefaultLayer { .. }
            | Action::ReplaceLayer(_)
            | Action::MomentaryLayer(_)
            | Action::ToggleLayer(_)
            | Action::ToLayer(_) => {
                execute_release(&mut self.layers, hid, &action);
            }
            _ => {
                execute_release(&mut self.layers, hid, &action);
                self.clear_stickies(hid);
            }
        }
    }

    fn timed_press(&mut self, pos: KeyPos, action: Action, now: u64) {
        let i = match self
            .timed
            .iter()
            .position(|e| e.pos == pos && e.action == action)
        {
            Some(i) => i,
            None => {
                let Some(entry) = TimedEntry::new(pos, action) else {
                    return;
                };
                // A stale entry for the slot (different layer mapping)
                // must not keep counting taps.
                self.timed.retain(|e| e.pos != pos);
                if self.timed.push(entry).is_err() {
                    warn!("timed-key table full, ignoring timed press");
                    return;
                }
                self.timed.len() - 1
            }
        };

        let entry = &mut self.timed[i];
        entry.active = true;
        entry.held = true;
        match &mut entry.state {
            TimedState::LayerTap {
                pressed_at, hold, ..
            } => {
                *pressed_at = Some(now);
                *hold = false;
            }
            TimedState::TapToggle {
                timeout,
                pressed_at,
                hold,
                taps,
                last_tap,
            } => {
                if now - *last_tap > u64::from(*timeout) {
                    *taps = 0;
                }
                *taps += 1;
                *last_tap = now;
                *pressed_at = Some(now);
                *hold = false;
            }
            TimedState::HoldTap {
                pressed_at,
                held_past,
                hold_sent,
                ..
            } => {
                *pressed_at = Some(now);
                *held_past = false;
                *hold_sent = false;
            }
            TimedState::TapDance {
                timeout,
                pressed_at,
                taps,
                last_press,
            } => {
                if now - *last_press > u64::from(*timeout) {
                    *taps = 0;
                }
                *taps += 1;
                *last_press = now;
                *pressed_at = Some(now);
            }
        }
    }

    fn timed_release(&mut self, hid: &mut impl HidSink, pos: KeyPos, now: u64) {
        let Some(i) = self.timed.iter().position(|e| e.pos == pos) else {
            return;
        };
        let mut entry = self.timed[i];
        entry.held = false;
        match &mut entry.state {
            TimedState::LayerTap {
                layer,
                tap,
                timeout,
                pressed_at,
                hold,
            } => {
                if let Some(t0) = *pressed_at {
                    if *hold {
                        self.layers.deactivate_layer(*layer);
                    } else if now - t0 < u64::from(*timeout) {
                        execute_tap(&mut self.layers, hid, tap);
                    } else {
                        // tick never fired; flash the layer so a
                        // wrapped modifier still resolves
                        self.layers.activate_layer(*layer, false);
                        self.layers.deactivate_layer(*layer);
                    }
                }
                *pressed_at = None;
                *hold = false;
                entry.active = false;
            }
            TimedState::TapToggle {
                layer,
                pressed_at,
                hold,
                taps,
                ..
            } => {
                if *hold {
                    self.layers.deactivate_layer(*layer);
                    *hold = false;
                    *taps = 0;
                    *pressed_at = None;
                    entry.active = false;
                }
                // otherwise the timer keeps running so a double tap
                // can resolve in tick()
            }
            TimedState::HoldTap {
                tap,
                hold,
                timeout,
                pressed_at,
                held_past,
                hold_sent,
            } => {
                match *pressed_at {
                    Some(t0) => {
                        if *held_past {
                            if *hold_sent {
                                execute_release(&mut self.layers, hid, hold);
                            } else {
                                warn!("hold timeout passed but hold was never sent");
                            }
                        } else if now - t0 < u64::from(*timeout) {
                            execute_tap(&mut self.layers, hid, tap);
                        } else {
                            debug!("hold-tap released late without resolution, ignoring");
                        }
                    }
                    None => warn!("hold-tap release without a press time"),
                }
                *pressed_at = None;
                entry.active = false;
            }
            TimedState::TapDance { .. } => {
                // resolution happens in tick() once the window closes
            }
        }
        self.timed[i] = entry;
        self.timed.retain(|e| e.active);
    }

    fn sticky_press(&mut self, hid: &mut impl HidSink, pos: KeyPos, action: &Action) {
        let Action::Sticky {
            action: inner,
            retap_cancel,
            ..
        } = *action
        else {
            return;
        };
        if let Some(i) = self.stickies.iter().position(|s| s.pos == pos) {
            if retap_cancel {
                let sticky = self.stickies.remove(i);
                execute_release(&mut self.layers, hid, sticky.inner);
            }
        } else {
            execute_press(&mut self.layers, hid, inner);
            if self
                .stickies
                .push(StickyEntry { pos, inner })
                .is_err()
            {
                warn!("sticky table full, releasing immediately");
                execute_release(&mut self.layers, hid, inner);
            }
        }
    }

    fn clear_stickies(&mut self, hid: &mut impl HidSink) {
        while let Some(sticky) = self.stickies.pop() {
            execute_release(&mut self.layers, hid, sticky.inner);
        }
    }
}

fn press_modifiers(hid: &mut impl HidSink, mods: Modifiers) {
    for bit in 0..8 {
        if mods.contains_bit(bit) {
            hid.press(KeyCode::from_modifier_bit(bit));
        }
    }
}

fn release_modifiers(hid: &mut impl HidSink, mods: Modifiers) {
    for bit in 0..8 {
        if mods.contains_bit(bit) {
            hid.release(KeyCode::from_modifier_bit(bit));
        }
    }
}

/// Press-side behavior of an action. Timed and sticky actions landing
/// here arrive nested (inside sequences or as a hold target) and
/// degrade to their immediate meaning.
fn execute_press(layers: &mut LayerManager, hid: &mut impl HidSink, action: &Action) {
    match *action {
        Action::NoOp => {}
        Action::Key(code) => hid.press(code),
        Action::Chord(mods, code) => {
            press_modifiers(hid, mods);
            hid.press(code);
            hid.release(code);
            release_modifiers(hid, mods);
        }
        Action::Media(code) => hid.media(code),
        Action::Mouse(mouse) => match mouse {
            MouseAction::Click(button) => {
                hid.mouse(MouseEvent::Press(button));
                hid.mouse(MouseEvent::Release(button));
            }
            MouseAction::Press(button) => hid.mouse(MouseEvent::Press(button)),
            MouseAction::Release(button) => hid.mouse(MouseEvent::Release(button)),
            MouseAction::Move { x, y, wheel } => hid.mouse(MouseEvent::Move { x, y, wheel }),
        },
        Action::Sequence(actions) => {
            for action in actions {
                execute_tap(layers, hid, action);
            }
        }
        Action::DefaultLayer { layer, jump } => {
            layers.set_default_layer(layer);
            if jump {
                layers.set_active_layer(layer);
            }
        }
        Action::ReplaceLayer(layer) => layers.replace_top_layer(layer),
        Action::MomentaryLayer(layer) => layers.activate_layer(layer, true),
        Action::ToggleLayer(layer) => layers.toggle_layer(layer, false),
        Action::ToLayer(layer) => layers.set_active_layer(layer),
        Action::LayerTap { tap, .. } => execute_tap(layers, hid, tap),
        Action::TapToggle { layer, .. } => layers.toggle_layer(layer, false),
        Action::HoldTap { tap, .. } => execute_tap(layers, hid, tap),
        Action::TapDance { actions, .. } => {
            if let Some(first) = actions.first() {
                execute_tap(layers, hid, first);
            }
        }
        Action::Sticky { action, .. } => execute_press(layers, hid, action),
    }
}

fn execute_release(layers: &mut LayerManager, hid: &mut impl HidSink, action: &Action) {
    match *action {
        Action::Key(code) => hid.release(code),
        Action::Mouse(MouseAction::Press(button)) => hid.mouse(MouseEvent::Release(button)),
        Action::MomentaryLayer(layer) => layers.deactivate_layer(layer),
        Action::Sticky { action, .. } => execute_release(layers, hid, action),
        _ => {}
    }
}

fn execute_tap(layers: &mut LayerManager, hid: &mut impl HidSink, action: &Action) {
    execute_press(layers, hid, action);
    execute_release(layers, hid, action);
}
