use heapless::FnvIndexMap;
use log::warn;

/// Window inside which a state flip is treated as contact bounce.
pub const DEBOUNCE_MS: u64 = 5;

#[derive(Copy, Clone, Debug)]
struct KeyTrack {
    pressed: bool,
    at: u64,
}

/// Per-key debounce over flat local key indices. The first sighting of
/// a key is always accepted; afterwards a flip only passes once the
/// window since the last accepted change has elapsed.
pub struct Debouncer<const N: usize> {
    window_ms: u64,
    keys: FnvIndexMap<u16, KeyTrack, N>,
}

impl<const N: usize> Debouncer<N> {
    pub fn new() -> Self {
        Self {
            window_ms: DEBOUNCE_MS,
            keys: FnvIndexMap::new(),
        }
    }

    pub fn with_window(window_ms: u64) -> Self {
        Self {
            window_ms,
            keys: FnvIndexMap::new(),
        }
    }

    /// Returns true when the event should be forwarded.
    pub fn update(&mut self, key: u16, pressed: bool, timestamp: u64) -> bool {
        match self.keys.get_mut(&key) {
            Some(track) => {
                if track.pressed == pressed {
                    track.at = timestamp;
                    return false;
                }
                if timestamp.saturating_sub(track.at) >= self.window_ms {
                    track.pressed = pressed;
                    track.at = timestamp;
                    true
                } else {
                    false
                }
            }
            None => {
                if self
                    .keys
                    .insert(key, KeyTrack { pressed, at: timestamp })
                    .is_err()
                {
                    warn!("debounce table full, passing key {key} through");
                }
                true
            }
        }
    }
}

impl<const N: usize> Default for Debouncer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_accepted() {
        let mut debouncer: Debouncer<16> = Debouncer::new();
        assert!(debouncer.update(0, true, 100));
    }

    #[test]
    fn bounce_inside_window_is_dropped() {
        let mut debouncer: Debouncer<16> = Debouncer::new();
        assert!(debouncer.update(0, true, 100));
        assert!(!debouncer.update(0, false, 102));
        assert!(!debouncer.update(0, true, 103));
    }

    #[test]
    fn flip_after_window_passes() {
        let mut debouncer: Debouncer<16> = Debouncer::new();
        assert!(debouncer.update(0, true, 100));
        assert!(debouncer.update(0, false, 106));
    }

    #[test]
    fn repeated_state_refreshes_without_event() {
        let mut debouncer: Debouncer<16> = Debouncer::new();
        assert!(debouncer.update(0, true, 100));
        assert!(!debouncer.update(0, true, 200));
        // the refresh at 200 restarts the window
        assert!(!debouncer.update(0, false, 203));
        assert!(debouncer.update(0, false, 206));
    }

    #[test]
    fn keys_are_tracked_independently() {
        let mut debouncer: Debouncer<16> = Debouncer::new();
        assert!(debouncer.update(0, true, 100));
        assert!(debouncer.update(1, true, 101));
        assert!(!debouncer.update(0, false, 102));
        assert!(debouncer.update(1, false, 110));
    }
}
