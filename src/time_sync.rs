use fixed::types::I48F16;
use fixed_macro::fixed;

/// Smoothing factor for the clock-offset estimate.
const ALPHA: I48F16 = fixed!(0.05: I48F16);

/// Tracks the offset between a periphery's millisecond clock and the
/// central's, smoothing each observation to ride out transport jitter.
#[derive(Copy, Clone, Debug, Default)]
pub struct TimeSync {
    offset_ms: I48F16,
    synced: bool,
}

impl TimeSync {
    pub const fn new() -> Self {
        Self {
            offset_ms: I48F16::ZERO,
            synced: false,
        }
    }

    /// Feed one sync observation: the remote timestamp as received and
    /// the local time it arrived at.
    pub fn update(&mut self, remote_ms: u64, local_ms: u64) {
        let new_offset = I48F16::from_num(local_ms as i64 - remote_ms as i64);
        if self.synced {
            self.offset_ms += (new_offset - self.offset_ms) * ALPHA;
        } else {
            // jump straight onto the first observation
            self.offset_ms = new_offset;
            self.synced = true;
        }
    }

    /// Translates a remote timestamp into the local clock. Before the
    /// first sync the timestamp passes through unchanged.
    pub fn to_local(&self, remote_ms: u64) -> u64 {
        let local = remote_ms as i64 + self.offset_ms.to_num::<i64>();
        local.max(0) as u64
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }
}
