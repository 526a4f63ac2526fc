use num_enum::{FromPrimitive, IntoPrimitive};

/// HID keyboard usage ids (usage page 0x07). Only the keys the stock
/// keymaps reach for; the full page round-trips through `Undefined`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, IntoPrimitive, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum KeyCode {
    #[num_enum(default)]
    Undefined = 0x00,
    A = 0x04,
    B = 0x05,
    C = 0x06,
    D = 0x07,
    E = 0x08,
    F = 0x09,
    G = 0x0A,
    H = 0x0B,
    I = 0x0C,
    J = 0x0D,
    K = 0x0E,
    L = 0x0F,
    M = 0x10,
    N = 0x11,
    O = 0x12,
    P = 0x13,
    Q = 0x14,
    R = 0x15,
    S = 0x16,
    T = 0x17,
    U = 0x18,
    V = 0x19,
    W = 0x1A,
    X = 0x1B,
    Y = 0x1C,
    Z = 0x1D,
    One = 0x1E,
    Two = 0x1F,
    Three = 0x20,
    Four = 0x21,
    Five = 0x22,
    Six = 0x23,
    Seven = 0x24,
    Eight = 0x25,
    Nine = 0x26,
    Zero = 0x27,
    Enter = 0x28,
    Escape = 0x29,
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x2C,
    Minus = 0x2D,
    Equals = 0x2E,
    LeftBracket = 0x2F,
    RightBracket = 0x30,
    Backslash = 0x31,
    Semicolon = 0x33,
    Quote = 0x34,
    GraveAccent = 0x35,
    Comma = 0x36,
    Period = 0x37,
    ForwardSlash = 0x38,
    CapsLock = 0x39,
    F1 = 0x3A,
    F2 = 0x3B,
    F3 = 0x3C,
    F4 = 0x3D,
    F5 = 0x3E,
    F6 = 0x3F,
    F7 = 0x40,
    F8 = 0x41,
    F9 = 0x42,
    F10 = 0x43,
    F11 = 0x44,
    F12 = 0x45,
    PrintScreen = 0x46,
    ScrollLock = 0x47,
    Pause = 0x48,
    Insert = 0x49,
    Home = 0x4A,
    PageUp = 0x4B,
    Delete = 0x4C,
    End = 0x4D,
    PageDown = 0x4E,
    Right = 0x4F,
    Left = 0x50,
    Down = 0x51,
    Up = 0x52,
    NumLock = 0x53,
    Application = 0x65,
    LeftControl = 0xE0,
    LeftShift = 0xE1,
    LeftAlt = 0xE2,
    LeftGui = 0xE3,
    RightControl = 0xE4,
    RightShift = 0xE5,
    RightAlt = 0xE6,
    RightGui = 0xE7,
}

impl KeyCode {
    pub const fn is_modifier(self) -> bool {
        (self as u8) >= 0xE0
    }

    /// Bit position in the HID modifier byte. Only meaningful for
    /// modifier codes.
    pub const fn modifier_bit(self) -> u8 {
        (self as u8) & 0x07
    }

    pub const fn from_modifier_bit(bit: u8) -> Self {
        match bit & 0x07 {
            0 => Self::LeftControl,
            1 => Self::LeftShift,
            2 => Self::LeftAlt,
            3 => Self::LeftGui,
            4 => Self::RightControl,
            5 => Self::RightShift,
            6 => Self::RightAlt,
            _ => Self::RightGui,
        }
    }
}

/// HID modifier byte as carried in keyboard reports.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Modifiers(pub u8);

impl Modifiers {
    pub const NONE: Self = Self(0);
    pub const LCTRL: Self = Self(1 << 0);
    pub const LSHIFT: Self = Self(1 << 1);
    pub const LALT: Self = Self(1 << 2);
    pub const LGUI: Self = Self(1 << 3);
    pub const RCTRL: Self = Self(1 << 4);
    pub const RSHIFT: Self = Self(1 << 5);
    pub const RALT: Self = Self(1 << 6);
    pub const RGUI: Self = Self(1 << 7);

    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains_bit(self, bit: u8) -> bool {
        self.0 & (1 << bit) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Consumer-control usage ids (usage page 0x0C).
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ConsumerCode {
    #[num_enum(default)]
    Unassigned = 0x00,
    Record = 0xB2,
    FastForward = 0xB3,
    Rewind = 0xB4,
    ScanNextTrack = 0xB5,
    ScanPreviousTrack = 0xB6,
    Stop = 0xB7,
    Eject = 0xB8,
    PlayPause = 0xCD,
    Mute = 0xE2,
    VolumeIncrement = 0xE9,
    VolumeDecrement = 0xEA,
    BrightnessIncrement = 0x6F,
    BrightnessDecrement = 0x70,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MouseButton {
    Left = 0,
    Right = 1,
    Middle = 2,
    Back = 3,
    Forward = 4,
}

impl MouseButton {
    pub const fn mask(self) -> u8 {
        1 << self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_bits_round_trip() {
        for bit in 0..8 {
            let code = KeyCode::from_modifier_bit(bit);
            assert!(code.is_modifier());
            assert_eq!(code.modifier_bit(), bit);
        }
        assert!(!KeyCode::A.is_modifier());
    }

    #[test]
    fn unknown_codes_collapse_to_undefined() {
        assert_eq!(KeyCode::from(0x03), KeyCode::Undefined);
        assert_eq!(KeyCode::from(0x04), KeyCode::A);
    }
}
