use heapless::Vec;
use log::warn;
use num_enum::TryFromPrimitive;

/// Start-of-frame marker; resynchronization scans for it after noise.
pub const SOF: u8 = 0xA5;

const HEADER_LEN: usize = 2;

const KEY_EVENT_WIRE_LEN: usize = HEADER_LEN + 7;
const TIME_SYNC_WIRE_LEN: usize = HEADER_LEN + 4;
const BATTERY_WIRE_LEN: usize = HEADER_LEN + 2;
const LAYER_STATE_WIRE_LEN: usize = HEADER_LEN + 1;
const BACKLIGHT_CMD_WIRE_LEN: usize = HEADER_LEN + 1;

const fn max_len(arr: &[usize]) -> usize {
    let mut max = 0;
    let mut i = 0;
    while i < arr.len() {
        if arr[i] > max {
            max = arr[i];
        }
        i += 1;
    }
    max
}

pub const MAX_WIRE_LENGTH: usize = max_len(&[
    KEY_EVENT_WIRE_LEN,
    TIME_SYNC_WIRE_LEN,
    BATTERY_WIRE_LEN,
    LAYER_STATE_WIRE_LEN,
    BACKLIGHT_CMD_WIRE_LEN,
]);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    BufferTooSmall,
    InvalidFormat,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
enum MessageType {
    KeyEvent = 0,
    TimeSync = 1,
    Battery = 2,
    LayerState = 3,
    BacklightCmd = 4,
}

impl MessageType {
    fn wire_len(self) -> usize {
        match self {
            Self::KeyEvent => KEY_EVENT_WIRE_LEN,
            Self::TimeSync => TIME_SYNC_WIRE_LEN,
            Self::Battery => BATTERY_WIRE_LEN,
            Self::LayerState => LAYER_STATE_WIRE_LEN,
            Self::BacklightCmd => BACKLIGHT_CMD_WIRE_LEN,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BacklightMode {
    Off = 0,
    Static = 1,
    Rainbow = 2,
}

/// Traffic between the halves. Key events and sync flow periphery to
/// central; layer state and backlight commands flow the other way.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message {
    KeyEvent {
        col: u8,
        row: u8,
        pressed: bool,
        timestamp_ms: u32,
    },
    TimeSync {
        timestamp_ms: u32,
    },
    Battery {
        millivolts: u16,
    },
    LayerState {
        layer: u8,
    },
    BacklightCmd {
        mode: BacklightMode,
    },
}

impl Message {
    fn message_type(&self) -> MessageType {
        match self {
            Message::KeyEvent { .. } => MessageType::KeyEvent,
            Message::TimeSync { .. } => MessageType::TimeSync,
            Message::Battery { .. } => MessageType::Battery,
            Message::LayerState { .. } => MessageType::LayerState,
            Message::BacklightCmd { .. } => MessageType::BacklightCmd,
        }
    }

    pub fn wire_len(&self) -> usize {
        self.message_type().wire_len()
    }

    /// Serializes into `buffer`, returning the number of bytes used.
    pub fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, CodecError> {
        let len = self.wire_len();
        if buffer.len() < len {
            return Err(CodecError::BufferTooSmall);
        }
        buffer[0] = SOF;
        buffer[1] = self.message_type() as u8;
        match *self {
            Message::KeyEvent {
                col,
                row,
                pressed,
                timestamp_ms,
            } => {
                buffer[2] = col;
                buffer[3] = row;
                buffer[4] = pressed as u8;
                buffer[5..9].copy_from_slice(&timestamp_ms.to_le_bytes());
            }
            Message::TimeSync { timestamp_ms } => {
                buffer[2..6].copy_from_slice(&timestamp_ms.to_le_bytes());
            }
            Message::Battery { millivolts } => {
                buffer[2..4].copy_from_slice(&millivolts.to_le_bytes());
            }
            Message::LayerState { layer } => {
                buffer[2] = layer;
            }
            Message::BacklightCmd { mode } => {
                buffer[2] = mode as u8;
            }
        }
        Ok(len)
    }

    /// Deserializes one message from a buffer that starts at a SOF
    /// byte. Returns the message and the bytes consumed.
    pub fn deserialize_from(buffer: &[u8]) -> Result<(Self, usize), CodecError> {
        if buffer.len() < HEADER_LEN {
            return Err(CodecError::BufferTooSmall);
        }
        if buffer[0] != SOF {
            return Err(CodecError::InvalidFormat);
        }
        let msg_type =
            MessageType::try_from(buffer[1]).map_err(|_| CodecError::InvalidFormat)?;
        let len = msg_type.wire_len();
        if buffer.len() < len {
            return Err(CodecError::BufferTooSmall);
        }
        let message = match msg_type {
            MessageType::KeyEvent => Message::KeyEvent {
                col: buffer[2],
                row: buffer[3],
                pressed: buffer[4] != 0,
                timestamp_ms: u32::from_le_bytes(buffer[5..9].try_into().unwrap()),
            },
            MessageType::TimeSync => Message::TimeSync {
                timestamp_ms: u32::from_le_bytes(buffer[2..6].try_into().unwrap()),
            },
            MessageType::Battery => Message::Battery {
                millivolts: u16::from_le_bytes(buffer[2..4].try_into().unwrap()),
            },
            MessageType::LayerState => Message::LayerState { layer: buffer[2] },
            MessageType::BacklightCmd => Message::BacklightCmd {
                mode: BacklightMode::try_from(buffer[2])
                    .map_err(|_| CodecError::InvalidFormat)?,
            },
        };
        Ok((message, len))
    }
}

const PARSER_BUFFER: usize = 256;

/// Accumulates raw transport bytes and yields complete messages,
/// skipping garbage until the next start-of-frame byte.
pub struct FrameParser {
    buffer: Vec<u8, PARSER_BUFFER>,
}

impl FrameParser {
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn push_bytes(&mut self, data: &[u8]) {
        if self.buffer.extend_from_slice(data).is_err() {
            // a link this far behind is better restarted than replayed
            warn!("frame buffer overflow, dropping {} buffered bytes", self.buffer.len());
            self.buffer.clear();
            let tail = &data[data.len().saturating_sub(PARSER_BUFFER)..];
            let _ = self.buffer.extend_from_slice(tail);
        }
    }

    fn consume(&mut self, n: usize) {
        let remaining = self.buffer.len() - n;
        self.buffer.copy_within(n.., 0);
        self.buffer.truncate(remaining);
    }

    /// Next complete message, if the buffer holds one.
    pub fn next_message(&mut self) -> Option<Message> {
        loop {
            let Some(start) = self.buffer.iter().position(|&b| b == SOF) else {
                self.buffer.clear();
                return None;
            };
            if start > 0 {
                self.consume(start);
            }
            match Message::deserialize_from(&self.buffer) {
                Ok((message, len)) => {
                    self.consume(len);
                    return Some(message);
                }
                Err(CodecError::BufferTooSmall) => return None,
                Err(CodecError::InvalidFormat) => {
                    // bad type byte: drop this SOF and rescan
                    self.consume(1);
                }
            }
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(message: Message) -> std::vec::Vec<u8> {
        let mut buf = [0u8; MAX_WIRE_LENGTH];
        let len = message.serialize_into(&mut buf).unwrap();
        buf[..len].to_vec()
    }

    #[test]
    fn key_event_round_trips() {
        let message = Message::KeyEvent {
            col: 3,
            row: 1,
            pressed: true,
            timestamp_ms: 0xDEAD_BEEF,
        };
        let bytes = encoded(message);
        assert_eq!(bytes.len(), 9);
        let (decoded, consumed) = Message::deserialize_from(&bytes).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn every_variant_round_trips() {
        let messages = [
            Message::KeyEvent { col: 0, row: 7, pressed: false, timestamp_ms: 12 },
            Message::TimeSync { timestamp_ms: 5000 },
            Message::Battery { millivolts: 3730 },
            Message::LayerState { layer: 2 },
            Message::BacklightCmd { mode: BacklightMode::Rainbow },
        ];
        for message in messages {
            let bytes = encoded(message);
            let (decoded, consumed) = Message::deserialize_from(&bytes).unwrap();
            assert_eq!(decoded, message);
            assert_eq!(consumed, message.wire_len());
        }
    }

    #[test]
    fn serialize_rejects_short_buffers() {
        let message = Message::TimeSync { timestamp_ms: 1 };
        let mut buf = [0u8; 3];
        assert_eq!(
            message.serialize_into(&mut buf),
            Err(CodecError::BufferTooSmall)
        );
    }

    #[test]
    fn deserialize_rejects_unknown_type() {
        let bytes = [SOF, 0x7F, 0, 0];
        assert_eq!(
            Message::deserialize_from(&bytes),
            Err(CodecError::InvalidFormat)
        );
    }

    #[test]
    fn parser_yields_messages_across_split_reads() {
        let mut parser = FrameParser::new();
        let bytes = encoded(Message::KeyEvent {
            col: 1,
            row: 2,
            pressed: true,
            timestamp_ms: 99,
        });
        parser.push_bytes(&bytes[..4]);
        assert_eq!(parser.next_message(), None);
        parser.push_bytes(&bytes[4..]);
        assert_eq!(
            parser.next_message(),
            Some(Message::KeyEvent {
                col: 1,
                row: 2,
                pressed: true,
                timestamp_ms: 99
            })
        );
        assert_eq!(parser.next_message(), None);
    }

    #[test]
    fn parser_skips_garbage_before_frames() {
        let mut parser = FrameParser::new();
        parser.push_bytes(&[0x00, 0x13, 0x37]);
        parser.push_bytes(&encoded(Message::LayerState { layer: 1 }));
        assert_eq!(
            parser.next_message(),
            Some(Message::LayerState { layer: 1 })
        );
    }

    #[test]
    fn parser_resyncs_after_bad_type_byte() {
        let mut parser = FrameParser::new();
        parser.push_bytes(&[SOF, 0xEE]);
        parser.push_bytes(&encoded(Message::Battery { millivolts: 4200 }));
        assert_eq!(
            parser.next_message(),
            Some(Message::Battery { millivolts: 4200 })
        );
    }

    #[test]
    fn parser_handles_back_to_back_messages() {
        let mut parser = FrameParser::new();
        let mut stream = encoded(Message::TimeSync { timestamp_ms: 1 });
        stream.extend(encoded(Message::TimeSync { timestamp_ms: 2 }));
        parser.push_bytes(&stream);
        assert_eq!(parser.next_message(), Some(Message::TimeSync { timestamp_ms: 1 }));
        assert_eq!(parser.next_message(), Some(Message::TimeSync { timestamp_ms: 2 }));
        assert_eq!(parser.next_message(), None);
    }
}
