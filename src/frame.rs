//! Wire framing for state packets.
//!
//! ```text
//! A4 11 E4 D8 | LEN | SUM_hi SUM_lo | payload...
//! ```
//! `LEN` counts the whole frame (payload + 7). `SUM` is the additive checksum
//! of the payload only. All multi-byte fields are big-endian.

use std::io::Cursor;

use thiserror::Error;

use crate::checksum::{checksum, checksum_unread};
use crate::state::{Colour, Detail, LinkState, StateParts};

pub const HEADER: [u8; 4] = [0xA4, 0x11, 0xE4, 0xD8];
/// Magic header + size byte + checksum.
pub const OVERHEAD: usize = HEADER.len() + 1 + 2;
/// Largest frame whose length still fits the size byte.
pub const MAX_FRAME: usize = 255;
pub const STATE_PAYLOAD_LEN: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame of {0} bytes exceeds 255")]
    TooLarge(usize),
    #[error("truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("bad header")]
    BadHeader,
    #[error("bad length byte {0}")]
    BadLength(u8),
    #[error("checksum {actual:#06x}!={expected:#06x}")]
    Checksum { expected: u16, actual: u16 },
    #[error("invalid {0} bits: {1:#b}")]
    BadField(&'static str, u16),
}

mod bits {
    pub const COUNTDOWN_CONTINUES: u16 = 1 << 9;
    pub const LAST_END: u16 = 1 << 8;
    pub const EMERGENCY_STOP: u16 = 1 << 7;
    pub const MATCHPLAY: u16 = 1 << 6;
    pub const COUNTDOWN: u16 = 1 << 5;
    pub const DETAIL_SHIFT: u16 = 3;
    pub const COLOUR_SHIFT: u16 = 1;
    pub const TIME_ENABLED: u16 = 1;
}

/// Pack the flag fields into the 16-bit state word.
pub fn state_word(state: &LinkState) -> u16 {
    let flag = |on: bool, bit: u16| if on { bit } else { 0 };
    let detail = match state.detail() {
        Detail::Off => 0,
        Detail::AB => 1,
        Detail::CD => 2,
    };
    let colour = match state.colour() {
        Colour::Red => 0,
        Colour::Amber => 1,
        Colour::Green => 2,
    };
    flag(state.countdown_continues(), bits::COUNTDOWN_CONTINUES)
        | flag(state.last_end(), bits::LAST_END)
        | flag(state.emergency_stop(), bits::EMERGENCY_STOP)
        | flag(state.matchplay(), bits::MATCHPLAY)
        | flag(state.countdown(), bits::COUNTDOWN)
        | (detail << bits::DETAIL_SHIFT)
        | (colour << bits::COLOUR_SHIFT)
        | flag(state.time_enabled(), bits::TIME_ENABLED)
}

impl LinkState {
    /// Serialize into the 8-byte state payload.
    pub fn to_payload(&self) -> [u8; STATE_PAYLOAD_LEN] {
        let mut out = [0u8; STATE_PAYLOAD_LEN];
        out[0..2].copy_from_slice(&state_word(self).to_be_bytes());
        out[2..4].copy_from_slice(&self.raw_time().to_be_bytes());
        out[4..6].copy_from_slice(&self.start_beeps().to_be_bytes());
        out[6..8].copy_from_slice(&self.end_beeps().to_be_bytes());
        out
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < STATE_PAYLOAD_LEN {
            return Err(FrameError::Truncated {
                need: STATE_PAYLOAD_LEN,
                have: payload.len(),
            });
        }
        let word = u16::from_be_bytes([payload[0], payload[1]]);
        let int = |i: usize| i16::from_be_bytes([payload[i], payload[i + 1]]);

        let detail = match (word >> bits::DETAIL_SHIFT) & 0b11 {
            0 => Detail::Off,
            1 => Detail::AB,
            2 => Detail::CD,
            v => return Err(FrameError::BadField("detail", v)),
        };
        let colour = match (word >> bits::COLOUR_SHIFT) & 0b11 {
            0 => Colour::Red,
            1 => Colour::Amber,
            2 => Colour::Green,
            v => return Err(FrameError::BadField("colour", v)),
        };

        Ok(LinkState::from_parts(StateParts {
            countdown_continues: word & bits::COUNTDOWN_CONTINUES != 0,
            last_end: word & bits::LAST_END != 0,
            emergency_stop: word & bits::EMERGENCY_STOP != 0,
            matchplay: word & bits::MATCHPLAY != 0,
            countdown: word & bits::COUNTDOWN != 0,
            detail,
            colour,
            time_enabled: word & bits::TIME_ENABLED != 0,
            time: int(2),
            start_beeps: int(4),
            end_beeps: int(6),
        }))
    }
}

/// Wrap a payload into a complete frame.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let total = payload.len() + OVERHEAD;
    if total > MAX_FRAME {
        return Err(FrameError::TooLarge(total));
    }
    Ok(wrap(payload))
}

/// Frame the serialized state. The payload is fixed-size, so this cannot fail.
pub fn encode_state(state: &LinkState) -> Vec<u8> {
    wrap(&state.to_payload())
}

fn wrap(payload: &[u8]) -> Vec<u8> {
    let total = payload.len() + OVERHEAD;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&HEADER);
    out.push(total as u8);
    out.extend_from_slice(&checksum(payload).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validate one complete frame and return its payload.
pub fn parse_frame(frame: &[u8]) -> Result<&[u8], FrameError> {
    if frame.len() < OVERHEAD {
        return Err(FrameError::Truncated {
            need: OVERHEAD,
            have: frame.len(),
        });
    }
    if frame[..HEADER.len()] != HEADER {
        return Err(FrameError::BadHeader);
    }
    let len = frame[4];
    if (len as usize) < OVERHEAD {
        return Err(FrameError::BadLength(len));
    }
    if frame.len() < len as usize {
        return Err(FrameError::Truncated {
            need: len as usize,
            have: frame.len(),
        });
    }
    let expected = u16::from_be_bytes([frame[5], frame[6]]);

    let mut cur = Cursor::new(&frame[..len as usize]);
    cur.set_position(OVERHEAD as u64);
    let actual = checksum_unread(&mut cur);
    if actual != expected {
        return Err(FrameError::Checksum { expected, actual });
    }
    Ok(&frame[OVERHEAD..len as usize])
}

/// Byte-at-a-time frame receiver.
///
/// Collects the header and size byte, drops the leading byte and retries
/// when the header does not match, then waits for the announced length.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: Vec<u8>,
    expected: Option<usize>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.expected = None;
    }

    /// Bytes currently held while waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Feed one byte. `Ok(Some(payload))` when a frame completes,
    /// `Err` when a completed frame fails its checksum.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Vec<u8>>, FrameError> {
        self.buf.push(byte);

        if self.expected.is_none() && self.buf.len() == HEADER.len() + 1 {
            if self.buf[..HEADER.len()] != HEADER {
                self.buf.remove(0);
                return Ok(None);
            }
            let len = self.buf[HEADER.len()];
            if (len as usize) < OVERHEAD {
                self.reset();
                return Err(FrameError::BadLength(len));
            }
            self.expected = Some(len as usize);
        }

        match self.expected {
            Some(len) if self.buf.len() == len => {
                let result = parse_frame(&self.buf).map(<[u8]>::to_vec);
                self.reset();
                result.map(Some)
            }
            _ => Ok(None),
        }
    }
}
