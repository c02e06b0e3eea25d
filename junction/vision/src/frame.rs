use std::io;

/// `content` plus `padding` in one frame must never exceed this — the
/// same ceiling a single TLS record payload would carry, so a padded
/// frame never fragments across more TCP segments than an unpadded one
/// reasonably would.
pub const MAX_PAYLOAD: usize = 4075;

/// `[uuid16 once][cmd u8][content_len u16 BE][padding_len u16 BE]`
pub const HEADER_LEN: usize = 1 + 2 + 2;
pub const UUID_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// More padded frames are coming.
    PaddingContinue,
    /// This is the last padded frame; subsequent bytes on the wire are
    /// raw, unframed application data.
    PaddingEnd,
    /// Padding was never engaged for this stream — pass bytes straight
    /// through untouched.
    Direct,
}

impl Command {
    pub fn to_byte(self) -> u8 {
        match self {
            Command::PaddingContinue => 0,
            Command::PaddingEnd => 1,
            Command::Direct => 2,
        }
    }

    pub fn from_byte(b: u8) -> io::Result<Self> {
        match b {
            0 => Ok(Command::PaddingContinue),
            1 => Ok(Command::PaddingEnd),
            2 => Ok(Command::Direct),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown vision command byte {other}"),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub cmd: Command,
    pub content_len: u16,
    pub padding_len: u16,
}

impl FrameHeader {
    pub fn encode(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.cmd.to_byte();
        out[1..3].copy_from_slice(&self.content_len.to_be_bytes());
        out[3..5].copy_from_slice(&self.padding_len.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8; HEADER_LEN]) -> io::Result<Self> {
        let cmd = Command::from_byte(bytes[0])?;
        let content_len = u16::from_be_bytes([bytes[1], bytes[2]]);
        let padding_len = u16::from_be_bytes([bytes[3], bytes[4]]);
        if content_len as usize + padding_len as usize > MAX_PAYLOAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "content_len + padding_len exceeds the per-frame ceiling",
            ));
        }
        Ok(Self {
            cmd,
            content_len,
            padding_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = FrameHeader {
            cmd: Command::PaddingContinue,
            content_len: 120,
            padding_len: 30,
        };
        let encoded = h.encode();
        let decoded = FrameHeader::decode(&encoded).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn oversized_payload_is_rejected_at_decode() {
        let h = FrameHeader {
            cmd: Command::PaddingContinue,
            content_len: 4000,
            padding_len: 100,
        };
        assert!(FrameHeader::decode(&h.encode()).is_err());
    }
}
