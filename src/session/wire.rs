//! Frame wire format.
//!
//! Every plaintext the node exchanges starts with the same 5-byte prefix:
//!
//! ```text
//! [message_id:4 LE][frame_kind:1]
//! ```
//!
//! For handshake frames the `message_id` slot carries the handshake nonce.
//! Fragment frames extend the prefix:
//!
//! ```text
//! [message_id:4 LE][0x02][session_id:2 LE][fragment_index:2 LE][total_length:4 LE][payload]
//! ```

use crate::utils::index::SessionId;

/// Maximum payload bytes per fragment.
pub const FRAGMENT_SIZE: usize = 4096;

/// Size of the fragment header.
pub const FRAGMENT_HEADER_SIZE: usize = 13;

/// Size of the common prefix shared by all frame kinds.
pub const FRAME_PREFIX_SIZE: usize = 5;

/// Frame kind discriminator (byte 4 of every frame).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Client handshake proposal (inside RSA ciphertext).
    HandshakeInit = 0,
    /// Server handshake confirmation (inside AES ciphertext).
    HandshakeConfirm = 1,
    /// One fragment of a logical message.
    Fragment = 2,
}

impl FrameKind {
    /// Parse a frame kind byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(FrameKind::HandshakeInit),
            1 => Some(FrameKind::HandshakeConfirm),
            2 => Some(FrameKind::Fragment),
            _ => None,
        }
    }

    /// Get the wire byte.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Parsed fragment header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentHeader {
    pub message_id: u32,
    pub session_id: SessionId,
    pub fragment_index: u16,
    pub total_length: u32,
}

impl FragmentHeader {
    /// Parse a fragment header from the front of a frame.
    ///
    /// Returns None for frames too short to hold the header or whose kind
    /// is not `Fragment`.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        if frame.len() < FRAGMENT_HEADER_SIZE {
            return None;
        }
        if FrameKind::from_byte(frame[4]) != Some(FrameKind::Fragment) {
            return None;
        }

        Some(Self {
            message_id: u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]),
            session_id: SessionId::from_le_bytes([frame[5], frame[6]]),
            fragment_index: u16::from_le_bytes([frame[7], frame[8]]),
            total_length: u32::from_le_bytes([frame[9], frame[10], frame[11], frame[12]]),
        })
    }

    /// Encode the header followed by `payload` into a new frame.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAGMENT_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&self.message_id.to_le_bytes());
        frame.push(FrameKind::Fragment.as_byte());
        frame.extend_from_slice(&self.session_id.to_le_bytes());
        frame.extend_from_slice(&self.fragment_index.to_le_bytes());
        frame.extend_from_slice(&self.total_length.to_le_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    /// Byte offset of this fragment inside the reassembled message.
    pub fn offset(&self) -> usize {
        self.fragment_index as usize * FRAGMENT_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = FragmentHeader {
            message_id: 0x04030201,
            session_id: SessionId::new(0x0605),
            fragment_index: 0x0807,
            total_length: 0x0c0b0a09,
        };
        let frame = header.encode(&[0xee]);
        assert_eq!(
            frame,
            vec![1, 2, 3, 4, 2, 5, 6, 7, 8, 9, 10, 11, 12, 0xee]
        );
        assert_eq!(FragmentHeader::parse(&frame), Some(header));
    }

    #[test]
    fn test_parse_rejects_short_and_foreign_kinds() {
        assert_eq!(FragmentHeader::parse(&[0u8; 12]), None);

        let mut frame = FragmentHeader {
            message_id: 1,
            session_id: SessionId::new(1),
            fragment_index: 0,
            total_length: 0,
        }
        .encode(&[]);
        frame[4] = FrameKind::HandshakeConfirm.as_byte();
        assert_eq!(FragmentHeader::parse(&frame), None);
        frame[4] = 0x7f;
        assert_eq!(FragmentHeader::parse(&frame), None);
    }

    #[test]
    fn test_frame_kind_bytes() {
        assert_eq!(FrameKind::from_byte(0), Some(FrameKind::HandshakeInit));
        assert_eq!(FrameKind::from_byte(1), Some(FrameKind::HandshakeConfirm));
        assert_eq!(FrameKind::from_byte(2), Some(FrameKind::Fragment));
        assert_eq!(FrameKind::from_byte(3), None);
    }
}
