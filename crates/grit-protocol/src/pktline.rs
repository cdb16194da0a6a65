//! Pkt-line framing for the smart HTTP protocol.
//!
//! Each frame is prefixed with 4 hex digits giving its total length
//! (including the prefix); `0000` is a flush marker. Once a response
//! payload begins with the four bytes `PACK`, the server has dropped
//! pkt-line framing and the remainder of the input is raw pack data.

use crate::{ProtocolError, Result};

/// A single pkt-line frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Data frame. A single trailing LF has been trimmed, except for the
    /// raw pack tail.
    Data(Vec<u8>),
    /// Flush marker (`0000`), terminating a group of frames.
    Flush,
}

impl Frame {
    /// Returns the payload, or None for a flush.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            Self::Flush => None,
        }
    }

    /// Returns the payload as UTF-8 text.
    pub fn as_str(&self) -> Option<&str> {
        self.data().and_then(|d| std::str::from_utf8(d).ok())
    }

    /// Returns true if this is a flush marker.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }
}

/// Reads frames out of a response body.
#[derive(Debug)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    /// Creates a reader over a raw response body.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Reads the next frame, or None at end of input.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let rest = &self.buf[self.pos..];
        if rest.is_empty() {
            return Ok(None);
        }
        // Side-band-free pack data is not framed; hand it over verbatim.
        if rest.starts_with(b"PACK") {
            self.pos = self.buf.len();
            return Ok(Some(Frame::Data(rest.to_vec())));
        }
        if rest.len() < 4 {
            return Err(ProtocolError::InvalidPktLine(format!(
                "truncated length prefix: {} bytes left",
                rest.len()
            )));
        }
        let prefix = std::str::from_utf8(&rest[..4])
            .map_err(|_| ProtocolError::InvalidPktLine("non-ASCII length prefix".to_string()))?;
        let len = usize::from_str_radix(prefix, 16).map_err(|_| {
            ProtocolError::InvalidPktLine(format!("invalid length prefix: {:?}", prefix))
        })?;
        if len == 0 {
            self.pos += 4;
            return Ok(Some(Frame::Flush));
        }
        if len < 4 {
            return Err(ProtocolError::InvalidPktLine(format!(
                "length {} too small",
                len
            )));
        }
        if rest.len() < len {
            return Err(ProtocolError::InvalidPktLine(format!(
                "frame of {} bytes overruns input",
                len
            )));
        }
        let mut payload = rest[4..len].to_vec();
        if payload.last() == Some(&b'\n') {
            payload.pop();
        }
        self.pos += len;
        Ok(Some(Frame::Data(payload)))
    }

    /// Reads data frames until a flush, which is consumed.
    pub fn read_until_flush(&mut self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        loop {
            match self.next_frame()? {
                Some(Frame::Flush) | None => break,
                Some(frame) => frames.push(frame),
            }
        }
        Ok(frames)
    }
}

/// Encodes a data frame.
pub fn encode_data(payload: &[u8]) -> Vec<u8> {
    let mut out = format!("{:04x}", payload.len() + 4).into_bytes();
    out.extend_from_slice(payload);
    out
}

/// Encodes a flush marker.
pub fn encode_flush() -> Vec<u8> {
    b"0000".to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_data() {
        assert_eq!(encode_data(b"hello\n"), b"000ahello\n");
        assert_eq!(encode_flush(), b"0000");
    }

    #[test]
    fn test_read_trims_trailing_newline() {
        let mut reader = FrameReader::new(b"000ahello\n0000");
        assert_eq!(
            reader.next_frame().unwrap(),
            Some(Frame::Data(b"hello".to_vec()))
        );
        assert_eq!(reader.next_frame().unwrap(), Some(Frame::Flush));
        assert_eq!(reader.next_frame().unwrap(), None);
    }

    #[test]
    fn test_pack_tail_is_one_raw_frame() {
        let mut body = encode_data(b"NAK\n");
        body.extend_from_slice(b"PACK\x00\x00\x00\x02rest of the pack\n");

        let mut reader = FrameReader::new(&body);
        assert_eq!(
            reader.next_frame().unwrap(),
            Some(Frame::Data(b"NAK".to_vec()))
        );
        // The tail is verbatim: untrimmed, unframed.
        let Some(Frame::Data(pack)) = reader.next_frame().unwrap() else {
            panic!("expected pack frame");
        };
        assert_eq!(pack, b"PACK\x00\x00\x00\x02rest of the pack\n".to_vec());
        assert_eq!(reader.next_frame().unwrap(), None);
    }

    #[test]
    fn test_read_until_flush() {
        let mut body = encode_data(b"one\n");
        body.extend_from_slice(&encode_data(b"two\n"));
        body.extend_from_slice(&encode_flush());
        body.extend_from_slice(&encode_data(b"three\n"));

        let mut reader = FrameReader::new(&body);
        let frames = reader.read_until_flush().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_str(), Some("one"));
        assert_eq!(
            reader.next_frame().unwrap(),
            Some(Frame::Data(b"three".to_vec()))
        );
    }

    #[test]
    fn test_truncated_prefix_rejected() {
        let mut reader = FrameReader::new(b"00");
        assert!(matches!(
            reader.next_frame(),
            Err(ProtocolError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn test_overrunning_frame_rejected() {
        let mut reader = FrameReader::new(b"00ffshort");
        assert!(matches!(
            reader.next_frame(),
            Err(ProtocolError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn test_non_hex_prefix_rejected() {
        let mut reader = FrameReader::new(b"zzzzdata");
        assert!(matches!(
            reader.next_frame(),
            Err(ProtocolError::InvalidPktLine(_))
        ));
    }
}
