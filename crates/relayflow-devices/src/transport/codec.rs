//! Fixed-length framing for serial status reports.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Splits a byte stream into frames of exactly `length` bytes, however the
/// stream happens to fragment them. Outbound payloads pass through as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLengthCodec {
    length: usize,
}

impl FixedLengthCodec {
    /// Create a codec for `length` byte frames; zero is treated as one
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }

    /// The frame length
    pub fn length(&self) -> usize {
        self.length
    }
}

impl Decoder for FixedLengthCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        if src.len() < self.length {
            src.reserve(self.length - src.len());
            return Ok(None);
        }
        Ok(Some(src.split_to(self.length)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !src.is_empty() {
                    trace!("dropping {} trailing bytes of a partial frame", src.len());
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for FixedLengthCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragmented_input() {
        let mut codec = FixedLengthCodec::new(2);
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&[0x01]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&[0x02, 0x03, 0x04, 0x05]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &[0x01, 0x02][..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &[0x03, 0x04][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], &[0x05]);
    }

    #[test]
    fn test_partial_frame_at_eof_is_dropped() {
        let mut codec = FixedLengthCodec::new(2);
        let mut buf = BytesMut::from(&[0x01, 0x02, 0x03][..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().unwrap(), &[0x01, 0x02][..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_zero_length_means_single_bytes() {
        let mut codec = FixedLengthCodec::new(0);
        assert_eq!(codec.length(), 1);
        let mut buf = BytesMut::from(&[0xaa, 0xbb][..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &[0xaa][..]);
    }

    #[test]
    fn test_encode_passes_through() {
        let mut codec = FixedLengthCodec::new(1);
        let mut dst = BytesMut::new();
        codec.encode(Bytes::from_static(b"\x65"), &mut dst).unwrap();
        assert_eq!(&dst[..], b"\x65");
    }
}
