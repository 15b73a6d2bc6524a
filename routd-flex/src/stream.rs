//! Length-prefixed stream framing for opaque payloads.
//!
//! Protocols that do not delimit their own messages (raw TCP, or UDP
//! carrying JSON/protobuf bodies) wrap each payload as
//! `flex-num(length − 1) ‖ payload`. The subtraction wraps, so an empty
//! payload frames and unframes cleanly.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::FlexError;
use crate::number::{parse_head, parse_value, NumHead};

/// Frames `payload` with its flex-num length prefix.
pub fn stream_pack(payload: &[u8]) -> Bytes {
    let head = NumHead::non_zero_len(payload.len() as u64);
    let mut buf = BytesMut::with_capacity(head.encoded_len() + payload.len());
    head.encode(&mut buf);
    buf.put_slice(payload);
    buf.freeze()
}

/// Attempts to unframe one payload from the front of `buf`. Returns
/// `Ok(None)` until a whole frame is buffered; nothing is consumed in
/// that case.
pub fn stream_unpack(buf: &mut BytesMut) -> Result<Option<Bytes>, FlexError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let parsed = parse_head(buf[0], false);
    let prefix_len = 1 + parsed.bytes_len as usize;
    if buf.len() < prefix_len {
        return Ok(None);
    }
    let payload_len = parse_value(parsed.original_bits, &buf[1..prefix_len]).wrapping_add(1);
    if (buf.len() as u64) < prefix_len as u64 + payload_len {
        return Ok(None);
    }
    buf.advance(prefix_len);
    Ok(Some(buf.split_to(payload_len as usize).freeze()))
}

/// Reads one framed payload from an async byte stream, buffering through
/// `buf`. Returns `Ok(None)` on a clean end of stream between frames.
pub async fn stream_read<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
) -> Result<Option<Bytes>, FlexError> {
    loop {
        if let Some(payload) = stream_unpack(buf)? {
            return Ok(Some(payload));
        }
        if reader.read_buf(buf).await? == 0 {
            return if buf.is_empty() { Ok(None) } else { Err(FlexError::UnexpectedEof) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_round_trips() {
        let framed = stream_pack(b"");
        let mut buf = BytesMut::from(framed.as_ref());
        assert_eq!(stream_unpack(&mut buf).unwrap(), Some(Bytes::new()));
        assert!(buf.is_empty());
    }

    #[test]
    fn short_payload_takes_two_bytes() {
        let framed = stream_pack(b"x");
        assert_eq!(framed.len(), 2);
    }

    #[test]
    fn partial_frame_returns_none() {
        let framed = stream_pack(&[7u8; 300]);
        let mut buf = BytesMut::from(&framed[..150]);
        assert_eq!(stream_unpack(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 150);
    }
}
