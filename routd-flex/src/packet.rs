//! Flex packet serialization and incremental deserialization.

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::FlexError;
use crate::number::{parse_head, parse_value, NumHead};

const FLAG_ID: u8 = 0b1000_0000;
const FLAG_PATH: u8 = 0b0100_0000;
const FLAG_SID: u8 = 0b0010_0000;
const FLAG_CODE: u8 = 0b0001_0000;
const FLAG_MSG: u8 = 0b0000_1000;
const FLAG_BODY: u8 = 0b0000_0100;
const FLAG_NUM_PATH: u8 = 0b0000_0010;
const FLAG_EXTENSION: u8 = 0b0000_0001;

/// One flex request/response tuple. Every field is optional on the wire;
/// an absent field keeps its default here. `path` and `num_path` are
/// mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub id: u32,
    pub path: String,
    pub num_path: u32,
    pub sid: String,
    pub code: i32,
    pub message: String,
    pub body: Bytes,
}

impl Packet {
    /// A client-side request packet; pass `id: None` to draw a fresh
    /// correlation id from the process-wide counter.
    pub fn new(path: impl Into<String>, body: Bytes, sid: impl Into<String>, id: Option<u32>) -> Self {
        Packet {
            id: id.unwrap_or_else(next_request_id),
            path: path.into(),
            sid: sid.into(),
            body,
            ..Packet::default()
        }
    }

    /// Like [`Packet::new`] but addressed by numeric path.
    pub fn with_num_path(num_path: u32, body: Bytes, sid: impl Into<String>, id: Option<u32>) -> Self {
        Packet {
            id: id.unwrap_or_else(next_request_id),
            num_path,
            sid: sid.into(),
            body,
            ..Packet::default()
        }
    }

    /// Serializes the packet: flag byte, flex-num heads, flex-num bodies,
    /// then the text fields and the payload.
    pub fn encode(&self) -> Bytes {
        let mut flag = 0u8;
        let mut heads: Vec<NumHead> = Vec::with_capacity(7);
        let mut texts: Vec<&[u8]> = Vec::with_capacity(4);
        if !self.path.is_empty() {
            flag |= FLAG_PATH;
            heads.push(NumHead::non_zero_len(self.path.len() as u64));
            texts.push(self.path.as_bytes());
        }
        if !self.sid.is_empty() {
            flag |= FLAG_SID;
            heads.push(NumHead::non_zero_len(self.sid.len() as u64));
            texts.push(self.sid.as_bytes());
        }
        if !self.message.is_empty() {
            flag |= FLAG_MSG;
            heads.push(NumHead::non_zero_len(self.message.len() as u64));
            texts.push(self.message.as_bytes());
        }
        if !self.body.is_empty() {
            flag |= FLAG_BODY;
            heads.push(NumHead::non_zero_len(self.body.len() as u64));
            texts.push(&self.body);
        }
        if self.id > 0 {
            flag |= FLAG_ID;
            heads.push(NumHead::non_zero_len(u64::from(self.id)));
        }
        if self.code != 0 {
            flag |= FLAG_CODE;
            heads.push(NumHead::int(i64::from(self.code)));
        }
        if self.num_path > 0 {
            flag |= FLAG_NUM_PATH;
            heads.push(NumHead::non_zero_len(u64::from(self.num_path)));
        }

        let text_len: usize = texts.iter().map(|t| t.len()).sum();
        let head_len: usize = heads.iter().map(NumHead::encoded_len).sum();
        let mut buf = BytesMut::with_capacity(1 + head_len + text_len);
        buf.put_u8(flag);
        for head in &heads {
            buf.put_u8(head.head);
        }
        for head in &heads {
            head.write_body(&mut buf);
        }
        for text in texts {
            buf.put_slice(text);
        }
        buf.freeze()
    }

    /// Attempts to decode one packet from the front of `buf`. Returns
    /// `Ok(None)` when the buffered bytes do not yet hold a complete
    /// packet; nothing is consumed in that case.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Packet>, FlexError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let flag = buf[0];
        if flag & FLAG_EXTENSION != 0 {
            return Err(FlexError::FlagOverflow);
        }
        let head_count = flag.count_ones() as usize;
        if buf.len() < 1 + head_count {
            return Ok(None);
        }

        // First pass: the heads give every flex-num's body size.
        let heads: Vec<_> = buf[1..1 + head_count]
            .iter()
            .map(|&h| parse_head(h, true))
            .collect();
        let num_len: usize = heads.iter().map(|h| h.bytes_len as usize).sum();
        if buf.len() < 1 + head_count + num_len {
            return Ok(None);
        }

        // Second pass: materialize the numbers in head order.
        let mut unsigneds = Vec::with_capacity(head_count);
        let mut signeds = Vec::with_capacity(head_count);
        let mut at = 1 + head_count;
        for head in &heads {
            let body = &buf[at..at + head.bytes_len as usize];
            at += head.bytes_len as usize;
            unsigneds.push(parse_value(head.original_bits, body));
            let magnitude = parse_value(head.unsigned_bits, body) as i64;
            signeds.push(if head.negative { magnitude.wrapping_neg() } else { magnitude });
        }

        // Field assignment follows the serialization order: path, sid,
        // message and body lengths first, then id, code, numeric path.
        let mut index = 0;
        let mut next = |signed: bool| {
            let value = if signed { signeds[index] as u64 } else { unsigneds[index].wrapping_add(1) };
            index += 1;
            value
        };
        let path_len = if flag & FLAG_PATH > 0 { next(false) } else { 0 };
        let sid_len = if flag & FLAG_SID > 0 { next(false) } else { 0 };
        let msg_len = if flag & FLAG_MSG > 0 { next(false) } else { 0 };
        let body_len = if flag & FLAG_BODY > 0 { next(false) } else { 0 };
        let id = if flag & FLAG_ID > 0 { next(false) as u32 } else { 0 };
        let code = if flag & FLAG_CODE > 0 { next(true) as i32 } else { 0 };
        let num_path = if flag & FLAG_NUM_PATH > 0 { next(false) as u32 } else { 0 };

        // Widened sum: declared lengths are attacker-controlled.
        let text_len = [path_len, sid_len, msg_len, body_len]
            .iter()
            .map(|&n| n as u128)
            .sum::<u128>();
        if (buf.len() as u128) < at as u128 + text_len {
            return Ok(None);
        }
        buf.advance(at);
        let path = String::from_utf8(buf.split_to(path_len as usize).to_vec())?;
        let sid = String::from_utf8(buf.split_to(sid_len as usize).to_vec())?;
        let message = String::from_utf8(buf.split_to(msg_len as usize).to_vec())?;
        let body = buf.split_to(body_len as usize).freeze();

        Ok(Some(Packet { id, path, num_path, sid, code, message, body }))
    }
}

/// Reads one packet from an async byte stream, buffering through `buf`.
/// Returns `Ok(None)` on a clean end of stream between packets.
pub async fn read_packet<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
) -> Result<Option<Packet>, FlexError> {
    loop {
        if let Some(packet) = Packet::decode(buf)? {
            return Ok(Some(packet));
        }
        if reader.read_buf(buf).await? == 0 {
            return if buf.is_empty() { Ok(None) } else { Err(FlexError::UnexpectedEof) };
        }
    }
}

static REQUEST_ID: AtomicU32 = AtomicU32::new(0);

/// Allocates the next request correlation id, skipping zero on wrap.
pub fn next_request_id() -> u32 {
    loop {
        let id = REQUEST_ID.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if id != 0 {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_packet_is_one_flag_byte() {
        let packet = Packet::default();
        let encoded = packet.encode();
        assert_eq!(encoded.as_ref(), &[0u8]);
        let mut buf = BytesMut::from(encoded.as_ref());
        assert_eq!(Packet::decode(&mut buf).unwrap(), Some(packet));
    }

    #[test]
    fn full_packet_round_trips() {
        let packet = Packet {
            id: 77,
            path: "member/detail".into(),
            num_path: 0,
            sid: "A".repeat(76),
            code: -404,
            message: "not found".into(),
            body: Bytes::from_static(b"hello world"),
        };
        let mut buf = BytesMut::from(packet.encode().as_ref());
        assert_eq!(Packet::decode(&mut buf).unwrap(), Some(packet));
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_input_returns_none_without_consuming() {
        let packet = Packet::new("home", Bytes::from_static(b"payload"), "", Some(9));
        let encoded = packet.encode();
        for cut in 0..encoded.len() {
            let mut buf = BytesMut::from(&encoded[..cut]);
            let before = buf.len();
            assert_eq!(Packet::decode(&mut buf).unwrap(), None, "cut at {cut}");
            assert_eq!(buf.len(), before);
        }
    }

    #[test]
    fn extension_flag_is_rejected() {
        let mut buf = BytesMut::from(&[0b0000_0001u8][..]);
        assert!(matches!(Packet::decode(&mut buf), Err(FlexError::FlagOverflow)));
    }

    #[test]
    fn request_ids_are_never_zero() {
        for _ in 0..100 {
            assert_ne!(next_request_id(), 0);
        }
    }

    #[test]
    fn two_packets_decode_in_sequence() {
        let first = Packet::new("a", Bytes::from_static(b"1"), "", Some(1));
        let second = Packet::with_num_path(42, Bytes::new(), "", Some(2));
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&first.encode());
        buf.extend_from_slice(&second.encode());
        assert_eq!(Packet::decode(&mut buf).unwrap(), Some(first));
        assert_eq!(Packet::decode(&mut buf).unwrap(), Some(second));
        assert!(buf.is_empty());
    }
}
