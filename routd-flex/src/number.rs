//! Flexible-length integer encoding and decoding ("flex-num").
//!
//! A flex-num is a head byte followed by zero or more big-endian body
//! bytes. The head's leading 1-bits, terminated by a 0-bit, give the body
//! length; the bits after the terminator hold the top of the magnitude
//! (and, for signed numbers, a sign bit):
//!
//! ```text
//! |0|S|B|B|B|B|B|B|                                  0 body bytes
//! |1|0|S|B|B|B|B|B| B×8                              1 body byte
//! |1|1|0|S|B|B|B|B| B×16                             2 body bytes
//! |1|1|1|0|S|B|B|B| B×24                             3 body bytes
//! |1|1|1|1|0|S|B|B| B×32                             4 body bytes
//! |1|1|1|1|1|0|S|B| B×40                             5 body bytes
//! |1|1|1|1|1|1|0|S| B×64                             8 body bytes (long form)
//! |1|1|1|1|1|1|1|0|                                  reserved
//! |1|1|1|1|1|1|1|1|                                  reserved
//! ```
//!
//! `S` is the sign bit of the signed variants (absent for unsigned, where
//! that position holds one more magnitude bit). Anything needing more
//! than 5 body bytes jumps straight to the 8-byte long form, whose sign
//! sits in the head's lowest bit.
//!
//! The non-zero-length variant encodes `value − 1`, letting a length of
//! up to 128 fit in a single byte; the subtraction wraps, so a zero
//! length survives the round trip as well.

use bytes::{Buf, BufMut};

use crate::error::FlexError;

/// A packed flex-num: the head byte plus the pending big-endian body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumHead {
    pub head: u8,
    pub bytes_len: u8,
    value: u64,
}

impl NumHead {
    /// Packs an unsigned value.
    pub fn uint(value: u64) -> Self {
        let bits_len = (64 - value.leading_zeros()) as u8;
        let (head, bytes_len) = pack_head(value, bits_len);
        NumHead { head, bytes_len, value }
    }

    /// Packs a signed value: one extra bit is reserved for the sign,
    /// which lands in the head at a position depending on the body size.
    pub fn int(value: i64) -> Self {
        let magnitude = value.unsigned_abs();
        let bits_len = (64 - magnitude.leading_zeros()) as u8 + 1;
        let (mut head, bytes_len) = pack_head(magnitude, bits_len);
        if value < 0 {
            head |= if bytes_len < 7 { 1 << (6 - bytes_len) } else { 1 };
        }
        NumHead { head, bytes_len, value: magnitude }
    }

    /// Packs a counter that is always ≥ 1 as `value − 1`, saving a bit.
    /// The subtraction wraps so a zero still round-trips.
    pub fn non_zero_len(value: u64) -> Self {
        Self::uint(value.wrapping_sub(1))
    }

    /// Appends the `bytes_len` big-endian body bytes.
    pub fn write_body(&self, buf: &mut impl BufMut) {
        for i in (0..self.bytes_len).rev() {
            buf.put_u8((self.value >> (u32::from(i) * 8)) as u8);
        }
    }

    /// Appends the head byte followed by the body.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.head);
        self.write_body(buf);
    }

    /// Total encoded size in bytes (head included, at most 9).
    pub fn encoded_len(&self) -> usize {
        1 + self.bytes_len as usize
    }
}

fn pack_head(value: u64, bits_len: u8) -> (u8, u8) {
    let mut bytes_len = bits_len / 8;
    let mut head_shift = 8 - bytes_len;
    let mut head_bits = 0u8;
    if bytes_len > 5 {
        // Anything wider than 5 body bytes takes the 8-byte long form.
        bytes_len = 8;
        head_shift = 2;
    } else if bits_len % 8 > 7 - bytes_len {
        // The residual bits don't fit in the space the head prefix
        // leaves, so grow the body by one byte and store no bits in the
        // head at all.
        bytes_len += 1;
        head_shift -= 1;
        if bytes_len > 5 {
            // A six-byte body would share its head pattern with the long
            // form, so pad the body out to the long form's eight bytes.
            bytes_len = 8;
        }
    } else {
        head_bits = (value >> (u32::from(bytes_len) * 8)) as u8;
    }
    let mask = ((0xFFu16 << head_shift) & 0xFF) as u8;
    (mask | head_bits, bytes_len)
}

/// The decoded interpretation of a flex-num head byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHead {
    /// Number of body bytes following the head.
    pub bytes_len: u8,
    /// Sign bit (always false when parsed unsigned).
    pub negative: bool,
    /// Head magnitude bits under the signed interpretation.
    pub unsigned_bits: u8,
    /// Head magnitude bits under the unsigned interpretation.
    pub original_bits: u8,
}

/// Scans the head byte's leading 1-bits to find the terminator zero and
/// extract the magnitude (and optional sign) bits.
pub fn parse_head(head: u8, signed: bool) -> ParsedHead {
    let mut bytes_len = 0u8;
    let mut original_bits = 0u8;
    for i in 0..8u8 {
        if (128 >> i) & head == 0 {
            bytes_len = i;
            if bytes_len > 5 {
                bytes_len = 8;
                original_bits = head & 1;
            } else {
                original_bits = (127 >> bytes_len) & head;
            }
            break;
        }
    }
    let mut negative = false;
    let mut unsigned_bits = original_bits;
    if signed {
        if bytes_len == 8 {
            negative = head & 1 == 1;
        } else {
            negative = (64 >> bytes_len) & head > 0;
            let sign_shift = u8::from(negative);
            unsigned_bits = (127 >> bytes_len >> sign_shift) & head;
        }
    }
    ParsedHead { bytes_len, negative, unsigned_bits, original_bits }
}

/// Combines the head magnitude bits with the big-endian body bytes.
pub fn parse_value(head_bits: u8, body: &[u8]) -> u64 {
    let mut value = u64::from(head_bits);
    for &byte in body {
        value = (value << 8) | u64::from(byte);
    }
    value
}

pub fn put_uint(value: u64, buf: &mut impl BufMut) {
    NumHead::uint(value).encode(buf);
}

pub fn put_int(value: i64, buf: &mut impl BufMut) {
    NumHead::int(value).encode(buf);
}

pub fn put_non_zero_len(value: u64, buf: &mut impl BufMut) {
    NumHead::non_zero_len(value).encode(buf);
}

fn get_body(buf: &mut impl Buf, bytes_len: u8) -> Result<[u8; 8], FlexError> {
    if buf.remaining() < bytes_len as usize {
        return Err(FlexError::UnexpectedEof);
    }
    let mut body = [0u8; 8];
    buf.copy_to_slice(&mut body[..bytes_len as usize]);
    Ok(body)
}

pub fn get_uint(buf: &mut impl Buf) -> Result<u64, FlexError> {
    if !buf.has_remaining() {
        return Err(FlexError::UnexpectedEof);
    }
    let parsed = parse_head(buf.get_u8(), false);
    let body = get_body(buf, parsed.bytes_len)?;
    Ok(parse_value(parsed.original_bits, &body[..parsed.bytes_len as usize]))
}

pub fn get_int(buf: &mut impl Buf) -> Result<i64, FlexError> {
    if !buf.has_remaining() {
        return Err(FlexError::UnexpectedEof);
    }
    let parsed = parse_head(buf.get_u8(), true);
    let body = get_body(buf, parsed.bytes_len)?;
    let magnitude = parse_value(parsed.unsigned_bits, &body[..parsed.bytes_len as usize]);
    // wrapping_neg keeps i64::MIN (magnitude 2^63) round-tripping.
    Ok(if parsed.negative { (magnitude as i64).wrapping_neg() } else { magnitude as i64 })
}

pub fn get_non_zero_len(buf: &mut impl Buf) -> Result<u64, FlexError> {
    Ok(get_uint(buf)?.wrapping_add(1))
}
