//! Flexible-length binary framing codec ("flex").
//!
//! A compact, self-describing wire format for request/response tuples
//! carried over stream and datagram transports. A packet is a flag byte
//! followed by flex-num heads, flex-num bodies, then the variable-length
//! text fields and the payload:
//!
//! ```text
//!  0               1               .               .               .
//!  0 1 2 3 4 5 6 7 0 . . . . . . . . . . . . . . . . . . . . . . . .
//! +-+-+-+-+-+-+-+-+- - - - - - - - - - - - - - - - - - - - - - - - |
//! |I|P|S|C|M|L|N|R| LEN of| LEN of| LEN of| LEN of|  ID   |  CODE |
//! |D|A|I|O|S|O|P|S| Path  | Sid   | Msg   |  Body |FlexNum|FlexNum|
//! |E|T|D|D|G|A|A|V|FlexNum|FlexNum|FlexNum|FlexNum| HEAD  | HEAD  |
//! |N|H| |E| |D|T| | HEAD  | HEAD  | HEAD  | HEAD  |       |       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+ - - - - - - - - - - - - - - - |
//! | FlexNum BODYs (same order) | Path | Sid | Msg | Body Data ... |
//! +-+-------------+-+-------------+-+-------------+---------------+
//! ```
//!
//! The first byte is a bit-flag set (an empty packet if none is set):
//! IDEN = request id, PATH = request path, SID = session id, CODE = error
//! code, MSG = error message, LOAD = payload, NPAT = numeric path, RSV =
//! reserved for flag extension. Every present field contributes one
//! flex-num head; all heads precede all bodies so the fixed-size prefix
//! of a packet can be read in two passes.
//!
//! The flex-num integer itself stores small values in one byte and grows
//! to a 9-byte long form; see [`number`] for the bit layout.

pub mod error;
pub mod number;
pub mod packet;
pub mod stream;

pub use error::FlexError;
pub use number::{
    get_int, get_non_zero_len, get_uint, parse_head, parse_value, put_int, put_non_zero_len,
    put_uint, NumHead, ParsedHead,
};
pub use packet::{next_request_id, read_packet, Packet};
pub use stream::{stream_pack, stream_read, stream_unpack};
