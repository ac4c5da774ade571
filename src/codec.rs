//! Framed wire codec shared by the control socket and the outbox worker.
//!
//! Wire format, little-endian throughout:
//!
//! ```text
//! u8      message type tag
//! u8      nargs
//! repeat nargs times:
//!     u32 arg_len
//!     arg_len bytes of arg data
//! ```
//!
//! `decode` never mutates its input; it reports how many leading bytes were
//! consumed so the caller can drain its own buffer. This lets both the
//! outbox worker (buffering from a blocking pipe read) and tests (feeding
//! bytes in arbitrary chunks) share one decode routine.

use crate::message::{Message, MessageKind};

const HEADER_LEN: usize = 2;
const LEN_FIELD_BYTES: usize = 4;

/// Outcome of attempting to decode one message from the front of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A full message was decoded; consumes `consumed` bytes from the front.
    Message { message: Message, consumed: usize },
    /// Not enough bytes buffered yet to decode a full message.
    Incomplete,
    /// The buffer starts with bytes that cannot form a valid message ever
    /// (currently unreachable for any `(tag, nargs)` pair, since nargs and
    /// arg lengths are unconstrained bytes/u32s - kept for forward
    /// compatibility with a future bounded-nargs or bounded-length rule).
    Malformed,
}

/// Encodes `message` onto the end of `out`.
pub fn encode(message: &Message, out: &mut Vec<u8>) {
    out.push(message.kind.to_tag());
    out.push(message.args.len() as u8);
    for arg in &message.args {
        out.extend_from_slice(&(arg.len() as u32).to_le_bytes());
        out.extend_from_slice(arg);
    }
}

/// Attempts to decode one message from the front of `buf` without mutating
/// it. The caller is responsible for draining `consumed` bytes from the
/// front of its own buffer on `Decoded::Message`.
pub fn decode(buf: &[u8]) -> Decoded {
    if buf.len() < HEADER_LEN {
        return Decoded::Incomplete;
    }
    let tag = buf[0];
    let nargs = buf[1] as usize;

    let mut cursor = HEADER_LEN;
    let mut args = Vec::with_capacity(nargs);
    for _ in 0..nargs {
        if buf.len() < cursor + LEN_FIELD_BYTES {
            return Decoded::Incomplete;
        }
        let len_bytes: [u8; 4] = buf[cursor..cursor + LEN_FIELD_BYTES]
            .try_into()
            .expect("slice is exactly 4 bytes");
        let arg_len = u32::from_le_bytes(len_bytes) as usize;
        cursor += LEN_FIELD_BYTES;

        if buf.len() < cursor + arg_len {
            return Decoded::Incomplete;
        }
        args.push(buf[cursor..cursor + arg_len].to_vec());
        cursor += arg_len;
    }

    Decoded::Message {
        message: Message::new(MessageKind::from_tag(tag), args),
        consumed: cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: Message) {
        let mut buf = Vec::new();
        encode(&message, &mut buf);
        match decode(&buf) {
            Decoded::Message { message: decoded, consumed } => {
                assert_eq!(consumed, buf.len());
                assert_eq!(decoded, message);
            }
            other => panic!("expected a full decode, got {other:?}"),
        }
    }

    #[test]
    fn roundtrips_no_args() {
        roundtrip(Message::new(MessageKind::InputPoll, vec![]));
    }

    #[test]
    fn roundtrips_multiple_args() {
        roundtrip(Message::new(
            MessageKind::InputEval,
            vec![b"1 + 1".to_vec(), b"".to_vec(), b"trailing".to_vec()],
        ));
    }

    #[test]
    fn roundtrips_unknown_tag() {
        roundtrip(Message::new(MessageKind::from_tag(200), vec![b"x".to_vec()]));
    }

    #[test]
    fn empty_buffer_is_incomplete() {
        assert_eq!(decode(&[]), Decoded::Incomplete);
    }

    #[test]
    fn header_only_is_incomplete() {
        assert_eq!(decode(&[MessageKind::InputPoll.to_tag(), 1]), Decoded::Incomplete);
    }

    #[test]
    fn truncated_arg_length_is_incomplete() {
        let buf = [MessageKind::InputPoll.to_tag(), 1, 0, 0];
        assert_eq!(decode(&buf), Decoded::Incomplete);
    }

    #[test]
    fn truncated_arg_body_is_incomplete() {
        let mut buf = vec![MessageKind::InputPoll.to_tag(), 1];
        buf.extend_from_slice(&10u32.to_le_bytes());
        buf.extend_from_slice(b"short");
        assert_eq!(decode(&buf), Decoded::Incomplete);
    }

    #[test]
    fn decodes_prefix_and_reports_consumed_for_resumption() {
        let mut buf = Vec::new();
        encode(&Message::new(MessageKind::OutputReady, vec![]), &mut buf);
        let first_len = buf.len();
        encode(&Message::new(MessageKind::OutputOther, vec![b"hi".to_vec()]), &mut buf);

        match decode(&buf) {
            Decoded::Message { message, consumed } => {
                assert_eq!(consumed, first_len);
                assert_eq!(message.kind, MessageKind::OutputReady);
                let remainder = &buf[consumed..];
                match decode(remainder) {
                    Decoded::Message { message, consumed } => {
                        assert_eq!(consumed, remainder.len());
                        assert_eq!(message.kind, MessageKind::OutputOther);
                    }
                    other => panic!("expected second message, got {other:?}"),
                }
            }
            other => panic!("expected first message, got {other:?}"),
        }
    }
}
