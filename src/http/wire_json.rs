//! Converts between `Message` and the `[type, arg, arg, ...]` JSON array
//! shape exchanged with the browser. This is the only place in the crate
//! that knows about that shape; the framed wire protocol (`crate::codec`)
//! and this JSON shape are deliberately kept as two separate encodings
//! even though they carry the same `Message` type, matching the boundary
//! the original draws between the control-socket protocol and the
//! browser-facing JSON request/response bodies.

use serde_json::Value;

use crate::message::{Message, MessageKind};

pub fn encode_messages(messages: &[Message]) -> String {
    let array: Vec<Value> = messages.iter().map(to_json).collect();
    Value::Array(array).to_string()
}

pub fn decode_messages(raw: &str) -> Vec<Message> {
    let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(raw) else {
        return Vec::new();
    };
    entries.iter().filter_map(from_json).collect()
}

fn to_json(message: &Message) -> Value {
    let mut array = vec![Value::from(message.kind.to_tag())];
    for arg in &message.args {
        array.push(Value::from(String::from_utf8_lossy(arg).into_owned()));
    }
    Value::Array(array)
}

fn from_json(value: &Value) -> Option<Message> {
    let entries = value.as_array()?;
    let (tag, args) = entries.split_first()?;
    let tag = tag.as_u64()? as u8;
    let args = args
        .iter()
        .map(|arg| arg.as_str().unwrap_or_default().as_bytes().to_vec())
        .collect();
    Some(Message::new(MessageKind::from_tag(tag), args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let messages = vec![
            Message::new(MessageKind::InputEval, vec![b"1 + 1".to_vec()]),
            Message::new(MessageKind::OutputReady, vec![]),
        ];
        let encoded = encode_messages(&messages);
        let decoded = decode_messages(&encoded);
        assert_eq!(decoded, messages);
    }

    #[test]
    fn decodes_browser_shaped_array() {
        let decoded = decode_messages(r#"[[3,"1+1"],[2]]"#);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].kind, MessageKind::InputEval);
        assert_eq!(decoded[0].arg_str(0), Some("1+1"));
        assert_eq!(decoded[1].kind, MessageKind::InputPoll);
    }

    #[test]
    fn malformed_json_decodes_to_no_messages() {
        assert!(decode_messages("not json").is_empty());
        assert!(decode_messages("{}").is_empty());
    }

    #[test]
    fn empty_entry_is_skipped() {
        assert!(decode_messages("[[]]").is_empty());
    }
}
