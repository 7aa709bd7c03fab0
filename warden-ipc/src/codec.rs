//! Wire encoding of a single control message

use crate::error::IpcError;
use crate::protocol::{
    is_control_byte, Message, Record, ENQUIRY, GROUP_SEPARATOR, RECORD_SEPARATOR, UNIT_SEPARATOR,
};

/// Decode one complete frame, including its trailing group separator.
///
/// Returns whether the sender waits for a continuation signal, together with
/// the decoded message.
pub fn decode(frame: &[u8]) -> Result<(bool, Message), IpcError> {
    let Some((&last, body)) = frame.split_last() else {
        return Err(IpcError::Framing("empty frame".to_string()));
    };
    if last != GROUP_SEPARATOR {
        return Err(IpcError::Framing(
            "frame does not end with a group separator".to_string(),
        ));
    }

    let (is_blocking, body) = match body.split_last() {
        Some((&ENQUIRY, rest)) => (true, rest),
        _ => (false, body),
    };

    if body.is_empty() {
        return Err(IpcError::Framing("message has no records".to_string()));
    }

    let text = std::str::from_utf8(body)
        .map_err(|e| IpcError::Framing(format!("message is not valid UTF-8: {}", e)))?;

    if text.contains(GROUP_SEPARATOR as char) {
        return Err(IpcError::Framing(
            "group separator inside message body".to_string(),
        ));
    }

    let records = text
        .split(RECORD_SEPARATOR as char)
        .map(|record| {
            Record::from_units(
                record
                    .split(UNIT_SEPARATOR as char)
                    .map(str::to_string)
                    .collect(),
            )
        })
        .collect();

    let message = Message {
        records,
        blocking: is_blocking,
        origin: None,
    };
    Ok((is_blocking, message))
}

/// Encode a message into a complete frame.
///
/// The engine is the only production sender; this exists so both directions
/// of the codec can be exercised against each other.
pub fn encode(message: &Message) -> Result<Vec<u8>, IpcError> {
    if message.records.is_empty() {
        return Err(IpcError::Framing("message has no records".to_string()));
    }

    let mut frame = Vec::new();
    for (i, record) in message.records.iter().enumerate() {
        if i > 0 {
            frame.push(RECORD_SEPARATOR);
        }
        let units = record.units();
        if let Record::Composite(_) = record {
            if units.len() < 2 {
                return Err(IpcError::InvalidMessage(format!(
                    "composite record needs at least two units, got {}",
                    units.len()
                )));
            }
        }
        for (j, unit) in units.iter().enumerate() {
            if unit.bytes().any(is_control_byte) {
                return Err(IpcError::InvalidMessage(format!(
                    "unit {:?} contains a control character",
                    unit
                )));
            }
            if j > 0 {
                frame.push(UNIT_SEPARATOR);
            }
            frame.extend_from_slice(unit.as_bytes());
        }
    }

    if frame.is_empty() {
        return Err(IpcError::Framing("message body is empty".to_string()));
    }

    if message.blocking {
        frame.push(ENQUIRY);
    }
    frame.push(GROUP_SEPARATOR);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_scalar_records() {
        let (blocking, msg) = decode(b"output\x1ea.out\x1d").unwrap();
        assert!(!blocking);
        assert!(!msg.blocking);
        assert_eq!(msg.records, vec![Record::from("output"), Record::from("a.out")]);
        assert_eq!(msg.origin, None);
    }

    #[test]
    fn test_decode_composite_record() {
        let (_, msg) = decode(b"energy\x1e1.5\x1fkeV\x1d").unwrap();
        assert_eq!(
            msg.records,
            vec![Record::from("energy"), Record::from(["1.5", "keV"])]
        );
    }

    #[test]
    fn test_decode_blocking() {
        let (blocking, msg) = decode(b"ping\x05\x1d").unwrap();
        assert!(blocking);
        assert!(msg.blocking);
        assert_eq!(msg.records, vec![Record::from("ping")]);
    }

    #[test]
    fn test_decode_rejects_empty_body() {
        assert!(matches!(decode(b"\x1d"), Err(IpcError::Framing(_))));
        assert!(matches!(decode(b"\x05\x1d"), Err(IpcError::Framing(_))));
        assert!(matches!(decode(b""), Err(IpcError::Framing(_))));
    }

    #[test]
    fn test_decode_rejects_missing_terminator() {
        assert!(matches!(decode(b"output\x1ea.out"), Err(IpcError::Framing(_))));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        assert!(matches!(decode(b"out\xff\x1d"), Err(IpcError::Framing(_))));
    }

    #[test]
    fn test_decode_keeps_multibyte_text() {
        let (_, msg) = decode("détecteur\x1eµs\x1d".as_bytes()).unwrap();
        assert_eq!(msg.records, vec![Record::from("détecteur"), Record::from("µs")]);
    }

    #[test]
    fn test_decode_empty_units_are_kept() {
        let (_, msg) = decode(b"key\x1e\x1d").unwrap();
        assert_eq!(msg.records, vec![Record::from("key"), Record::from("")]);
    }

    #[test]
    fn test_encode_matches_wire_format() {
        let msg = Message::blocking(vec![Record::from("energy"), Record::from(["1.5", "keV"])]);
        assert_eq!(encode(&msg).unwrap(), b"energy\x1e1.5\x1fkeV\x05\x1d".to_vec());
    }

    #[test]
    fn test_encode_rejects_control_characters() {
        let msg = Message::new(vec![Record::from("bad\x1dvalue")]);
        assert!(matches!(encode(&msg), Err(IpcError::InvalidMessage(_))));
    }

    #[test]
    fn test_encode_rejects_empty_message() {
        assert!(matches!(encode(&Message::new(vec![])), Err(IpcError::Framing(_))));
    }

    #[test]
    fn test_encode_rejects_empty_body() {
        let lone_empty = Message::new(vec![Record::from("")]);
        assert!(matches!(encode(&lone_empty), Err(IpcError::Framing(_))));
        let blocking = Message::blocking(vec![Record::from("")]);
        assert!(matches!(encode(&blocking), Err(IpcError::Framing(_))));

        // an empty unit next to others is fine
        let msg = Message::new(vec![Record::from("key"), Record::from("")]);
        let (_, decoded) = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_encode_rejects_short_composite() {
        let single = Message::new(vec![Record::Composite(vec!["a".to_string()])]);
        assert!(matches!(encode(&single), Err(IpcError::InvalidMessage(_))));
        let none = Message::new(vec![Record::from("key"), Record::Composite(Vec::new())]);
        assert!(matches!(encode(&none), Err(IpcError::InvalidMessage(_))));

        let pair = Message::new(vec![Record::from(["", ""])]);
        let (_, decoded) = decode(&encode(&pair).unwrap()).unwrap();
        assert_eq!(decoded, pair);
    }
}
