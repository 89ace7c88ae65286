//! NIP-01 wire frames
//!
//! Client-to-relay frames are JSON arrays: `["REQ", sub_id, filter]`,
//! `["EVENT", event]`, `["CLOSE", sub_id]`. Relay-to-client frames are
//! `["EVENT", sub_id, event]`, `["OK", event_id, accepted, message]`,
//! `["EOSE", sub_id]` and `["NOTICE", message]`.

use serde_json::{json, Value};

use crate::event::Event;
use crate::relay::RelayError;

/// Build a REQ frame subscribing to a topic tag with a backlog limit
pub fn req(sub_id: &str, topic: &str, limit: u32) -> Result<String, RelayError> {
    let frame = json!([
        "REQ",
        sub_id,
        {
            "#t": [topic],
            "limit": limit,
        }
    ]);
    serde_json::to_string(&frame).map_err(|e| RelayError::Malformed(e.to_string()))
}

/// Build an EVENT frame carrying a signed event
pub fn publish(event: &Event) -> Result<String, RelayError> {
    let event_value =
        serde_json::to_value(event).map_err(|e| RelayError::Malformed(e.to_string()))?;
    let frame = Value::Array(vec![Value::String("EVENT".into()), event_value]);
    serde_json::to_string(&frame).map_err(|e| RelayError::Malformed(e.to_string()))
}

/// Build a CLOSE frame for a subscription
pub fn close(sub_id: &str) -> Result<String, RelayError> {
    serde_json::to_string(&json!(["CLOSE", sub_id]))
        .map_err(|e| RelayError::Malformed(e.to_string()))
}

/// A parsed relay-to-client frame
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event { sub_id: String, event: Event },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Eose { sub_id: String },
    Notice { message: String },
    /// Frame types this daemon does not act on
    Unknown,
}

/// Parse a relay-to-client frame
pub fn parse(text: &str) -> Result<RelayMessage, RelayError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| RelayError::Malformed(e.to_string()))?;
    let Some(items) = value.as_array() else {
        return Err(RelayError::Malformed("frame is not an array".into()));
    };
    let Some(kind) = items.first().and_then(Value::as_str) else {
        return Err(RelayError::Malformed("frame has no type marker".into()));
    };

    match kind {
        "EVENT" => {
            let (Some(sub_id), Some(event_value)) =
                (items.get(1).and_then(Value::as_str), items.get(2))
            else {
                return Err(RelayError::Malformed("EVENT frame too short".into()));
            };
            let event: Event = serde_json::from_value(event_value.clone())
                .map_err(|e| RelayError::Malformed(format!("bad event payload: {e}")))?;
            Ok(RelayMessage::Event {
                sub_id: sub_id.to_string(),
                event,
            })
        }
        "OK" => {
            let (Some(event_id), Some(accepted)) = (
                items.get(1).and_then(Value::as_str),
                items.get(2).and_then(Value::as_bool),
            ) else {
                return Err(RelayError::Malformed("OK frame too short".into()));
            };
            let message = items
                .get(3)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(RelayMessage::Ok {
                event_id: event_id.to_string(),
                accepted,
                message,
            })
        }
        "EOSE" => {
            let sub_id = items
                .get(1)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(RelayMessage::Eose { sub_id })
        }
        "NOTICE" => {
            let message = items
                .get(1)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(RelayMessage::Notice { message })
        }
        _ => Ok(RelayMessage::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            id: hex::encode([1u8; 32]),
            pubkey: hex::encode([2u8; 32]),
            created_at: 1_700_000_000,
            kind: 1,
            tags: vec![vec!["t".into(), "prediction".into()]],
            content: "hello".into(),
            sig: hex::encode([3u8; 64]),
        }
    }

    #[test]
    fn test_req_frame_shape() {
        let frame = req("sub-1", "prediction", 1).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value[0], "REQ");
        assert_eq!(value[1], "sub-1");
        assert_eq!(value[2]["#t"][0], "prediction");
        assert_eq!(value[2]["limit"], 1);
    }

    #[test]
    fn test_publish_frame_roundtrips_event() {
        let event = sample_event();
        let frame = publish(&event).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value[0], "EVENT");
        let parsed: Event = serde_json::from_value(value[1].clone()).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_parse_event_frame() {
        let event = sample_event();
        let frame = format!(
            r#"["EVENT","sub-1",{}]"#,
            serde_json::to_string(&event).unwrap()
        );
        match parse(&frame).unwrap() {
            RelayMessage::Event { sub_id, event: e } => {
                assert_eq!(sub_id, "sub-1");
                assert_eq!(e, event);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_ok_frames() {
        let ok = parse(r#"["OK","abcd",true,""]"#).unwrap();
        assert_eq!(
            ok,
            RelayMessage::Ok {
                event_id: "abcd".into(),
                accepted: true,
                message: String::new(),
            }
        );

        let rejected = parse(r#"["OK","abcd",false,"blocked: rate limited"]"#).unwrap();
        assert_eq!(
            rejected,
            RelayMessage::Ok {
                event_id: "abcd".into(),
                accepted: false,
                message: "blocked: rate limited".into(),
            }
        );
    }

    #[test]
    fn test_parse_eose_and_notice() {
        assert_eq!(
            parse(r#"["EOSE","sub-1"]"#).unwrap(),
            RelayMessage::Eose {
                sub_id: "sub-1".into()
            }
        );
        assert_eq!(
            parse(r#"["NOTICE","slow down"]"#).unwrap(),
            RelayMessage::Notice {
                message: "slow down".into()
            }
        );
    }

    #[test]
    fn test_parse_unknown_frame() {
        assert_eq!(parse(r#"["AUTH","challenge"]"#).unwrap(), RelayMessage::Unknown);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("not json").is_err());
        assert!(parse(r#"{"type":"EVENT"}"#).is_err());
        assert!(parse(r#"["EVENT","sub-1"]"#).is_err());
        assert!(parse(r#"["OK","abcd"]"#).is_err());
    }
}
