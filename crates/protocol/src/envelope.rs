use serde::{Deserialize, Serialize};

use crate::constants::OpKind;

/// Error details carried in a worker reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("worker error {code}: {message}")]
pub struct WorkerError {
    pub code: i32,
    pub message: String,
}

impl WorkerError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns `true` if the error is worth retrying.
    ///
    /// Only genuine infrastructure failures qualify. 507 (insufficient
    /// storage) is 5xx-shaped but a hard rejection the remote repeats on
    /// every attempt, so it stays permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self.code, 500 | 502 | 503 | 504)
    }
}

/// Request frame sent from the engine to the worker.
///
/// Serialized as `{"id": n, "type": "...", ...payload fields}` — the
/// operation payload is spread into the top-level object, matching the
/// worker's dispatch contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    #[serde(rename = "type")]
    pub op: OpKind,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl RequestFrame {
    /// Creates a request frame, spreading `payload`'s fields into the frame.
    ///
    /// `payload` must serialize to a JSON object (or unit, for payload-less
    /// ops such as `exit`).
    pub fn new<T: Serialize>(
        id: u64,
        op: OpKind,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        let payload = match serde_json::to_value(payload)? {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(serde::ser::Error::custom(format!(
                    "request payload must be a JSON object, got {other}"
                )));
            }
        };
        Ok(Self { id, op, payload })
    }

    /// Deserializes the spread payload fields into the given type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.payload.clone()))
    }
}

/// Reply frame sent from the worker to the engine, correlated by `id`.
///
/// Exactly one of `response` / `err` is set. `response` uses
/// [`serde_json::value::RawValue`] to defer deserialization until the caller
/// that owns the matching continuation asks for its concrete type.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Box<serde_json::value::RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<WorkerError>,
}

impl ReplyFrame {
    /// Creates a success reply.
    pub fn ok<T: Serialize>(id: u64, response: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(response)?;
        Ok(Self {
            id,
            response: Some(serde_json::value::RawValue::from_string(json)?),
            err: None,
        })
    }

    /// Creates an error reply.
    pub fn error(id: u64, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            response: None,
            err: Some(WorkerError::new(code, message)),
        }
    }

    /// Deserializes the response into the given type.
    pub fn parse_response<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        match &self.response {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }
}

/// Kinds of unsolicited worker-originated events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// The worker finished initializing and accepts requests.
    #[serde(rename = "ready")]
    Ready,
    /// Chunk-level progress computed on the worker side.
    #[serde(rename = "chunkProgress")]
    ChunkProgress,
    #[serde(other)]
    Unknown,
}

/// Unsolicited event frame sent from the worker (no correlation id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl EventFrame {
    pub fn ready() -> Self {
        Self {
            kind: EventKind::Ready,
            data: None,
        }
    }
}

/// Any frame the engine can receive from the worker.
///
/// Distinguished structurally: replies carry `id`, events carry `type`.
/// Parsed in two steps rather than via an untagged derive because
/// `RawValue` payloads cannot round-trip through serde's internal
/// buffering.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum InboundFrame {
    Reply(ReplyFrame),
    Event(EventFrame),
}

impl InboundFrame {
    /// Parses a frame, trying the reply shape first.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<ReplyFrame>(text) {
            Ok(reply) => Ok(Self::Reply(reply)),
            Err(_) => Ok(Self::Event(serde_json::from_str::<EventFrame>(text)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct SamplePayload {
        uuid: String,
        index: u64,
    }

    #[test]
    fn request_frame_spreads_payload() {
        let payload = SamplePayload {
            uuid: "f-1".into(),
            index: 3,
        };
        let frame = RequestFrame::new(7, OpKind::EncryptAndUploadChunk, &payload).unwrap();
        let json = serde_json::to_string(&frame).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["id"], 7);
        assert_eq!(value["type"], "encryptAndUploadChunk");
        assert_eq!(value["uuid"], "f-1");
        assert_eq!(value["index"], 3);
    }

    #[test]
    fn request_frame_unit_payload() {
        let frame = RequestFrame::new(1, OpKind::Shutdown, &()).unwrap();
        assert!(frame.payload.is_empty());
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"id":1,"type":"exit"}"#);
    }

    #[test]
    fn request_frame_rejects_non_object_payload() {
        assert!(RequestFrame::new(1, OpKind::HashData, &42u32).is_err());
    }

    #[test]
    fn request_frame_payload_roundtrip() {
        let payload = SamplePayload {
            uuid: "f-2".into(),
            index: 0,
        };
        let frame = RequestFrame::new(9, OpKind::DownloadAndDecryptChunk, &payload).unwrap();
        let json = serde_json::to_string(&frame).unwrap();
        let parsed: RequestFrame = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, 9);
        assert_eq!(parsed.op, OpKind::DownloadAndDecryptChunk);
        assert_eq!(parsed.parse_payload::<SamplePayload>().unwrap(), payload);
    }

    #[test]
    fn reply_frame_ok_roundtrip() {
        let payload = SamplePayload {
            uuid: "f-3".into(),
            index: 12,
        };
        let reply = ReplyFrame::ok(42, &payload).unwrap();
        let json = serde_json::to_string(&reply).unwrap();
        assert!(!json.contains("err"));

        let parsed: ReplyFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, 42);
        assert_eq!(
            parsed.parse_response::<SamplePayload>().unwrap().unwrap(),
            payload
        );
    }

    #[test]
    fn reply_frame_error() {
        let reply = ReplyFrame::error(5, 507, "insufficient storage");
        let json = serde_json::to_string(&reply).unwrap();
        assert!(!json.contains("response"));

        let parsed: ReplyFrame = serde_json::from_str(&json).unwrap();
        let err = parsed.err.unwrap();
        assert_eq!(err.code, 507);
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_classification() {
        assert!(WorkerError::new(500, "internal").is_transient());
        assert!(WorkerError::new(503, "unavailable").is_transient());
        assert!(WorkerError::new(504, "timeout").is_transient());
        assert!(!WorkerError::new(507, "insufficient storage").is_transient());
        assert!(!WorkerError::new(400, "bad request").is_transient());
        assert!(!WorkerError::new(401, "invalid key").is_transient());
        assert!(!WorkerError::new(404, "not found").is_transient());
    }

    #[test]
    fn inbound_frame_distinguishes_reply_from_event() {
        let reply = InboundFrame::parse(r#"{"id":1,"response":{"ok":true}}"#).unwrap();
        match reply {
            InboundFrame::Reply(r) => {
                assert_eq!(r.id, 1);
                assert!(r.response.is_some());
            }
            other => panic!("expected reply, got {other:?}"),
        }

        let event = InboundFrame::parse(r#"{"type":"ready"}"#).unwrap();
        match event {
            InboundFrame::Event(e) => assert_eq!(e.kind, EventKind::Ready),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_kind_is_tolerated() {
        let event = InboundFrame::parse(r#"{"type":"futureEvent","data":{"x":1}}"#).unwrap();
        match event {
            InboundFrame::Event(e) => assert_eq!(e.kind, EventKind::Unknown),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn garbage_frame_is_an_error() {
        assert!(InboundFrame::parse("not json {{{").is_err());
        assert!(InboundFrame::parse(r#"{"neither":"shape"}"#).is_err());
    }
}
