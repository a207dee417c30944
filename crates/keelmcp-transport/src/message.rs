//! The unit a transport carries: one serialized JSON-RPC message.

use bytes::Bytes;

/// A serialized JSON-RPC message in flight.
#[derive(Debug, Clone, Default)]
pub struct TransportMessage {
    /// UTF-8 JSON payload, unframed
    pub payload: Bytes,
}

impl TransportMessage {
    /// Wrap an already-serialized payload.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Build from a JSON string.
    pub fn from_json(json: String) -> Self {
        Self {
            payload: Bytes::from(json),
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// The payload as UTF-8, when valid.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

impl From<String> for TransportMessage {
    fn from(json: String) -> Self {
        Self::from_json(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trip() {
        let m = TransportMessage::from_json(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#.into());
        assert_eq!(m.size(), 40);
        assert!(m.as_str().unwrap().contains("ping"));
    }
}
