use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BusError;

/// One discrete unit on the bus: a JSON metadata map plus optional binary
/// blobs (image frames).
///
/// On the wire blobs are base64 strings so the whole envelope stays JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    /// Topic (publish) or service name (request) the message is addressed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "blob_base64")]
    pub blobs: Vec<Vec<u8>>,
}

impl BusMessage {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            topic: None,
            data,
            blobs: Vec::new(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_blob(mut self, blob: Vec<u8>) -> Self {
        self.blobs.push(blob);
        self
    }

    pub fn to_frame(&self) -> Result<Vec<u8>, BusError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_frame(frame: &[u8]) -> Result<Self, BusError> {
        Ok(serde_json::from_slice(frame)?)
    }
}

mod blob_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(blobs: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(blobs.len()))?;
        for blob in blobs {
            seq.serialize_element(&base64::engine::general_purpose::STANDARD.encode(blob))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|s| {
                base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blobs_travel_as_base64_strings() {
        let msg = BusMessage::default()
            .with_topic("ImageStore")
            .with_blob(vec![0xff, 0xd8, 0xff]);
        let wire: Value = serde_json::from_slice(&msg.to_frame().unwrap()).unwrap();
        assert_eq!(wire["blobs"], json!(["/9j/"]));
        assert_eq!(BusMessage::from_frame(&msg.to_frame().unwrap()).unwrap(), msg);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let msg = BusMessage::from_frame(br#"{"data":{"a":1}}"#).unwrap();
        assert_eq!(msg.topic, None);
        assert!(msg.blobs.is_empty());
        assert_eq!(msg.data["a"], json!(1));
    }

    #[test]
    fn rejects_non_base64_blob() {
        let err = BusMessage::from_frame(br#"{"data":{},"blobs":["***"]}"#).unwrap_err();
        assert!(matches!(err, BusError::Envelope(_)));
    }
}
