//! Content blocks carried by tool results, prompts and sampling.

use serde::{Deserialize, Serialize};

use super::core::{Base64String, MimeType, Uri};

/// A block of content, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text
    Text {
        /// The text payload
        text: String,
    },
    /// Base64-encoded image data
    Image {
        /// Base64 payload
        data: Base64String,
        /// Image MIME type
        #[serde(rename = "mimeType")]
        mime_type: MimeType,
    },
    /// Base64-encoded audio data
    Audio {
        /// Base64 payload
        data: Base64String,
        /// Audio MIME type
        #[serde(rename = "mimeType")]
        mime_type: MimeType,
    },
    /// An embedded resource
    Resource {
        /// The resource contents
        resource: ResourceContents,
    },
}

impl Content {
    /// Text content from anything stringy.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Image content from base64 data and a MIME type.
    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// The text payload, if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Resource contents: text or binary, always addressed by URI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResourceContents {
    /// Text resource
    Text {
        /// Resource URI
        uri: Uri,
        /// MIME type, when known
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<MimeType>,
        /// The text
        text: String,
    },
    /// Binary resource, base64-encoded
    Blob {
        /// Resource URI
        uri: Uri,
        /// MIME type, when known
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<MimeType>,
        /// Base64 payload
        blob: Base64String,
    },
}

impl ResourceContents {
    /// Text contents for a URI.
    pub fn text(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text {
            uri: uri.into(),
            mime_type: None,
            text: text.into(),
        }
    }

    /// Binary contents for a URI, base64-encoding the bytes.
    pub fn blob(uri: impl Into<String>, bytes: &[u8], mime_type: impl Into<String>) -> Self {
        use base64::Engine as _;
        Self::Blob {
            uri: uri.into(),
            mime_type: Some(mime_type.into()),
            blob: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// The URI this content belongs to.
    pub fn uri(&self) -> &str {
        match self {
            Self::Text { uri, .. } | Self::Blob { uri, .. } => uri,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_content_wire_shape() {
        let c = Content::text("5");
        assert_eq!(
            serde_json::to_value(&c).unwrap(),
            json!({"type": "text", "text": "5"})
        );
    }

    #[test]
    fn image_content_wire_shape() {
        let c = Content::image("aGk=", "image/png");
        assert_eq!(
            serde_json::to_value(&c).unwrap(),
            json!({"type": "image", "data": "aGk=", "mimeType": "image/png"})
        );
    }

    #[test]
    fn blob_encodes_base64() {
        let contents = ResourceContents::blob("file://x", b"hi", "application/octet-stream");
        match &contents {
            ResourceContents::Blob { blob, .. } => assert_eq!(blob, "aGk="),
            other => panic!("expected blob, got {other:?}"),
        }
    }

    #[test]
    fn resource_contents_distinguish_text_and_blob() {
        let text: ResourceContents =
            serde_json::from_value(json!({"uri": "u://1", "text": "hello"})).unwrap();
        assert!(matches!(text, ResourceContents::Text { .. }));

        let blob: ResourceContents =
            serde_json::from_value(json!({"uri": "u://1", "blob": "aGk="})).unwrap();
        assert!(matches!(blob, ResourceContents::Blob { .. }));
    }
}
