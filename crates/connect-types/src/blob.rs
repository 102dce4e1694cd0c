use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque reference to externally stored media.
///
/// Either a URL the blob store already serves, or raw bytes that have not
/// been uploaded anywhere yet. Bytes travel as base64 on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum BlobHandle {
    Url(String),
    Bytes(#[serde(with = "b64")] Bytes),
}

impl BlobHandle {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// URL usable for direct display. Inline bytes become a `data:` URL.
    pub fn direct_url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Bytes(bytes) => format!("data:application/octet-stream;base64,{}", B64.encode(bytes)),
        }
    }

    pub fn inline_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Url(_) => None,
        }
    }
}

mod b64 {
    use super::B64;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(d)?;
        B64.decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
