//! Persisted provider sessions
//!
//! A session is a flat JSON object carrying at least `type` and `id`. Every
//! adapter describes its own keys with a serde struct; unknown keys are ignored
//! and missing optional keys default, so records written by older releases
//! keep loading.

use md5::{Digest, Md5};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::types::{ProviderError, ProviderType};

/// Receives sessions that changed outside an explicit `serialize` call
/// (token refresh). The registry persists them.
pub trait SessionSink: Send + Sync {
    fn session_updated(&self, id: &str, raw: &str);
}

/// Stable session id: hex md5 of the concatenated parts
pub fn session_id(parts: &[&str]) -> String {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn encode<T: Serialize>(session: &T) -> Result<String, ProviderError> {
    serde_json::to_string(session).map_err(|e| ProviderError::ParseError(format!("Failed to encode session: {}", e)))
}

pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, ProviderError> {
    serde_json::from_str(raw).map_err(|e| ProviderError::ParseError(format!("Invalid session: {}", e)))
}

#[derive(Deserialize)]
struct SessionHeader {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
}

/// Read the `type` tag of a stored session without decoding the rest
pub fn peek_type(raw: &str) -> Result<ProviderType, ProviderError> {
    let header: SessionHeader = decode(raw)?;
    ProviderType::from_tag(&header.kind)
}

/// Read the `id` of a stored session
pub fn peek_id(raw: &str) -> Result<Option<String>, ProviderError> {
    let header: SessionHeader = decode(raw)?;
    Ok(header.id)
}
