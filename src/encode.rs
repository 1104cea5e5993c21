use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ServeError;
use crate::resource::ResourceStore;

/// JSON payload carrying a whole resource as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedPayload {
    pub file_name: String,
    pub base64: String,
}

impl EncodedPayload {
    /// Decodes the payload back into raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.base64)
    }
}

/// Reads the resource `id` fully and encodes it as base64.
///
/// The resource is held in memory twice, once raw and once encoded, so this
/// is only suitable for resources far smaller than available memory. Large
/// resources should be served through the streaming endpoints instead.
pub async fn encode(
    store: &dyn ResourceStore,
    id: &str,
    file_name: &str,
) -> Result<EncodedPayload, ServeError> {
    if store.describe(id).await?.is_none() {
        return Err(ServeError::NotFound(id.to_string()));
    }

    let raw = store.read_all(id).await.map_err(|e| match e {
        ServeError::Io(source) => ServeError::Encoding { id: id.to_string(), source },
        other => other,
    })?;

    tracing::debug!(id, bytes = raw.len(), "encoding resource as base64");
    Ok(EncodedPayload {
        file_name: file_name.to_string(),
        base64: STANDARD.encode(&raw),
    })
}
