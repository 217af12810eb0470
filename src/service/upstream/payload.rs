use std::sync::Arc;

use bytes::Bytes;

use crate::error::VisitError;
use crate::models::{PayloadConfig, PayloadMode};
use crate::utils::protobuf::encode_varint_field;

/// Builds the request body for a target. Called once per batch; the same
/// bytes are reused for every visit in it.
pub trait PayloadEncoder: Send + Sync {
    fn encode(&self, target_id: u64) -> Result<Bytes, VisitError>;
}

/// Plain protobuf message: `id_field` = target id, followed by fixed varint
/// trailer fields.
pub struct ProtobufIdPayload {
    id_field: u32,
    trailer_fields: Vec<(u32, u64)>,
}

impl ProtobufIdPayload {
    pub fn new(id_field: u32, trailer_fields: Vec<(u32, u64)>) -> Self {
        Self {
            id_field,
            trailer_fields,
        }
    }
}

impl PayloadEncoder for ProtobufIdPayload {
    fn encode(&self, target_id: u64) -> Result<Bytes, VisitError> {
        if self.id_field == 0 {
            return Err(VisitError::Encoding("field number 0 is reserved".to_string()));
        }
        let mut out = Vec::with_capacity(16);
        encode_varint_field(self.id_field, target_id, &mut out);
        for (field, value) in &self.trailer_fields {
            encode_varint_field(*field, *value, &mut out);
        }
        Ok(Bytes::from(out))
    }
}

/// Ciphertext produced outside this service, supplied as hex and sent as-is.
pub struct ExternalHexPayload {
    hex: String,
}

impl ExternalHexPayload {
    pub fn new(hex: impl Into<String>) -> Self {
        Self { hex: hex.into() }
    }
}

impl PayloadEncoder for ExternalHexPayload {
    fn encode(&self, _target_id: u64) -> Result<Bytes, VisitError> {
        let trimmed = self.hex.trim();
        if trimmed.is_empty() {
            return Err(VisitError::Encoding("empty ciphertext".to_string()));
        }
        hex::decode(trimmed)
            .map(Bytes::from)
            .map_err(|e| VisitError::Encoding(format!("invalid hex ciphertext: {}", e)))
    }
}

pub fn encoder_from_config(config: &PayloadConfig) -> Arc<dyn PayloadEncoder> {
    match config.mode {
        PayloadMode::Protobuf => Arc::new(ProtobufIdPayload::new(
            config.id_field,
            config.trailer_fields.clone(),
        )),
        PayloadMode::Hex => Arc::new(ExternalHexPayload::new(config.hex.clone())),
    }
}
