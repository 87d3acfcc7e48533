//! Marshalling seam for distributed knowledge backends.
//!
//! The in-process path never marshals; values move as [`serde_json::Value`]
//! clones. A backend that replicates roots across physical nodes encodes
//! values through this trait and owns the rest of its wire protocol itself.

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MarshalError {
    #[error("failed to encode knowledge value")]
    #[diagnostic(code(murmuration::marshal::encode))]
    Encode {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode knowledge value")]
    #[diagnostic(code(murmuration::marshal::decode))]
    Decode {
        #[source]
        source: serde_json::Error,
    },
}

/// Opaque value ↔ bytes conversion.
pub trait Marshaller: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, MarshalError>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, MarshalError>;
}

/// JSON wire encoding, the default.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonMarshaller;

impl Marshaller for JsonMarshaller {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, MarshalError> {
        serde_json::to_vec(value).map_err(|source| MarshalError::Encode { source })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, MarshalError> {
        serde_json::from_slice(bytes).map_err(|source| MarshalError::Decode { source })
    }
}
