use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A record with a fixed schema name and version
pub trait Versioned: Serialize + DeserializeOwned {
    const TYPE_NAME: &'static str;
    const VERSION: &'static str;
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Type mismatch: expected {expected}, got {found}")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("Unsupported version {found} for {type_name} (expected {expected})")]
    VersionMismatch {
        type_name: &'static str,
        expected: &'static str,
        found: String,
    },
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Wire wrapper carrying the schema name and version next to the payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope<T> {
    pub type_name: String,
    pub version: String,
    pub payload: T,
}

impl<T: Versioned> Envelope<T> {
    pub fn seal(payload: T) -> Self {
        Self {
            type_name: T::TYPE_NAME.to_string(),
            version: T::VERSION.to_string(),
            payload,
        }
    }

    /// Check the schema tag and hand out the payload
    pub fn open(self) -> Result<T, EnvelopeError> {
        if self.type_name != T::TYPE_NAME {
            return Err(EnvelopeError::TypeMismatch {
                expected: T::TYPE_NAME,
                found: self.type_name,
            });
        }
        if self.version != T::VERSION {
            return Err(EnvelopeError::VersionMismatch {
                type_name: T::TYPE_NAME,
                expected: T::VERSION,
                found: self.version,
            });
        }
        Ok(self.payload)
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<T, EnvelopeError> {
        let envelope: Envelope<T> = serde_json::from_str(s)?;
        envelope.open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    impl Versioned for Ping {
        const TYPE_NAME: &'static str = "ping";
        const VERSION: &'static str = "002";
    }

    #[test]
    fn test_open_sealed_envelope() {
        let json = Envelope::seal(Ping { seq: 7 }).to_json().unwrap();
        assert!(json.contains("\"TypeName\":\"ping\""));
        assert_eq!(Envelope::<Ping>::from_json(&json).unwrap(), Ping { seq: 7 });
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let json = r#"{"TypeName":"ping","Version":"001","Payload":{"seq":1}}"#;
        let err = Envelope::<Ping>::from_json(json).unwrap_err();
        assert!(matches!(err, EnvelopeError::VersionMismatch { .. }));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let json = r#"{"TypeName":"pong","Version":"002","Payload":{"seq":1}}"#;
        let err = Envelope::<Ping>::from_json(json).unwrap_err();
        assert!(matches!(err, EnvelopeError::TypeMismatch { .. }));
    }
}
