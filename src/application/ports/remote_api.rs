use crate::domain::value_objects::{ConflictKind, EntityType, OutboxOperation};
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// REST backend as seen by the sync core. Payloads are entity JSON objects;
/// responses may be wrapped as `{"data": {...}}`.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create(&self, entity_type: EntityType, body: Value) -> Result<Value, RemoteError>;
    async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        body: Value,
    ) -> Result<Value, RemoteError>;
    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), RemoteError>;
    /// `Ok(None)` when the server has no such record.
    async fn fetch(&self, entity_type: EntityType, id: &str) -> Result<Option<Value>, RemoteError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Request timed out")]
    Timeout,
    #[error("Connectivity error: {0}")]
    Connectivity(String),
    #[error("Server responded with {code}: {body}")]
    Status { code: u16, body: String },
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// How a failed replay should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient; retried automatically with backoff.
    Retryable,
    /// The server refused the payload; needs correction by the user.
    Validation,
    /// Remote state diverged; needs manual resolution.
    Conflict(ConflictKind),
}

impl FailureClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureClass::Retryable)
    }

    pub fn conflict(&self) -> Option<ConflictKind> {
        match self {
            FailureClass::Conflict(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl RemoteError {
    pub fn classify(&self, operation: OutboxOperation) -> FailureClass {
        match self {
            RemoteError::Timeout | RemoteError::Connectivity(_) => FailureClass::Retryable,
            RemoteError::Malformed(_) => FailureClass::Validation,
            RemoteError::Status { code, .. } => match *code {
                408 | 429 => FailureClass::Retryable,
                500..=599 => FailureClass::Retryable,
                409 => FailureClass::Conflict(ConflictKind::Rejected),
                404 if operation != OutboxOperation::Create => {
                    FailureClass::Conflict(ConflictKind::RemoteMissing)
                }
                _ => FailureClass::Validation,
            },
        }
    }
}

/// Validated acknowledgement of a successful replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAck {
    /// Server-assigned id. Always present for CREATE.
    pub server_id: Option<String>,
    /// Fields of the returned entity, envelope removed. Empty for DELETE and
    /// for an UPDATE answered without a body.
    pub fields: Map<String, Value>,
}

impl RemoteAck {
    pub fn decode(operation: OutboxOperation, payload: Value) -> Result<Self, RemoteError> {
        if operation == OutboxOperation::Delete {
            return Ok(Self {
                server_id: None,
                fields: Map::new(),
            });
        }

        let object = match payload {
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Object(inner)) => inner,
                Some(other) => {
                    map.insert("data".to_string(), other);
                    map
                }
                None => map,
            },
            Value::Null if operation == OutboxOperation::Update => Map::new(),
            other => {
                return Err(RemoteError::Malformed(format!(
                    "expected JSON object, got {other}"
                )));
            }
        };

        let server_id = match object.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(RemoteError::Malformed(format!("invalid id {other}")));
            }
        };

        if operation == OutboxOperation::Create && server_id.is_none() {
            return Err(RemoteError::Malformed(
                "create response carries no id".to_string(),
            ));
        }

        Ok(Self {
            server_id,
            fields: object,
        })
    }
}
