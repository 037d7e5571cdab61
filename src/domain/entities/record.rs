use super::SyncMetadata;
use crate::domain::value_objects::{EntityType, SyncStatus};
use crate::shared::error::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Domain fields of a server-owned entity.
pub trait EntityData: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const ENTITY_TYPE: EntityType;

    /// Parent disaster, for entities that hang off one.
    fn disaster_id(&self) -> Option<&str> {
        None
    }

    fn validate(&self) -> Result<(), String>;
}

/// A typed record: domain fields plus sync metadata, flattened into one JSON
/// object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    #[serde(flatten)]
    pub meta: SyncMetadata,
    #[serde(flatten)]
    pub data: T,
}

/// Untyped form of a record as persisted by the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub entity_type: EntityType,
    pub meta: SyncMetadata,
    pub disaster_id: Option<String>,
    pub data: Value,
}

impl StoredRecord {
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn status(&self) -> SyncStatus {
        self.meta.sync_status
    }

    /// A string field of the domain data, if present.
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// The server's copy of this record after a replayed write: `fields`
    /// from the response laid over the local data, then validated like any
    /// remote payload. Fields the server leaves out keep their local values.
    pub fn with_server_fields(
        &self,
        server_id: &str,
        fields: Map<String, Value>,
        now: i64,
    ) -> Result<StoredRecord, String> {
        let mut merged = match &self.data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        merged.insert("createdAt".to_string(), Value::from(self.meta.created_at));
        merged.insert("updatedAt".to_string(), Value::from(self.meta.updated_at));
        merged.extend(fields);
        merged.insert("id".to_string(), Value::String(server_id.to_string()));

        let mut copy = decode_remote_stored(self.entity_type, Value::Object(merged), now)?;
        copy.meta.local_id = self.meta.local_id.clone();
        Ok(copy)
    }
}

impl<T: EntityData> Record<T> {
    pub fn new_local(data: T, now: i64) -> Self {
        Self {
            meta: SyncMetadata::new_local(now),
            data,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn status(&self) -> SyncStatus {
        self.meta.sync_status
    }

    pub fn into_stored(self) -> Result<StoredRecord, AppError> {
        let disaster_id = self.data.disaster_id().map(str::to_string);
        let data = serde_json::to_value(&self.data)
            .map_err(|err| AppError::SerializationError(err.to_string()))?;
        Ok(StoredRecord {
            entity_type: T::ENTITY_TYPE,
            meta: self.meta,
            disaster_id,
            data,
        })
    }

    pub fn try_from_stored(stored: StoredRecord) -> Result<Self, AppError> {
        if stored.entity_type != T::ENTITY_TYPE {
            return Err(AppError::InvalidInput(format!(
                "Expected {} record, found {}",
                T::ENTITY_TYPE,
                stored.entity_type
            )));
        }
        let data = serde_json::from_value::<T>(stored.data)
            .map_err(|err| AppError::DeserializationError(err.to_string()))?;
        Ok(Self {
            meta: stored.meta,
            data,
        })
    }
}

/// Validating decode of a server payload into a typed, synced record.
///
/// Accepts either a bare object or one wrapped as `{"data": {...}}`. The
/// object must carry a non-empty `id` (string or number); `createdAt` and
/// `updatedAt` default to `now`.
pub fn decode_remote<T: EntityData>(payload: Value, now: i64) -> Result<Record<T>, String> {
    let object = unwrap_object(payload)?;
    let id = read_id(&object)?;
    let created_at = object
        .get("createdAt")
        .and_then(Value::as_i64)
        .unwrap_or(now);
    let updated_at = object
        .get("updatedAt")
        .and_then(Value::as_i64)
        .unwrap_or(created_at);

    let data = serde_json::from_value::<T>(Value::Object(object))
        .map_err(|err| format!("Malformed {} payload: {err}", T::ENTITY_TYPE))?;
    data.validate()
        .map_err(|err| format!("Invalid {} payload: {err}", T::ENTITY_TYPE))?;

    Ok(Record {
        meta: SyncMetadata::from_remote(id, created_at, updated_at, now),
        data,
    })
}

/// Untyped counterpart of [`decode_remote`], dispatching on `entity_type`.
pub fn decode_remote_stored(
    entity_type: EntityType,
    payload: Value,
    now: i64,
) -> Result<StoredRecord, String> {
    use super::{
        Disaster, DisasterAid, DisasterReport, DisasterVictim, DisasterVolunteer, Notification,
        Picture, User,
    };

    fn stored<T: EntityData>(payload: Value, now: i64) -> Result<StoredRecord, String> {
        decode_remote::<T>(payload, now)?
            .into_stored()
            .map_err(|err| err.to_string())
    }

    match entity_type {
        EntityType::User => stored::<User>(payload, now),
        EntityType::Disaster => stored::<Disaster>(payload, now),
        EntityType::DisasterReport => stored::<DisasterReport>(payload, now),
        EntityType::DisasterVictim => stored::<DisasterVictim>(payload, now),
        EntityType::DisasterAid => stored::<DisasterAid>(payload, now),
        EntityType::DisasterVolunteer => stored::<DisasterVolunteer>(payload, now),
        EntityType::Picture => stored::<Picture>(payload, now),
        EntityType::Notification => stored::<Notification>(payload, now),
    }
}

fn unwrap_object(payload: Value) -> Result<Map<String, Value>, String> {
    match payload {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Object(inner)) => Ok(inner),
            Some(other) => {
                map.insert("data".to_string(), other);
                Ok(map)
            }
            None => Ok(map),
        },
        Value::Null => Err("Empty response payload".to_string()),
        other => Err(format!("Expected JSON object, got {other}")),
    }
}

fn read_id(object: &Map<String, Value>) -> Result<String, String> {
    match object.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        Some(_) => Err("Payload id must be a non-empty string or number".to_string()),
        None => Err("Payload is missing an id".to_string()),
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    Ok(())
}
