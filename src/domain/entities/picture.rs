use super::record::{require_text, EntityData};
use crate::domain::value_objects::EntityType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Picture {
    pub disaster_id: String,
    /// Id of the file in the device image store.
    pub image_id: String,
    pub caption: Option<String>,
    pub mime_type: String,
    pub remote_url: Option<String>,
}

impl EntityData for Picture {
    const ENTITY_TYPE: EntityType = EntityType::Picture;

    fn disaster_id(&self) -> Option<&str> {
        Some(&self.disaster_id)
    }

    fn validate(&self) -> Result<(), String> {
        require_text("disasterId", &self.disaster_id)?;
        require_text("imageId", &self.image_id)?;
        if !self.mime_type.starts_with("image/") {
            return Err(format!("unsupported mime type: {}", self.mime_type));
        }
        Ok(())
    }
}
