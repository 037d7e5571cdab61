use super::record::{require_text, EntityData};
use crate::domain::value_objects::EntityType;
use serde::{Deserialize, Serialize};

/// Assignment of a volunteer to a disaster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisasterVolunteer {
    pub disaster_id: String,
    pub user_id: String,
    pub role: String,
    pub status: String,
}

impl EntityData for DisasterVolunteer {
    const ENTITY_TYPE: EntityType = EntityType::DisasterVolunteer;

    fn disaster_id(&self) -> Option<&str> {
        Some(&self.disaster_id)
    }

    fn validate(&self) -> Result<(), String> {
        require_text("disasterId", &self.disaster_id)?;
        require_text("userId", &self.user_id)?;
        require_text("role", &self.role)
    }
}
