use super::record::{require_text, EntityData};
use crate::domain::value_objects::EntityType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisasterAid {
    pub disaster_id: String,
    pub aid_type: String,
    pub quantity: u32,
    pub unit: String,
    pub recipient: Option<String>,
    pub distributed_at: Option<i64>,
}

impl EntityData for DisasterAid {
    const ENTITY_TYPE: EntityType = EntityType::DisasterAid;

    fn disaster_id(&self) -> Option<&str> {
        Some(&self.disaster_id)
    }

    fn validate(&self) -> Result<(), String> {
        require_text("disasterId", &self.disaster_id)?;
        require_text("aidType", &self.aid_type)?;
        require_text("unit", &self.unit)?;
        if self.quantity == 0 {
            return Err("quantity must be greater than 0".to_string());
        }
        Ok(())
    }
}
