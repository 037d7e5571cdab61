use super::record::{require_text, EntityData};
use crate::domain::value_objects::EntityType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisasterReport {
    pub disaster_id: String,
    pub reporter_id: Option<String>,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub reported_at: i64,
}

impl EntityData for DisasterReport {
    const ENTITY_TYPE: EntityType = EntityType::DisasterReport;

    fn disaster_id(&self) -> Option<&str> {
        Some(&self.disaster_id)
    }

    fn validate(&self) -> Result<(), String> {
        require_text("disasterId", &self.disaster_id)?;
        require_text("title", &self.title)?;
        require_text("severity", &self.severity)
    }
}
