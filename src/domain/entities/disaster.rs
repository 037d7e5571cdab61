use super::record::{require_text, EntityData};
use crate::domain::value_objects::EntityType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disaster {
    pub title: String,
    pub description: String,
    pub disaster_type: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: String,
    pub occurred_at: i64,
}

impl EntityData for Disaster {
    const ENTITY_TYPE: EntityType = EntityType::Disaster;

    fn validate(&self) -> Result<(), String> {
        require_text("title", &self.title)?;
        require_text("disasterType", &self.disaster_type)?;
        require_text("status", &self.status)?;
        if let Some(latitude) = self.latitude {
            if !(-90.0..=90.0).contains(&latitude) {
                return Err(format!("latitude out of range: {latitude}"));
            }
        }
        if let Some(longitude) = self.longitude {
            if !(-180.0..=180.0).contains(&longitude) {
                return Err(format!("longitude out of range: {longitude}"));
            }
        }
        Ok(())
    }
}
