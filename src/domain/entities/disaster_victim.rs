use super::record::{require_text, EntityData};
use crate::domain::value_objects::EntityType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisasterVictim {
    pub disaster_id: String,
    pub name: String,
    /// National identity number.
    pub nik: Option<String>,
    pub condition: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub notes: Option<String>,
}

impl EntityData for DisasterVictim {
    const ENTITY_TYPE: EntityType = EntityType::DisasterVictim;

    fn disaster_id(&self) -> Option<&str> {
        Some(&self.disaster_id)
    }

    fn validate(&self) -> Result<(), String> {
        require_text("disasterId", &self.disaster_id)?;
        require_text("name", &self.name)?;
        require_text("condition", &self.condition)?;
        if let Some(nik) = &self.nik {
            if nik.is_empty() || !nik.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!("nik must contain digits only: {nik}"));
            }
        }
        Ok(())
    }
}
