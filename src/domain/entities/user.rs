use super::record::{require_text, EntityData};
use crate::domain::value_objects::EntityType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
}

impl EntityData for User {
    const ENTITY_TYPE: EntityType = EntityType::User;

    fn validate(&self) -> Result<(), String> {
        require_text("name", &self.name)?;
        require_text("role", &self.role)?;
        if !self.email.contains('@') {
            return Err(format!("invalid email: {}", self.email));
        }
        Ok(())
    }
}
