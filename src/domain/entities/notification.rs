use super::record::{require_text, EntityData};
use crate::domain::value_objects::EntityType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: Option<String>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub read: bool,
}

impl EntityData for Notification {
    const ENTITY_TYPE: EntityType = EntityType::Notification;

    fn validate(&self) -> Result<(), String> {
        require_text("title", &self.title)
    }
}
