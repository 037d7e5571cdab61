use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    User,
    Disaster,
    DisasterReport,
    DisasterVictim,
    DisasterAid,
    DisasterVolunteer,
    Picture,
    Notification,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        EntityType::User,
        EntityType::Disaster,
        EntityType::DisasterReport,
        EntityType::DisasterVictim,
        EntityType::DisasterAid,
        EntityType::DisasterVolunteer,
        EntityType::Picture,
        EntityType::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Disaster => "disaster",
            EntityType::DisasterReport => "disaster_report",
            EntityType::DisasterVictim => "disaster_victim",
            EntityType::DisasterAid => "disaster_aid",
            EntityType::DisasterVolunteer => "disaster_volunteer",
            EntityType::Picture => "picture",
            EntityType::Notification => "notification",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|entity_type| entity_type.as_str() == value)
            .ok_or_else(|| format!("Unknown entity type: {value}"))
    }

    /// REST collection segment for this entity type.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityType::User => "users",
            EntityType::Disaster => "disasters",
            EntityType::DisasterReport => "disaster-reports",
            EntityType::DisasterVictim => "disaster-victims",
            EntityType::DisasterAid => "disaster-aids",
            EntityType::DisasterVolunteer => "disaster-volunteers",
            EntityType::Picture => "pictures",
            EntityType::Notification => "notifications",
        }
    }

    /// Reconciliation tier. Lower tiers are replayed first so children see
    /// their parent's server id.
    pub fn tier(&self) -> u8 {
        match self {
            EntityType::User | EntityType::Disaster => 0,
            EntityType::DisasterReport
            | EntityType::DisasterVictim
            | EntityType::DisasterAid
            | EntityType::DisasterVolunteer
            | EntityType::Picture
            | EntityType::Notification => 1,
        }
    }

    pub fn has_disaster_parent(&self) -> bool {
        matches!(
            self,
            EntityType::DisasterReport
                | EntityType::DisasterVictim
                | EntityType::DisasterAid
                | EntityType::DisasterVolunteer
                | EntityType::Picture
        )
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
