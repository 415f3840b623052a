use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub relationship: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReminder {
    pub id: String,
    pub medication: String,
    /// Local time of day, "HH:MM"
    pub time: String,
    pub frequency: String,
    /// Set once by the controller; never cleared
    pub taken: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PensionInfo {
    pub next_payment: String,
    pub amount: String,
    pub last_payment: String,
    pub status: String,
    /// Day of the month the pension is deposited
    pub deposit_day: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelpStatus {
    Pending,
    Connected,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpRequest {
    pub id: Uuid,
    /// What the user needs help with, e.g. "Consulta general"
    pub topic: String,
    pub status: HelpStatus,
    /// Volunteer assigned once connected
    pub volunteer: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HelpRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            status: HelpStatus::Pending,
            volunteer: None,
            created_at: Utc::now(),
        }
    }
}

/// Top-level screens of the interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Communication,
    Health,
    Pension,
    Help,
}

/// A call the user confirmed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub contact_id: String,
    pub contact_name: String,
    pub placed_at: DateTime<Utc>,
}
