// Domain types for the BlockBuzz discovery backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Behavioral signal recorded against an event. Each carries a fixed
/// engagement weight applied once per recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    View,
    Save,
    Register,
    Attended,
}

impl InteractionType {
    pub fn weight(&self) -> f64 {
        match self {
            InteractionType::View => 0.1,
            InteractionType::Save => 0.4,
            InteractionType::Register => 0.7,
            InteractionType::Attended => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::View => "VIEW",
            InteractionType::Save => "SAVE",
            InteractionType::Register => "REGISTER",
            InteractionType::Attended => "ATTENDED",
        }
    }
}

/// One ledger row per (user, event, type); repeated actions bump `cnt`.
#[derive(Debug, Clone, Serialize)]
pub struct Interaction {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub kind: InteractionType,
    pub cnt: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub engagement_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Organizer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub verified: bool,
    pub total_events: i64,
    pub host_score: f64,
    pub trust_score: f64,
}

/// Durable event record. Drafts may have any of the optional fields unset;
/// publishing requires all of them and computes the embedding.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub capacity: Option<i64>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// Volunteer staffing requirement, unique per (event, role).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolunteerRequirement {
    pub role: String,
    #[serde(default)]
    pub other_role: Option<String>,
    pub required_count: i64,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Fully specified event payload required for publishing.
#[derive(Debug, Clone, Deserialize)]
pub struct EventDetails {
    pub title: String,
    pub description: String,
    pub city: String,
    pub venue: String,
    pub latitude: f64,
    pub longitude: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: i64,
    pub interest_ids: Vec<Uuid>,
    #[serde(default)]
    pub volunteer_requirements: Vec<VolunteerRequirement>,
}

impl EventDetails {
    pub fn validate(&self) -> AppResult<()> {
        if self.title.len() < 3 || self.title.len() > 200 {
            return Err(AppError::Validation(
                "Title must be between 3 and 200 characters".to_string(),
            ));
        }
        if self.description.len() < 10 || self.description.len() > 5000 {
            return Err(AppError::Validation(
                "Description must be between 10 and 5000 characters".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AppError::Validation(
                "Latitude must be between -90 and 90".to_string(),
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AppError::Validation(
                "Longitude must be between -180 and 180".to_string(),
            ));
        }
        if self.end_time <= self.start_time {
            return Err(AppError::Validation(
                "End time must be after start time".to_string(),
            ));
        }
        if self.capacity < 1 {
            return Err(AppError::Validation(
                "Capacity must be at least 1".to_string(),
            ));
        }
        if self.interest_ids.is_empty() {
            return Err(AppError::Validation(
                "At least one interest is required for publishing".to_string(),
            ));
        }
        Ok(())
    }

    /// Text fed to the embedding model. Must stay in sync with nothing else:
    /// queries embed raw text, events embed exactly this concatenation.
    pub fn embedding_text(&self, interest_names: &[String]) -> String {
        format!(
            "{}\n{}\n{}\n{}\n{}",
            self.title,
            self.description,
            self.city,
            self.venue,
            interest_names.join(", ")
        )
    }
}

/// Draft payload; everything beyond the title is optional until publish.
#[derive(Debug, Clone, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub capacity: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_weights_are_fixed() {
        assert_eq!(InteractionType::View.weight(), 0.1);
        assert_eq!(InteractionType::Save.weight(), 0.4);
        assert_eq!(InteractionType::Register.weight(), 0.7);
        assert_eq!(InteractionType::Attended.weight(), 1.0);
    }
}
