use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use herdbook_auth::{AccessDecision, Role};
use herdbook_breeding::{Bull, InseminationRecord};
use herdbook_core::{AggregateRoot, UserId};
use herdbook_herd::AnimalId;
use herdbook_infra::projections::{AnimalReadModel, InseminationReadModel};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterAnimalRequest {
    pub ear_tag: String,
    pub name: Option<String>,
    pub breed: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterBullRequest {
    pub code: String,
    pub name: String,
    /// Minor currency units.
    pub price_per_dose: u64,
    pub initial_doses: u32,
}

#[derive(Debug, Deserialize)]
pub struct WriteOffRequest {
    pub quantity: u32,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordInseminationRequest {
    pub bull_id: String,
    pub animal_ids: Vec<String>,
    /// Defaults to the caller.
    pub executor_id: Option<UserId>,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InseminationQuery {
    #[serde(default)]
    pub include_deleted: bool,
    pub animal_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PregnancyCheckRequest {
    /// `ОСЕМ`, `СТЕЛ` or `ЯЛОВАЯ`.
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub display_name: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub farm_id: String,
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    pub access: Vec<AccessDecision>,
}

/// Write-side view of a bull, returned right after a ledger call.
#[derive(Debug, Serialize)]
pub struct BullResponse {
    pub id: String,
    pub code: String,
    pub name: String,
    pub price_per_dose: u64,
    pub initial_doses: u32,
    pub remaining_doses: u32,
    pub written_off: u32,
    pub active_inseminations: u32,
}

impl From<&Bull> for BullResponse {
    fn from(bull: &Bull) -> Self {
        Self {
            id: bull.id().to_string(),
            code: bull.code().to_string(),
            name: bull.name().to_string(),
            price_per_dose: bull.price_per_dose(),
            initial_doses: bull.initial_doses(),
            remaining_doses: bull.remaining(),
            written_off: bull.written_off(),
            active_inseminations: bull.active_inseminations(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordedInseminations {
    pub inseminations: Vec<InseminationRecord>,
}

#[derive(Debug, Serialize)]
pub struct AnimalCard {
    #[serde(flatten)]
    pub animal: AnimalReadModel,
    pub inseminations: Vec<InseminationReadModel>,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_role(s: &str) -> Result<Role, axum::response::Response> {
    s.parse::<Role>().map_err(|e| {
        crate::app::errors::json_error(axum::http::StatusCode::BAD_REQUEST, "invalid_role", e.to_string())
    })
}

pub fn parse_animal_ids(raw: &[String]) -> Result<Vec<AnimalId>, axum::response::Response> {
    raw.iter()
        .map(|s| s.parse::<AnimalId>().map_err(|_| crate::app::errors::invalid_id("animal")))
        .collect()
}
