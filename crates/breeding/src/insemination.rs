use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herdbook_core::{DomainError, UserId};
use herdbook_herd::AnimalId;

use crate::BullId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InseminationId(pub Uuid);

impl InseminationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for InseminationId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for InseminationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for InseminationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DomainError::invalid_id(format!("not an insemination id: {s}")))
    }
}

/// Outcome of the insemination as tracked by the veterinary workflow.
///
/// Independent of [`Lifecycle`]; never affects dose counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InseminationStatus {
    #[default]
    #[serde(rename = "ОСЕМ")]
    Inseminated,
    #[serde(rename = "СТЕЛ")]
    Pregnant,
    #[serde(rename = "ЯЛОВАЯ")]
    Open,
}

impl InseminationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            InseminationStatus::Inseminated => "ОСЕМ",
            InseminationStatus::Pregnant => "СТЕЛ",
            InseminationStatus::Open => "ЯЛОВАЯ",
        }
    }
}

impl core::fmt::Display for InseminationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

impl core::str::FromStr for InseminationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ОСЕМ" => Ok(Self::Inseminated),
            "СТЕЛ" => Ok(Self::Pregnant),
            "ЯЛОВАЯ" => Ok(Self::Open),
            other => Err(DomainError::validation(format!(
                "unknown insemination status '{other}'"
            ))),
        }
    }
}

/// Soft-delete state. `Deleted` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Active,
    Deleted {
        reason: String,
        actor: UserId,
        at: DateTime<Utc>,
    },
}

impl Lifecycle {
    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

/// One insemination: one animal, one dose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InseminationRecord {
    pub id: InseminationId,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub animal_id: AnimalId,
    pub bull_id: BullId,
    pub executor_id: UserId,
    pub status: InseminationStatus,
    pub lifecycle: Lifecycle,
}

impl InseminationRecord {
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }
}
