//! Semen dose report: stock, consumption and value per bull.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use herdbook_breeding::BullId;

use crate::projections::{BullReadModel, InseminationReadModel};

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoseReportRow {
    pub bull_id: BullId,
    pub code: String,
    pub name: String,
    pub price_per_dose: u64,
    pub initial_doses: u32,
    /// Active inseminations (all time).
    pub used: u32,
    pub written_off: u32,
    pub remaining: u32,
    /// Active inseminations dated inside the report period.
    pub used_in_period: u32,
    pub used_value: u64,
    pub remaining_value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoseReport {
    pub period: Option<Period>,
    pub rows: Vec<DoseReportRow>,
    pub total_remaining: u64,
    pub total_used_in_period: u64,
    /// Saturates at `u64::MAX`.
    pub total_remaining_value: u64,
}

/// Build the report from read models. Tombstoned inseminations never count.
pub fn dose_report(
    bulls: &[BullReadModel],
    inseminations: &[InseminationReadModel],
    period: Option<Period>,
) -> DoseReport {
    let mut in_period: HashMap<BullId, u32> = HashMap::new();
    for record in inseminations {
        if record.is_active() && period.is_none_or(|p| p.contains(record.date)) {
            *in_period.entry(record.bull_id).or_default() += 1;
        }
    }

    let mut rows: Vec<DoseReportRow> = bulls
        .iter()
        .map(|bull| DoseReportRow {
            bull_id: bull.bull_id,
            code: bull.code.clone(),
            name: bull.name.clone(),
            price_per_dose: bull.price_per_dose,
            initial_doses: bull.initial_doses,
            used: bull.active_inseminations,
            written_off: bull.written_off,
            remaining: bull.remaining_doses,
            used_in_period: in_period.get(&bull.bull_id).copied().unwrap_or(0),
            used_value: u64::from(bull.active_inseminations).saturating_mul(bull.price_per_dose),
            remaining_value: u64::from(bull.remaining_doses).saturating_mul(bull.price_per_dose),
        })
        .collect();
    rows.sort_by(|a, b| a.code.cmp(&b.code));

    DoseReport {
        period,
        total_remaining: rows.iter().map(|r| u64::from(r.remaining)).fold(0, u64::saturating_add),
        total_used_in_period: rows.iter().map(|r| u64::from(r.used_in_period)).fold(0, u64::saturating_add),
        total_remaining_value: rows.iter().map(|r| r.remaining_value).fold(0, u64::saturating_add),
        rows,
    }
}
