use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use herdbook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, FarmId, UserId};
use herdbook_events::Event;
use herdbook_herd::AnimalId;

use crate::{BreedingError, InseminationId, InseminationRecord, InseminationStatus, Lifecycle};

/// Bull identifier (farm-scoped via `farm_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BullId(pub AggregateId);

impl BullId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for BullId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for BullId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<AggregateId>()
            .map(Self)
            .map_err(|_| DomainError::invalid_id(format!("not a bull id: {s}")))
    }
}

/// Aggregate root: Bull, together with every insemination that used its semen.
///
/// # Invariants
/// - `remaining = initial − active inseminations − written off`, never negative.
/// - Reversing an insemination restores exactly one dose.
/// - A removed bull (only possible at zero stock) accepts no further commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bull {
    id: BullId,
    farm_id: Option<FarmId>,
    code: String,
    name: String,
    price_per_dose: u64,
    initial_doses: u32,
    remaining: u32,
    written_off: u32,
    inseminations: BTreeMap<InseminationId, InseminationRecord>,
    removed: bool,
    version: u64,
    created: bool,
}

impl Bull {
    pub fn empty(id: BullId) -> Self {
        Self {
            id,
            farm_id: None,
            code: String::new(),
            name: String::new(),
            price_per_dose: 0,
            initial_doses: 0,
            remaining: 0,
            written_off: 0,
            inseminations: BTreeMap::new(),
            removed: false,
            version: 0,
            created: false,
        }
    }

    pub fn farm_id(&self) -> Option<FarmId> {
        self.farm_id
    }

    pub fn exists(&self) -> bool {
        self.created && !self.removed
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price_per_dose(&self) -> u64 {
        self.price_per_dose
    }

    pub fn initial_doses(&self) -> u32 {
        self.initial_doses
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn written_off(&self) -> u32 {
        self.written_off
    }

    pub fn inseminations(&self) -> impl Iterator<Item = &InseminationRecord> {
        self.inseminations.values()
    }

    pub fn insemination(&self, id: InseminationId) -> Option<&InseminationRecord> {
        self.inseminations.get(&id)
    }

    pub fn active_inseminations(&self) -> u32 {
        self.inseminations.values().filter(|r| r.is_active()).count() as u32
    }

    /// Whether the stock equation holds for the current state.
    pub fn reconciles(&self) -> bool {
        self.initial_doses
            .checked_sub(self.active_inseminations())
            .and_then(|left| left.checked_sub(self.written_off))
            == Some(self.remaining)
    }
}

impl AggregateRoot for Bull {
    type Id = BullId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBull {
    pub farm_id: FarmId,
    pub bull_id: BullId,
    pub code: String,
    pub name: String,
    pub price_per_dose: u64,
    pub initial_doses: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Record one insemination per listed animal, one dose each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeDoses {
    pub farm_id: FarmId,
    pub bull_id: BullId,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub executor_id: UserId,
    /// Pre-assigned record ids, paired with the animal each one covers.
    pub entries: Vec<(InseminationId, AnimalId)>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseInsemination {
    pub farm_id: FarmId,
    pub bull_id: BullId,
    pub insemination_id: InseminationId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOffDoses {
    pub farm_id: FarmId,
    pub bull_id: BullId,
    pub quantity: u32,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetInseminationStatus {
    pub farm_id: FarmId,
    pub bull_id: BullId,
    pub insemination_id: InseminationId,
    pub status: InseminationStatus,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveBull {
    pub farm_id: FarmId,
    pub bull_id: BullId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BullCommand {
    Register(RegisterBull),
    ConsumeDoses(ConsumeDoses),
    ReverseInsemination(ReverseInsemination),
    WriteOff(WriteOffDoses),
    SetInseminationStatus(SetInseminationStatus),
    Remove(RemoveBull),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BullRegistered {
    pub farm_id: FarmId,
    pub bull_id: BullId,
    pub code: String,
    pub name: String,
    pub price_per_dose: u64,
    pub initial_doses: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Dose decrement and the records it pays for, as one fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DosesConsumed {
    pub farm_id: FarmId,
    pub bull_id: BullId,
    pub records: Vec<InseminationRecord>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InseminationReversed {
    pub farm_id: FarmId,
    pub bull_id: BullId,
    pub insemination_id: InseminationId,
    pub animal_id: AnimalId,
    pub date: NaiveDate,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DosesWrittenOff {
    pub farm_id: FarmId,
    pub bull_id: BullId,
    pub quantity: u32,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InseminationStatusChanged {
    pub farm_id: FarmId,
    pub bull_id: BullId,
    pub insemination_id: InseminationId,
    pub from: InseminationStatus,
    pub to: InseminationStatus,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BullRemoved {
    pub farm_id: FarmId,
    pub bull_id: BullId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BullEvent {
    Registered(BullRegistered),
    DosesConsumed(DosesConsumed),
    InseminationReversed(InseminationReversed),
    DosesWrittenOff(DosesWrittenOff),
    InseminationStatusChanged(InseminationStatusChanged),
    Removed(BullRemoved),
}

impl Event for BullEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BullEvent::Registered(_) => "breeding.bull.registered",
            BullEvent::DosesConsumed(_) => "breeding.bull.doses_consumed",
            BullEvent::InseminationReversed(_) => "breeding.bull.insemination_reversed",
            BullEvent::DosesWrittenOff(_) => "breeding.bull.doses_written_off",
            BullEvent::InseminationStatusChanged(_) => "breeding.bull.insemination_status_changed",
            BullEvent::Removed(_) => "breeding.bull.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BullEvent::Registered(e) => e.occurred_at,
            BullEvent::DosesConsumed(e) => e.occurred_at,
            BullEvent::InseminationReversed(e) => e.occurred_at,
            BullEvent::DosesWrittenOff(e) => e.occurred_at,
            BullEvent::InseminationStatusChanged(e) => e.occurred_at,
            BullEvent::Removed(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Bull {
    type Command = BullCommand;
    type Event = BullEvent;
    type Error = BreedingError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BullEvent::Registered(e) => {
                self.id = e.bull_id;
                self.farm_id = Some(e.farm_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.price_per_dose = e.price_per_dose;
                self.initial_doses = e.initial_doses;
                self.remaining = e.initial_doses;
                self.created = true;
            }
            BullEvent::DosesConsumed(e) => {
                self.remaining = self.remaining.saturating_sub(e.records.len() as u32);
                for record in &e.records {
                    self.inseminations.insert(record.id, record.clone());
                }
            }
            BullEvent::InseminationReversed(e) => {
                if let Some(record) = self.inseminations.get_mut(&e.insemination_id) {
                    record.lifecycle = Lifecycle::Deleted {
                        reason: e.reason.clone(),
                        actor: e.actor,
                        at: e.occurred_at,
                    };
                }
                self.remaining += 1;
            }
            BullEvent::DosesWrittenOff(e) => {
                self.remaining = self.remaining.saturating_sub(e.quantity);
                self.written_off += e.quantity;
            }
            BullEvent::InseminationStatusChanged(e) => {
                if let Some(record) = self.inseminations.get_mut(&e.insemination_id) {
                    record.status = e.to;
                }
            }
            BullEvent::Removed(_) => self.removed = true,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BullCommand::Register(cmd) => self.handle_register(cmd),
            BullCommand::ConsumeDoses(cmd) => self.handle_consume(cmd),
            BullCommand::ReverseInsemination(cmd) => self.handle_reverse(cmd),
            BullCommand::WriteOff(cmd) => self.handle_write_off(cmd),
            BullCommand::SetInseminationStatus(cmd) => self.handle_set_status(cmd),
            BullCommand::Remove(cmd) => self.handle_remove(cmd),
        }
    }
}

fn required_reason(reason: &str) -> Result<String, BreedingError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(BreedingError::EmptyReason);
    }
    Ok(reason.to_string())
}

impl Bull {
    /// A bull of another farm, or one that was removed, does not exist for
    /// the caller.
    fn ensure_live(&self, farm_id: FarmId, bull_id: BullId) -> Result<(), BreedingError> {
        if !self.exists() || self.farm_id != Some(farm_id) || self.id != bull_id {
            return Err(BreedingError::UnknownBull);
        }
        Ok(())
    }

    fn active_record(&self, id: InseminationId) -> Result<&InseminationRecord, BreedingError> {
        let record = self
            .inseminations
            .get(&id)
            .ok_or(BreedingError::EventNotFound)?;
        if !record.is_active() {
            return Err(BreedingError::AlreadyDeleted);
        }
        Ok(record)
    }

    fn handle_register(&self, cmd: &RegisterBull) -> Result<Vec<BullEvent>, BreedingError> {
        if self.created {
            return Err(BreedingError::AlreadyRegistered);
        }
        let code = cmd.code.trim();
        if code.is_empty() {
            return Err(BreedingError::validation("bull code cannot be empty"));
        }
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(BreedingError::validation("bull name cannot be empty"));
        }

        Ok(vec![BullEvent::Registered(BullRegistered {
            farm_id: cmd.farm_id,
            bull_id: cmd.bull_id,
            code: code.to_string(),
            name: name.to_string(),
            price_per_dose: cmd.price_per_dose,
            initial_doses: cmd.initial_doses,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_consume(&self, cmd: &ConsumeDoses) -> Result<Vec<BullEvent>, BreedingError> {
        if cmd.entries.is_empty() {
            return Err(BreedingError::validation("at least one animal is required"));
        }
        self.ensure_live(cmd.farm_id, cmd.bull_id)?;

        let mut animals = BTreeSet::new();
        let mut ids = BTreeSet::new();
        for (id, animal_id) in &cmd.entries {
            if !animals.insert(*animal_id) {
                return Err(BreedingError::validation(format!(
                    "animal {animal_id} listed twice"
                )));
            }
            if !ids.insert(*id) || self.inseminations.contains_key(id) {
                return Err(BreedingError::validation(format!(
                    "insemination id {id} is not unique"
                )));
            }
        }

        let requested = u32::try_from(cmd.entries.len())
            .map_err(|_| BreedingError::validation("too many animals"))?;
        if requested > self.remaining {
            return Err(BreedingError::InsufficientDoses {
                requested,
                remaining: self.remaining,
            });
        }

        let records = cmd
            .entries
            .iter()
            .map(|(id, animal_id)| InseminationRecord {
                id: *id,
                date: cmd.date,
                time: cmd.time,
                animal_id: *animal_id,
                bull_id: cmd.bull_id,
                executor_id: cmd.executor_id,
                status: InseminationStatus::Inseminated,
                lifecycle: Lifecycle::Active,
            })
            .collect();

        Ok(vec![BullEvent::DosesConsumed(DosesConsumed {
            farm_id: cmd.farm_id,
            bull_id: cmd.bull_id,
            records,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(&self, cmd: &ReverseInsemination) -> Result<Vec<BullEvent>, BreedingError> {
        self.ensure_live(cmd.farm_id, cmd.bull_id)?;
        let record = self.active_record(cmd.insemination_id)?;
        let reason = required_reason(&cmd.reason)?;

        Ok(vec![BullEvent::InseminationReversed(InseminationReversed {
            farm_id: cmd.farm_id,
            bull_id: cmd.bull_id,
            insemination_id: record.id,
            animal_id: record.animal_id,
            date: record.date,
            reason,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_write_off(&self, cmd: &WriteOffDoses) -> Result<Vec<BullEvent>, BreedingError> {
        self.ensure_live(cmd.farm_id, cmd.bull_id)?;
        if cmd.quantity == 0 {
            return Err(BreedingError::InvalidQuantity);
        }
        if cmd.quantity > self.remaining {
            return Err(BreedingError::ExceedsStock {
                requested: cmd.quantity,
                remaining: self.remaining,
            });
        }
        let reason = required_reason(&cmd.reason)?;

        Ok(vec![BullEvent::DosesWrittenOff(DosesWrittenOff {
            farm_id: cmd.farm_id,
            bull_id: cmd.bull_id,
            quantity: cmd.quantity,
            reason,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_status(
        &self,
        cmd: &SetInseminationStatus,
    ) -> Result<Vec<BullEvent>, BreedingError> {
        self.ensure_live(cmd.farm_id, cmd.bull_id)?;
        let record = self.active_record(cmd.insemination_id)?;
        if record.status == cmd.status {
            return Ok(vec![]);
        }

        Ok(vec![BullEvent::InseminationStatusChanged(InseminationStatusChanged {
            farm_id: cmd.farm_id,
            bull_id: cmd.bull_id,
            insemination_id: record.id,
            from: record.status,
            to: cmd.status,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveBull) -> Result<Vec<BullEvent>, BreedingError> {
        self.ensure_live(cmd.farm_id, cmd.bull_id)?;
        if self.remaining > 0 {
            return Err(BreedingError::HasRemainingStock(self.remaining));
        }

        Ok(vec![BullEvent::Removed(BullRemoved {
            farm_id: cmd.farm_id,
            bull_id: cmd.bull_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        farm_id: FarmId,
        bull: Bull,
        executor: UserId,
    }

    impl Fixture {
        fn with_doses(initial_doses: u32) -> Self {
            let farm_id = FarmId::new();
            let bull_id = BullId::generate();
            let mut bull = Bull::empty(bull_id);
            let events = bull
                .handle(&BullCommand::Register(RegisterBull {
                    farm_id,
                    bull_id,
                    code: "HOL-117".to_string(),
                    name: "Буран".to_string(),
                    price_per_dose: 2_500,
                    initial_doses,
                    occurred_at: Utc::now(),
                }))
                .unwrap();
            for e in &events {
                bull.apply(e);
            }
            Self {
                farm_id,
                bull,
                executor: UserId::new(),
            }
        }

        fn exec(&mut self, cmd: BullCommand) -> Result<Vec<BullEvent>, BreedingError> {
            let events = self.bull.handle(&cmd)?;
            for e in &events {
                self.bull.apply(e);
            }
            Ok(events)
        }

        fn consume(&mut self, animals: &[AnimalId]) -> Result<Vec<InseminationId>, BreedingError> {
            let entries: Vec<_> = animals.iter().map(|a| (InseminationId::new(), *a)).collect();
            let ids = entries.iter().map(|(id, _)| *id).collect();
            self.exec(BullCommand::ConsumeDoses(ConsumeDoses {
                farm_id: self.farm_id,
                bull_id: *self.bull.id(),
                date: NaiveDate::from_ymd_opt(2024, 5, 14).unwrap(),
                time: NaiveTime::from_hms_opt(7, 30, 0),
                executor_id: self.executor,
                entries,
                occurred_at: Utc::now(),
            }))?;
            Ok(ids)
        }

        fn reverse(&mut self, id: InseminationId, reason: &str) -> Result<(), BreedingError> {
            self.exec(BullCommand::ReverseInsemination(ReverseInsemination {
                farm_id: self.farm_id,
                bull_id: *self.bull.id(),
                insemination_id: id,
                reason: reason.to_string(),
                actor: self.executor,
                occurred_at: Utc::now(),
            }))
            .map(|_| ())
        }

        fn write_off(&mut self, quantity: u32, reason: &str) -> Result<(), BreedingError> {
            self.exec(BullCommand::WriteOff(WriteOffDoses {
                farm_id: self.farm_id,
                bull_id: *self.bull.id(),
                quantity,
                reason: reason.to_string(),
                actor: self.executor,
                occurred_at: Utc::now(),
            }))
            .map(|_| ())
        }

        fn remove(&mut self) -> Result<(), BreedingError> {
            self.exec(BullCommand::Remove(RemoveBull {
                farm_id: self.farm_id,
                bull_id: *self.bull.id(),
                actor: self.executor,
                occurred_at: Utc::now(),
            }))
            .map(|_| ())
        }
    }

    fn animals(n: usize) -> Vec<AnimalId> {
        (0..n).map(|_| AnimalId::generate()).collect()
    }

    #[test]
    fn register_requires_code_and_name() {
        let bull_id = BullId::generate();
        let err = Bull::empty(bull_id)
            .handle(&BullCommand::Register(RegisterBull {
                farm_id: FarmId::new(),
                bull_id,
                code: " ".to_string(),
                name: "Буран".to_string(),
                price_per_dose: 0,
                initial_doses: 10,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, BreedingError::Validation(_)));
    }

    #[test]
    fn consuming_the_last_doses_then_asking_for_more() {
        let mut f = Fixture::with_doses(2);
        let ids = f.consume(&animals(2)).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(f.bull.remaining(), 0);
        assert!(f.bull.inseminations().all(|r| r.is_active()));

        let version = f.bull.version();
        let err = f.consume(&animals(1)).unwrap_err();
        assert_eq!(
            err,
            BreedingError::InsufficientDoses {
                requested: 1,
                remaining: 0
            }
        );
        assert_eq!(f.bull.remaining(), 0);
        assert_eq!(f.bull.version(), version);
        assert_eq!(f.bull.inseminations().count(), 2);
    }

    #[test]
    fn records_share_date_time_bull_and_executor() {
        let mut f = Fixture::with_doses(5);
        let events = {
            let entries: Vec<_> = animals(3).into_iter().map(|a| (InseminationId::new(), a)).collect();
            f.exec(BullCommand::ConsumeDoses(ConsumeDoses {
                farm_id: f.farm_id,
                bull_id: *f.bull.id(),
                date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                time: None,
                executor_id: f.executor,
                entries,
                occurred_at: Utc::now(),
            }))
            .unwrap()
        };
        assert_eq!(events.len(), 1);
        let BullEvent::DosesConsumed(consumed) = &events[0] else {
            panic!("expected DosesConsumed");
        };
        assert_eq!(consumed.records.len(), 3);
        for r in &consumed.records {
            assert_eq!(r.bull_id, *f.bull.id());
            assert_eq!(r.executor_id, f.executor);
            assert_eq!(r.time, None);
            assert_eq!(r.status, InseminationStatus::Inseminated);
        }
    }

    #[test]
    fn empty_or_duplicate_animal_sets_are_rejected() {
        let mut f = Fixture::with_doses(5);
        assert!(matches!(f.consume(&[]), Err(BreedingError::Validation(_))));

        let a = AnimalId::generate();
        assert!(matches!(f.consume(&[a, a]), Err(BreedingError::Validation(_))));
        assert_eq!(f.bull.remaining(), 5);
    }

    #[test]
    fn reversing_restores_exactly_one_dose() {
        let mut f = Fixture::with_doses(2);
        let ids = f.consume(&animals(2)).unwrap();

        f.reverse(ids[0], "ошибка ввода").unwrap();
        assert_eq!(f.bull.remaining(), 1);
        let deleted = f.bull.insemination(ids[0]).unwrap();
        match &deleted.lifecycle {
            Lifecycle::Deleted { reason, actor, .. } => {
                assert_eq!(reason, "ошибка ввода");
                assert_eq!(*actor, f.executor);
            }
            Lifecycle::Active => panic!("expected tombstone"),
        }
        assert!(f.bull.insemination(ids[1]).unwrap().is_active());

        assert_eq!(f.reverse(ids[0], "ещё раз"), Err(BreedingError::AlreadyDeleted));
        assert_eq!(f.bull.remaining(), 1);
        assert!(f.bull.reconciles());
    }

    #[test]
    fn reversal_needs_a_reason_and_a_known_record() {
        let mut f = Fixture::with_doses(1);
        let ids = f.consume(&animals(1)).unwrap();

        assert_eq!(f.reverse(ids[0], "   "), Err(BreedingError::EmptyReason));
        assert_eq!(f.reverse(InseminationId::new(), "x"), Err(BreedingError::EventNotFound));
        assert_eq!(f.bull.remaining(), 0);
    }

    #[test]
    fn write_off_bounds() {
        let mut f = Fixture::with_doses(3);
        assert_eq!(
            f.write_off(5, "истек срок"),
            Err(BreedingError::ExceedsStock {
                requested: 5,
                remaining: 3
            })
        );
        assert_eq!(f.write_off(0, "истек срок"), Err(BreedingError::InvalidQuantity));
        assert_eq!(f.write_off(1, ""), Err(BreedingError::EmptyReason));
        assert_eq!(f.bull.remaining(), 3);

        f.write_off(2, "истек срок").unwrap();
        assert_eq!(f.bull.remaining(), 1);
        assert_eq!(f.bull.written_off(), 2);
        assert!(f.bull.reconciles());
    }

    #[test]
    fn status_changes_leave_stock_alone() {
        let mut f = Fixture::with_doses(2);
        let ids = f.consume(&animals(1)).unwrap();
        let (farm_id, bull_id) = (f.farm_id, *f.bull.id());
        let cmd = |status| {
            BullCommand::SetInseminationStatus(SetInseminationStatus {
                farm_id,
                bull_id,
                insemination_id: ids[0],
                status,
                actor: UserId::new(),
                occurred_at: Utc::now(),
            })
        };
        let pregnant = cmd(InseminationStatus::Pregnant);
        let events = f.exec(pregnant.clone()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(f.bull.remaining(), 1);
        assert_eq!(
            f.bull.insemination(ids[0]).unwrap().status,
            InseminationStatus::Pregnant
        );

        // Same status again is a no-op.
        assert!(f.exec(pregnant.clone()).unwrap().is_empty());

        f.reverse(ids[0], "ошибка").unwrap();
        assert_eq!(f.exec(pregnant), Err(BreedingError::AlreadyDeleted));
    }

    #[test]
    fn removal_only_at_zero_stock() {
        let mut f = Fixture::with_doses(1);
        assert_eq!(f.remove(), Err(BreedingError::HasRemainingStock(1)));

        f.write_off(1, "брак").unwrap();
        f.remove().unwrap();
        assert!(!f.bull.exists());
        assert_eq!(f.consume(&animals(1)), Err(BreedingError::UnknownBull));
        assert_eq!(f.remove(), Err(BreedingError::UnknownBull));
    }

    #[test]
    fn other_farm_cannot_see_the_bull() {
        let mut f = Fixture::with_doses(4);
        f.farm_id = FarmId::new();
        assert_eq!(f.write_off(1, "брак"), Err(BreedingError::UnknownBull));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Record(usize),
            Reverse(usize),
            WriteOff(u32),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (1usize..4).prop_map(Op::Record),
                (0usize..16).prop_map(Op::Reverse),
                (0u32..4).prop_map(Op::WriteOff),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Any mix of accepted and rejected operations keeps the stock
            /// equation balanced.
            #[test]
            fn stock_always_reconciles(
                initial in 0u32..12,
                ops in prop::collection::vec(op(), 0..40)
            ) {
                let mut f = Fixture::with_doses(initial);
                let mut recorded: Vec<InseminationId> = Vec::new();

                for op in ops {
                    let before = f.bull.clone();
                    let outcome = match op {
                        Op::Record(n) => f.consume(&animals(n)).map(|ids| recorded.extend(ids)),
                        Op::Reverse(i) if !recorded.is_empty() => {
                            let id = recorded[i % recorded.len()];
                            f.reverse(id, "ошибка ввода")
                        }
                        Op::Reverse(_) => Ok(()),
                        Op::WriteOff(q) => f.write_off(q, "истек срок"),
                    };
                    if outcome.is_err() {
                        prop_assert_eq!(&f.bull, &before);
                    }
                    prop_assert!(f.bull.reconciles());
                    prop_assert!(f.bull.remaining() <= initial);
                }
            }
        }
    }
}
