use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use herdbook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, FarmId};
use herdbook_events::Event;

/// Animal identifier (farm-scoped via `farm_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnimalId(pub AggregateId);

impl AnimalId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for AnimalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for AnimalId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<AggregateId>()
            .map(Self)
            .map_err(|_| DomainError::invalid_id(format!("not an animal id: {s}")))
    }
}

/// Herd status as shown on the animal card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnimalStatus {
    #[default]
    Active,
    /// At least one breeding on record.
    Inseminated,
    /// Out of the herd (sold, culled, died); breeding is blocked.
    Archived,
}

impl core::fmt::Display for AnimalStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AnimalStatus::Active => write!(f, "ACTIVE"),
            AnimalStatus::Inseminated => write!(f, "INSEMINATED"),
            AnimalStatus::Archived => write!(f, "ARCHIVED"),
        }
    }
}

/// Aggregate root: Animal.
///
/// # Invariants
/// - Ear tags are non-empty.
/// - Archived animals accept no new breedings.
/// - A breeding can only be reverted if one was recorded on that date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Animal {
    id: AnimalId,
    farm_id: Option<FarmId>,
    ear_tag: String,
    name: Option<String>,
    breed: Option<String>,
    breeding_dates: Vec<NaiveDate>,
    archived: bool,
    version: u64,
    created: bool,
}

impl Animal {
    pub fn empty(id: AnimalId) -> Self {
        Self {
            id,
            farm_id: None,
            ear_tag: String::new(),
            name: None,
            breed: None,
            breeding_dates: Vec::new(),
            archived: false,
            version: 0,
            created: false,
        }
    }

    pub fn farm_id(&self) -> Option<FarmId> {
        self.farm_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn ear_tag(&self) -> &str {
        &self.ear_tag
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn breed(&self) -> Option<&str> {
        self.breed.as_deref()
    }

    pub fn breeding_dates(&self) -> &[NaiveDate] {
        &self.breeding_dates
    }

    pub fn last_breeding_date(&self) -> Option<NaiveDate> {
        self.breeding_dates.iter().max().copied()
    }

    pub fn status(&self) -> AnimalStatus {
        if self.archived {
            AnimalStatus::Archived
        } else if self.breeding_dates.is_empty() {
            AnimalStatus::Active
        } else {
            AnimalStatus::Inseminated
        }
    }
}

impl AggregateRoot for Animal {
    type Id = AnimalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAnimal {
    pub farm_id: FarmId,
    pub animal_id: AnimalId,
    pub ear_tag: String,
    pub name: Option<String>,
    pub breed: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBreeding {
    pub farm_id: FarmId,
    pub animal_id: AnimalId,
    pub date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertBreeding {
    pub farm_id: FarmId,
    pub animal_id: AnimalId,
    pub date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveAnimal {
    pub farm_id: FarmId,
    pub animal_id: AnimalId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimalCommand {
    Register(RegisterAnimal),
    RecordBreeding(RecordBreeding),
    RevertBreeding(RevertBreeding),
    Archive(ArchiveAnimal),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimalRegistered {
    pub farm_id: FarmId,
    pub animal_id: AnimalId,
    pub ear_tag: String,
    pub name: Option<String>,
    pub breed: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreedingRecorded {
    pub farm_id: FarmId,
    pub animal_id: AnimalId,
    pub date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreedingReverted {
    pub farm_id: FarmId,
    pub animal_id: AnimalId,
    pub date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimalArchived {
    pub farm_id: FarmId,
    pub animal_id: AnimalId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimalEvent {
    Registered(AnimalRegistered),
    BreedingRecorded(BreedingRecorded),
    BreedingReverted(BreedingReverted),
    Archived(AnimalArchived),
}

impl Event for AnimalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AnimalEvent::Registered(_) => "herd.animal.registered",
            AnimalEvent::BreedingRecorded(_) => "herd.animal.breeding_recorded",
            AnimalEvent::BreedingReverted(_) => "herd.animal.breeding_reverted",
            AnimalEvent::Archived(_) => "herd.animal.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AnimalEvent::Registered(e) => e.occurred_at,
            AnimalEvent::BreedingRecorded(e) => e.occurred_at,
            AnimalEvent::BreedingReverted(e) => e.occurred_at,
            AnimalEvent::Archived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Animal {
    type Command = AnimalCommand;
    type Event = AnimalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AnimalEvent::Registered(e) => {
                self.id = e.animal_id;
                self.farm_id = Some(e.farm_id);
                self.ear_tag = e.ear_tag.clone();
                self.name = e.name.clone();
                self.breed = e.breed.clone();
                self.created = true;
            }
            AnimalEvent::BreedingRecorded(e) => self.breeding_dates.push(e.date),
            AnimalEvent::BreedingReverted(e) => {
                if let Some(pos) = self.breeding_dates.iter().rposition(|d| *d == e.date) {
                    self.breeding_dates.remove(pos);
                }
            }
            AnimalEvent::Archived(_) => self.archived = true,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AnimalCommand::Register(cmd) => self.handle_register(cmd),
            AnimalCommand::RecordBreeding(cmd) => self.handle_record_breeding(cmd),
            AnimalCommand::RevertBreeding(cmd) => self.handle_revert_breeding(cmd),
            AnimalCommand::Archive(cmd) => self.handle_archive(cmd),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Animal {
    fn ensure_existing(&self, farm_id: FarmId, animal_id: AnimalId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.farm_id != Some(farm_id) {
            return Err(DomainError::invariant("farm mismatch"));
        }
        if self.id != animal_id {
            return Err(DomainError::invariant("animal_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterAnimal) -> Result<Vec<AnimalEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("animal already registered"));
        }
        let ear_tag = cmd.ear_tag.trim();
        if ear_tag.is_empty() {
            return Err(DomainError::validation("ear tag cannot be empty"));
        }

        Ok(vec![AnimalEvent::Registered(AnimalRegistered {
            farm_id: cmd.farm_id,
            animal_id: cmd.animal_id,
            ear_tag: ear_tag.to_string(),
            name: non_blank(&cmd.name),
            breed: non_blank(&cmd.breed),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_breeding(&self, cmd: &RecordBreeding) -> Result<Vec<AnimalEvent>, DomainError> {
        self.ensure_existing(cmd.farm_id, cmd.animal_id)?;
        if self.archived {
            return Err(DomainError::invariant("animal is archived"));
        }

        Ok(vec![AnimalEvent::BreedingRecorded(BreedingRecorded {
            farm_id: cmd.farm_id,
            animal_id: cmd.animal_id,
            date: cmd.date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revert_breeding(&self, cmd: &RevertBreeding) -> Result<Vec<AnimalEvent>, DomainError> {
        self.ensure_existing(cmd.farm_id, cmd.animal_id)?;
        if !self.breeding_dates.contains(&cmd.date) {
            return Err(DomainError::conflict(format!(
                "no breeding recorded on {}",
                cmd.date
            )));
        }

        Ok(vec![AnimalEvent::BreedingReverted(BreedingReverted {
            farm_id: cmd.farm_id,
            animal_id: cmd.animal_id,
            date: cmd.date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveAnimal) -> Result<Vec<AnimalEvent>, DomainError> {
        self.ensure_existing(cmd.farm_id, cmd.animal_id)?;
        if self.archived {
            return Err(DomainError::conflict("animal is already archived"));
        }
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("archive reason cannot be empty"));
        }

        Ok(vec![AnimalEvent::Archived(AnimalArchived {
            farm_id: cmd.farm_id,
            animal_id: cmd.animal_id,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
