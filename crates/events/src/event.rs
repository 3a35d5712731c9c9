use chrono::{DateTime, Utc};

/// A fact recorded by an aggregate.
///
/// Events are immutable, versioned and only ever appended.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable type name, e.g. `"breeding.bull.doses_consumed"`.
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;
}
