//! Fan-out of committed events to read-model subscribers.
//!
//! Events reach the bus only after the store accepted them, so the store
//! stays authoritative and anything a subscriber missed can be replayed from
//! it. Delivery is at-least-once; projections skip repeats by stream
//! sequence number.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use herdbook_core::FarmId;

use crate::FarmScoped;

/// One subscriber's queue. Every subscription sees every published message;
/// a farm-bound one drops the messages of other farms as it reads them.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
    farm_id: Option<FarmId>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self {
            receiver,
            farm_id: None,
        }
    }

    pub fn farm_id(&self) -> Option<FarmId> {
        self.farm_id
    }

    /// Next queued message, ignoring the farm binding.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl<M: FarmScoped> Subscription<M> {
    /// Bind to one farm, or to every farm with `None`.
    pub fn for_farm(self, farm_id: Option<FarmId>) -> Self {
        Self { farm_id, ..self }
    }

    /// Wait up to `timeout` for the next message of the bound farm.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let msg = self.receiver.recv_timeout(left)?;
            if self.farm_id.is_none_or(|f| msg.farm_id() == f) {
                return Ok(msg);
            }
        }
    }
}

/// Where the command dispatcher publishes after a successful append.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herdbook_core::AggregateId;
    use uuid::Uuid;

    use crate::{EventEnvelope, InMemoryEventBus};

    fn envelope(farm_id: FarmId, payload: u32) -> EventEnvelope<u32> {
        EventEnvelope::new(Uuid::now_v7(), farm_id, AggregateId::new(), "breeding.bull", 1, payload)
    }

    #[test]
    fn farm_bound_subscription_skips_other_farms() {
        let bus = InMemoryEventBus::<EventEnvelope<u32>>::new();
        let farm_id = FarmId::new();
        let sub = bus.subscribe().for_farm(Some(farm_id));
        assert_eq!(sub.farm_id(), Some(farm_id));

        bus.publish(envelope(FarmId::new(), 1)).unwrap();
        bus.publish(envelope(farm_id, 2)).unwrap();

        let got = sub.recv_timeout(Duration::from_millis(200)).unwrap();
        assert_eq!(*got.payload(), 2);
        assert!(matches!(
            sub.recv_timeout(Duration::from_millis(20)),
            Err(RecvTimeoutError::Timeout)
        ));
    }

    #[test]
    fn unbound_subscription_sees_every_farm() {
        let bus = InMemoryEventBus::<EventEnvelope<u32>>::new();
        let sub = bus.subscribe().for_farm(None);

        bus.publish(envelope(FarmId::new(), 1)).unwrap();
        bus.publish(envelope(FarmId::new(), 2)).unwrap();

        assert_eq!(*sub.recv_timeout(Duration::from_millis(200)).unwrap().payload(), 1);
        assert_eq!(*sub.recv_timeout(Duration::from_millis(200)).unwrap().payload(), 2);
    }
}
