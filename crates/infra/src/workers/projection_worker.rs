use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use herdbook_core::FarmId;
use herdbook_events::{EventBus, FarmScoped, Subscription};

/// Stop switch and join handle of a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Ask the worker to stop and wait for it.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Feeds bus messages to a handler on a dedicated thread.
///
/// Handlers must be idempotent: the bus delivers at least once. A handler
/// error is logged and the loop moves on to the next message.
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// `farm_id` restricts the worker to one farm's messages.
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: &B,
        farm_id: Option<FarmId>,
        mut handler: H,
    ) -> std::io::Result<WorkerHandle>
    where
        M: FarmScoped + Send + 'static,
        B: EventBus<M>,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe().for_farm(farm_id);

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, &mut handler))?;

        debug!(worker = name, "projection worker started");
        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    handler: &mut H,
) where
    M: FarmScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Display,
{
    let tick = Duration::from_millis(100);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = %err, "projection handler failed");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker = name, "projection worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use herdbook_events::{EventEnvelope, InMemoryEventBus};
    use herdbook_core::AggregateId;
    use uuid::Uuid;

    fn envelope(farm_id: FarmId, seq: u64) -> EventEnvelope<u64> {
        EventEnvelope::new(Uuid::now_v7(), farm_id, AggregateId::new(), "test.stream", seq, seq)
    }

    #[test]
    fn delivers_only_the_selected_farm() {
        let bus = InMemoryEventBus::<EventEnvelope<u64>>::new();
        let farm_id = FarmId::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let handle = ProjectionWorker::spawn("test-worker", &bus, Some(farm_id), move |msg: EventEnvelope<u64>| {
            sink.lock().unwrap().push(*msg.payload());
            Ok::<(), String>(())
        })
        .unwrap();

        bus.publish(envelope(FarmId::new(), 1)).unwrap();
        bus.publish(envelope(farm_id, 2)).unwrap();
        bus.publish(envelope(farm_id, 3)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while seen.lock().unwrap().len() < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();

        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }
}
