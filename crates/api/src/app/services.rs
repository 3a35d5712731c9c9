use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde_json::Value as JsonValue;
use tracing::info;

use herdbook_auth::{AccessPolicy, FileSessionStore, Role, SessionRegistry};
use herdbook_config::AppConfig;
use herdbook_events::{EventEnvelope, InMemoryEventBus};
use herdbook_infra::{
    AnimalRegistry, CommandDispatcher, DoseLedger, HerdRegistry, LedgerSettings, PregnancyChecks,
    UserAccounts, UserDirectory,
    event_store::{EventFilter, EventStore, InMemoryEventStore},
    projections::{ReadModels, aggregate_types, replay},
    workers::{ProjectionWorker, WorkerHandle},
};

pub type Store = Arc<dyn EventStore>;
pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// Everything the handlers reach for, wired once at start-up.
pub struct AppServices {
    pub policy: AccessPolicy,
    pub sessions: Arc<SessionRegistry>,
    pub accounts: UserAccounts<Store, Bus>,
    pub herd: HerdRegistry<Store, Bus>,
    pub ledger: DoseLedger<Store, Bus>,
    pub checks: PregnancyChecks<Store, Bus>,
    pub read_models: ReadModels,
    worker: Mutex<Option<WorkerHandle>>,
}

impl AppServices {
    /// Stop the read-model worker. Later commits are no longer projected.
    pub fn shutdown(&self) {
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            handle.shutdown();
        }
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store = build_store(config).await?;
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));

    // Subscribe before anything is dispatched so bootstrap events are projected.
    let read_models = ReadModels::in_memory();
    let sink = read_models.clone();
    let worker = ProjectionWorker::spawn("read-models", &bus, None, move |env: EventEnvelope<JsonValue>| {
        sink.apply_envelope(&env)
    })
    .context("spawning read-model worker")?;

    let settings = LedgerSettings {
        max_attempts: config.ledger.max_attempts,
    };
    let accounts = UserAccounts::new(dispatcher.clone());
    let herd = HerdRegistry::new(dispatcher.clone());
    let directory: Arc<dyn UserDirectory> = Arc::new(accounts.clone());
    let registry: Arc<dyn AnimalRegistry> = Arc::new(herd.clone());
    let ledger = DoseLedger::new(dispatcher.clone(), directory, registry, settings);
    let checks = PregnancyChecks::new(dispatcher, ledger.index().clone(), settings);

    // Events committed before this process started reach memory only here.
    let index = ledger.index().clone();
    let summary = replay(&store, &EventFilter::for_types(aggregate_types::ALL), |env| {
        read_models.apply_envelope(env)?;
        index.apply_envelope(env)
    })
    .context("replaying stored events")?;
    info!(events = summary.events, streams = summary.streams, "in-memory state restored");

    let sessions = Arc::new(match &config.session.file {
        Some(path) => {
            info!(%path, "restoring sessions from file");
            SessionRegistry::restore(FileSessionStore::new(path))
        }
        None => SessionRegistry::in_memory(),
    });

    let services = AppServices {
        policy: AccessPolicy::new(config.access_table()?),
        sessions,
        accounts,
        herd,
        ledger,
        checks,
        read_models,
        worker: Mutex::new(Some(worker)),
    };

    bootstrap_admin(&services, config)?;
    Ok(services)
}

fn bootstrap_admin(services: &AppServices, config: &AppConfig) -> anyhow::Result<()> {
    let (Some(farm_id), Some(admin_id)) = (config.bootstrap.farm_id, config.bootstrap.admin_id) else {
        return Ok(());
    };

    services
        .accounts
        .ensure_user(farm_id, admin_id, &config.bootstrap.admin_name, Role::Admin)
        .with_context(|| format!("bootstrapping administrator {admin_id}"))?;
    info!(%farm_id, %admin_id, "administrator account ready");
    Ok(())
}

#[cfg(feature = "postgres")]
async fn build_store(config: &AppConfig) -> anyhow::Result<Store> {
    use herdbook_infra::event_store::PostgresEventStore;

    let Some(url) = &config.storage.postgres_url else {
        return Ok(Arc::new(InMemoryEventStore::new()));
    };

    let store = PostgresEventStore::connect(url).await.context("connecting to postgres")?;
    store.ensure_schema().await.context("creating event store schema")?;
    info!("using postgres event store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn build_store(config: &AppConfig) -> anyhow::Result<Store> {
    if config.storage.postgres_url.is_some() {
        tracing::warn!("storage.postgres_url is set but the postgres feature is not enabled; falling back to in-memory");
    }
    Ok(Arc::new(InMemoryEventStore::new()))
}
