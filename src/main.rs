use anyhow::Context as _;
use sipdir::application::{Manager, ManagerHandle, RegistrationDecision, RegistrationService};
use sipdir::config::Config;
use sipdir::domain::directory::Directory;
use sipdir::domain::event::{Event, SipMethod};
use sipdir::domain::store::DirectoryStore;
use sipdir::infrastructure::persistence::MemoryDirectoryStore;
use sipdir::infrastructure::protocols::sip::{
    DigestAuth, UdpContext, EVENT_QUEUE_DEPTH, NONCE_LIFETIME,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "postgres")]
use sipdir::infrastructure::persistence::{
    create_pool, mask_password, run_migrations, DatabaseConfig, PgDirectoryStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting sipdir");

    let config = Config::load().context("loading configuration")?;
    debug!("Configuration loaded: {:?}", config);

    let store = open_store(&config).await?;
    let directory = Arc::new(Directory::new());

    // integrity errors in the initial listing are fatal
    let rows = store.extensions().await.context("reading extensions")?;
    let report = directory.reload(rows).context("loading directory")?;
    info!(
        "Directory loaded: {} registries ({} skipped)",
        report.created, report.skipped
    );

    let (manager, handle) = Manager::new(&config, directory.clone(), store.clone());
    info!("Server uuid {}", manager.uuid());
    let settings = handle.settings();
    let manager_task = tokio::spawn(manager.run());

    let bind: SocketAddr = config
        .sip_bind()
        .parse()
        .with_context(|| format!("invalid SIP bind address {}", config.sip_bind()))?;
    let context = Arc::new(UdpContext::bind(bind).await?);
    context.set_hostnames(settings.names());
    watch_hostnames(&handle, context.clone());

    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let receiver = context.clone().spawn(events_tx);
    info!("Listening for SIP messages on UDP {}", context.local_addr());

    let auth = Arc::new(DigestAuth::new(settings.digest));
    let registration = RegistrationService::new(
        directory.clone(),
        store.clone(),
        auth.clone(),
        handle.subscribe(),
    );
    let dispatcher = tokio::spawn(dispatch(events_rx, registration));

    tokio::spawn({
        let auth = auth.clone();
        async move {
            let mut interval = tokio::time::interval(NONCE_LIFETIME);
            loop {
                interval.tick().await;
                let purged = auth.cleanup_nonces().await;
                if purged > 0 {
                    debug!("Purged {} stale nonces", purged);
                }
            }
        }
    });

    #[cfg(unix)]
    spawn_reload_on_hangup(handle.clone());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down...");
            if let Err(e) = handle.shutdown().await {
                warn!("Manager already stopped: {}", e);
            }
        }
        result = manager_task => {
            receiver.abort();
            dispatcher.abort();
            return match result? {
                Ok(()) => Ok(()),
                Err(e) => Err(anyhow::Error::new(e).context("directory manager stopped")),
            };
        }
    }

    receiver.abort();
    dispatcher.abort();
    Ok(())
}

/// `memory:<file>` selects the in-memory store; anything else is a database url
async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn DirectoryStore>> {
    if let Some(path) = config.database.url.strip_prefix("memory:") {
        let store = if path.is_empty() {
            MemoryDirectoryStore::new()
        } else {
            MemoryDirectoryStore::load(path)
                .await
                .with_context(|| format!("loading directory file {}", path))?
        };
        info!("Using in-memory directory store");
        return Ok(Arc::new(store));
    }

    open_database(config).await
}

#[cfg(feature = "postgres")]
async fn open_database(config: &Config) -> anyhow::Result<Arc<dyn DirectoryStore>> {
    let db_config = DatabaseConfig::from(&config.database);
    info!("Connecting to {}", mask_password(&db_config.url));
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;
    info!("Database migrations completed");
    Ok(Arc::new(PgDirectoryStore::new(pool)))
}

#[cfg(not(feature = "postgres"))]
async fn open_database(config: &Config) -> anyhow::Result<Arc<dyn DirectoryStore>> {
    anyhow::bail!(
        "database url {} requires the postgres feature",
        config.database.url
    )
}

/// Keep the transport's local names in step with published settings
fn watch_hostnames(handle: &ManagerHandle, context: Arc<UdpContext>) {
    let mut settings = handle.subscribe();
    tokio::spawn(async move {
        while settings.changed().await.is_ok() {
            let names = settings.borrow_and_update().names();
            context.set_hostnames(names);
        }
    });
}

#[cfg(unix)]
fn spawn_reload_on_hangup(handle: ManagerHandle) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                warn!("Cannot listen for SIGHUP: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            match handle.reload().await {
                Ok(report) => info!(
                    "Directory reloaded: {} created, {} updated, {} removed, {} skipped",
                    report.created, report.updated, report.removed, report.skipped
                ),
                Err(e) => error!("Directory reload failed: {}", e),
            }
        }
    });
}

async fn dispatch(mut events: mpsc::Receiver<Event>, registration: RegistrationService) {
    while let Some(event) = events.recv().await {
        if event.method() != Some(SipMethod::Register) {
            debug!("Ignoring {}", event);
            continue;
        }
        match registration.handle(&event).await {
            Ok(RegistrationDecision::Accept {
                registry,
                expires,
                contacts,
            }) => info!(
                "{} accepted for registry {} ({} binding(s), {}s)",
                event,
                registry,
                contacts.len(),
                expires
            ),
            Ok(RegistrationDecision::Challenge(challenge)) => {
                debug!("{} challenged: {}", event, challenge.to_header_value())
            }
            Ok(RegistrationDecision::Reject(reason)) => warn!(
                "{} rejected: {} ({})",
                event,
                reason,
                reason.status_code()
            ),
            Err(e) => error!("{} failed: {}", event, e),
        }
    }
    debug!("Event channel closed");
}
