//! Manager task
//!
//! Owns runtime settings (realm, system password, digest, names) and the
//! periodic maintenance of the directory. Other tasks talk to it through a
//! bounded command channel and observe settings through a watch channel.

use crate::config::{Config, RegistrationConfig};
use crate::domain::directory::{Directory, ReloadReport};
use crate::domain::shared::DomainError;
use crate::domain::store::DirectoryStore;
use crate::infrastructure::protocols::sip::DigestAlgorithm;
use metrics::gauge;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Depth of the manager command queue
pub const COMMAND_QUEUE_DEPTH: usize = 64;

const LOCAL_NAMES: [&str; 3] = ["local", "localhost", "localdomain"];

/// Settings published to the rest of the server
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub realm: String,
    pub system_password: String,
    pub digest: DigestAlgorithm,
    pub hostname: String,
    pub localnames: Vec<String>,
    pub aliases: Vec<String>,
    pub mode: String,
    pub policy: RegistrationConfig,
}

impl Settings {
    /// Aliases followed by local names and the hostname
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .aliases
            .iter()
            .chain(self.localnames.iter())
            .cloned()
            .collect();
        if !self.hostname.is_empty() && !names.contains(&self.hostname) {
            names.push(self.hostname.clone());
        }
        names
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            realm: String::new(),
            system_password: String::new(),
            digest: DigestAlgorithm::default(),
            hostname: String::new(),
            localnames: Vec::new(),
            aliases: Vec::new(),
            mode: "default".to_string(),
            policy: RegistrationConfig::default(),
        }
    }
}

type ReloadReply = oneshot::Sender<Result<ReloadReport, DomainError>>;

#[derive(Debug)]
pub enum ManagerCommand {
    ApplyConfig(Box<Config>),
    SetMode(String),
    SetAliases(Vec<String>),
    /// Re-read extensions from the store; the reply is optional
    Reload(Option<ReloadReply>),
    Shutdown,
}

/// Cloneable client side of the manager
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    commands: mpsc::Sender<ManagerCommand>,
    settings: watch::Receiver<Settings>,
}

impl ManagerHandle {
    async fn send(&self, command: ManagerCommand) -> Result<(), DomainError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DomainError::Internal("Manager has stopped".to_string()))
    }

    pub async fn apply_config(&self, config: Config) -> Result<(), DomainError> {
        self.send(ManagerCommand::ApplyConfig(Box::new(config))).await
    }

    pub async fn set_mode(&self, mode: &str) -> Result<(), DomainError> {
        self.send(ManagerCommand::SetMode(mode.to_string())).await
    }

    pub async fn set_aliases(&self, aliases: Vec<String>) -> Result<(), DomainError> {
        self.send(ManagerCommand::SetAliases(aliases)).await
    }

    /// Reload the directory and wait for the outcome
    pub async fn reload(&self) -> Result<ReloadReport, DomainError> {
        let (tx, rx) = oneshot::channel();
        self.send(ManagerCommand::Reload(Some(tx))).await?;
        rx.await
            .map_err(|_| DomainError::Internal("Manager dropped reload".to_string()))?
    }

    pub async fn shutdown(&self) -> Result<(), DomainError> {
        self.send(ManagerCommand::Shutdown).await
    }

    pub fn settings(&self) -> Settings {
        self.settings.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.settings.clone()
    }
}

pub struct Manager {
    uuid: Uuid,
    settings: Settings,
    sweep_interval: Duration,
    directory: Arc<Directory>,
    store: Arc<dyn DirectoryStore>,
    commands: mpsc::Receiver<ManagerCommand>,
    publisher: watch::Sender<Settings>,
}

/// Realm from configuration, falling back to the host, then the server uuid
pub fn derive_realm(realm: Option<&str>, host: &str, uuid: &Uuid) -> String {
    if let Some(realm) = realm.map(str::trim).filter(|r| !r.is_empty()) {
        return realm.to_string();
    }
    let host = host.trim();
    if host.is_empty() || LOCAL_NAMES.contains(&host) {
        uuid.to_string()
    } else {
        host.to_string()
    }
}

fn system_password(digest: DigestAlgorithm) -> String {
    digest.hash(&format!("system:{}", Uuid::new_v4()))
}

impl Manager {
    pub fn new(
        config: &Config,
        directory: Arc<Directory>,
        store: Arc<dyn DirectoryStore>,
    ) -> (Self, ManagerHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let mut manager = Self {
            uuid: Uuid::new_v4(),
            settings: Settings::default(),
            sweep_interval: Duration::from_secs(config.registration.sweep_interval_secs.max(1)),
            directory,
            store,
            commands,
            publisher: watch::Sender::new(Settings::default()),
        };
        manager.apply_config(config);

        let handle = ManagerHandle {
            commands: commands_tx,
            settings: manager.publisher.subscribe(),
        };
        (manager, handle)
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn publish(&self) {
        self.publisher.send_replace(self.settings.clone());
    }

    fn apply_config(&mut self, config: &Config) {
        let switch = &config.switch;
        let digest = DigestAlgorithm::parse(&switch.digest).unwrap_or_else(|| {
            warn!("Unknown digest {:?}, using MD5", switch.digest);
            DigestAlgorithm::Md5
        });
        let realm = derive_realm(switch.realm.as_deref(), &switch.host, &self.uuid);

        if switch.host != self.settings.hostname {
            info!("Starting as host {}", switch.host);
            self.settings.hostname = switch.host.clone();
        }
        if realm != self.settings.realm || digest != self.settings.digest {
            info!("Entering realm {}", realm);
            self.settings.realm = realm;
            self.settings.digest = digest;
            self.settings.system_password = system_password(digest);
        }
        self.settings.localnames = config.sip.localnames.clone();
        self.settings.mode = switch.mode.clone();
        self.settings.policy = config.registration;
        self.sweep_interval = Duration::from_secs(config.registration.sweep_interval_secs.max(1));
        self.publish();
    }

    async fn reload(&self) -> Result<ReloadReport, DomainError> {
        // rows are fetched before the directory lock is taken
        let rows = self.store.extensions().await?;
        let report = self.directory.reload(rows)?;
        self.update_gauge();
        Ok(report)
    }

    fn sweep(&self) {
        let expired = self.directory.sweep_expired();
        if !expired.is_empty() {
            info!("Expired {} endpoint(s)", expired.len());
        }
        self.update_gauge();
    }

    fn update_gauge(&self) {
        gauge!("sip_registered_endpoints").set(self.directory.total_endpoints() as f64);
    }

    /// Run until shutdown, until every handle is dropped, or until the
    /// directory reports an integrity error
    pub async fn run(mut self) -> Result<(), DomainError> {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut period = self.sweep_interval;

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("All manager handles dropped");
                        return Ok(());
                    };
                    match command {
                        ManagerCommand::ApplyConfig(config) => {
                            self.apply_config(&config);
                            if self.sweep_interval != period {
                                period = self.sweep_interval;
                                sweep = tokio::time::interval(period);
                                sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            }
                        }
                        ManagerCommand::SetMode(mode) => {
                            info!("Setting mode {}", mode);
                            self.settings.mode = mode;
                            self.publish();
                        }
                        ManagerCommand::SetAliases(aliases) => {
                            debug!("Apply names {:?}", aliases);
                            self.settings.aliases = aliases;
                            self.publish();
                        }
                        ManagerCommand::Reload(reply) => {
                            let result = self.reload().await;
                            let fatal = match &result {
                                Err(err) if err.is_fatal() => Some(err.clone()),
                                Err(err) => {
                                    error!("Directory reload failed: {}", err);
                                    None
                                }
                                Ok(_) => None,
                            };
                            if let Some(reply) = reply {
                                let _ = reply.send(result);
                            }
                            if let Some(err) = fatal {
                                error!("Directory integrity error: {}", err);
                                return Err(err);
                            }
                        }
                        ManagerCommand::Shutdown => {
                            info!("Manager shutting down");
                            return Ok(());
                        }
                    }
                }
                _ = sweep.tick() => self.sweep(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::value_objects::{Address, ContextId};
    use crate::domain::store::{ExtensionRow, MockDirectoryStore, StoreError};
    use crate::domain::directory::DirectoryError;

    fn config_with_realm(realm: Option<&str>, host: &str) -> Config {
        let mut config = Config::default();
        config.switch.realm = realm.map(str::to_string);
        config.switch.host = host.to_string();
        config
    }

    fn manager(store: MockDirectoryStore, config: &Config) -> (Manager, ManagerHandle, Arc<Directory>) {
        let directory = Arc::new(Directory::new());
        let (manager, handle) = Manager::new(config, directory.clone(), Arc::new(store));
        (manager, handle, directory)
    }

    #[test]
    fn test_realm_fallback() {
        let uuid = Uuid::new_v4();
        assert_eq!(derive_realm(Some("example.com"), "pbx", &uuid), "example.com");
        assert_eq!(derive_realm(Some("  "), "pbx.example.com", &uuid), "pbx.example.com");
        assert_eq!(derive_realm(None, "localhost", &uuid), uuid.to_string());
        assert_eq!(derive_realm(None, "localdomain", &uuid), uuid.to_string());
        assert_eq!(derive_realm(None, "", &uuid), uuid.to_string());
    }

    #[tokio::test]
    async fn test_initial_settings() {
        let mut config = config_with_realm(None, "local");
        config.switch.digest = "sha256".to_string();
        config.sip.localnames = vec!["pbx".to_string()];
        let (manager, handle, _) = manager(MockDirectoryStore::new(), &config);

        let settings = handle.settings();
        assert_eq!(settings.realm, manager.uuid().to_string());
        assert_eq!(settings.digest, DigestAlgorithm::Sha256);
        assert_eq!(settings.system_password.len(), 64);
        assert_eq!(settings.names(), vec!["pbx".to_string(), "local".to_string()]);
    }

    #[tokio::test]
    async fn test_realm_change_regenerates_password() {
        let config = config_with_realm(Some("a.example.com"), "");
        let (manager, handle, _) = manager(MockDirectoryStore::new(), &config);
        let mut settings_rx = handle.subscribe();
        let before = handle.settings();
        let task = tokio::spawn(manager.run());

        // same realm keeps the password
        handle.set_mode("night").await.unwrap();
        settings_rx.changed().await.unwrap();
        assert_eq!(settings_rx.borrow().mode, "night");
        assert_eq!(settings_rx.borrow().system_password, before.system_password);

        handle
            .apply_config(config_with_realm(Some("b.example.com"), ""))
            .await
            .unwrap();
        settings_rx.changed().await.unwrap();
        let after = settings_rx.borrow().clone();
        assert_eq!(after.realm, "b.example.com");
        assert_ne!(after.system_password, before.system_password);

        handle.set_aliases(vec!["sip.example.com".to_string()]).await.unwrap();
        settings_rx.changed().await.unwrap();
        assert_eq!(settings_rx.borrow().names(), vec!["sip.example.com".to_string()]);

        handle.shutdown().await.unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_reload_through_handle() {
        let mut store = MockDirectoryStore::new();
        store
            .expect_extensions()
            .times(1)
            .returning(|| Ok(vec![ExtensionRow::new(1001), ExtensionRow::new(1002)]));
        let (manager, handle, directory) = manager(store, &Config::default());
        let task = tokio::spawn(manager.run());

        let report = handle.reload().await.unwrap();
        assert_eq!(report.created, 2);
        assert!(directory.lookup("1002").is_some());

        drop(handle);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_store_failure_is_not_fatal() {
        let mut store = MockDirectoryStore::new();
        store
            .expect_extensions()
            .returning(|| Err(StoreError::Unavailable("down".to_string())));
        let (manager, handle, _) = manager(store, &Config::default());
        let task = tokio::spawn(manager.run());

        let err = handle.reload().await.unwrap_err();
        assert_eq!(err, DomainError::Store(StoreError::Unavailable("down".to_string())));

        handle.shutdown().await.unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_integrity_error_stops_manager() {
        let mut store = MockDirectoryStore::new();
        store
            .expect_extensions()
            .returning(|| Ok(vec![ExtensionRow::new(1001), ExtensionRow::new(1001)]));
        let (manager, handle, _) = manager(store, &Config::default());
        let task = tokio::spawn(manager.run());

        let err = handle.reload().await.unwrap_err();
        assert_eq!(err, DomainError::Directory(DirectoryError::DuplicateExtension(1001)));
        assert_eq!(task.await.unwrap(), Err(err));
        assert!(handle.set_mode("day").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweep() {
        let mut config = Config::default();
        config.registration.sweep_interval_secs = 10;
        let (manager, handle, directory) = manager(MockDirectoryStore::new(), &config);

        let id = directory.create_registry(ExtensionRow::new(1001)).unwrap();
        let ctx = ContextId::new();
        directory
            .register_endpoint(ctx, Address::parse("10.0.0.4", 5060).unwrap(), 15, id)
            .unwrap();
        let task = tokio::spawn(manager.run());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(directory.endpoint_count(ctx), 1);

        // expires at 15s, swept by the tick at 20s
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(directory.endpoint_count(ctx), 0);

        handle.shutdown().await.unwrap();
        assert!(task.await.unwrap().is_ok());
    }
}
