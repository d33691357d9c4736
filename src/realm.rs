//! Realm handle tying the subscription store, sync session and events together.

use crate::error::{Result, SyncError};
use crate::events::NotificationHub;
use crate::schema::Schema;
use crate::subscriptions::{MutableSubscriptionSet, SubscriptionSet, SubscriptionStore};
use crate::sync::{NullTransport, SyncSession, SyncTransport};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Magic bytes for the realm manifest.
const REALM_MAGIC: &[u8; 4] = b"FSX\0";

/// Current realm format version.
const REALM_VERSION: u8 = 1;

const WAL_FILE: &str = "subscriptions.wal";

/// Callback type for [`InitialSubscriptions`].
pub type InitialUpdate =
    dyn Fn(&mut MutableSubscriptionSet<'_>, &Realm) -> Result<()> + Send + Sync;

/// Subscriptions to create when a realm is opened.
#[derive(Clone)]
pub struct InitialSubscriptions {
    pub update: Arc<InitialUpdate>,

    /// Run on every open, not only when the realm is created.
    pub rerun_on_open: bool,
}

impl InitialSubscriptions {
    pub fn new<F>(update: F) -> Self
    where
        F: Fn(&mut MutableSubscriptionSet<'_>, &Realm) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            update: Arc::new(update),
            rerun_on_open: false,
        }
    }

    pub fn rerun_on_open(mut self) -> Self {
        self.rerun_on_open = true;
        self
    }
}

impl fmt::Debug for InitialSubscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitialSubscriptions")
            .field("rerun_on_open", &self.rerun_on_open)
            .finish_non_exhaustive()
    }
}

/// How the realm decides which objects to sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// Client-declared queries.
    Flexible,
    /// A fixed partition value. Subscriptions are unavailable.
    Partition(String),
}

/// Sync section of a realm configuration.
#[derive(Clone)]
pub struct SyncConfig {
    pub mode: SyncMode,

    /// Where committed versions are delivered.
    pub transport: Arc<dyn SyncTransport>,

    pub initial_subscriptions: Option<InitialSubscriptions>,
}

impl SyncConfig {
    pub fn flexible(transport: impl SyncTransport + 'static) -> Self {
        Self {
            mode: SyncMode::Flexible,
            transport: Arc::new(transport),
            initial_subscriptions: None,
        }
    }

    pub fn partition(value: impl Into<String>, transport: impl SyncTransport + 'static) -> Self {
        Self {
            mode: SyncMode::Partition(value.into()),
            transport: Arc::new(transport),
            initial_subscriptions: None,
        }
    }

    pub fn with_initial_subscriptions(mut self, initial: InitialSubscriptions) -> Self {
        self.initial_subscriptions = Some(initial);
        self
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("mode", &self.mode)
            .field("initial_subscriptions", &self.initial_subscriptions)
            .finish_non_exhaustive()
    }
}

/// Realm configuration.
#[derive(Clone, Debug)]
pub struct RealmConfig {
    /// Directory holding the realm's files.
    pub path: PathBuf,

    /// Whether to create the realm if it doesn't exist.
    pub create_if_missing: bool,

    /// Object types, used to validate queries locally. Empty disables the checks.
    pub schema: Schema,

    /// `None` for a local-only realm.
    pub sync: Option<SyncConfig>,

    /// WAL entries kept before the log is rewritten as a checkpoint.
    pub wal_compact_threshold: usize,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./realm"),
            create_if_missing: true,
            schema: Schema::new(),
            sync: None,
            wal_compact_threshold: 1000,
        }
    }
}

struct RealmInner {
    config: RealmConfig,

    /// Exclusive lock, released on close.
    lock_file: Mutex<Option<File>>,

    store: SubscriptionStore,
}

/// An open realm.
///
/// Cloning is cheap and every clone refers to the same realm. The directory
/// lock is held until [`close`](Realm::close) or until the last clone (and
/// every subscription set or wait derived from it) is dropped.
#[derive(Clone)]
pub struct Realm {
    inner: Arc<RealmInner>,
}

impl Realm {
    /// Open a realm, creating it if allowed.
    ///
    /// Replays persisted subscriptions, delivers a still-pending version
    /// again, then runs the configured initial subscriptions when the realm
    /// was just created or `rerun_on_open` is set.
    pub fn open(config: RealmConfig) -> Result<Self> {
        let created = if config.path.join("MANIFEST").exists() {
            false
        } else if config.create_if_missing {
            fs::create_dir_all(&config.path)?;
            true
        } else {
            return Err(SyncError::NotInitialized);
        };

        let lock_file = Self::acquire_lock(&config.path)?;
        if created {
            Self::write_manifest(&config.path)?;
        } else {
            Self::verify_manifest(&config.path)?;
        }

        let transport: Arc<dyn SyncTransport> = match &config.sync {
            Some(sync) => Arc::clone(&sync.transport),
            None => Arc::new(NullTransport),
        };
        let store = SubscriptionStore::open(
            &config.path.join(WAL_FILE),
            transport,
            config.wal_compact_threshold,
        )?;

        info!(path = %config.path.display(), created, "realm opened");

        let realm = Realm {
            inner: Arc::new(RealmInner {
                config,
                lock_file: Mutex::new(Some(lock_file)),
                store,
            }),
        };

        if realm.is_flexible() {
            if let Err(e) = realm.inner.store.resend() {
                warn!(error = %e, "failed to re-deliver pending subscription set");
            }
            realm.run_initial_subscriptions(created)?;
        }

        Ok(realm)
    }

    fn run_initial_subscriptions(&self, created: bool) -> Result<()> {
        let initial = match self
            .inner
            .config
            .sync
            .as_ref()
            .and_then(|s| s.initial_subscriptions.clone())
        {
            Some(initial) => initial,
            None => return Ok(()),
        };
        if !created && !initial.rerun_on_open {
            return Ok(());
        }

        let mut subscriptions = self.subscriptions()?;
        subscriptions.update_no_wait(|mutable, realm| (initial.update)(mutable, realm))?;
        info!(version = %subscriptions.version(), "initial subscriptions applied");
        Ok(())
    }

    /// Handle on the latest subscription set.
    ///
    /// Only available with flexible sync.
    pub fn subscriptions(&self) -> Result<SubscriptionSet> {
        self.check_flexible()?;
        Ok(SubscriptionSet::new(self.clone(), self.inner.store.latest()))
    }

    /// Acknowledgement and rejection entry points for the sync service.
    pub fn sync_session(&self) -> Result<SyncSession> {
        self.check_flexible()?;
        Ok(SyncSession::new(self.clone()))
    }

    /// Commit and state change notifications.
    pub fn events(&self) -> &NotificationHub {
        self.inner.store.events()
    }

    /// Close the realm: pending waits fail with `RealmClosed`, event
    /// channels are dropped and the directory lock is released.
    pub fn close(&self) {
        self.inner.store.close();
        self.inner.lock_file.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.store.is_closed()
    }

    pub fn path(&self) -> &Path {
        &self.inner.config.path
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.config.schema
    }

    pub fn config(&self) -> &RealmConfig {
        &self.inner.config
    }

    pub(crate) fn store(&self) -> &SubscriptionStore {
        &self.inner.store
    }

    fn is_flexible(&self) -> bool {
        matches!(
            self.inner.config.sync,
            Some(SyncConfig {
                mode: SyncMode::Flexible,
                ..
            })
        )
    }

    fn check_flexible(&self) -> Result<()> {
        self.inner.store.ensure_open()?;
        match &self.inner.config.sync {
            None => Err(SyncError::SyncDisabled),
            Some(sync) => match sync.mode {
                SyncMode::Flexible => Ok(()),
                SyncMode::Partition(_) => Err(SyncError::PartitionSyncEnabled),
            },
        }
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(REALM_MAGIC)?;
        file.write_all(&[REALM_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != REALM_MAGIC {
            return Err(SyncError::InvalidFormat("Invalid realm magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != REALM_VERSION {
            return Err(SyncError::InvalidFormat(format!(
                "Unsupported realm version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| SyncError::Locked)?;

        Ok(lock_file)
    }
}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("path", &self.inner.config.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;
    use crate::subscriptions::SubscriptionOptions;
    use crate::types::Version;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> RealmConfig {
        RealmConfig {
            path: dir.path().join("realm"),
            sync: Some(SyncConfig::flexible(NullTransport)),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_realm() {
        let dir = TempDir::new().unwrap();
        let realm = Realm::open(test_config(&dir)).unwrap();

        assert!(realm.path().join("MANIFEST").exists());
        assert!(realm.path().join(WAL_FILE).exists());
        assert_eq!(realm.subscriptions().unwrap().version(), Version(0));
    }

    #[test]
    fn test_realm_lock() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let realm = Realm::open(config.clone()).unwrap();

        // Second open should fail to acquire lock
        let result = Realm::open(config.clone());
        assert!(matches!(result, Err(SyncError::Locked)));

        realm.close();
        assert!(Realm::open(config).is_ok());
    }

    #[test]
    fn test_missing_realm() {
        let dir = TempDir::new().unwrap();
        let config = RealmConfig {
            create_if_missing: false,
            ..test_config(&dir)
        };
        assert!(matches!(Realm::open(config), Err(SyncError::NotInitialized)));
    }

    #[test]
    fn test_invalid_manifest() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        fs::create_dir_all(&config.path).unwrap();
        fs::write(config.path.join("MANIFEST"), b"RST\0\x01").unwrap();

        assert!(matches!(
            Realm::open(config),
            Err(SyncError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_subscriptions_require_flexible_sync() {
        let dir = TempDir::new().unwrap();

        let local = Realm::open(RealmConfig {
            sync: None,
            ..test_config(&dir)
        })
        .unwrap();
        assert!(matches!(local.subscriptions(), Err(SyncError::SyncDisabled)));
        assert!(matches!(local.sync_session(), Err(SyncError::SyncDisabled)));
        local.close();

        let partitioned = Realm::open(RealmConfig {
            sync: Some(SyncConfig::partition("owner=1", NullTransport)),
            ..test_config(&dir)
        })
        .unwrap();
        let err = partitioned.subscriptions().unwrap_err();
        assert!(matches!(err, SyncError::PartitionSyncEnabled));
        assert!(err.to_string().contains("partition based sync"));
    }

    #[test]
    fn test_closed_realm() {
        let dir = TempDir::new().unwrap();
        let realm = Realm::open(test_config(&dir)).unwrap();
        let mut subs = realm.subscriptions().unwrap();

        realm.close();
        assert!(realm.is_closed());
        assert!(matches!(realm.subscriptions(), Err(SyncError::RealmClosed)));
        let result = subs.update_no_wait(|m, _| {
            m.add(&Query::objects("Cat"), SubscriptionOptions::default())?;
            Ok(())
        });
        assert!(matches!(result, Err(SyncError::RealmClosed)));
    }

    #[test]
    fn test_initial_subscriptions_on_create() {
        let dir = TempDir::new().unwrap();
        let initial = InitialSubscriptions::new(|m, _| {
            m.add(&Query::objects("Cat"), SubscriptionOptions::named("cats"))?;
            Ok(())
        });
        let config = RealmConfig {
            sync: Some(SyncConfig::flexible(NullTransport).with_initial_subscriptions(initial)),
            ..test_config(&dir)
        };

        let realm = Realm::open(config).unwrap();
        let subs = realm.subscriptions().unwrap();
        assert_eq!(subs.version(), Version(1));
        assert!(subs.find_by_name("cats").is_some());
    }
}
