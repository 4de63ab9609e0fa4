//! Load → adopt → commit, wired once per platform.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::MigrationConfig;
use crate::loader::LegacyLoader;
use crate::locator::{
    HomeDirLocator, LegacyLocator, OsUserLookup, PlatformLocator, StateKeyLocator,
};
use crate::marker::{write_marker, CommitToken};
use crate::platform::{LegacyBackend, Platform, UserId};
use crate::policy::{ManagedPolicyOverride, PolicyOverride, PolicySource};
use crate::prefs::NormalizedPrefs;
use crate::profile_sink::ProfileSink;
use crate::state_store::StateStore;
use crate::{AppError, MigrationError};

/// Result of a successful load: the prefs to adopt and the token that
/// finalises the migration once they are adopted.
#[derive(Debug)]
pub struct LoadedPrefs {
    pub prefs: NormalizedPrefs,
    pub token: CommitToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOutcome {
    Migrated,
    AlreadyMigrated,
    /// Prefs were adopted but the marker could not be written; the next
    /// start will migrate again.
    MigratedCommitPending,
}

pub struct Migrator {
    locator: Box<dyn PlatformLocator>,
    loader: LegacyLoader,
    policy: Option<Box<dyn PolicyOverride>>,
    store: Arc<dyn StateStore>,
    default_control_url: String,
}

impl Migrator {
    pub fn new(
        locator: Box<dyn PlatformLocator>,
        store: Arc<dyn StateStore>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            locator,
            loader: LegacyLoader::new(store.clone()),
            policy: None,
            store,
            default_control_url: config.default_control_url,
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn PolicyOverride>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Standard wiring: state-key locator or home-directory locator by
    /// platform, plus the policy override on managed platforms when a policy
    /// source is available.
    pub fn for_platform(
        platform: Platform,
        store: Arc<dyn StateStore>,
        policy: Option<Box<dyn PolicySource>>,
        config: MigrationConfig,
    ) -> Self {
        let locator: Box<dyn PlatformLocator> = match platform.backend() {
            LegacyBackend::StateStore => Box::new(StateKeyLocator::new(platform)),
            LegacyBackend::UserDirectory => Box::new(HomeDirLocator::with_subpath(
                platform,
                OsUserLookup,
                &config.legacy_subpath,
            )),
        };
        let default_control_url = config.default_control_url.clone();
        let migrator = Self::new(locator, store, config);
        match policy {
            Some(source) if platform.is_managed() => migrator.with_policy(Box::new(
                ManagedPolicyOverride::new(source, default_control_url),
            )),
            _ => migrator,
        }
    }

    pub fn platform(&self) -> Platform {
        self.locator.platform()
    }

    pub fn resolve(&self, user: Option<&UserId>) -> Result<LegacyLocator, MigrationError> {
        self.locator.resolve(user).map_err(|err| {
            warn!(
                target: "legacy_prefs",
                event = "legacy_prefs_lookup_failed",
                platform = %self.platform(),
                code = err.code()
            );
            MigrationError::Lookup(err)
        })
    }

    /// Resolve, check the marker, read, apply policy, then fill defaults.
    ///
    /// Side-effect free: repeating it before a successful commit yields the
    /// same prefs.
    pub fn load(&self, user: Option<&UserId>) -> Result<LoadedPrefs, MigrationError> {
        let locator = self.resolve(user)?;
        info!(
            target: "legacy_prefs",
            event = "legacy_prefs_locator_resolved",
            platform = %self.platform(),
            locator = %locator.log_label()
        );

        let (prefs, token) = self.loader.load(&locator)?;
        let mut prefs = match &self.policy {
            Some(policy) => policy.apply(prefs),
            None => prefs,
        };
        if prefs.control_url.trim().is_empty() {
            prefs.control_url = self.default_control_url.clone();
        }
        Ok(LoadedPrefs { prefs, token })
    }

    /// Record that the prefs from the matching load were adopted.
    pub fn commit(&self, token: CommitToken) -> Result<(), MigrationError> {
        write_marker(token, self.store.as_ref()).map_err(|err| {
            error!(
                target: "legacy_prefs",
                event = "legacy_prefs_commit_failed",
                code = err.code()
            );
            MigrationError::Commit(err)
        })
    }

    /// Run the whole protocol against `sink`. A failed commit is tolerated
    /// because a later run repeats the migration from scratch.
    pub fn migrate<S: ProfileSink + ?Sized>(
        &self,
        user: Option<&UserId>,
        sink: &S,
    ) -> Result<MigrationOutcome, AppError> {
        let LoadedPrefs { prefs, token } = match self.load(user) {
            Ok(loaded) => loaded,
            Err(MigrationError::AlreadyMigrated) => return Ok(MigrationOutcome::AlreadyMigrated),
            Err(err) => return Err(err.into()),
        };

        sink.adopt(&prefs).map_err(|err| {
            AppError::new("MIGRATION/ADOPT", "Could not store migrated preferences.")
                .with_cause(err)
        })?;

        match self.commit(token) {
            Ok(()) => Ok(MigrationOutcome::Migrated),
            Err(err) => {
                warn!(
                    target: "legacy_prefs",
                    event = "legacy_prefs_commit_deferred",
                    error = %err
                );
                Ok(MigrationOutcome::MigratedCommitPending)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONTROL_URL;
    use crate::locator::StateKey;
    use crate::policy::{
        MemoryPolicySource, ALLOW_INCOMING_CONNECTIONS, LEGACY_INSTALLER_CONTROL_URL, LOGIN_URL,
    };
    use crate::state_store::MemoryStateStore;
    use crate::AppResult;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Captured(RefCell<Vec<NormalizedPrefs>>);

    impl ProfileSink for Captured {
        fn adopt(&self, prefs: &NormalizedPrefs) -> AppResult<()> {
            self.0.borrow_mut().push(prefs.clone());
            Ok(())
        }
    }

    struct Refusing;

    impl ProfileSink for Refusing {
        fn adopt(&self, _prefs: &NormalizedPrefs) -> AppResult<()> {
            Err(AppError::new("STORE/FULL", "profile store is full"))
        }
    }

    fn android_store() -> Arc<MemoryStateStore> {
        Arc::new(
            MemoryStateStore::new()
                .with_entry("ipn-android", br#"{"ShieldsUp":false,"WantRunning":true}"#.to_vec()),
        )
    }

    #[test]
    fn migrate_runs_once() {
        let store = android_store();
        let migrator = Migrator::for_platform(
            Platform::Android,
            store.clone(),
            None,
            MigrationConfig::default(),
        );
        let sink = Captured::default();

        assert_eq!(migrator.migrate(None, &sink).unwrap(), MigrationOutcome::Migrated);
        assert_eq!(
            migrator.migrate(None, &sink).unwrap(),
            MigrationOutcome::AlreadyMigrated
        );

        let adopted = sink.0.borrow();
        assert_eq!(adopted.len(), 1);
        assert_eq!(adopted[0].control_url, DEFAULT_CONTROL_URL);
        assert_eq!(
            adopted[0].passthrough.get("WantRunning"),
            Some(&serde_json::json!(true))
        );
        assert!(store.contains(&StateKey::from("ipn-android/_migrated-to-profiles")));
    }

    #[test]
    fn adopt_failure_leaves_migration_pending() {
        let store = android_store();
        let migrator = Migrator::for_platform(
            Platform::Android,
            store.clone(),
            None,
            MigrationConfig::default(),
        );

        let err = migrator.migrate(None, &Refusing).unwrap_err();
        assert_eq!(err.code(), "MIGRATION/ADOPT");
        assert_eq!(err.cause().map(AppError::code), Some("STORE/FULL"));
        assert_eq!(store.keys(), vec![StateKey::from("ipn-android")]);
        assert!(migrator.load(None).is_ok(), "load stays repeatable");
    }

    #[test]
    fn policy_is_ignored_on_unmanaged_platforms() {
        let migrator = Migrator::for_platform(
            Platform::Android,
            android_store(),
            Some(Box::new(
                MemoryPolicySource::new().with(ALLOW_INCOMING_CONNECTIONS, "never"),
            )),
            MigrationConfig::default(),
        );
        let loaded = migrator.load(None).unwrap();
        assert!(!loaded.prefs.shields_up);
    }

    #[test]
    fn explicit_policy_is_applied_during_load() {
        let migrator = Migrator::new(
            Box::new(StateKeyLocator::new(Platform::Android)),
            android_store(),
            MigrationConfig::default(),
        )
        .with_policy(Box::new(ManagedPolicyOverride::new(
            MemoryPolicySource::new().with(ALLOW_INCOMING_CONNECTIONS, "never"),
            DEFAULT_CONTROL_URL,
        )));
        let loaded = migrator.load(None).unwrap();
        assert!(loaded.prefs.shields_up);
    }

    #[test]
    fn configured_default_control_url_is_used() {
        let config = MigrationConfig {
            default_control_url: "https://headscale.internal".into(),
            ..MigrationConfig::default()
        };
        let migrator = Migrator::for_platform(
            Platform::Other,
            Arc::new(MemoryStateStore::new()),
            None,
            config,
        );
        let loaded = migrator.load(None).unwrap();
        assert_eq!(loaded.prefs.control_url, "https://headscale.internal");
    }

    #[test]
    fn installer_login_url_fills_empty_disk_value() {
        let store = Arc::new(
            MemoryStateStore::new().with_entry("_daemon", br#"{"ControlURL":""}"#.to_vec()),
        );
        let migrator = Migrator::new(
            Box::new(StateKeyLocator::new(Platform::Other)),
            store,
            MigrationConfig::default(),
        )
        .with_policy(Box::new(ManagedPolicyOverride::new(
            MemoryPolicySource::new().with(LOGIN_URL, LEGACY_INSTALLER_CONTROL_URL),
            DEFAULT_CONTROL_URL,
        )));
        let loaded = migrator.load(None).unwrap();
        assert_eq!(loaded.prefs.control_url, LEGACY_INSTALLER_CONTROL_URL);
    }

    #[test]
    fn windows_without_user_is_lookup_error() {
        let migrator = Migrator::for_platform(
            Platform::Windows,
            Arc::new(MemoryStateStore::new()),
            None,
            MigrationConfig::default(),
        );
        let err = migrator.load(None).unwrap_err();
        assert_eq!(err.name(), "Lookup");
    }
}
