use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{short_hash, LegacyLocator, PlatformLocator};
use crate::platform::{Platform, UserId};
use crate::{AppError, AppResult};

/// Per-user legacy directory, relative to the user's home.
pub const DEFAULT_LEGACY_SUBPATH: &str = "AppData/Local/Tailscale";

/// OS identity lookup keyed by user identifier.
pub trait UserLookup: Send + Sync {
    /// Home directory recorded for `user`. An empty path means the account
    /// exists but has no home directory.
    fn home_dir(&self, user: &UserId) -> AppResult<PathBuf>;
}

impl<T: UserLookup + ?Sized> UserLookup for Box<T> {
    fn home_dir(&self, user: &UserId) -> AppResult<PathBuf> {
        (**self).home_dir(user)
    }
}

/// Locator for platforms that kept legacy prefs in a directory below each
/// user's home.
pub struct HomeDirLocator<L> {
    platform: Platform,
    lookup: L,
    subpath: PathBuf,
}

impl<L: UserLookup> HomeDirLocator<L> {
    pub fn new(platform: Platform, lookup: L) -> Self {
        Self::with_subpath(platform, lookup, DEFAULT_LEGACY_SUBPATH)
    }

    /// `subpath` uses `/` separators regardless of host.
    pub fn with_subpath(platform: Platform, lookup: L, subpath: &str) -> Self {
        let subpath = subpath
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty())
            .collect::<PathBuf>();
        Self {
            platform,
            lookup,
            subpath,
        }
    }

    pub fn subpath(&self) -> &Path {
        &self.subpath
    }
}

impl<L: UserLookup> PlatformLocator for HomeDirLocator<L> {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn resolve(&self, user: Option<&UserId>) -> AppResult<LegacyLocator> {
        let user = user.ok_or_else(|| {
            AppError::new(
                "LOCATOR/USER_REQUIRED",
                "A user identity is required to locate legacy preferences.",
            )
            .with_context("platform", self.platform.as_str())
        })?;

        let home = self.lookup.home_dir(user).map_err(|err| {
            warn!(
                target: "legacy_prefs",
                event = "legacy_prefs_user_lookup_failed",
                user = %user,
                code = err.code()
            );
            AppError::new("LOCATOR/USER_LOOKUP", "Failed to look up user account.")
                .with_context("user", user.to_string())
                .with_cause(err)
        })?;

        if home.as_os_str().is_empty() {
            return Err(AppError::new(
                "LOCATOR/NO_HOME_DIR",
                format!("user {:?} does not have a home directory", user.as_str()),
            )
            .with_context("user", user.to_string()));
        }

        let dir = home.join(&self.subpath);
        debug!(
            target: "legacy_prefs",
            event = "legacy_prefs_dir_resolved",
            user = %user,
            path_hash = %short_hash(&dir)
        );
        Ok(LegacyLocator::Directory(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedHomes(HashMap<String, PathBuf>);

    impl UserLookup for FixedHomes {
        fn home_dir(&self, user: &UserId) -> AppResult<PathBuf> {
            self.0.get(user.as_str()).cloned().ok_or_else(|| {
                AppError::new("USER/UNKNOWN", "unknown user").with_context("user", user.as_str())
            })
        }
    }

    fn homes() -> FixedHomes {
        let mut map = HashMap::new();
        map.insert("S-1-5-21-1000".to_string(), PathBuf::from("/home/alice"));
        map.insert("S-1-5-21-1001".to_string(), PathBuf::new());
        FixedHomes(map)
    }

    #[test]
    fn builds_fixed_subpath_below_home() {
        let locator = HomeDirLocator::new(Platform::Windows, homes());
        let resolved = locator
            .resolve(Some(&UserId::from("S-1-5-21-1000")))
            .expect("known user resolves");
        assert_eq!(
            resolved,
            LegacyLocator::Directory(
                PathBuf::from("/home/alice")
                    .join("AppData")
                    .join("Local")
                    .join("Tailscale")
            )
        );
    }

    #[test]
    fn custom_subpath_is_honoured() {
        let locator = HomeDirLocator::with_subpath(Platform::Windows, homes(), "app-legacy");
        let resolved = locator
            .resolve(Some(&UserId::from("S-1-5-21-1000")))
            .unwrap();
        assert_eq!(
            resolved,
            LegacyLocator::Directory(PathBuf::from("/home/alice/app-legacy"))
        );
    }

    #[test]
    fn unknown_user_is_a_lookup_error() {
        let locator = HomeDirLocator::new(Platform::Windows, homes());
        let err = locator
            .resolve(Some(&UserId::from("S-1-5-21-9999")))
            .unwrap_err();
        assert_eq!(err.code(), "LOCATOR/USER_LOOKUP");
        assert_eq!(err.cause().map(AppError::code), Some("USER/UNKNOWN"));
    }

    #[test]
    fn empty_home_is_rejected() {
        let locator = HomeDirLocator::new(Platform::Windows, homes());
        let err = locator
            .resolve(Some(&UserId::from("S-1-5-21-1001")))
            .unwrap_err();
        assert_eq!(err.code(), "LOCATOR/NO_HOME_DIR");
        assert!(err.message().contains("does not have a home directory"));
    }

    #[test]
    fn missing_user_is_rejected() {
        let locator = HomeDirLocator::new(Platform::Windows, homes());
        let err = locator.resolve(None).unwrap_err();
        assert_eq!(err.code(), "LOCATOR/USER_REQUIRED");
    }

    #[test]
    fn resolution_is_deterministic() {
        let locator = HomeDirLocator::new(Platform::Windows, homes());
        let user = UserId::from("S-1-5-21-1000");
        assert_eq!(
            locator.resolve(Some(&user)).unwrap(),
            locator.resolve(Some(&user)).unwrap()
        );
    }
}
