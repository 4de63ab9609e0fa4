//! One-time migration of single-profile legacy preferences into the
//! multi-profile store.

pub mod atomic;
pub mod config;
pub mod error;
pub mod loader;
pub mod locator;
pub mod logging;
pub mod marker;
pub mod migrator;
pub mod platform;
pub mod policy;
pub mod prefs;
pub mod profile_sink;
pub mod state_store;

pub use error::{AppError, AppResult, MigrationError};
pub use locator::{LegacyLocator, MarkerLocation, PlatformLocator, StateKey};
pub use logging::init_logging;
pub use marker::CommitToken;
pub use migrator::{LoadedPrefs, MigrationOutcome, Migrator};
pub use platform::{Platform, UserId};
pub use prefs::NormalizedPrefs;
pub use profile_sink::{JsonProfileSink, ProfileSink};
pub use state_store::{FileStateStore, MemoryStateStore, StateStore};
