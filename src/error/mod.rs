use std::collections::HashMap;
use std::fmt;

use anyhow::Error as AnyhowError;
use serde::Serialize;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;

/// A structured error carrying a machine readable code, a message, and
/// optional context. Used as the cause payload of every [`MigrationError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppError {
    /// Machine readable error code.
    pub code: String,
    /// Human friendly message.
    pub message: String,
    /// Arbitrary key/value pairs that provide additional context.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
    /// Optional nested cause that preserves the error chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<AppError>>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Default code used when an upstream error does not expose a specific code.
    pub const UNKNOWN_CODE: &'static str = "APP/UNKNOWN";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: HashMap::new(),
            cause: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    /// Adds a contextual key/value pair to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets the nested cause for the error.
    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }

    /// True when this error or any nested cause carries `IO/NotFound`.
    pub fn is_not_found(&self) -> bool {
        let mut current = Some(self);
        while let Some(err) = current {
            if err.code == "IO/NotFound" {
                return true;
            }
            current = err.cause();
        }
        false
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            let mut keys: Vec<_> = self.context.iter().collect();
            keys.sort();
            write!(f, "[{}] {} ({:?})", self.code, self.message, keys)
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Collapses an anyhow chain into nested causes. The walk stops at the first
/// `AppError`, which keeps its own cause chain.
impl From<AnyhowError> for AppError {
    fn from(error: AnyhowError) -> Self {
        let mut layers = Vec::new();
        for layer in error.chain() {
            if let Some(app) = layer.downcast_ref::<AppError>() {
                layers.push(app.clone());
                break;
            }
            layers.push(AppError::new(AppError::UNKNOWN_CODE, layer.to_string()));
        }
        layers
            .into_iter()
            .rev()
            .reduce(|cause, outer| outer.with_cause(cause))
            .unwrap_or_else(|| AppError::new(AppError::UNKNOWN_CODE, error.to_string()))
    }
}

impl From<IoError> for AppError {
    fn from(error: IoError) -> Self {
        let code = format!("IO/{:?}", error.kind());
        let mut app_error = AppError::new(code, error.to_string());
        if let Some(os_code) = error.raw_os_error() {
            app_error = app_error.with_context("os_code", os_code.to_string());
        }
        app_error
    }
}

impl From<SerdeJsonError> for AppError {
    fn from(error: SerdeJsonError) -> Self {
        let code = if error.is_data() {
            "JSON/DATA"
        } else if error.is_syntax() {
            "JSON/SYNTAX"
        } else if error.is_eof() {
            "JSON/EOF"
        } else if error.is_io() {
            "JSON/IO"
        } else {
            "JSON/ERROR"
        };

        let mut app_error = AppError::new(code, error.to_string());
        let line = error.line();
        if line > 0 {
            app_error = app_error.with_context("line", line.to_string());
        }
        let column = error.column();
        if column > 0 {
            app_error = app_error.with_context("column", column.to_string());
        }
        app_error
    }
}

/// Outcome taxonomy of the migration protocol.
///
/// `AlreadyMigrated` is the expected steady state rather than a failure;
/// callers usually match on it and treat it as "nothing to do".
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    #[error("could not resolve legacy preferences location: {0}")]
    Lookup(#[source] AppError),
    #[error("profile migration already completed")]
    AlreadyMigrated,
    #[error("could not read legacy preferences: {0}")]
    Read(#[source] AppError),
    #[error("could not record migration completion: {0}")]
    Commit(#[source] AppError),
}

impl MigrationError {
    pub const LOOKUP_CODE: &'static str = "MIGRATION/LOOKUP";
    pub const ALREADY_MIGRATED_CODE: &'static str = "MIGRATION/ALREADY_MIGRATED";
    pub const READ_CODE: &'static str = "MIGRATION/READ";
    pub const COMMIT_CODE: &'static str = "MIGRATION/COMMIT";

    pub fn name(&self) -> &'static str {
        match self {
            MigrationError::Lookup(_) => "Lookup",
            MigrationError::AlreadyMigrated => "AlreadyMigrated",
            MigrationError::Read(_) => "Read",
            MigrationError::Commit(_) => "Commit",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            MigrationError::Lookup(_) => Self::LOOKUP_CODE,
            MigrationError::AlreadyMigrated => Self::ALREADY_MIGRATED_CODE,
            MigrationError::Read(_) => Self::READ_CODE,
            MigrationError::Commit(_) => Self::COMMIT_CODE,
        }
    }

    pub fn is_already_migrated(&self) -> bool {
        matches!(self, MigrationError::AlreadyMigrated)
    }

    /// The underlying cause, absent only for `AlreadyMigrated`.
    pub fn app_error(&self) -> Option<&AppError> {
        match self {
            MigrationError::Lookup(err) | MigrationError::Read(err) | MigrationError::Commit(err) => {
                Some(err)
            }
            MigrationError::AlreadyMigrated => None,
        }
    }
}

impl From<MigrationError> for AppError {
    fn from(error: MigrationError) -> Self {
        let code = error.code();
        match error {
            MigrationError::AlreadyMigrated => {
                AppError::new(code, "Profile migration already completed.")
            }
            MigrationError::Lookup(cause) => {
                AppError::new(code, "Could not resolve legacy preferences location.")
                    .with_cause(cause)
            }
            MigrationError::Read(cause) => {
                AppError::new(code, "Could not read legacy preferences.").with_cause(cause)
            }
            MigrationError::Commit(cause) => {
                AppError::new(code, "Could not record migration completion.").with_cause(cause)
            }
        }
    }
}
