//! Store configuration module.
//!
//! This module provides configuration loading for the document store from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `DOCSTORE_BASE_DIRECTORY`: Directory where parked documents are written (default: `./data`)
//! - `DOCSTORE_MAX_DOCUMENT_COUNT`: Maximum number of documents kept in memory (default: unbounded)
//! - `DOCSTORE_MAX_DOCUMENT_BYTES`: Maximum bytes of documents kept in memory (default: unbounded)
//!
//! # Invariants
//!
//! - `base_directory` is always a valid path (may not exist yet)
//! - A ceiling of `None` means unbounded

use std::path::PathBuf;

/// Store configuration.
///
/// # Pre-conditions
///
/// When constructed via `from_env()`:
/// - All values that are set must be valid for their respective types
///
/// # Post-conditions
///
/// - `base_directory` is a valid path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory where parked documents are stored.
    /// A document keyed `scheme://host/a/b` is written to
    /// `{base_directory}/host/a/b.<crc>.json`, `<crc>` being the CRC32 of the
    /// whole key in hex.
    pub base_directory: PathBuf,
    /// Maximum number of documents resident in memory.
    pub max_document_count: Option<usize>,
    /// Maximum combined footprint of resident documents, in bytes.
    pub max_document_bytes: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from(Self::DEFAULT_BASE_DIRECTORY),
            max_document_count: None,
            max_document_bytes: None,
        }
    }
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl StoreConfig {
    /// Default base directory.
    pub const DEFAULT_BASE_DIRECTORY: &'static str = "./data";

    const BASE_DIRECTORY_VAR: &'static str = "DOCSTORE_BASE_DIRECTORY";
    const MAX_DOCUMENT_COUNT_VAR: &'static str = "DOCSTORE_MAX_DOCUMENT_COUNT";
    const MAX_DOCUMENT_BYTES_VAR: &'static str = "DOCSTORE_MAX_DOCUMENT_BYTES";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a ceiling is set but is not a non-negative integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// Used by `from_env` and by tests that must not touch the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_directory = lookup(Self::BASE_DIRECTORY_VAR)
            .filter(|value| !value.is_empty())
            .map_or_else(|| PathBuf::from(Self::DEFAULT_BASE_DIRECTORY), PathBuf::from);
        let max_document_count = Self::load_ceiling(&lookup, Self::MAX_DOCUMENT_COUNT_VAR)?;
        let max_document_bytes = Self::load_ceiling(&lookup, Self::MAX_DOCUMENT_BYTES_VAR)?;

        Ok(Self {
            base_directory,
            max_document_count,
            max_document_bytes,
        })
    }

    /// Load an optional ceiling.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is set but not a non-negative integer.
    fn load_ceiling<F>(lookup: &F, name: &str) -> Result<Option<usize>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(name) {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: format!("'{value}' is not a non-negative integer"),
                }),
            None => Ok(None),
        }
    }
}
