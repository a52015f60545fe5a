//! KRB-prefixed error types with structured error codes.
//!
//! Only conditions the caller must act on live here. Per-entry problems met
//! during a walk (unlistable directory, unreadable file) are rendered inline
//! as report or manifest content and never become a `KerbError`.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, KerbError>;

/// Top-level error type for the Kerberos analyzer.
#[derive(Debug, Error)]
pub enum KerbError {
    #[error("[KRB-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[KRB-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[KRB-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[KRB-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[KRB-2001] volume capacity query failed for {path}: {details}")]
    VolumeStats { path: PathBuf, details: String },

    #[error("[KRB-2002] mount table parse failure: {details}")]
    MountParse { details: String },

    #[error("[KRB-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[KRB-2102] malformed checksum record in {path}: {details}")]
    ChecksumParse { path: PathBuf, details: String },

    #[error("[KRB-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[KRB-3003] could not persist {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl KerbError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "KRB-1001",
            Self::MissingConfig { .. } => "KRB-1002",
            Self::ConfigParse { .. } => "KRB-1003",
            Self::UnsupportedPlatform { .. } => "KRB-1101",
            Self::VolumeStats { .. } => "KRB-2001",
            Self::MountParse { .. } => "KRB-2002",
            Self::Serialization { .. } => "KRB-2101",
            Self::ChecksumParse { .. } => "KRB-2102",
            Self::Io { .. } => "KRB-3002",
            Self::Write { .. } => "KRB-3003",
        }
    }

    /// Whether retrying might resolve the failure. Recorded with each
    /// logged error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Write { .. } | Self::VolumeStats { .. }
        )
    }

    /// Convenience constructor for read-side IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for an artifact that could not be persisted.
    #[must_use]
    pub fn write(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for KerbError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for KerbError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
