//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use kerberos_analyzer::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, ScanMode};
pub use crate::core::errors::{KerbError, Result};

// Platform
pub use crate::platform::pal::{Platform, Volume, VolumeCapacity, detect_platform};

// Scanner
pub use crate::scanner::classifier::{ClassificationVerdict, PatternClassifier};
pub use crate::scanner::integrity::{IntegrityRecord, VerificationReport, seal, verify, verify_image};
pub use crate::scanner::snapshot::{Manifest, SnapshotBuilder, SnapshotConfig, write_image};
pub use crate::scanner::syntax::{PythonSyntaxChecker, SyntaxChecker, SyntaxStatus};
pub use crate::scanner::tree::{ScanConfig, TreeRenderer};

// Report
pub use crate::report::TreeReport;
