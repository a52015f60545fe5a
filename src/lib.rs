#![forbid(unsafe_code)]

//! Kerberos analyzer (`kerb`): bounded disk inventory for low-resource machines.
//!
//! Three products, all built from a single depth- and width-capped traversal:
//! 1. **Tree reports** with tracked files annotated by script classification
//!    (syntax check, imported modules, risk signatures)
//! 2. **Snapshot images** (`.kbi`) listing directories and files with partial
//!    content digests, under a global entry cap
//! 3. **Integrity records** (`.sha256`) sealing a finalized image so later
//!    corruption or edits are detected
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use kerberos_analyzer::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use kerberos_analyzer::core::config::Config;
//! use kerberos_analyzer::scanner::tree::{ScanConfig, TreeRenderer};
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod platform;
pub mod report;
pub mod scanner;
