//! Bounded snapshot manifests (`.kbi` images).
//!
//! A snapshot is a pre-order listing of a subtree with sizes and short
//! partial-content digests, bounded three ways: a depth cap, a per-directory
//! sampling cap, and one global entry cap shared by the whole walk. Once the
//! global cap is reached a single limit notice is appended and nothing else
//! is visited.

#![allow(missing_docs)]

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::errors::Result;
use crate::core::fsio::write_atomic;
use crate::core::paths::{resolve_absolute_path, target_basename};
use crate::scanner::integrity::{IntegrityRecord, record_path_for, seal, sha256_hex};
use crate::scanner::listing::{ChildKind, list_dir};

/// Hex characters kept from each file's partial digest.
pub const PARTIAL_DIGEST_HEX_LEN: usize = 8;

/// Manifest file extension.
pub const IMAGE_EXTENSION: &str = "kbi";

const HEADER_RULE_WIDTH: usize = 60;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Bounds for one snapshot pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotConfig {
    /// Directories deeper than this get a depth notice instead of a listing.
    pub max_depth: usize,
    pub max_entries_per_dir: usize,
    /// Regular entries allowed across the whole walk.
    pub max_total_entries: usize,
    pub hash_sample_bytes: usize,
    pub follow_symlinks: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_entries_per_dir: 100,
            max_total_entries: 500,
            hash_sample_bytes: 4096,
            follow_symlinks: false,
        }
    }
}

/// Digest over a file's leading bytes, or the read-failure sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PartialDigest {
    Hex(String),
    ReadError,
}

impl fmt::Display for PartialDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hex(hex) => f.write_str(hex),
            Self::ReadError => f.write_str("err"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LimitNotice {
    /// A directory sat below the depth cap and was not listed.
    Depth {
        depth: usize,
        max_depth: usize,
        emitted: usize,
    },
    /// The global entry cap was reached; the walk stopped here.
    Global { cap: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManifestEntry {
    Directory {
        rel_path: String,
    },
    File {
        rel_path: String,
        size_bytes: u64,
        digest: PartialDigest,
    },
    AccessDenied {
        rel_path: String,
    },
    /// Listed, but its type could not be determined.
    Unreadable {
        rel_path: String,
    },
    Limit(LimitNotice),
}

impl ManifestEntry {
    /// Directory and file entries count toward the global cap; notices do not.
    #[must_use]
    pub const fn is_regular(&self) -> bool {
        matches!(self, Self::Directory { .. } | Self::File { .. })
    }

    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Directory { rel_path } => format!("D {rel_path}/"),
            Self::File {
                rel_path,
                size_bytes,
                digest,
            } => format!("F {rel_path} | {size_bytes} bytes | HASH:{digest}"),
            Self::AccessDenied { rel_path } => format!("# ACCESS DENIED: {rel_path}"),
            Self::Unreadable { rel_path } => format!("# UNREADABLE: {rel_path}"),
            Self::Limit(LimitNotice::Depth {
                depth,
                max_depth,
                emitted,
            }) => format!("[...] (limit reached: depth {depth}/{max_depth}, {emitted} entries)"),
            Self::Limit(LimitNotice::Global { cap }) => {
                format!("[...] (limit reached: {cap} entries)")
            }
        }
    }
}

/// A finished snapshot. Immutable; identified by its rendered text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub generated_at: String,
    pub target: PathBuf,
    pub entries: Vec<ManifestEntry>,
    /// The global entry cap cut the walk short.
    pub truncated: bool,
}

impl Manifest {
    #[must_use]
    pub fn regular_entries(&self) -> usize {
        self.entries.iter().filter(|e| e.is_regular()).count()
    }

    /// Full manifest text: header, separator, one line per entry, joined by
    /// newlines with no trailing newline.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.entries.len() + 3);
        lines.push(format!("KERBEROS IMAGE - {}", self.generated_at));
        lines.push(format!("Target: {}", self.target.display()));
        lines.push("-".repeat(HEADER_RULE_WIDTH));
        lines.extend(self.entries.iter().map(ManifestEntry::render));
        lines.join("\n")
    }

    /// `kerb_image_<basename>.kbi`, basename lowercased with spaces as `_`.
    #[must_use]
    pub fn file_name(&self) -> String {
        image_file_name(&self.target)
    }
}

/// Manifest file name for a snapshot target.
#[must_use]
pub fn image_file_name(target: &Path) -> String {
    let base = target_basename(target).to_lowercase().replace(' ', "_");
    let base = if base.is_empty() { "root".to_string() } else { base };
    format!("kerb_image_{base}.{IMAGE_EXTENSION}")
}

/// Shared across the recursion: how many regular entries have been
/// appended and whether the global cap already stopped the walk.
#[derive(Debug)]
struct SnapshotBudget {
    emitted: usize,
    cap: usize,
    exhausted: bool,
}

impl SnapshotBudget {
    const fn new(cap: usize) -> Self {
        Self {
            emitted: 0,
            cap,
            exhausted: false,
        }
    }

    /// Reserve room for one regular entry. The first refusal appends the
    /// global notice.
    fn try_take(&mut self, entries: &mut Vec<ManifestEntry>) -> bool {
        if self.exhausted {
            return false;
        }
        if self.emitted >= self.cap {
            self.exhausted = true;
            entries.push(ManifestEntry::Limit(LimitNotice::Global { cap: self.cap }));
            return false;
        }
        self.emitted += 1;
        true
    }
}

/// Builds manifests for a subtree.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    config: SnapshotConfig,
}

impl SnapshotBuilder {
    #[must_use]
    pub const fn new(config: SnapshotConfig) -> Self {
        Self { config }
    }

    /// Snapshot `root`, stamped with the current local time.
    #[must_use]
    pub fn build(&self, root: &Path) -> Manifest {
        let generated_at = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.build_at(root, generated_at)
    }

    /// Snapshot `root` with an explicit header timestamp.
    #[must_use]
    pub fn build_at(&self, root: &Path, generated_at: String) -> Manifest {
        let mut entries = Vec::new();
        let mut budget = SnapshotBudget::new(self.config.max_total_entries);
        self.walk(root, "", 0, &mut budget, &mut entries);
        Manifest {
            generated_at,
            target: resolve_absolute_path(root),
            entries,
            truncated: budget.exhausted,
        }
    }

    fn walk(
        &self,
        dir: &Path,
        rel: &str,
        depth: usize,
        budget: &mut SnapshotBudget,
        entries: &mut Vec<ManifestEntry>,
    ) {
        if budget.exhausted {
            return;
        }
        if depth > self.config.max_depth {
            entries.push(ManifestEntry::Limit(LimitNotice::Depth {
                depth,
                max_depth: self.config.max_depth,
                emitted: budget.emitted,
            }));
            return;
        }

        let Ok(listing) = list_dir(
            dir,
            self.config.max_entries_per_dir,
            self.config.follow_symlinks,
        ) else {
            let rel_path = if rel.is_empty() { "." } else { rel };
            entries.push(ManifestEntry::AccessDenied {
                rel_path: rel_path.to_string(),
            });
            return;
        };

        for child in listing.children {
            let rel_path = if rel.is_empty() {
                child.name.clone()
            } else {
                format!("{rel}/{}", child.name)
            };
            match child.kind {
                ChildKind::Directory => {
                    if !budget.try_take(entries) {
                        return;
                    }
                    entries.push(ManifestEntry::Directory {
                        rel_path: rel_path.clone(),
                    });
                    self.walk(&child.path, &rel_path, depth + 1, budget, entries);
                    if budget.exhausted {
                        return;
                    }
                }
                ChildKind::File => {
                    if !budget.try_take(entries) {
                        return;
                    }
                    entries.push(ManifestEntry::File {
                        rel_path,
                        size_bytes: child.size_bytes,
                        digest: partial_digest(&child.path, self.config.hash_sample_bytes),
                    });
                }
                ChildKind::Unreadable => entries.push(ManifestEntry::Unreadable { rel_path }),
                ChildKind::Symlink | ChildKind::Special => {}
            }
        }
    }
}

/// First 8 hex chars of SHA-256 over at most `limit` leading bytes.
#[must_use]
pub fn partial_digest(path: &Path, limit: usize) -> PartialDigest {
    let mut sample = Vec::with_capacity(limit.min(64 * 1024));
    let read = File::open(path).and_then(|file| file.take(limit as u64).read_to_end(&mut sample));
    if read.is_err() {
        return PartialDigest::ReadError;
    }
    let mut hex = sha256_hex(&sample);
    hex.truncate(PARTIAL_DIGEST_HEX_LEN);
    PartialDigest::Hex(hex)
}

/// Paths and record produced by [`write_image`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageArtifacts {
    pub manifest_path: PathBuf,
    pub record_path: PathBuf,
    pub record: IntegrityRecord,
    pub regular_entries: usize,
    pub truncated: bool,
}

/// Persist a manifest and its integrity record under `output_dir`. The
/// record is sealed over exactly the bytes written.
pub fn write_image(manifest: &Manifest, output_dir: &Path) -> Result<ImageArtifacts> {
    let name = manifest.file_name();
    let manifest_path = output_dir.join(&name);
    let text = manifest.to_text();
    write_atomic(&manifest_path, text.as_bytes())?;

    let record = seal(&text, &name);
    let record_path = record_path_for(&manifest_path);
    write_atomic(&record_path, record.to_line().as_bytes())?;

    Ok(ImageArtifacts {
        manifest_path,
        record_path,
        record,
        regular_entries: manifest.regular_entries(),
        truncated: manifest.truncated,
    })
}
