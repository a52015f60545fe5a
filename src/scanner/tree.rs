//! Depth- and width-bounded tree rendering with optional script classification.
//!
//! The renderer never materializes the tree: each directory is listed once,
//! its lines are appended to the output, and its children are rendered by
//! recursion with a longer prefix. Peak memory follows the current depth, not
//! the number of entries.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::path::Path;

use crate::core::config::{DEFAULT_TRACKED_EXTENSIONS, DEFAULT_TRASH_DIR_NAME};
use crate::core::paths::entry_name;
use crate::scanner::classifier::{DEFAULT_SAMPLE_BYTES, PatternClassifier, dotted_extension};
use crate::scanner::listing::{ChildKind, ListedChild, list_dir};

const BRANCH: &str = "├── ";
const LAST_BRANCH: &str = "└── ";
const PIPE: &str = "│   ";
const SPACE: &str = "    ";

/// Traversal settings for one render call.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub max_depth: usize,
    pub max_entries_per_dir: usize,
    pub exclude_trash: bool,
    pub trash_dir_name: String,
    /// Lowercase, leading-dot extensions listed individually.
    pub tracked_extensions: BTreeSet<String>,
    pub classify_scripts: bool,
    pub script_sample_bytes: usize,
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_entries_per_dir: 200,
            exclude_trash: true,
            trash_dir_name: DEFAULT_TRASH_DIR_NAME.to_string(),
            tracked_extensions: DEFAULT_TRACKED_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            classify_scripts: true,
            script_sample_bytes: DEFAULT_SAMPLE_BYTES,
            follow_symlinks: false,
        }
    }
}

impl ScanConfig {
    /// Trim, lowercase, and prefix a dot onto each extension. Blank entries
    /// are dropped.
    #[must_use]
    pub fn normalize_extensions(extensions: &BTreeSet<String>) -> BTreeSet<String> {
        extensions
            .iter()
            .map(|ext| ext.trim().to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext != ".")
            .map(|ext| {
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{ext}")
                }
            })
            .collect()
    }

    #[must_use]
    pub fn is_tracked(&self, path: &Path) -> bool {
        dotted_extension(path).is_some_and(|ext| self.tracked_extensions.contains(&ext))
    }

    #[must_use]
    pub fn is_trash(&self, name: &str) -> bool {
        self.exclude_trash && name.eq_ignore_ascii_case(&self.trash_dir_name)
    }
}

/// Rendered lines plus a count of what the width cap left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedTree {
    pub lines: Vec<String>,
    /// Entries skipped by `max_entries_per_dir`, summed over every listed
    /// directory. Never shown in the lines themselves.
    pub dropped_entries: usize,
}

/// Renders bounded directory trees as display lines.
#[derive(Debug)]
pub struct TreeRenderer {
    config: ScanConfig,
    classifier: PatternClassifier,
}

impl TreeRenderer {
    #[must_use]
    pub fn new(config: ScanConfig) -> Self {
        let classifier = PatternClassifier::new(config.script_sample_bytes);
        Self { config, classifier }
    }

    #[must_use]
    pub const fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Render the tree below `root`. Never fails: listing and read problems
    /// become inline lines.
    #[must_use]
    pub fn render(&self, root: &Path) -> Vec<String> {
        self.render_tree(root).lines
    }

    /// Like [`Self::render`], also counting entries dropped by the width cap.
    #[must_use]
    pub fn render_tree(&self, root: &Path) -> RenderedTree {
        let mut tree = RenderedTree::default();
        if self.config.max_depth > 0 {
            let name = entry_name(root);
            if self.config.is_trash(&name) {
                tree.lines.push(format!("{name}/ (excluded)"));
                return tree;
            }
        }
        self.render_dir(root, 0, "", &mut tree);
        tree
    }

    fn render_dir(&self, dir: &Path, depth: usize, prefix: &str, out: &mut RenderedTree) {
        let max_depth = self.config.max_depth;
        if depth >= max_depth {
            out.lines.push(format!(
                "{prefix}{LAST_BRANCH}[...] (depth limit {depth}/{max_depth})"
            ));
            return;
        }

        let Ok(listing) = list_dir(
            dir,
            self.config.max_entries_per_dir,
            self.config.follow_symlinks,
        ) else {
            out.lines.push(format!("{prefix}[access denied]"));
            return;
        };
        out.dropped_entries += listing.dropped;

        let mut dirs: Vec<&ListedChild> = Vec::new();
        let mut tracked: Vec<&ListedChild> = Vec::new();
        let mut others = 0usize;
        for child in &listing.children {
            match child.kind {
                ChildKind::Directory => dirs.push(child),
                ChildKind::File if self.config.is_tracked(&child.path) => tracked.push(child),
                ChildKind::File | ChildKind::Symlink | ChildKind::Special => others += 1,
                ChildKind::Unreadable => {}
            }
        }
        let unreadable = listing.unreadable_count();

        let total =
            dirs.len() + tracked.len() + usize::from(others > 0) + usize::from(unreadable > 0);
        let mut idx = 0usize;
        let mut branch = || {
            idx += 1;
            let last = idx == total;
            (if last { LAST_BRANCH } else { BRANCH }, last)
        };

        for child in dirs {
            let (marker, last) = branch();
            if self.config.is_trash(&child.name) {
                out.lines.push(format!("{prefix}{marker}{}/ (excluded)", child.name));
                continue;
            }
            out.lines.push(format!("{prefix}{marker}{}/", child.name));
            let child_prefix = format!("{prefix}{}", if last { SPACE } else { PIPE });
            self.render_dir(&child.path, depth + 1, &child_prefix, out);
        }

        for child in tracked {
            let (marker, _) = branch();
            let verdict = if self.config.classify_scripts {
                self.classifier.classify_file(&child.path)
            } else {
                None
            };
            match verdict {
                Some(verdict) => out.lines.push(format!("{prefix}{marker}{}  [{verdict}]", child.name)),
                None => out.lines.push(format!("{prefix}{marker}{}", child.name)),
            }
        }

        if others > 0 {
            let (marker, _) = branch();
            let noun = if others == 1 { "file" } else { "files" };
            out.lines.push(format!("{prefix}{marker}[{others} other {noun}]"));
        }

        if unreadable > 0 {
            let (marker, _) = branch();
            let noun = if unreadable == 1 { "entry" } else { "entries" };
            out.lines.push(format!("{prefix}{marker}[{unreadable} unreadable {noun}]"));
        }
    }
}
