//! Shared path manipulation utilities.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, normalized path.
///
/// Uses `fs::canonicalize` when the path exists (symlinks resolved); otherwise
/// the path is made absolute relative to CWD and `..`/`.` are folded
/// syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

/// Last name component of a scan target, ignoring trailing separators and
/// drive colons (`C:\` gives `c`, `/` gives an empty string).
#[must_use]
pub fn target_basename(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim_matches(|c| matches!(c, ':' | '\\' | '/'));
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Name of an entry inside a snapshot or tree, lossily decoded.
#[must_use]
pub fn entry_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.to_string_lossy().into_owned(), |name| {
            name.to_string_lossy().into_owned()
        })
}
