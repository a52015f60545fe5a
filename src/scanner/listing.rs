//! Sorted, width-capped directory listing shared by the tree and snapshot
//! passes.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

/// What a listed child turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Directory,
    File,
    /// A symlink that was not followed.
    Symlink,
    /// Sockets, FIFOs, devices.
    Special,
    /// The entry vanished or could not be stat'ed.
    Unreadable,
}

#[derive(Debug, Clone)]
pub struct ListedChild {
    /// Lossily decoded file name.
    pub name: String,
    pub path: PathBuf,
    pub kind: ChildKind,
    /// Full size in bytes for files; zero otherwise.
    pub size_bytes: u64,
}

/// One directory's children, sorted by name and capped.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub children: Vec<ListedChild>,
    /// Entries the listing itself failed to yield (no usable name).
    pub unnamed_failures: usize,
    /// Entries dropped by the width cap.
    pub dropped: usize,
}

impl Listing {
    #[must_use]
    pub fn unreadable_count(&self) -> usize {
        self.unnamed_failures
            + self
                .children
                .iter()
                .filter(|child| child.kind == ChildKind::Unreadable)
                .count()
    }
}

/// List `dir`, sort child names, keep at most `limit`, then stat each kept
/// child. Fails only when the directory itself cannot be listed.
pub fn list_dir(dir: &Path, limit: usize, follow_symlinks: bool) -> std::io::Result<Listing> {
    let mut names = Vec::new();
    let mut unnamed_failures = 0usize;
    for entry in fs::read_dir(dir)? {
        match entry {
            Ok(entry) => names.push(entry.file_name()),
            Err(_) => unnamed_failures += 1,
        }
    }
    names.sort();

    let total = names.len() + unnamed_failures;
    names.truncate(limit);
    let unnamed_failures = unnamed_failures.min(limit - names.len());
    let dropped = total - names.len() - unnamed_failures;

    let children = names
        .into_iter()
        .map(|name| {
            let path = dir.join(&name);
            let (kind, size_bytes) = match metadata_for_path(&path, follow_symlinks) {
                Ok(meta) => classify_metadata(&meta),
                Err(_) => (ChildKind::Unreadable, 0),
            };
            ListedChild {
                name: name.to_string_lossy().into_owned(),
                path,
                kind,
                size_bytes,
            }
        })
        .collect();

    Ok(Listing {
        children,
        unnamed_failures,
        dropped,
    })
}

fn classify_metadata(meta: &fs::Metadata) -> (ChildKind, u64) {
    let file_type = meta.file_type();
    if file_type.is_dir() {
        (ChildKind::Directory, 0)
    } else if file_type.is_file() {
        (ChildKind::File, meta.len())
    } else if file_type.is_symlink() {
        (ChildKind::Symlink, 0)
    } else {
        (ChildKind::Special, 0)
    }
}

fn metadata_for_path(path: &Path, follow_symlinks: bool) -> std::io::Result<fs::Metadata> {
    if follow_symlinks {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lists_sorted_and_typed() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("b_dir")).unwrap();
        fs::write(tmp.path().join("c.txt"), "hello").unwrap();
        fs::write(tmp.path().join("a.py"), "").unwrap();

        let listing = list_dir(tmp.path(), 10, false).unwrap();
        let names: Vec<&str> = listing.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a.py", "b_dir", "c.txt"]);
        assert_eq!(listing.children[1].kind, ChildKind::Directory);
        assert_eq!(listing.children[2].kind, ChildKind::File);
        assert_eq!(listing.children[2].size_bytes, 5);
        assert_eq!(listing.dropped, 0);
    }

    #[test]
    fn width_cap_keeps_first_names_in_sort_order() {
        let tmp = TempDir::new().unwrap();
        for name in ["e", "d", "c", "b", "a"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        let listing = list_dir(tmp.path(), 2, false).unwrap();
        let names: Vec<&str> = listing.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(listing.dropped, 3);
    }

    #[test]
    fn zero_limit_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a"), "").unwrap();
        let listing = list_dir(tmp.path(), 0, false).unwrap();
        assert!(listing.children.is_empty());
        assert_eq!(listing.dropped, 1);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(list_dir(&tmp.path().join("nope"), 10, false).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_reported_unless_followed() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("link")).unwrap();

        let listing = list_dir(tmp.path(), 10, false).unwrap();
        let link = listing.children.iter().find(|c| c.name == "link").unwrap();
        assert_eq!(link.kind, ChildKind::Symlink);

        let listing = list_dir(tmp.path(), 10, true).unwrap();
        let link = listing.children.iter().find(|c| c.name == "link").unwrap();
        assert_eq!(link.kind, ChildKind::Directory);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_followed_symlink_is_unreadable() {
        let tmp = TempDir::new().unwrap();
        std::os::unix::fs::symlink(tmp.path().join("missing"), tmp.path().join("dangling"))
            .unwrap();
        let listing = list_dir(tmp.path(), 10, true).unwrap();
        assert_eq!(listing.children[0].kind, ChildKind::Unreadable);
        assert_eq!(listing.unreadable_count(), 1);
    }
}
