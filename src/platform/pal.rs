//! Host platform collaborator: mounted volumes and their capacity.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::errors::{KerbError, Result};

const PROC_MOUNTS: &str = "/proc/self/mounts";

/// Capacity figures for the volume holding a path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeCapacity {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
}

impl VolumeCapacity {
    #[must_use]
    pub const fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }
}

/// A mounted, scannable volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    pub path: PathBuf,
    pub device: String,
    pub fs_type: String,
}

/// Platform abstraction used by the report layer and the CLI.
pub trait Platform: Send + Sync {
    /// Mounted volumes, pseudo filesystems excluded, longest path first.
    fn volumes(&self) -> Result<Vec<Volume>>;

    /// Capacity of the volume holding `path`.
    fn capacity(&self, path: &Path) -> Result<VolumeCapacity>;

    /// Whether `path` is itself a volume mount point.
    fn is_volume_root(&self, path: &Path) -> Result<bool> {
        Ok(self.volumes()?.iter().any(|volume| volume.path == path))
    }
}

/// Linux implementation using `/proc/self/mounts` + `statvfs`.
#[derive(Debug)]
pub struct LinuxPlatform {
    mounts_cache: RwLock<Option<(Vec<Volume>, Instant)>>,
    cache_ttl: Duration,
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mounts_cache: RwLock::new(None),
            cache_ttl: Duration::from_secs(5),
        }
    }

    fn cached_volumes(&self) -> Result<Vec<Volume>> {
        {
            let cache = self.mounts_cache.read();
            if let Some((volumes, collected_at)) = &*cache
                && collected_at.elapsed() < self.cache_ttl
            {
                return Ok(volumes.clone());
            }
        }

        let raw = fs::read_to_string(PROC_MOUNTS).map_err(|e| KerbError::io(PROC_MOUNTS, e))?;
        let volumes = parse_proc_mounts(&raw)?;

        *self.mounts_cache.write() = Some((volumes.clone(), Instant::now()));
        Ok(volumes)
    }
}

impl Platform for LinuxPlatform {
    fn volumes(&self) -> Result<Vec<Volume>> {
        self.cached_volumes()
    }

    #[cfg(unix)]
    fn capacity(&self, path: &Path) -> Result<VolumeCapacity> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(|error| KerbError::VolumeStats {
            path: path.to_path_buf(),
            details: error.to_string(),
        })?;
        let fragment = stat.fragment_size();
        Ok(VolumeCapacity {
            total_bytes: stat.blocks().saturating_mul(fragment),
            free_bytes: stat.blocks_free().saturating_mul(fragment),
            available_bytes: stat.blocks_available().saturating_mul(fragment),
        })
    }

    #[cfg(not(unix))]
    fn capacity(&self, path: &Path) -> Result<VolumeCapacity> {
        Err(KerbError::VolumeStats {
            path: path.to_path_buf(),
            details: "statvfs is unavailable on this platform".to_string(),
        })
    }
}

/// In-memory mock implementation for deterministic tests.
#[derive(Debug, Clone, Default)]
pub struct MockPlatform {
    volumes: Vec<Volume>,
    capacity_by_volume: HashMap<PathBuf, VolumeCapacity>,
}

impl MockPlatform {
    #[must_use]
    pub fn new(volumes: Vec<Volume>, capacity_by_volume: HashMap<PathBuf, VolumeCapacity>) -> Self {
        Self {
            volumes,
            capacity_by_volume,
        }
    }
}

impl Platform for MockPlatform {
    fn volumes(&self) -> Result<Vec<Volume>> {
        Ok(self.volumes.clone())
    }

    fn capacity(&self, path: &Path) -> Result<VolumeCapacity> {
        let volume = find_volume(path, &self.volumes).ok_or_else(|| KerbError::VolumeStats {
            path: path.to_path_buf(),
            details: "mock volume not found".to_string(),
        })?;
        self.capacity_by_volume
            .get(&volume.path)
            .copied()
            .ok_or_else(|| KerbError::VolumeStats {
                path: volume.path.clone(),
                details: "mock capacity not found".to_string(),
            })
    }
}

/// Detect active platform implementation.
pub fn detect_platform() -> Result<Arc<dyn Platform>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPlatform::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(KerbError::UnsupportedPlatform {
            details: "only Linux is currently implemented".to_string(),
        })
    }
}

/// `<os>/<arch>` string for report headers.
#[must_use]
pub fn platform_label() -> String {
    format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH)
}

fn parse_proc_mounts(raw: &str) -> Result<Vec<Volume>> {
    let mut volumes: Vec<Volume> = Vec::new();
    let mut malformed = 0usize;
    for line in raw.lines().filter(|line| !line.trim().is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            eprintln!("[KRB-PLATFORM] warning: skipping malformed mount line: {line}");
            malformed += 1;
            continue;
        }
        let fs_type = fields[2];
        if is_pseudo_fs(fs_type) {
            continue;
        }
        let path = unescape_mount_path(fields[1]);
        // Later entries shadow earlier mounts on the same path.
        volumes.retain(|volume| volume.path != path);
        volumes.push(Volume {
            path,
            device: fields[0].to_string(),
            fs_type: fs_type.to_string(),
        });
    }
    if volumes.is_empty() && malformed > 0 {
        return Err(KerbError::MountParse {
            details: format!("{malformed} malformed lines and no usable mount entries"),
        });
    }
    volumes.sort_by(|left, right| {
        right
            .path
            .as_os_str()
            .len()
            .cmp(&left.path.as_os_str().len())
            .then_with(|| left.path.cmp(&right.path))
    });
    Ok(volumes)
}

fn find_volume<'a>(path: &Path, volumes: &'a [Volume]) -> Option<&'a Volume> {
    volumes
        .iter()
        .filter(|volume| path.starts_with(&volume.path))
        .max_by_key(|volume| volume.path.as_os_str().len())
}

fn is_pseudo_fs(fs_type: &str) -> bool {
    matches!(
        fs_type.to_ascii_lowercase().as_str(),
        "proc"
            | "sysfs"
            | "devpts"
            | "devtmpfs"
            | "tmpfs"
            | "ramfs"
            | "cgroup"
            | "cgroup2"
            | "mqueue"
            | "debugfs"
            | "tracefs"
            | "securityfs"
            | "pstore"
            | "bpf"
            | "configfs"
            | "fusectl"
            | "autofs"
            | "binfmt_misc"
            | "hugetlbfs"
            | "nsfs"
            | "rpc_pipefs"
            | "efivarfs"
    )
}

/// Decode octal escape sequences (`\NNN`) used by the Linux kernel.
/// Returns a `PathBuf` via `OsString` to preserve raw bytes.
fn unescape_mount_path(raw: &str) -> PathBuf {
    let mut bytes = Vec::with_capacity(raw.len());
    let raw_bytes = raw.as_bytes();
    let mut i = 0;
    while i < raw_bytes.len() {
        if raw_bytes[i] == b'\\' && i + 3 < raw_bytes.len() {
            let digits = &raw_bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let val = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(val) {
                    bytes.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        bytes.push(raw_bytes[i]);
        i += 1;
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_vec(bytes))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}
