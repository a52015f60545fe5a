//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{KerbError, Result};
use crate::scanner::snapshot::SnapshotConfig;
use crate::scanner::tree::ScanConfig;

/// Recycle-bin folder name on Windows volumes.
pub const DEFAULT_TRASH_DIR_NAME: &str = "$RECYCLE.BIN";

/// Extensions listed individually in tree reports by default.
pub const DEFAULT_TRACKED_EXTENSIONS: &[&str] = &[
    ".py", ".txt", ".log", ".json", ".csv", ".html", ".exe", ".bat", ".ini", ".xml", ".yml",
];

/// Full analyzer configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub scan: ScanSettings,
    pub prescan: PrescanSettings,
    pub image: ImageSettings,
    pub paths: PathsConfig,
}

/// Tree report traversal settings (standard, deep and full modes).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanSettings {
    pub max_depth: usize,
    /// Depth used by `--deep` and by full scans.
    pub deep_max_depth: usize,
    pub max_entries_per_dir: usize,
    pub exclude_trash: bool,
    pub trash_dir_name: String,
    pub tracked_extensions: BTreeSet<String>,
    pub classify_scripts: bool,
    /// Bytes of each script handed to the classifier.
    pub script_sample_bytes: usize,
    pub follow_symlinks: bool,
}

/// Quick look-ahead traversal bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PrescanSettings {
    pub max_depth: usize,
    pub max_entries_per_dir: usize,
}

/// Snapshot image bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImageSettings {
    pub max_depth: usize,
    pub max_entries_per_dir: usize,
    /// Cumulative cap across the whole image walk.
    pub max_total_entries: usize,
    pub hash_sample_bytes: usize,
}

/// Filesystem paths used by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// Directory receiving reports, `.kbi` images and checksum records.
    pub output_dir: PathBuf,
    pub jsonl_log: PathBuf,
    /// Targets analyzed when none are given on the command line.
    pub default_roots: Vec<PathBuf>,
}

/// Which kind of tree report is being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Standard analysis with script classification.
    Standard,
    /// Standard analysis at the extended depth.
    Deep,
    /// Extended depth, no script classification.
    Full,
    /// Shallow look-ahead, never persisted.
    Prescan,
}

impl ScanMode {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Deep => "deep",
            Self::Full => "full (no script analysis)",
            Self::Prescan => "prescan",
        }
    }

    /// File name the report is saved under, if the mode persists one.
    #[must_use]
    pub const fn report_file_name(self) -> Option<&'static str> {
        match self {
            Self::Standard | Self::Deep => Some("disk_report.txt"),
            Self::Full => Some("full_scan_report.txt"),
            Self::Prescan => None,
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_depth: 4,
            deep_max_depth: 5,
            max_entries_per_dir: 200,
            exclude_trash: true,
            trash_dir_name: DEFAULT_TRASH_DIR_NAME.to_string(),
            tracked_extensions: DEFAULT_TRACKED_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            classify_scripts: true,
            script_sample_bytes: 10 * 1024,
            follow_symlinks: false,
        }
    }
}

impl Default for PrescanSettings {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_entries_per_dir: 50,
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_entries_per_dir: 100,
            max_total_entries: 500,
            hash_sample_bytes: 4096,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[KRB-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let data = home_dir.join(".local").join("share").join("kerberos");
        Self {
            config_file: home_dir.join(".config").join("kerberos").join("config.toml"),
            output_dir: PathBuf::from("."),
            jsonl_log: data.join("activity.jsonl"),
            default_roots: vec![PathBuf::from("/")],
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|e| KerbError::io(&path_buf, e))?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(KerbError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(|name| env::var(name).ok())?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for activity logs.
    ///
    /// FNV-1a over canonical JSON, stable across processes and releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Traversal configuration for one tree report invocation.
    #[must_use]
    pub fn scan_config(&self, mode: ScanMode) -> ScanConfig {
        let scan = &self.scan;
        let (max_depth, max_entries_per_dir, classify_scripts) = match mode {
            ScanMode::Standard => (scan.max_depth, scan.max_entries_per_dir, scan.classify_scripts),
            ScanMode::Deep => (
                scan.deep_max_depth,
                scan.max_entries_per_dir,
                scan.classify_scripts,
            ),
            ScanMode::Full => (scan.deep_max_depth, scan.max_entries_per_dir, false),
            ScanMode::Prescan => (
                self.prescan.max_depth,
                self.prescan.max_entries_per_dir,
                scan.classify_scripts,
            ),
        };
        ScanConfig {
            max_depth,
            max_entries_per_dir,
            exclude_trash: scan.exclude_trash,
            trash_dir_name: scan.trash_dir_name.clone(),
            tracked_extensions: ScanConfig::normalize_extensions(&scan.tracked_extensions),
            classify_scripts,
            script_sample_bytes: scan.script_sample_bytes,
            follow_symlinks: scan.follow_symlinks,
        }
    }

    /// Bounds for one snapshot image invocation.
    #[must_use]
    pub fn snapshot_config(&self) -> SnapshotConfig {
        SnapshotConfig {
            max_depth: self.image.max_depth,
            max_entries_per_dir: self.image.max_entries_per_dir,
            max_total_entries: self.image.max_total_entries,
            hash_sample_bytes: self.image.hash_sample_bytes,
            follow_symlinks: self.scan.follow_symlinks,
        }
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut var = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

        // scan
        if let Some(raw) = var("KERB_SCAN_MAX_DEPTH") {
            self.scan.max_depth = parse_env("KERB_SCAN_MAX_DEPTH", &raw)?;
        }
        if let Some(raw) = var("KERB_SCAN_DEEP_MAX_DEPTH") {
            self.scan.deep_max_depth = parse_env("KERB_SCAN_DEEP_MAX_DEPTH", &raw)?;
        }
        if let Some(raw) = var("KERB_SCAN_MAX_ENTRIES_PER_DIR") {
            self.scan.max_entries_per_dir = parse_env("KERB_SCAN_MAX_ENTRIES_PER_DIR", &raw)?;
        }
        if let Some(raw) = var("KERB_SCAN_EXCLUDE_TRASH") {
            self.scan.exclude_trash = parse_env("KERB_SCAN_EXCLUDE_TRASH", &raw)?;
        }
        if let Some(raw) = var("KERB_SCAN_TRASH_DIR_NAME") {
            self.scan.trash_dir_name = raw.trim().to_string();
        }
        if let Some(raw) = var("KERB_SCAN_TRACKED_EXTENSIONS") {
            self.scan.tracked_extensions = raw
                .split(',')
                .map(str::trim)
                .filter(|ext| !ext.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = var("KERB_SCAN_CLASSIFY_SCRIPTS") {
            self.scan.classify_scripts = parse_env("KERB_SCAN_CLASSIFY_SCRIPTS", &raw)?;
        }
        if let Some(raw) = var("KERB_SCAN_FOLLOW_SYMLINKS") {
            self.scan.follow_symlinks = parse_env("KERB_SCAN_FOLLOW_SYMLINKS", &raw)?;
        }

        // image
        if let Some(raw) = var("KERB_IMAGE_MAX_DEPTH") {
            self.image.max_depth = parse_env("KERB_IMAGE_MAX_DEPTH", &raw)?;
        }
        if let Some(raw) = var("KERB_IMAGE_MAX_ENTRIES_PER_DIR") {
            self.image.max_entries_per_dir = parse_env("KERB_IMAGE_MAX_ENTRIES_PER_DIR", &raw)?;
        }
        if let Some(raw) = var("KERB_IMAGE_MAX_TOTAL_ENTRIES") {
            self.image.max_total_entries = parse_env("KERB_IMAGE_MAX_TOTAL_ENTRIES", &raw)?;
        }

        // paths
        if let Some(raw) = var("KERB_PATHS_OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(raw);
        }
        if let Some(raw) = var("KERB_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }
        Ok(())
    }

    /// Canonicalize extension spellings and strip trailing slashes from roots.
    fn normalize(&mut self) {
        self.scan.tracked_extensions =
            ScanConfig::normalize_extensions(&self.scan.tracked_extensions);
        self.scan.trash_dir_name = self.scan.trash_dir_name.trim().to_string();

        for path in &mut self.paths.default_roots {
            let s = path.to_string_lossy();
            if s.len() > 1
                && let Some(stripped) = s.strip_suffix('/')
            {
                *path = PathBuf::from(stripped);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.scan.deep_max_depth < self.scan.max_depth {
            return Err(KerbError::InvalidConfig {
                details: format!(
                    "scan.deep_max_depth ({}) must be >= scan.max_depth ({})",
                    self.scan.deep_max_depth, self.scan.max_depth
                ),
            });
        }
        if self.scan.exclude_trash && self.scan.trash_dir_name.is_empty() {
            return Err(KerbError::InvalidConfig {
                details: "scan.trash_dir_name must be non-empty when exclude_trash is set"
                    .to_string(),
            });
        }
        if let Some(bad) = self
            .scan
            .tracked_extensions
            .iter()
            .find(|ext| {
                ext.strip_prefix('.').is_none_or(|stem| {
                    stem.is_empty() || stem.contains(|c: char| matches!(c, '.' | '/' | '\\'))
                })
            })
        {
            return Err(KerbError::InvalidConfig {
                details: format!("scan.tracked_extensions contains invalid entry {bad:?}"),
            });
        }
        if self.scan.script_sample_bytes == 0 {
            return Err(KerbError::InvalidConfig {
                details: "scan.script_sample_bytes must be > 0".to_string(),
            });
        }
        if self.image.hash_sample_bytes == 0 {
            return Err(KerbError::InvalidConfig {
                details: "image.hash_sample_bytes must be > 0".to_string(),
            });
        }
        if self.paths.default_roots.is_empty() {
            return Err(KerbError::InvalidConfig {
                details: "paths.default_roots must name at least one target".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| KerbError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use super::{Config, KerbError, ScanMode};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deep_depth_below_standard_rejected() {
        let mut cfg = Config::default();
        cfg.scan.deep_max_depth = 2;
        let err = cfg.validate().expect_err("expected invalid depth ordering");
        match err {
            KerbError::InvalidConfig { details } => assert!(details.contains("deep_max_depth")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_hash_sample_rejected() {
        let mut cfg = Config::default();
        cfg.image.hash_sample_bytes = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn extensions_normalized_to_lowercase_with_dot() {
        let mut cfg = Config::default();
        cfg.scan.tracked_extensions = ["PY", ".Txt", " md "]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        cfg.normalize();
        let exts: Vec<&str> = cfg
            .scan
            .tracked_extensions
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(exts, vec![".md", ".py", ".txt"]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn dotted_extension_rejected() {
        let mut cfg = Config::default();
        cfg.scan.tracked_extensions.insert(".tar.gz".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env = vars(&[
            ("KERB_SCAN_MAX_DEPTH", "3"),
            ("KERB_SCAN_EXCLUDE_TRASH", "false"),
            ("KERB_SCAN_TRACKED_EXTENSIONS", "rs, .TOML"),
            ("KERB_IMAGE_MAX_TOTAL_ENTRIES", "42"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env_overrides_from(|name| env.get(name).cloned())
            .expect("overrides parse");
        cfg.normalize();
        assert_eq!(cfg.scan.max_depth, 3);
        assert!(!cfg.scan.exclude_trash);
        assert!(cfg.scan.tracked_extensions.contains(".rs"));
        assert!(cfg.scan.tracked_extensions.contains(".toml"));
        assert_eq!(cfg.image.max_total_entries, 42);
    }

    #[test]
    fn env_invalid_number_rejected() {
        let env = vars(&[("KERB_SCAN_MAX_DEPTH", "deep")]);
        let mut cfg = Config::default();
        let err = cfg
            .apply_env_overrides_from(|name| env.get(name).cloned())
            .expect_err("expected parse failure");
        assert_eq!(err.code(), "KRB-1003");
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let env = vars(&[("KERB_SCAN_MAX_DEPTH", "   ")]);
        let mut cfg = Config::default();
        cfg.apply_env_overrides_from(|name| env.get(name).cloned())
            .expect("blank is ignored");
        assert_eq!(cfg.scan.max_depth, 4);
    }

    #[test]
    fn scan_modes_select_bounds() {
        let cfg = Config::default();
        let standard = cfg.scan_config(ScanMode::Standard);
        assert_eq!(standard.max_depth, 4);
        assert_eq!(standard.max_entries_per_dir, 200);
        assert!(standard.classify_scripts);

        let full = cfg.scan_config(ScanMode::Full);
        assert_eq!(full.max_depth, 5);
        assert!(!full.classify_scripts);

        let prescan = cfg.scan_config(ScanMode::Prescan);
        assert_eq!(prescan.max_depth, 2);
        assert_eq!(prescan.max_entries_per_dir, 50);

        assert_eq!(cfg.scan_config(ScanMode::Deep).max_depth, 5);
        assert_eq!(ScanMode::Prescan.report_file_name(), None);
    }

    #[test]
    fn snapshot_config_defaults() {
        let snap = Config::default().snapshot_config();
        assert_eq!(snap.max_depth, 5);
        assert_eq!(snap.max_entries_per_dir, 100);
        assert_eq!(snap.max_total_entries, 500);
        assert_eq!(snap.hash_sample_bytes, 4096);
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let err = Config::load(Some(Path::new("/definitely/not/here/kerberos.toml")))
            .expect_err("explicit missing path must fail");
        assert_eq!(err.code(), "KRB-1002");
    }

    #[test]
    fn load_reads_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[scan]\nmax_depth = 2\ntracked_extensions = [\"PY\"]\n\n[paths]\ndefault_roots = [\"/srv/\"]\n",
        )
        .unwrap();
        let cfg = Config::load(Some(&path)).expect("config loads");
        assert_eq!(cfg.scan.max_depth, 2);
        assert!(cfg.scan.tracked_extensions.contains(".py"));
        assert_eq!(cfg.paths.default_roots, vec![PathBuf::from("/srv")]);
        assert_eq!(cfg.image.max_total_entries, 500);
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn stable_hash_deterministic_and_sensitive() {
        let cfg = Config::default();
        let a = cfg.stable_hash().unwrap();
        assert_eq!(a, cfg.stable_hash().unwrap());
        assert_eq!(a.len(), 16);

        let mut changed = cfg;
        changed.scan.max_depth = 1;
        assert_ne!(a, changed.stable_hash().unwrap());
    }
}
