//! Text report assembled from one tree rendering per scan target.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::config::ScanMode;
use crate::core::errors::Result;
use crate::core::fsio::write_atomic;
use crate::platform::pal::{Platform, platform_label};
use crate::scanner::tree::{ScanConfig, TreeRenderer};

const RULE_WIDTH: usize = 60;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LICENSE_LINE: &str = "License: GNU GPLv3 - https://www.gnu.org/licenses/gpl-3.0.html";
const SOURCE_LINE: &str = "Source: https://github.com/victorpozen/kerberos";
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Used/total capacity shown for a target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpaceLine {
    Capacity { used_bytes: u64, total_bytes: u64 },
    /// The target is not a volume root.
    NotVolume,
    /// The target is a volume root but its capacity could not be read.
    Unavailable { reason: String },
}

impl SpaceLine {
    /// Capacity line for `target`, consulting the platform only when the
    /// target is a mount point.
    #[must_use]
    pub fn probe(platform: Option<&dyn Platform>, target: &Path) -> Self {
        let Some(platform) = platform else {
            return Self::NotVolume;
        };
        match platform.is_volume_root(target) {
            Ok(false) => Self::NotVolume,
            Ok(true) => match platform.capacity(target) {
                Ok(cap) => Self::Capacity {
                    used_bytes: cap.used_bytes(),
                    total_bytes: cap.total_bytes,
                },
                Err(err) => Self::Unavailable {
                    reason: err.to_string(),
                },
            },
            Err(err) => Self::Unavailable {
                reason: err.to_string(),
            },
        }
    }

    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Capacity {
                used_bytes,
                total_bytes,
            } => format!(
                "{:.1} / {:.1} GB",
                *used_bytes as f64 / GIB,
                *total_bytes as f64 / GIB
            ),
            Self::NotVolume => "N/A".to_string(),
            Self::Unavailable { .. } => "unavailable".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSection {
    pub target: PathBuf,
    pub space: SpaceLine,
    pub tree: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportHeader {
    pub generated_at: String,
    pub system: String,
    pub mode: ScanMode,
    pub max_depth: usize,
    pub trash_excluded: bool,
}

/// A complete disk report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeReport {
    pub header: ReportHeader,
    pub sections: Vec<TargetSection>,
}

impl TreeReport {
    /// Render every target with `config`, stamped with the current local time.
    #[must_use]
    pub fn build(
        targets: &[PathBuf],
        mode: ScanMode,
        config: &ScanConfig,
        platform: Option<&dyn Platform>,
    ) -> Self {
        let generated_at = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self::build_at(targets, mode, config, platform, generated_at)
    }

    #[must_use]
    pub fn build_at(
        targets: &[PathBuf],
        mode: ScanMode,
        config: &ScanConfig,
        platform: Option<&dyn Platform>,
        generated_at: String,
    ) -> Self {
        let renderer = TreeRenderer::new(config.clone());
        let sections = targets
            .iter()
            .map(|target| TargetSection {
                target: target.clone(),
                space: SpaceLine::probe(platform, target),
                tree: renderer.render(target),
            })
            .collect();
        Self {
            header: ReportHeader {
                generated_at,
                system: platform_label(),
                mode,
                max_depth: config.max_depth,
                trash_excluded: config.exclude_trash,
            },
            sections,
        }
    }

    /// Number of rendered tree lines across all targets.
    #[must_use]
    pub fn tree_lines(&self) -> usize {
        self.sections.iter().map(|s| s.tree.len()).sum()
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let header = &self.header;
        let mut lines = vec![
            rule.clone(),
            format!(
                "KERBEROS REPORT - DISK ANALYSIS v{}",
                env!("CARGO_PKG_VERSION")
            ),
            rule.clone(),
            format!("Date: {}", header.generated_at),
            format!("System: {}", header.system),
            format!("Mode: {}", header.mode.label()),
            format!("Depth: {} (max)", header.max_depth),
            format!(
                "Trash excluded: {}",
                if header.trash_excluded { "Yes" } else { "No" }
            ),
            LICENSE_LINE.to_string(),
            SOURCE_LINE.to_string(),
            rule.clone(),
            String::new(),
        ];

        for section in &self.sections {
            lines.push(String::new());
            lines.push(rule.clone());
            lines.push(format!("TARGET: {}", section.target.display()));
            lines.push(rule.clone());
            lines.push(format!("Space: {}", section.space.render()));
            lines.push(String::new());
            lines.push("Tree:".to_string());
            lines.extend(section.tree.iter().cloned());
            lines.push(String::new());
        }

        lines.push("Report generated - Kerberos project (GPLv3)".to_string());
        lines.join("\n")
    }

    /// Persist the report text. Failure is the one condition a scan surfaces
    /// as an error.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_text().as_bytes())
    }
}
