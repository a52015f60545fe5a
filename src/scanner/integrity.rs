//! Advisory integrity records for snapshot manifests.
//!
//! A record is the first 16 hex characters of the SHA-256 of the complete
//! manifest text, paired with the manifest's file name and stored next to it
//! as `<hex> *<name>`. The truncated digest detects accidental corruption or
//! edits; it does not resist an adversary who can also rewrite the record.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::errors::{KerbError, Result};
use crate::core::paths::entry_name;

/// Hex characters kept from the full manifest digest.
pub const RECORD_HEX_LEN: usize = 16;

/// Extension appended to a manifest path to name its record file.
pub const RECORD_EXTENSION: &str = "sha256";

/// Lowercase hex of the SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let digest: [u8; 32] = Sha256::digest(bytes).into();
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Digest of a finalized manifest, paired with the manifest name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityRecord {
    pub digest_hex: String,
    pub manifest_name: String,
}

impl IntegrityRecord {
    /// Record line as written to disk, newline-terminated.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{} *{}\n", self.digest_hex, self.manifest_name)
    }

    /// Parse a record line. `source` names the file for error reporting.
    pub fn parse(text: &str, source: &Path) -> Result<Self> {
        let malformed = |details: &str| KerbError::ChecksumParse {
            path: source.to_path_buf(),
            details: details.to_string(),
        };

        let line = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| malformed("record file is empty"))?;
        let (digest, name) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| malformed("expected `<hex> *<name>`"))?;
        let name = name.trim_start();
        let name = name.strip_prefix('*').unwrap_or(name);

        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(malformed("digest is not hexadecimal"));
        }
        if name.is_empty() {
            return Err(malformed("manifest name is missing"));
        }
        Ok(Self {
            digest_hex: digest.to_ascii_lowercase(),
            manifest_name: name.to_string(),
        })
    }
}

/// Seal finalized manifest text.
#[must_use]
pub fn seal(manifest_text: &str, manifest_name: &str) -> IntegrityRecord {
    seal_bytes(manifest_text.as_bytes(), manifest_name)
}

/// Seal manifest content as stored on disk, whether or not it is valid UTF-8.
#[must_use]
pub fn seal_bytes(manifest: &[u8], manifest_name: &str) -> IntegrityRecord {
    let mut digest_hex = sha256_hex(manifest);
    digest_hex.truncate(RECORD_HEX_LEN);
    IntegrityRecord {
        digest_hex,
        manifest_name: manifest_name.to_string(),
    }
}

/// Recompute and compare. Any difference, including a record digest of a
/// different length, is a mismatch.
#[must_use]
pub fn verify(manifest_text: &str, record: &IntegrityRecord) -> bool {
    verify_bytes(manifest_text.as_bytes(), record)
}

#[must_use]
pub fn verify_bytes(manifest: &[u8], record: &IntegrityRecord) -> bool {
    let expected = seal_bytes(manifest, &record.manifest_name);
    expected.digest_hex.as_bytes() == record.digest_hex.as_bytes()
}

/// Default record path for a manifest: `<manifest>.sha256`.
#[must_use]
pub fn record_path_for(manifest_path: &Path) -> PathBuf {
    let mut name = manifest_path.as_os_str().to_os_string();
    name.push(".");
    name.push(RECORD_EXTENSION);
    PathBuf::from(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    Match,
    DigestMismatch,
    /// The digest matches but the record names a different manifest.
    NameMismatch,
}

/// Result of checking a manifest file against its record file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub manifest_path: PathBuf,
    pub record_path: PathBuf,
    pub status: VerifyStatus,
    pub expected_digest: String,
    pub actual_digest: String,
    pub recorded_name: String,
    pub actual_name: String,
}

impl VerificationReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == VerifyStatus::Match
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self.status {
            VerifyStatus::Match => format!(
                "{} matches its record ({})",
                self.actual_name, self.actual_digest
            ),
            VerifyStatus::DigestMismatch => format!(
                "{} digest mismatch: record {} vs actual {}",
                self.actual_name, self.expected_digest, self.actual_digest
            ),
            VerifyStatus::NameMismatch => format!(
                "record names {} but manifest is {}",
                self.recorded_name, self.actual_name
            ),
        }
    }
}

/// Load a manifest and its record from disk and compare them.
/// `record_path` defaults to [`record_path_for`]. IO and parse problems are
/// errors; a mismatch is a normal outcome, including bytes that are no longer
/// valid UTF-8.
pub fn verify_image(manifest_path: &Path, record_path: Option<&Path>) -> Result<VerificationReport> {
    let record_path = record_path.map_or_else(|| record_path_for(manifest_path), Path::to_path_buf);

    let manifest = fs::read(manifest_path).map_err(|e| KerbError::io(manifest_path, e))?;
    let record_text = fs::read_to_string(&record_path).map_err(|e| KerbError::io(&record_path, e))?;
    let record = IntegrityRecord::parse(&record_text, &record_path)?;

    let actual_name = entry_name(manifest_path);
    let actual = seal_bytes(&manifest, &actual_name);
    let status = if !verify_bytes(&manifest, &record) {
        VerifyStatus::DigestMismatch
    } else if record.manifest_name == actual_name {
        VerifyStatus::Match
    } else {
        VerifyStatus::NameMismatch
    };

    Ok(VerificationReport {
        manifest_path: manifest_path.to_path_buf(),
        record_path,
        status,
        expected_digest: record.digest_hex,
        actual_digest: actual.digest_hex,
        recorded_name: record.manifest_name,
        actual_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn seal_is_sixteen_hex_chars_of_sha256() {
        let record = seal("abc", "m.kbi");
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(record.digest_hex, "ba7816bf8f01cfea");
        assert_eq!(record.to_line(), "ba7816bf8f01cfea *m.kbi\n");
    }

    #[test]
    fn verify_round_trip_and_single_byte_change() {
        let text = "KERBEROS IMAGE - 2026-01-01 00:00:00\nD a/";
        let record = seal(text, "x.kbi");
        assert!(verify(text, &record));
        assert!(!verify("KERBEROS IMAGE - 2026-01-01 00:00:00\nD b/", &record));
    }

    #[test]
    fn verify_rejects_different_length_digest() {
        let text = "hello";
        let mut record = seal(text, "x.kbi");
        record.digest_hex = sha256_hex(text.as_bytes());
        assert!(!verify(text, &record));
        record.digest_hex.truncate(8);
        assert!(!verify(text, &record));
    }

    #[test]
    fn parses_record_lines() {
        let src = Path::new("r.sha256");
        let record = IntegrityRecord::parse("ABCDEF0123456789 *kerb_image_docs.kbi\n", src).unwrap();
        assert_eq!(record.digest_hex, "abcdef0123456789");
        assert_eq!(record.manifest_name, "kerb_image_docs.kbi");

        let spaced = IntegrityRecord::parse("abcdef0123456789  my file.kbi", src).unwrap();
        assert_eq!(spaced.manifest_name, "my file.kbi");
    }

    #[test]
    fn rejects_malformed_records() {
        let src = Path::new("r.sha256");
        for bad in ["", "   \n", "nothex *a.kbi", "abcdef", "abcdef *"] {
            let err = IntegrityRecord::parse(bad, src).unwrap_err();
            assert_eq!(err.code(), "KRB-2102", "input {bad:?}");
        }
    }

    #[test]
    fn verify_image_reports_each_outcome() {
        let tmp = TempDir::new().unwrap();
        let manifest = tmp.path().join("kerb_image_t.kbi");
        fs::write(&manifest, "body").unwrap();
        let record_path = record_path_for(&manifest);
        assert_eq!(record_path, tmp.path().join("kerb_image_t.kbi.sha256"));

        fs::write(&record_path, seal("body", "kerb_image_t.kbi").to_line()).unwrap();
        let report = verify_image(&manifest, None).unwrap();
        assert!(report.passed());

        fs::write(&record_path, seal("body", "other.kbi").to_line()).unwrap();
        let report = verify_image(&manifest, None).unwrap();
        assert_eq!(report.status, VerifyStatus::NameMismatch);

        fs::write(&manifest, "body!").unwrap();
        let report = verify_image(&manifest, Some(&record_path)).unwrap();
        assert_eq!(report.status, VerifyStatus::DigestMismatch);
        assert!(report.message().contains("digest mismatch"));
    }

    #[test]
    fn corrupted_non_utf8_byte_is_a_digest_mismatch() {
        let tmp = TempDir::new().unwrap();
        let manifest = tmp.path().join("kerb_image_cafe.kbi");
        let text = "KERBEROS IMAGE - 2026-01-01 00:00:00\nF caf\u{e9}.txt | 3 bytes | HASH:0123abcd\n";
        fs::write(&manifest, text).unwrap();
        let name = entry_name(&manifest);
        fs::write(record_path_for(&manifest), seal(text, &name).to_line()).unwrap();
        assert!(verify_image(&manifest, None).unwrap().passed());

        let mut bytes = text.as_bytes().to_vec();
        let lead = bytes.iter().position(|&b| b == 0xC3).unwrap();
        bytes[lead] = 0xFF;
        fs::write(&manifest, &bytes).unwrap();

        let report = verify_image(&manifest, None).unwrap();
        assert_eq!(report.status, VerifyStatus::DigestMismatch);
        assert_eq!(report.actual_digest, sha256_hex(&bytes)[..RECORD_HEX_LEN]);
    }

    #[test]
    fn verify_image_missing_record_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let manifest = tmp.path().join("a.kbi");
        fs::write(&manifest, "x").unwrap();
        assert_eq!(verify_image(&manifest, None).unwrap_err().code(), "KRB-3002");
    }
}
