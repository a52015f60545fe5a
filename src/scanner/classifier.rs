//! Static risk classification for script files met during traversal.
//!
//! Risk signatures are plain regular expressions over the raw source prefix,
//! not AST-aware matches: `exec(` inside a string literal or comment still
//! counts. This keeps the classifier cheap and language-agnostic at the cost
//! of precision.

#![allow(missing_docs)]

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::scanner::syntax::{PythonSyntaxChecker, SyntaxChecker, SyntaxFault, SyntaxStatus};

/// Imported module names kept in a verdict.
pub const MAX_REPORTED_IMPORTS: usize = 2;

/// Risk labels kept in a verdict.
pub const MAX_REPORTED_RISKS: usize = 1;

/// Default number of leading bytes sampled from each script.
pub const DEFAULT_SAMPLE_BYTES: usize = 10 * 1024;

// ──────────────────────── signatures ────────────────────────

/// One risk heuristic: a pattern over source text and the label reported
/// when it matches.
#[derive(Debug)]
pub struct RiskSignature {
    pub id: &'static str,
    pub label: &'static str,
    pattern: Regex,
}

impl RiskSignature {
    fn new(id: &'static str, pattern: &str, label: &'static str) -> Self {
        Self {
            id,
            label,
            pattern: Regex::new(pattern)
                .unwrap_or_else(|err| panic!("{id}: invalid risk signature regex: {err}")),
        }
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    #[must_use]
    pub fn is_match(&self, source: &str) -> bool {
        self.pattern.is_match(source)
    }
}

static RISK_SIGNATURES: LazyLock<Vec<RiskSignature>> = LazyLock::new(|| {
    vec![
        RiskSignature::new("RS-001", r"exec\s*\(", "exec call (dynamic code execution)"),
        RiskSignature::new("RS-002", r"eval\s*\(", "eval call (dynamic code evaluation)"),
        RiskSignature::new("RS-003", r"__import__\s*\(", "__import__ call (dynamic import)"),
        RiskSignature::new(
            "RS-004",
            r"subprocess\.(run|Popen|call|check_output)",
            "subprocess spawn",
        ),
        RiskSignature::new(
            "RS-005",
            r"import\s+os\s*,\s*sys",
            "os + sys imported together (system access)",
        ),
        RiskSignature::new("RS-006", r"shutil\.rmtree", "shutil.rmtree (recursive delete)"),
        RiskSignature::new(
            "RS-007",
            r"ctypes\.windll",
            "ctypes.windll (low-level native access)",
        ),
    ]
});

/// The fixed, ordered risk signature list.
#[must_use]
pub fn risk_signatures() -> &'static [RiskSignature] {
    &RISK_SIGNATURES
}

/// Labels of every signature matching `source`, in signature order.
#[must_use]
pub fn matching_risk_labels(source: &str) -> Vec<&'static str> {
    risk_signatures()
        .iter()
        .filter(|sig| sig.is_match(source))
        .map(|sig| sig.label)
        .collect()
}

// ──────────────────────── verdict ────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    SyntaxBroken,
    ImportList,
    RiskHit,
}

impl FindingKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SyntaxBroken => "syntax_broken",
            Self::ImportList => "import_list",
            Self::RiskHit => "risk_hit",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub detail: String,
}

impl Finding {
    fn render(&self) -> String {
        match self.kind {
            FindingKind::SyntaxBroken => "syntax unverified".to_string(),
            FindingKind::ImportList => format!("imports: {}", self.detail),
            FindingKind::RiskHit => format!("risk: {}", self.detail),
        }
    }
}

/// Classification of one script file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ClassificationVerdict {
    /// Valid syntax, no imports, no risk hits.
    Clean,
    /// The sampled source has a confirmed syntax error.
    SyntaxInvalid { fault: SyntaxFault },
    /// The file could not be opened or read.
    ReadFailure { reason: String },
    Findings { findings: Vec<Finding> },
}

impl ClassificationVerdict {
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    /// Whether any risk signature contributed to this verdict.
    #[must_use]
    pub fn has_risk(&self) -> bool {
        match self {
            Self::Findings { findings } => findings.iter().any(|f| f.kind == FindingKind::RiskHit),
            _ => false,
        }
    }

    /// Short single-line form used in tree reports.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Clean => "clean".to_string(),
            Self::SyntaxInvalid { .. } => "syntax error".to_string(),
            Self::ReadFailure { .. } => "unreadable".to_string(),
            Self::Findings { findings } => findings
                .iter()
                .map(Finding::render)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

impl fmt::Display for ClassificationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Full classification detail: the size-limited verdict plus everything it
/// was cut from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptAnalysis {
    pub language: &'static str,
    pub verdict: ClassificationVerdict,
    pub sample_truncated: bool,
    pub imports: Vec<String>,
    pub risk_labels: Vec<&'static str>,
}

// ──────────────────────── classifier ────────────────────────

/// Applies the syntax check, import extraction, and risk signatures to
/// script files.
pub struct PatternClassifier {
    checkers: Vec<Box<dyn SyntaxChecker>>,
    sample_bytes: usize,
}

impl fmt::Debug for PatternClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let languages: Vec<&str> = self.checkers.iter().map(|c| c.language()).collect();
        f.debug_struct("PatternClassifier")
            .field("languages", &languages)
            .field("sample_bytes", &self.sample_bytes)
            .finish()
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_BYTES)
    }
}

impl PatternClassifier {
    /// Classifier with the built-in language checkers.
    #[must_use]
    pub fn new(sample_bytes: usize) -> Self {
        Self::with_checkers(sample_bytes, vec![Box::new(PythonSyntaxChecker)])
    }

    #[must_use]
    pub fn with_checkers(sample_bytes: usize, checkers: Vec<Box<dyn SyntaxChecker>>) -> Self {
        Self {
            checkers,
            sample_bytes,
        }
    }

    #[must_use]
    pub const fn sample_bytes(&self) -> usize {
        self.sample_bytes
    }

    /// Checker for a lowercase extension with leading dot, if it denotes a
    /// script language.
    #[must_use]
    pub fn checker_for(&self, extension: &str) -> Option<&dyn SyntaxChecker> {
        self.checkers
            .iter()
            .find(|checker| checker.handles(extension))
            .map(AsRef::as_ref)
    }

    /// Whether `path` has a script extension this classifier understands.
    #[must_use]
    pub fn is_script(&self, path: &Path) -> bool {
        dotted_extension(path).is_some_and(|ext| self.checker_for(&ext).is_some())
    }

    /// Classify one file on disk. Returns `None` when the extension is not
    /// a known script type. Read failures become `ReadFailure` verdicts.
    #[must_use]
    pub fn classify_file(&self, path: &Path) -> Option<ClassificationVerdict> {
        self.analyze_file(path).map(|analysis| analysis.verdict)
    }

    /// Like [`Self::classify_file`] but keeps the untruncated lists.
    #[must_use]
    pub fn analyze_file(&self, path: &Path) -> Option<ScriptAnalysis> {
        let checker = self.checker_for(&dotted_extension(path)?)?;
        let analysis = match read_sample(path, self.sample_bytes) {
            Ok((source, truncated)) => analyze_source(checker, &source, truncated),
            Err(err) => ScriptAnalysis {
                language: checker.language(),
                verdict: ClassificationVerdict::ReadFailure {
                    reason: err.to_string(),
                },
                sample_truncated: false,
                imports: Vec::new(),
                risk_labels: Vec::new(),
            },
        };
        Some(analysis)
    }
}

/// Classify an in-memory source prefix with a given checker.
#[must_use]
pub fn analyze_source(checker: &dyn SyntaxChecker, source: &str, truncated: bool) -> ScriptAnalysis {
    let language = checker.language();
    let syntax_ok = match checker.check(source) {
        SyntaxStatus::Valid => true,
        SyntaxStatus::Indeterminate(_) => false,
        SyntaxStatus::Invalid(fault) => {
            return ScriptAnalysis {
                language,
                verdict: ClassificationVerdict::SyntaxInvalid { fault },
                sample_truncated: truncated,
                imports: Vec::new(),
                risk_labels: Vec::new(),
            };
        }
    };

    let imports = checker.imported_modules(source);
    let risk_labels = matching_risk_labels(source);

    let mut findings = Vec::new();
    if !syntax_ok {
        findings.push(Finding {
            kind: FindingKind::SyntaxBroken,
            detail: String::new(),
        });
    }
    if !imports.is_empty() {
        findings.push(Finding {
            kind: FindingKind::ImportList,
            detail: imports
                .iter()
                .take(MAX_REPORTED_IMPORTS)
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        });
    }
    for label in risk_labels.iter().take(MAX_REPORTED_RISKS) {
        findings.push(Finding {
            kind: FindingKind::RiskHit,
            detail: (*label).to_string(),
        });
    }

    let verdict = if findings.is_empty() {
        ClassificationVerdict::Clean
    } else {
        ClassificationVerdict::Findings { findings }
    };
    ScriptAnalysis {
        language,
        verdict,
        sample_truncated: truncated,
        imports,
        risk_labels,
    }
}

/// Lowercase extension with a leading dot.
#[must_use]
pub fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
}

/// Read at most `limit` bytes, decoding UTF-8 with invalid sequences dropped.
/// The flag reports whether the file continues past the sample.
fn read_sample(path: &Path, limit: usize) -> std::io::Result<(String, bool)> {
    let file = File::open(path)?;
    let mut buf = Vec::with_capacity(limit.min(64 * 1024));
    file.take(limit as u64 + 1).read_to_end(&mut buf)?;
    let truncated = buf.len() > limit;
    buf.truncate(limit);
    Ok((decode_dropping_invalid(&buf), truncated))
}

fn decode_dropping_invalid(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn classify_text(source: &str) -> ClassificationVerdict {
        analyze_source(&PythonSyntaxChecker, source, false).verdict
    }

    #[test]
    fn signature_list_is_ordered_and_complete() {
        let ids: Vec<&str> = risk_signatures().iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            ["RS-001", "RS-002", "RS-003", "RS-004", "RS-005", "RS-006", "RS-007"]
        );
    }

    #[test]
    fn clean_script_is_clean() {
        assert_eq!(classify_text("x = 1\nprint(x)\n"), ClassificationVerdict::Clean);
        assert_eq!(classify_text(""), ClassificationVerdict::Clean);
    }

    #[test]
    fn exec_call_is_flagged_with_imports() {
        let verdict = classify_text("import os\nexec(x)");
        assert!(verdict.has_risk());
        assert_eq!(
            verdict.render(),
            "imports: os | risk: exec call (dynamic code execution)"
        );
    }

    #[test]
    fn only_first_matching_label_is_rendered() {
        let analysis = analyze_source(
            &PythonSyntaxChecker,
            "import shutil\nshutil.rmtree(p)\neval(s)\n",
            false,
        );
        assert_eq!(
            analysis.risk_labels,
            vec![
                "eval call (dynamic code evaluation)",
                "shutil.rmtree (recursive delete)"
            ]
        );
        assert_eq!(
            analysis.verdict.render(),
            "imports: shutil | risk: eval call (dynamic code evaluation)"
        );
    }

    #[test]
    fn at_most_two_imports_are_rendered() {
        let analysis = analyze_source(&PythonSyntaxChecker, "import a\nimport b\nimport c\n", false);
        assert_eq!(analysis.imports, vec!["a", "b", "c"]);
        assert_eq!(analysis.verdict.render(), "imports: a, b");
    }

    #[test]
    fn os_sys_import_line_is_a_risk() {
        let verdict = classify_text("import os, sys\n");
        assert_eq!(
            verdict.render(),
            "imports: os, sys | risk: os + sys imported together (system access)"
        );
    }

    #[test]
    fn signatures_match_inside_strings() {
        assert!(classify_text("doc = 'never call eval(x)'\n").has_risk());
    }

    #[test]
    fn syntax_error_suppresses_other_findings() {
        let verdict = classify_text("import os\nexec((x)\n");
        assert!(matches!(verdict, ClassificationVerdict::SyntaxInvalid { .. }));
        assert_eq!(verdict.render(), "syntax error");
        assert!(!verdict.has_risk());
    }

    #[test]
    fn sample_cut_mid_construct_is_a_syntax_error() {
        let analysis = analyze_source(&PythonSyntaxChecker, "import os\nitems = [\n  eval(", true);
        assert!(matches!(
            analysis.verdict,
            ClassificationVerdict::SyntaxInvalid { .. }
        ));
        assert!(analysis.sample_truncated);
        assert!(analysis.imports.is_empty());
        assert!(analysis.risk_labels.is_empty());
    }

    #[test]
    fn indeterminate_syntax_is_tagged_but_continues() {
        let analysis = analyze_source(&PythonSyntaxChecker, "import os\nx = 1\0\neval(s)\n", false);
        assert_eq!(
            analysis.verdict.render(),
            "syntax unverified | imports: os | risk: eval call (dynamic code evaluation)"
        );
    }

    #[test]
    fn classify_file_cut_inside_list_is_syntax_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.py");
        let mut body = "import os\nitems = [\n".to_string();
        for i in 0..3000 {
            body.push_str(&format!("    {i},\n"));
        }
        body.push_str("]\nexec(x)\n");
        fs::write(&path, &body).unwrap();

        let verdict = PatternClassifier::new(10_240).classify_file(&path).unwrap();
        assert_eq!(verdict.render(), "syntax error");
    }

    #[test]
    fn nested_imports_render_after_module_level_ones() {
        let verdict = classify_text("def f():\n    import json\nimport os\nimport sys\n");
        assert_eq!(verdict.render(), "imports: os, sys");
    }

    #[test]
    fn classify_file_samples_prefix_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.py");
        let mut body = "x = 1\n".repeat(10);
        body.push_str("eval(payload)\n");
        fs::write(&path, &body).unwrap();

        let classifier = PatternClassifier::new(30);
        let analysis = classifier.analyze_file(&path).unwrap();
        assert!(analysis.sample_truncated);
        assert!(analysis.risk_labels.is_empty());
    }

    #[test]
    fn classify_file_drops_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.py");
        fs::write(&path, b"x = 1\xff\xfe\nexec(y)\n").unwrap();

        let verdict = PatternClassifier::default().classify_file(&path).unwrap();
        assert!(verdict.has_risk());
    }

    #[test]
    fn decoding_keeps_literal_replacement_character() {
        let mut bytes = "s = '\u{FFFD}'\n".as_bytes().to_vec();
        bytes.extend_from_slice(b"\xff\xfet = 1\n");
        assert_eq!(decode_dropping_invalid(&bytes), "s = '\u{FFFD}'\nt = 1\n");
    }

    #[test]
    fn classify_file_keeps_replacement_character_in_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker.py");
        let mut bytes = b"x = 1\xff\n".to_vec();
        bytes.extend_from_slice("label = '\u{FFFD}'\nimport os\n".as_bytes());
        fs::write(&path, &bytes).unwrap();

        let analysis = PatternClassifier::default().analyze_file(&path).unwrap();
        assert_eq!(analysis.verdict.render(), "imports: os");
    }

    #[test]
    fn missing_file_is_read_failure_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = PatternClassifier::default()
            .classify_file(&dir.path().join("gone.py"))
            .unwrap();
        assert!(matches!(verdict, ClassificationVerdict::ReadFailure { .. }));
        assert_eq!(verdict.to_string(), "unreadable");
    }

    #[test]
    fn non_script_extensions_are_not_classified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "exec(x)").unwrap();
        let classifier = PatternClassifier::default();
        assert!(!classifier.is_script(&path));
        assert!(classifier.classify_file(&path).is_none());
        assert!(classifier.is_script(Path::new("RUN.PY")));
    }

    #[test]
    fn verdict_serializes_with_tag() {
        let json = serde_json::to_value(classify_text("exec(x)\n")).unwrap();
        assert_eq!(json["verdict"], "findings");
        assert_eq!(json["findings"][0]["kind"], "risk_hit");
    }
}
