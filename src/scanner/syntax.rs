//! Syntax-parseability capability for script classification.
//!
//! The classifier only needs a three-way answer (valid / invalid / cannot
//! tell) plus the list of imported modules. Each scripting language plugs in
//! through [`SyntaxChecker`]; Python is provided by [`PythonSyntaxChecker`],
//! a tokenizer-level checker (strings, comments, bracket nesting, line
//! continuations, indentation) rather than a full grammar.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Outcome of a syntax check over a (possibly truncated) source prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxStatus {
    /// The source tokenizes and nests correctly.
    Valid,
    /// A definite syntax error was found.
    Invalid(SyntaxFault),
    /// Parseability could not be established either way.
    Indeterminate(String),
}

/// Location and description of a syntax error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxFault {
    /// 1-based physical line number.
    pub line: usize,
    pub message: String,
}

/// Language-specific parseability check and import extraction.
pub trait SyntaxChecker: Send + Sync {
    /// Short language name used in reports.
    fn language(&self) -> &'static str;

    /// Lowercase extensions (with leading dot) this checker handles.
    fn extensions(&self) -> &[&'static str];

    /// Check `source`. A prefix cut mid-construct is reported like any other
    /// syntax error.
    fn check(&self, source: &str) -> SyntaxStatus;

    /// Directly imported module names. Module-level imports come first, then
    /// each deeper nesting level in turn.
    fn imported_modules(&self, source: &str) -> Vec<String>;

    /// Whether this checker handles files with `extension` (leading dot).
    fn handles(&self, extension: &str) -> bool {
        self.extensions()
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

/// Python source checker.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonSyntaxChecker;

impl SyntaxChecker for PythonSyntaxChecker {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".py", ".pyw"]
    }

    fn check(&self, source: &str) -> SyntaxStatus {
        if source.contains('\0') {
            return SyntaxStatus::Indeterminate("source contains NUL bytes".to_string());
        }
        let lexed = lex(source);
        match lexed
            .fault
            .or_else(|| check_indentation(&lexed.lines).err())
        {
            None => SyntaxStatus::Valid,
            Some(fault) => SyntaxStatus::Invalid(fault),
        }
    }

    fn imported_modules(&self, source: &str) -> Vec<String> {
        let lexed = lex(source);
        let depths = statement_depths(&lexed.lines);
        let mut found: Vec<(usize, String)> = Vec::new();
        for (line, depth) in lexed.lines.iter().zip(depths) {
            let (depth, text) = compound_body(&line.text)
                .map_or((depth.statement, line.text.as_str()), |body| (depth.body, body));
            let mut names = Vec::new();
            for statement in split_statements(text) {
                collect_imports(statement, &mut names);
            }
            found.extend(names.into_iter().map(|name| (depth, name)));
        }
        // Shallower statements first, source order within a level.
        found.sort_by_key(|(depth, _)| *depth);
        found.into_iter().map(|(_, name)| name).collect()
    }
}

// ──────────────────────── lexer ────────────────────────

/// One logical line: physical lines joined by brackets or backslashes, with
/// comments removed and string literal bodies blanked to `""`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogicalLine {
    line: usize,
    indent: usize,
    text: String,
}

#[derive(Debug, Default)]
struct Lexed {
    lines: Vec<LogicalLine>,
    fault: Option<SyntaxFault>,
}

fn fault(line: usize, message: impl Into<String>) -> SyntaxFault {
    SyntaxFault {
        line,
        message: message.into(),
    }
}

#[allow(clippy::too_many_lines)]
fn lex(source: &str) -> Lexed {
    let chars: Vec<char> = source.chars().collect();
    let mut out = Lexed::default();
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut text = String::new();
    let mut line_no = 1usize;
    let mut start_line = 1usize;
    let mut indent = 0usize;
    let mut at_line_start = true;
    let mut i = 0usize;

    while i < chars.len() {
        if at_line_start {
            let (width, next) = measure_indent(&chars, i);
            match chars.get(next) {
                // Blank and comment-only lines never open a logical line.
                None => break,
                Some('\n') => {
                    i = next + 1;
                    line_no += 1;
                    continue;
                }
                Some('\r') if chars.get(next + 1) == Some(&'\n') => {
                    i = next + 2;
                    line_no += 1;
                    continue;
                }
                Some('#') => {
                    i = skip_comment(&chars, next);
                    continue;
                }
                _ => {}
            }
            indent = width;
            start_line = line_no;
            at_line_start = false;
            i = next;
        }

        let c = chars[i];
        match c {
            '#' => i = skip_comment(&chars, i),
            '\'' | '"' => match skip_string(&chars, i, &mut line_no) {
                Ok(next) => {
                    text.push_str("\"\"");
                    i = next;
                }
                Err(err) => {
                    out.fault = Some(err);
                    return out;
                }
            },
            '(' | '[' | '{' => {
                brackets.push((c, line_no));
                text.push(c);
                i += 1;
            }
            ')' | ']' | '}' => {
                let Some((open, _)) = brackets.pop() else {
                    out.fault = Some(fault(line_no, format!("unmatched '{c}'")));
                    return out;
                };
                if closer_for(open) != c {
                    out.fault = Some(fault(
                        line_no,
                        format!("closing '{c}' does not match opening '{open}'"),
                    ));
                    return out;
                }
                text.push(c);
                i += 1;
            }
            '\\' => match chars.get(i + 1) {
                Some('\n') => {
                    i += 2;
                    line_no += 1;
                    text.push(' ');
                }
                Some('\r') if chars.get(i + 2) == Some(&'\n') => {
                    i += 3;
                    line_no += 1;
                    text.push(' ');
                }
                None => {
                    out.fault = Some(fault(
                        line_no,
                        "line continuation at end of input",
                    ));
                    return out;
                }
                Some(_) => {
                    out.fault = Some(fault(
                        line_no,
                        "unexpected character after line continuation character",
                    ));
                    return out;
                }
            },
            '\n' => {
                i += 1;
                line_no += 1;
                if brackets.is_empty() {
                    flush_line(&mut out.lines, &mut text, start_line, indent);
                    at_line_start = true;
                } else {
                    text.push(' ');
                }
            }
            '\r' => i += 1,
            _ => {
                text.push(c);
                i += 1;
            }
        }
    }

    if let Some((open, opened_at)) = brackets.last() {
        out.fault = Some(fault(
            *opened_at,
            format!("'{open}' was never closed"),
        ));
        return out;
    }
    flush_line(&mut out.lines, &mut text, start_line, indent);
    out
}

fn flush_line(lines: &mut Vec<LogicalLine>, text: &mut String, line: usize, indent: usize) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        lines.push(LogicalLine {
            line,
            indent,
            text: trimmed.to_string(),
        });
    }
    text.clear();
}

/// Indentation width of the physical line starting at `start` (tabs advance
/// to the next multiple of 8) and the index of its first non-blank char.
fn measure_indent(chars: &[char], start: usize) -> (usize, usize) {
    let mut width = 0usize;
    let mut i = start;
    while let Some(&c) = chars.get(i) {
        match c {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            '\x0c' => width = 0,
            _ => break,
        }
        i += 1;
    }
    (width, i)
}

fn skip_comment(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() && chars[i] != '\n' {
        i += 1;
    }
    i
}

/// Skip a string literal starting at the opening quote. Returns the index just
/// past the closing quote.
fn skip_string(chars: &[char], start: usize, line_no: &mut usize) -> Result<usize, SyntaxFault> {
    let quote = chars[start];
    let opened_at = *line_no;
    let triple = chars.get(start + 1) == Some(&quote) && chars.get(start + 2) == Some(&quote);
    let mut i = if triple { start + 3 } else { start + 1 };

    while let Some(&c) = chars.get(i) {
        match c {
            '\\' => {
                if chars.get(i + 1) == Some(&'\n') {
                    *line_no += 1;
                }
                i += 2;
                continue;
            }
            '\n' if !triple => {
                return Err(fault(
                    opened_at,
                    "unterminated string literal",
                ));
            }
            '\n' => *line_no += 1,
            _ if c == quote => {
                if !triple {
                    return Ok(i + 1);
                }
                if chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                    return Ok(i + 3);
                }
            }
            _ => {}
        }
        i += 1;
    }

    let message = if triple {
        "unterminated triple-quoted string literal"
    } else {
        "unterminated string literal"
    };
    Err(fault(opened_at, message))
}

const fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

// ──────────────────────── indentation ────────────────────────

fn check_indentation(lines: &[LogicalLine]) -> Result<(), SyntaxFault> {
    let mut stack = vec![0usize];
    let mut expect_block: Option<usize> = None;

    for line in lines {
        let top = stack.last().copied().unwrap_or(0);
        if let Some(header_line) = expect_block.take() {
            if line.indent <= top {
                return Err(fault(
                    line.line,
                    format!("expected an indented block after line {header_line}"),
                ));
            }
            stack.push(line.indent);
        } else if line.indent > top {
            return Err(fault(line.line, "unexpected indent"));
        } else if line.indent < top {
            while stack.last().is_some_and(|&level| level > line.indent) {
                stack.pop();
            }
            if stack.last() != Some(&line.indent) {
                return Err(fault(
                    line.line,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        if line.text.ends_with(':') {
            expect_block = Some(line.line);
        }
    }

    expect_block.map_or(Ok(()), |header_line| {
        Err(fault(
            header_line,
            format!("expected an indented block after line {header_line}"),
        ))
    })
}

/// Syntax-tree depth of a logical line and of the statements in its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineDepth {
    statement: usize,
    body: usize,
}

#[derive(Debug, Clone, Copy)]
struct Block {
    indent: usize,
    depth: usize,
    elifs: usize,
}

/// Depths follow the syntax tree rather than the indentation: each `elif`
/// nests one level inside the previous branch and handler bodies sit below
/// their `except` clause. Malformed indentation is tolerated.
fn statement_depths(lines: &[LogicalLine]) -> Vec<LineDepth> {
    let mut blocks = vec![Block {
        indent: 0,
        depth: 0,
        elifs: 0,
    }];
    let mut pending: Option<usize> = None;
    let mut depths = Vec::with_capacity(lines.len());

    for line in lines {
        let top_indent = blocks.last().map_or(0, |block| block.indent);
        if let Some(depth) = pending.take()
            && line.indent > top_indent
        {
            blocks.push(Block {
                indent: line.indent,
                depth,
                elifs: 0,
            });
        }
        while blocks.len() > 1 && blocks.last().is_some_and(|block| block.indent > line.indent) {
            blocks.pop();
        }
        let Some(block) = blocks.last_mut() else {
            break;
        };

        let extra = match leading_keyword(&line.text) {
            "elif" => {
                block.elifs += 1;
                block.elifs
            }
            "else" => block.elifs,
            "except" => {
                block.elifs = 0;
                1
            }
            _ => {
                block.elifs = 0;
                0
            }
        };
        let depth = LineDepth {
            statement: block.depth,
            body: block.depth + 1 + extra,
        };
        if line.text.ends_with(':') {
            pending = Some(depth.body);
        }
        depths.push(depth);
    }
    depths
}

// ──────────────────────── imports ────────────────────────

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+(.+)$").expect("import regex is valid"));

static FROM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^from\s+\.*\s*([^\W\d][\w.]*)\s+import\b").expect("from-import regex is valid")
});

const COMPOUND_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "try", "except", "finally", "with", "for", "while", "def", "class",
    "async",
];

/// Split a logical line on top-level `;`.
fn split_statements(text: &str) -> impl Iterator<Item = &str> {
    text.split(';').map(str::trim).filter(|s| !s.is_empty())
}

fn collect_imports(statement: &str, modules: &mut Vec<String>) {
    if let Some(caps) = IMPORT_RE.captures(statement) {
        for alias in caps[1].split(',') {
            if let Some(name) = alias.split_whitespace().next() {
                let name = name.trim_matches(|c| matches!(c, '(' | ')'));
                if !name.is_empty() {
                    modules.push(name.to_string());
                }
            }
        }
    } else if let Some(caps) = FROM_IMPORT_RE.captures(statement) {
        modules.push(caps[1].to_string());
    }
}

fn leading_keyword(statement: &str) -> &str {
    statement
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or_default()
}

/// Body of a one-line compound statement (`if x: import os`), if any.
fn compound_body(statement: &str) -> Option<&str> {
    if !COMPOUND_KEYWORDS.contains(&leading_keyword(statement)) {
        return None;
    }
    let mut depth = 0usize;
    for (idx, c) in statement.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => {
                let body = statement[idx + 1..].trim();
                return (!body.is_empty()).then_some(body);
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(source: &str) -> SyntaxStatus {
        PythonSyntaxChecker.check(source)
    }

    fn imports(source: &str) -> Vec<String> {
        PythonSyntaxChecker.imported_modules(source)
    }

    #[test]
    fn accepts_well_formed_module() {
        let src = "import os\n\n\ndef main(argv):\n    if argv:\n        return [\n            1,\n            2,\n        ]\n    return None\n\nclass A:\n    x = {'a': 1}  # trailing comment\n";
        assert_eq!(check(src), SyntaxStatus::Valid);
    }

    #[test]
    fn accepts_strings_containing_brackets_and_hashes() {
        let src = "s = '(['\nt = \"# not a comment )\"\nu = '''multi\n) line\n'''\n";
        assert_eq!(check(src), SyntaxStatus::Valid);
    }

    #[test]
    fn rejects_unbalanced_closer() {
        match check("x = (1, 2))\n") {
            SyntaxStatus::Invalid(fault) => {
                assert_eq!(fault.line, 1);
                assert!(fault.message.contains("unmatched"));
            }
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn rejects_mismatched_brackets() {
        assert!(matches!(check("x = [1, 2)\n"), SyntaxStatus::Invalid(_)));
    }

    #[test]
    fn unclosed_bracket_is_invalid_for_complete_file() {
        match check("def f(:\n    pass\n") {
            SyntaxStatus::Invalid(fault) => assert!(fault.message.contains("never closed")),
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn sample_cut_inside_bracket_is_invalid() {
        match check("data = [\n    1,\n    2,") {
            SyntaxStatus::Invalid(fault) => {
                assert_eq!(fault.line, 1);
                assert_eq!(fault.message, "'[' was never closed");
            }
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn sample_cut_inside_string_or_block_is_invalid() {
        assert!(matches!(check("doc = \"\"\"starts here\n"), SyntaxStatus::Invalid(_)));
        assert!(matches!(check("def f():\n"), SyntaxStatus::Invalid(_)));
        assert!(matches!(check("x = 1 + \\"), SyntaxStatus::Invalid(_)));
    }

    #[test]
    fn first_fault_wins_over_trailing_open_bracket() {
        match check("x = 1)\ny = [") {
            SyntaxStatus::Invalid(fault) => assert!(fault.message.contains("unmatched")),
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unterminated_single_line_string() {
        assert!(matches!(check("s = 'abc\nt = 1\n"), SyntaxStatus::Invalid(_)));
    }

    #[test]
    fn rejects_unexpected_indent() {
        match check("x = 1\n    y = 2\n") {
            SyntaxStatus::Invalid(fault) => {
                assert_eq!(fault.line, 2);
                assert_eq!(fault.message, "unexpected indent");
            }
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn rejects_inconsistent_dedent() {
        let src = "if x:\n        a = 1\n    b = 2\n";
        assert!(matches!(check(src), SyntaxStatus::Invalid(_)));
    }

    #[test]
    fn rejects_missing_block() {
        assert!(matches!(check("if x:\ny = 1\n"), SyntaxStatus::Invalid(_)));
    }

    #[test]
    fn backslash_continuation_joins_lines() {
        assert_eq!(check("x = 1 + \\\n    2\n"), SyntaxStatus::Valid);
    }

    #[test]
    fn nul_bytes_are_indeterminate() {
        assert!(matches!(check("x = 1\0\n"), SyntaxStatus::Indeterminate(_)));
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        assert_eq!(check("if x:\r\n    y = 1\r\n"), SyntaxStatus::Valid);
    }

    #[test]
    fn extracts_plain_and_from_imports_in_order() {
        let src = "import os, sys as system\nfrom collections.abc import Mapping\nfrom . import sibling\nfrom ..pkg import thing\n";
        assert_eq!(imports(src), vec!["os", "sys", "collections.abc", "pkg"]);
    }

    #[test]
    fn extracts_nested_and_one_line_compound_imports() {
        let src = "def f():\n    import json\ntry: import yaml\nexcept ImportError: pass\nimport a; import b\n";
        assert_eq!(imports(src), vec!["a", "b", "json", "yaml"]);
    }

    #[test]
    fn module_level_imports_come_before_nested_ones() {
        let src = "def f():\n    import json\nimport os\nimport sys\n";
        assert_eq!(imports(src), vec!["os", "sys", "json"]);
    }

    #[test]
    fn import_order_follows_tree_depth() {
        let src = "\
try:
    import fast
except ImportError:
    import slow
if a:
    import one
elif b:
    import two
else:
    import three
class C:
    def m(self):
        import deep
import top
";
        assert_eq!(
            imports(src),
            vec!["top", "fast", "one", "slow", "two", "three", "deep"]
        );
    }

    #[test]
    fn one_line_compound_body_keeps_all_statements_nested() {
        let src = "if x: import a; import b\nimport c\n";
        assert_eq!(imports(src), vec!["c", "a", "b"]);
    }

    #[test]
    fn ignores_imports_inside_strings_and_comments() {
        let src = "# import secret\ndoc = '''\nimport hidden\n'''\nx = 'import quoted'\n";
        assert!(imports(src).is_empty());
    }

    #[test]
    fn handles_extension_case_insensitively() {
        assert!(PythonSyntaxChecker.handles(".PY"));
        assert!(!PythonSyntaxChecker.handles(".txt"));
    }
}
