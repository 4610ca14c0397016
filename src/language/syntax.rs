//! Per-language pattern tables.

use regex::Regex;
use std::sync::LazyLock;

/// Opening and trailing patterns that isolate the body of a grouping block.
#[derive(Debug)]
pub struct GroupingSyntax {
    /// Matches the opening of a grouping block up to and including its `{`.
    pub open: Regex,
    /// Matches the closing of the final grouping block at the end of the text.
    pub close: Regex,
}

/// Textual patterns used for metrics, validation and merging.
#[derive(Debug)]
pub struct LanguageSyntax {
    pub function: Regex,
    /// Captures a whole declaration line for function signatures.
    pub signature: Regex,
    pub class: Regex,
    pub conditional: Regex,
    pub group_marker: Regex,
    pub test_marker: Regex,
    pub assertion: Regex,
    /// Test-case names; the first participating capture group is the name.
    pub test_name: Regex,
    /// Import/use lines that may be hoisted during a splice.
    pub prelude_line: Regex,
    /// `None` when the language has no brace-delimited groups to splice into.
    pub grouping: Option<GroupingSyntax>,
}

impl LanguageSyntax {
    /// Extract test-case names in order of appearance.
    pub fn extract_test_names(&self, content: &str) -> Vec<String> {
        self.test_name
            .captures_iter(content)
            .filter_map(|caps| {
                caps.iter()
                    .skip(1)
                    .flatten()
                    .next()
                    .map(|m| m.as_str().to_string())
            })
            .collect()
    }

    pub fn count(&self, pattern: &Regex, content: &str) -> usize {
        pattern.find_iter(content).count()
    }
}

fn re(pattern: &str) -> Regex {
    // Patterns are compile-time constants covered by unit tests.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

pub static JAVASCRIPT: LazyLock<LanguageSyntax> = LazyLock::new(|| LanguageSyntax {
    function: re(
        r"\bfunction\b\s*\*?\s*\w*\s*\(|\b(?:const|let|var)\s+\w+\s*=\s*(?:async\s*)?(?:\([^)]*\)|\w+)\s*=>",
    ),
    signature: re(
        r"(?m)^[ \t]*(?:export\s+)?(?:default\s+)?(?:async\s+)?(?:function\b[^\n{]*|(?:const|let|var)\s+\w+\s*=\s*(?:async\s*)?(?:\([^)\n]*\)|\w+)\s*=>)",
    ),
    class: re(r"\bclass\s+\w+"),
    conditional: re(r"\b(?:if|switch|case|for|while|catch)\b|&&|\|\||\?\?"),
    group_marker: re(r"\bdescribe(?:\.\w+)?\s*\("),
    test_marker: re(r"\b(?:test|it)(?:\.\w+)?\s*\("),
    assertion: re(r"\bexpect\s*\(|\bassert(?:\.\w+)?\s*\("),
    test_name: re(r#"\b(?:test|it)(?:\.\w+)?\s*\(\s*(?:'([^']*)'|"([^"]*)"|`([^`]*)`)"#),
    prelude_line: re(r"^\s*(?:import\b|(?:const|let|var)\s+.*=\s*require\s*\()"),
    grouping: Some(GroupingSyntax {
        open: re(
            r#"\bdescribe(?:\.\w+)?\s*\(\s*(?:'[^']*'|"[^"]*"|`[^`]*`)\s*,\s*(?:async\s*)?(?:\(\s*\)\s*=>|function\s*\(\s*\))\s*\{"#,
        ),
        close: re(r"\}\s*\)\s*;?\s*$"),
    }),
});

pub static RUST: LazyLock<LanguageSyntax> = LazyLock::new(|| LanguageSyntax {
    function: re(r"\bfn\s+\w+"),
    signature: re(
        r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+\w+[^\n{;]*",
    ),
    class: re(r"\b(?:struct|enum|trait)\s+\w+"),
    conditional: re(r"\b(?:if|match|while|for|loop)\b|&&|\|\|"),
    group_marker: re(r"\bmod\s+\w+\s*\{"),
    test_marker: re(r"#\[(?:tokio::)?test\]"),
    assertion: re(r"\b(?:debug_)?assert(?:_eq|_ne)?!\s*\("),
    test_name: re(r"#\[(?:tokio::)?test\](?:\s*#\[[^\]]*\])*\s*(?:async\s+)?fn\s+(\w+)"),
    prelude_line: re(r"^\s*use\s+"),
    grouping: Some(GroupingSyntax {
        open: re(r"\bmod\s+\w+\s*\{"),
        close: re(r"\}\s*$"),
    }),
});

pub static PYTHON: LazyLock<LanguageSyntax> = LazyLock::new(|| LanguageSyntax {
    function: re(r"(?m)^[ \t]*(?:async\s+)?def\s+\w+"),
    signature: re(r"(?m)^[ \t]*(?:async\s+)?def\s+\w+[^\n]*"),
    class: re(r"(?m)^[ \t]*class\s+\w+"),
    conditional: re(r"\b(?:if|elif|for|while|except|and|or)\b"),
    group_marker: re(r"(?m)^[ \t]*class\s+Test\w*"),
    test_marker: re(r"(?m)^[ \t]*(?:async\s+)?def\s+test_\w*"),
    assertion: re(r"\bassert\b|\bself\.assert\w+\s*\(|\bpytest\.raises\b"),
    test_name: re(r"(?m)^[ \t]*(?:async\s+)?def\s+(test_\w*)"),
    prelude_line: re(r"^\s*(?:import|from)\s+"),
    grouping: None,
});
