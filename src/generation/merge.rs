//! Textual merging of newly generated tests into an existing suite.
//!
//! This never parses the target language. `Splice` moves the body of the new
//! text's top-level group into the existing file's final group; `Append`
//! concatenates. A splice that cannot be done cleanly falls back to append.

use crate::language::{GroupingSyntax, Language};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Join new cases to the existing final group when possible.
    #[default]
    Splice,
    /// Add the new text after a blank line.
    Append,
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeStrategy::Splice => write!(f, "splice"),
            MergeStrategy::Append => write!(f, "append"),
        }
    }
}

/// Merged text and the strategy that actually produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub content: String,
    pub applied: MergeStrategy,
}

/// Merge `new` into `existing`. Everything in `existing` is preserved.
pub fn merge_tests(
    existing: &str,
    new: &str,
    language: Language,
    strategy: MergeStrategy,
) -> MergeOutcome {
    if strategy == MergeStrategy::Splice {
        if let Some(content) = splice(existing, new, language) {
            return MergeOutcome {
                content,
                applied: MergeStrategy::Splice,
            };
        }
        tracing::debug!("Splice not possible, appending new tests");
    }

    MergeOutcome {
        content: append(existing, new),
        applied: MergeStrategy::Append,
    }
}

fn append(existing: &str, new: &str) -> String {
    let existing = existing.trim_end();
    let new = new.trim();
    if existing.is_empty() {
        return format!("{new}\n");
    }
    if new.is_empty() {
        return format!("{existing}\n");
    }
    format!("{existing}\n\n{new}\n")
}

/// The body of the first top-level group in `text`, plus everything before it.
fn isolate_group_body<'a>(text: &'a str, grouping: &GroupingSyntax) -> Option<(&'a str, &'a str)> {
    let open = grouping.open.find(text)?;
    let rest = &text[open.end()..];
    let close = grouping.close.find(rest)?;
    let body = &rest[..close.start()];
    // A body that closes more braces than it opens spans several groups.
    if body.trim().is_empty() || !braces_balanced(body) {
        return None;
    }
    Some((&text[..open.start()], body))
}

fn braces_balanced(text: &str) -> bool {
    let mut depth: i64 = 0;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Start of the line holding `pos`, moved up over attribute lines attached to it.
fn group_line_start(text: &str, pos: usize) -> usize {
    let mut start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    while start > 0 {
        let previous = text[..start - 1].rfind('\n').map_or(0, |i| i + 1);
        if !text[previous..start].trim_start().starts_with("#[") {
            break;
        }
        start = previous;
    }
    start
}

/// Non-import prelude lines of the new text that `existing` lacks, in blank-line
/// separated blocks. Self-contained lines already in `existing` are skipped.
fn carried_setup(lines: &[&str], existing: &str) -> String {
    let already_present = |line: &str| existing.lines().any(|l| l.trim() == line.trim());

    let mut blocks = Vec::new();
    for block in lines.split(|l| l.trim().is_empty()) {
        let kept: Vec<&str> = block
            .iter()
            .map(|l| l.trim_end())
            .filter(|l| !(braces_balanced(l) && already_present(*l)))
            .collect();
        if !kept.is_empty() {
            blocks.push(kept.join("\n"));
        }
    }
    blocks.join("\n\n")
}

fn splice(existing: &str, new: &str, language: Language) -> Option<String> {
    let syntax = language.syntax();
    let grouping = syntax.grouping.as_ref()?;

    let (prelude, body) = isolate_group_body(new, grouping)?;

    // The text must end with the closer of a group, not of a trailing
    // top-level case, hook or function.
    let close = grouping.close.find(existing)?;
    let group = grouping.open.find_iter(existing).find(|open| {
        open.end() <= close.start() && braces_balanced(&existing[open.end()..close.start()])
    })?;

    let already_present =
        |line: &str| existing.lines().any(|l| l.trim() == line.trim());

    let (imports, setup): (Vec<&str>, Vec<&str>) = prelude
        .lines()
        .partition(|l| syntax.prelude_line.is_match(l));
    let imports: Vec<&str> = imports.into_iter().filter(|l| !already_present(*l)).collect();
    let setup = carried_setup(&setup, existing);

    let body: Vec<&str> = body
        .lines()
        .filter(|l| !(syntax.prelude_line.is_match(l) && already_present(*l)))
        .collect();
    let body = body.join("\n");
    let body = body.trim_matches('\n').trim_end();

    let mut merged = String::with_capacity(existing.len() + new.len() + 4);
    for import in &imports {
        merged.push_str(import.trim_end());
        merged.push('\n');
    }
    if setup.is_empty() {
        merged.push_str(existing[..close.start()].trim_end());
    } else {
        let insert_at = group_line_start(existing, group.start());
        let head = existing[..insert_at].trim_end();
        if !head.is_empty() {
            merged.push_str(head);
            merged.push_str("\n\n");
        }
        merged.push_str(&setup);
        merged.push_str("\n\n");
        merged.push_str(existing[insert_at..close.start()].trim_end());
    }
    merged.push_str("\n\n");
    merged.push_str(body);
    merged.push('\n');
    merged.push_str(&existing[close.start()..]);
    Some(merged)
}
