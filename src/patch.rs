//! Line-oriented `s/old/new/` edit parsing and application.

use once_cell::sync::Lazy;
use regex::Regex;

/// GBNF grammar attached to reviewer requests so the model can only emit
/// well-formed edits.
pub const SED_GRAMMAR: &str = r#"
root   ::= (edits)*
edits  ::= "s/" old "/" new "/\n"
old    ::= [^\n/]+
new    ::= [^\n/]+
"#;

static EDIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"s/([^/\n]+)/([^/\n]+)/").unwrap());

/// A single textual replacement. Neither side may span lines or contain `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOp {
    pub old: String,
    pub new: String,
}

/// Scan `text` for `s/old/new/` edits, in order of appearance.
///
/// No matches is not an error; the caller reads an empty sequence as "no
/// issues found".
///
/// # Examples
///
/// ```
/// use redraft::patch::parse_patches;
///
/// let ops = parse_patches("s/foo/bar/\ns/baz/qux/\n");
/// assert_eq!(ops.len(), 2);
/// assert_eq!(ops[0].old, "foo");
/// assert_eq!(ops[1].new, "qux");
/// ```
pub fn parse_patches(text: &str) -> Vec<PatchOp> {
    EDIT.captures_iter(text)
        .map(|caps| PatchOp {
            old: caps[1].to_string(),
            new: caps[2].to_string(),
        })
        .collect()
}

/// Fold `ops` over `draft`, replacing the first occurrence of each `old` in
/// the current text. Ops whose `old` is absent are no-ops.
///
/// Order and the first-occurrence rule are load-bearing: later ops see the
/// output of earlier ones.
pub fn apply_patches(draft: &str, ops: &[PatchOp]) -> String {
    ops.iter().fold(draft.to_string(), |text, op| {
        text.replacen(op.old.as_str(), op.new.as_str(), 1)
    })
}
