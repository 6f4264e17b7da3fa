//! Pulls source code out of free-form model output.

use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:[A-Za-z0-9_+-]+)?\n(.*?)```").unwrap());
static FENCE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:[A-Za-z0-9_+-]+)?").unwrap());

/// Return the best-guess code payload of `text`.
///
/// The first fenced block wins, with an optional language tag on the opening
/// fence and the first closing fence terminating it. Without a complete block
/// any stray fence markers are stripped and the remainder returned trimmed.
///
/// # Examples
///
/// ```
/// use redraft::extract::extract_code;
///
/// let out = "Here you go:\n```python\nprint('hi')\n```\ntrailing prose";
/// assert_eq!(extract_code(out), "print('hi')");
/// assert_eq!(extract_code("print('hi')"), "print('hi')");
/// ```
pub fn extract_code(text: &str) -> String {
    if let Some(caps) = FENCED_BLOCK.captures(text) {
        return caps[1].trim().to_string();
    }
    FENCE_MARKER.replace_all(text, "").trim().to_string()
}
