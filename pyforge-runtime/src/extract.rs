//! Turning raw model output into runnable Python source.
//!
//! Reasoning models wrap deliberation in `<think>` tags and often fence the
//! final code in markdown despite instructions not to. Extraction order:
//! strip think blocks, prefer a python-tagged fence, fall back to any
//! fence, then accept bare text only if it looks like Python.

use regex::Regex;
use std::sync::OnceLock;

fn think_closed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>\s*").expect("hardcoded regex compiles"))
}

fn think_dangling() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*").expect("hardcoded regex compiles"))
}

fn python_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```python\s*\n(.*?)```").expect("hardcoded regex compiles"))
}

fn any_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```\s*\n(.*?)```").expect("hardcoded regex compiles"))
}

fn leading_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```python\s*\n?").expect("hardcoded regex compiles"))
}

fn trailing_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n?```\s*$").expect("hardcoded regex compiles"))
}

/// Remove `<think>...</think>` blocks (including a dangling unterminated one)
pub fn strip_think(text: &str) -> String {
    let text = think_closed().replace_all(text, "");
    let text = think_dangling().replace_all(&text, "");
    text.trim().to_string()
}

/// Markers that make bare (unfenced) text plausible as Python source
const CODE_MARKERS: [&str; 6] = ["def ", "print(", "import ", "for ", "class ", "="];

/// Extract Python source from a model response.
///
/// Returns `None` when the response carries no recognizable code - the
/// model answered in prose instead.
pub fn extract_code(text: &str) -> Option<String> {
    let text = strip_think(text);

    if let Some(captures) = python_fence().captures(&text) {
        return Some(captures[1].trim().to_string());
    }
    if let Some(captures) = any_fence().captures(&text) {
        return Some(captures[1].trim().to_string());
    }

    let cleaned = text.trim();
    if !cleaned.is_empty() && CODE_MARKERS.iter().any(|m| cleaned.contains(m)) {
        // Bare code sometimes keeps a stray fence on one side only
        let cleaned = leading_fence().replace(cleaned, "");
        let cleaned = trailing_fence().replace(&cleaned, "");
        return Some(cleaned.trim().to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_think_closed() {
        let text = "<think>let me reason about this</think>\nprint(2+2)";
        assert_eq!(strip_think(text), "print(2+2)");
    }

    #[test]
    fn test_strip_think_dangling() {
        let text = "print(2+2)\n<think>ran out of tokens mid-thought";
        assert_eq!(strip_think(text), "print(2+2)");
    }

    #[test]
    fn test_strip_think_multiple_blocks() {
        let text = "<think>a</think>x = 1\n<think>b</think>print(x)";
        assert_eq!(strip_think(text), "x = 1\nprint(x)");
    }

    #[test]
    fn test_extract_python_fence() {
        let text = "Here is the code:\n```python\nprint(2+2)\n```\nEnjoy!";
        assert_eq!(extract_code(text), Some("print(2+2)".to_string()));
    }

    #[test]
    fn test_extract_plain_fence() {
        let text = "```\nfor i in range(3):\n    print(i)\n```";
        assert_eq!(
            extract_code(text),
            Some("for i in range(3):\n    print(i)".to_string())
        );
    }

    #[test]
    fn test_python_fence_wins_over_plain() {
        let text = "```\nnot this\n```\n```python\nprint('this')\n```";
        assert_eq!(extract_code(text), Some("print('this')".to_string()));
    }

    #[test]
    fn test_extract_bare_code() {
        let text = "import math\nprint(math.pi)";
        assert_eq!(extract_code(text), Some(text.to_string()));
    }

    #[test]
    fn test_extract_bare_code_with_stray_fence() {
        let text = "```python\nprint('hi')";
        assert_eq!(extract_code(text), Some("print('hi')".to_string()));
    }

    #[test]
    fn test_extract_behind_think_block() {
        let text = "<think>sum of 2 and 2 is 4</think>\n```python\nprint(2 + 2)\n```";
        assert_eq!(extract_code(text), Some("print(2 + 2)".to_string()));
    }

    #[test]
    fn test_prose_yields_none() {
        let text = "I'm sorry, could you clarify what the program should do?";
        assert_eq!(extract_code(text), None);
    }

    #[test]
    fn test_empty_yields_none() {
        assert_eq!(extract_code(""), None);
        assert_eq!(extract_code("<think>only thoughts</think>"), None);
    }
}
