//! API key sanitation.
//!
//! Keys pasted into `.env` files regularly pick up quotes, stray newlines,
//! zero-width spaces or a BOM. The Gemini key travels in an HTTP header, and
//! header values must be visible ASCII, so anything else is cleaned here or
//! rejected before the network layer ever sees it.

use std::fmt;

/// Characters silently removed from a key.
const STRIPPED_CHARS: [char; 5] = ['\r', '\n', '\t', '\u{200b}', '\u{feff}'];

/// Keys shorter than this are reported as suspicious by [`diagnose_api_key`].
const MIN_PLAUSIBLE_KEY_LEN: usize = 20;

/// Why a raw key could not be used. Only explains a failure of
/// [`sanitize_api_key`]; it never decides validity on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyProblem {
    Empty,
    Quoted,
    ControlChars,
    NonAscii,
    InternalWhitespace,
    TooShort,
    Unknown,
}

impl KeyProblem {
    pub fn code(&self) -> &'static str {
        match self {
            KeyProblem::Empty => "empty",
            KeyProblem::Quoted => "quoted",
            KeyProblem::ControlChars => "control_chars",
            KeyProblem::NonAscii => "non_ascii",
            KeyProblem::InternalWhitespace => "internal_whitespace",
            KeyProblem::TooShort => "too_short",
            KeyProblem::Unknown => "unknown",
        }
    }
}

impl fmt::Display for KeyProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KeyProblem::Empty => "value is empty",
            KeyProblem::Quoted => "value is wrapped in quotes",
            KeyProblem::ControlChars => "value contains newline/tab/BOM/zero-width characters",
            KeyProblem::NonAscii => "value contains non-ASCII characters",
            KeyProblem::InternalWhitespace => "value contains internal whitespace",
            KeyProblem::TooShort => "value is unusually short",
            KeyProblem::Unknown => "unknown format error",
        };
        f.write_str(msg)
    }
}

fn strip_matching_quotes(s: &str) -> &str {
    for quote in ['\'', '"'] {
        if s.starts_with(quote) && s.ends_with(quote) {
            return if s.len() >= 2 { &s[1..s.len() - 1] } else { "" };
        }
    }
    s
}

fn is_quoted(s: &str) -> bool {
    ['\'', '"']
        .iter()
        .any(|q| s.starts_with(*q) && s.ends_with(*q))
}

/// Clean a raw key from configuration.
///
/// Returns `None` when nothing usable is left: empty, non-ASCII, or with
/// whitespace inside the key.
pub fn sanitize_api_key(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    let unquoted = strip_matching_quotes(trimmed);

    let cleaned: String = unquoted
        .chars()
        .filter(|c| !STRIPPED_CHARS.contains(c))
        .collect();
    let cleaned = cleaned.trim();

    if !cleaned.is_ascii() {
        return None;
    }
    if cleaned.chars().any(char::is_whitespace) {
        return None;
    }
    if cleaned.is_empty() {
        return None;
    }
    Some(cleaned.to_string())
}

/// Classify what is wrong with a raw key, first match wins.
pub fn diagnose_api_key(raw: Option<&str>) -> KeyProblem {
    let raw = match raw {
        Some(r) if !r.trim().is_empty() => r,
        _ => return KeyProblem::Empty,
    };

    if is_quoted(raw.trim()) {
        return KeyProblem::Quoted;
    }
    if raw.chars().any(|c| STRIPPED_CHARS.contains(&c)) {
        return KeyProblem::ControlChars;
    }
    if !raw.is_ascii() {
        return KeyProblem::NonAscii;
    }
    if raw.trim().chars().any(char::is_whitespace) {
        return KeyProblem::InternalWhitespace;
    }
    if raw.trim_matches(|c| c == '"' || c == '\'').len() < MIN_PLAUSIBLE_KEY_LEN {
        return KeyProblem::TooShort;
    }
    KeyProblem::Unknown
}

/// Sanitize, and explain the rejection when there is one.
pub fn check_api_key(raw: Option<&str>) -> Result<String, KeyProblem> {
    sanitize_api_key(raw).ok_or_else(|| diagnose_api_key(raw))
}

/// Shown instead of values too short to preview without revealing them.
const MASK_PLACEHOLDER: &str = "****";

/// Preview of a secret for diagnostics: `abcd...wxyz`.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return MASK_PLACEHOLDER.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AIzaSyD-abcdefghijklmnopqrstuvwx";

    #[test]
    fn test_clean_key_passes_through() {
        assert_eq!(sanitize_api_key(Some(KEY)), Some(KEY.to_string()));
    }

    #[test]
    fn test_strips_quotes_and_padding() {
        let raw = format!("  \"{}\"  ", KEY);
        assert_eq!(sanitize_api_key(Some(&raw)), Some(KEY.to_string()));
        let raw = format!("'{}'", KEY);
        assert_eq!(sanitize_api_key(Some(&raw)), Some(KEY.to_string()));
    }

    #[test]
    fn test_removes_hidden_characters() {
        let raw = format!("\u{feff}{}\r\n", KEY);
        assert_eq!(sanitize_api_key(Some(&raw)), Some(KEY.to_string()));
        let raw = "AIza\u{200b}SyD-abcdefghijklmnopqrstuvwx";
        assert_eq!(sanitize_api_key(Some(raw)), Some(KEY.to_string()));
    }

    #[test]
    fn test_rejects_invalid_keys() {
        assert_eq!(sanitize_api_key(None), None);
        assert_eq!(sanitize_api_key(Some("   ")), None);
        assert_eq!(sanitize_api_key(Some("\"\"")), None);
        assert_eq!(sanitize_api_key(Some("키AIzaSyD-abcdefghijklmnop")), None);
        assert_eq!(sanitize_api_key(Some("AIza SyD-abcdefghijklmnop")), None);
    }

    #[test]
    fn test_diagnosis_reasons() {
        assert_eq!(diagnose_api_key(None), KeyProblem::Empty);
        assert_eq!(diagnose_api_key(Some("  ")), KeyProblem::Empty);
        assert_eq!(diagnose_api_key(Some("'abc def'")), KeyProblem::Quoted);
        assert_eq!(diagnose_api_key(Some("abc\u{200b}")), KeyProblem::ControlChars);
        assert_eq!(diagnose_api_key(Some("키값")), KeyProblem::NonAscii);
        assert_eq!(diagnose_api_key(Some("abc def")), KeyProblem::InternalWhitespace);
        assert_eq!(diagnose_api_key(Some("short")), KeyProblem::TooShort);
        assert_eq!(diagnose_api_key(Some(KEY)), KeyProblem::Unknown);
    }

    #[test]
    fn test_check_reports_reason_only_on_failure() {
        assert_eq!(check_api_key(Some(KEY)), Ok(KEY.to_string()));
        assert_eq!(check_api_key(Some("abc def")), Err(KeyProblem::InternalWhitespace));
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("short"), "****");
        assert_eq!(mask("12345678"), "****");
        assert_eq!(mask("123456789"), "1234...6789");
        assert_eq!(mask(KEY), "AIza...uvwx");
    }
}
