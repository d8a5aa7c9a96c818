//! String sanitizers and format checks.
//!
//! Everything here is a pure function over `&str`. Escaping and stripping are
//! separate concerns: [`sanitize_html`] is for output, [`sanitize_for_storage`]
//! is for persisting user text, and neither is an XSS defense on its own.

use crate::domain::error::{ErrorCode, ValidationResult};
use regex::{Regex, RegexSet};
use std::sync::LazyLock;

static UUID_V4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("UUID pattern is valid")
});
static MOCK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^mock-\d{1,3}$").expect("mock id pattern is valid"));
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));
static SCRIPT_PROTOCOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)javascript:").expect("protocol pattern is valid"));
static EVENT_HANDLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)on\w+=").expect("handler pattern is valid"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));
static FILE_NAME_DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._-]").expect("file name pattern is valid"));

// Matched against the upper-cased, whitespace-collapsed input.
static SQL_INJECTION: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"\b(SELECT|INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|TRUNCATE)\b",
        r"\b(UNION|JOIN|WHERE|FROM|INTO|VALUES|SET)\b",
        r"\b(HAVING|GROUP BY|ORDER BY|LIMIT|OFFSET)\b",
        r"\b(GRANT|REVOKE|COMMIT|ROLLBACK|SAVEPOINT)\b",
        r"\b(CONCAT|SUBSTRING|CHAR|ASCII|HEX|UNHEX)\s*\(",
        r"\b(SLEEP|BENCHMARK|WAITFOR|DELAY)\s*\(",
        r"\b(LOAD_FILE|INTO OUTFILE|INTO DUMPFILE)\b",
        r"--",
        r"#",
        r"/\*",
        r"\*/",
        r#"['"`]\s*(OR|AND)\s"#,
        r"\b(OR|AND)\s+\d+\s*=\s*\d+",
        r#"\b(OR|AND)\s+['"`]"#,
        r"\b(EXEC|EXECUTE|XP_|SP_)\b",
        r"(?i)\\x00|\\0|%00",
        r"(?i)0x[0-9a-f]{4,}",
        r#"['"`]\s*\+\s*['"`]"#,
        r#"['"`]\s*\|\|\s*['"`]"#,
        r"CHAR\s*\(\s*\d+",
        r"\bCASE WHEN\b",
        r"\bIF\s*\(",
        r"INFORMATION_SCHEMA",
        r"SYS\.(ALL_|DBA_|USER_)",
        r"PG_CATALOG",
        r"\(\s*SELECT\b",
    ])
    .expect("injection patterns are valid")
});

/// Maximum stored email length, in characters.
pub const MAX_EMAIL_LEN: usize = 255;
/// Maximum sanitized file name length, in characters.
pub const MAX_FILE_NAME_LEN: usize = 100;

/// True only for canonical UUID v4 syntax, case-insensitive.
///
/// ```
/// use portal_guard::domain::sanitize::is_valid_uuid;
///
/// assert!(is_valid_uuid("550e8400-e29b-41d4-a716-446655440000"));
/// assert!(!is_valid_uuid("550e8400-e29b-41d4-a716-446655440000' OR '1'='1"));
/// assert!(!is_valid_uuid("550e8400-e29b-11d4-a716-446655440000"));
/// ```
pub fn is_valid_uuid(s: &str) -> bool {
    UUID_V4.is_match(s)
}

/// True when `s` names a seeded placeholder entity (`mock-` prefix).
pub fn is_mock_id(s: &str) -> bool {
    s.starts_with("mock-")
}

/// Accept a UUID v4 or a well-formed mock id (`mock-` plus 1 to 3 digits).
pub fn validate_id(s: &str) -> ValidationResult<&str> {
    let valid = if is_mock_id(s) {
        MOCK_ID.is_match(s)
    } else {
        is_valid_uuid(s)
    };
    if valid {
        Ok(s)
    } else {
        Err(ErrorCode::InvalidFormat)
    }
}

/// Escape HTML-significant characters.
///
/// Not idempotent: escaping twice double-encodes ampersands.
pub fn sanitize_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '/' => out.push_str("&#x2F;"),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            _ => out.push(c),
        }
    }
    out
}

/// Remove `<...>` tag markup, keeping the text between tags.
pub fn strip_html(s: &str) -> String {
    HTML_TAG.replace_all(s, "").into_owned()
}

/// Clean free text before persisting it.
///
/// Drops NUL bytes, tags, `javascript:` and inline `on*=` handlers, then
/// collapses whitespace runs to single spaces and trims.
pub fn sanitize_for_storage(s: &str) -> String {
    let without_nul = s.replace('\0', "");
    let stripped = HTML_TAG.replace_all(&without_nul, "");
    let no_protocol = SCRIPT_PROTOCOL.replace_all(&stripped, "");
    let no_handlers = EVENT_HANDLER.replace_all(&no_protocol, "");
    WHITESPACE_RUN
        .replace_all(&no_handlers, " ")
        .trim()
        .to_string()
}

/// Lowercase, trim and truncate an email. Does not check the format.
pub fn sanitize_email(s: &str) -> String {
    s.trim().to_lowercase().chars().take(MAX_EMAIL_LEN).collect()
}

/// Harden a user-supplied file name for storage paths.
///
/// ```
/// use portal_guard::domain::sanitize::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("../../../etc/passwd"), "etcpasswd");
/// assert_eq!(sanitize_file_name("写真.jpg"), "__.jpg");
/// ```
pub fn sanitize_file_name(s: &str) -> String {
    let mut name: String = s.chars().filter(|c| *c != '/' && *c != '\\').collect();
    while name.contains("..") {
        name = name.replace("..", "");
    }
    FILE_NAME_DISALLOWED
        .replace_all(&name, "_")
        .chars()
        .take(MAX_FILE_NAME_LEN)
        .collect()
}

/// Whether `s` looks like an SQL injection attempt.
///
/// Deliberately broad; only use it on fields that never carry prose.
pub fn has_sql_injection_pattern(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let normalized = WHITESPACE_RUN.replace_all(&s.to_uppercase(), " ").into_owned();
    SQL_INJECTION.is_match(&normalized)
}

/// Reject input that matches [`has_sql_injection_pattern`].
pub fn validate_no_injection(s: &str) -> ValidationResult<&str> {
    if has_sql_injection_pattern(s) {
        Err(ErrorCode::InvalidInput)
    } else {
        Ok(s)
    }
}

/// Mask a value for logs: `ab***yz` when longer than 4 characters, else `***`.
pub fn mask_value(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 4 {
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}***{}", head, tail)
    } else {
        "***".to_string()
    }
}

/// Keep the first `n` characters and append `***`.
pub(crate) fn mask_prefix(s: &str, n: usize) -> String {
    let head: String = s.chars().take(n).collect();
    format!("{}***", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_uuids() {
        assert!(is_valid_uuid("123e4567-e89b-42d3-a456-426614174000"));
        assert!(is_valid_uuid("550E8400-E29B-41D4-A716-446655440000"));
        assert!(is_valid_uuid("6ba7b810-9dad-4Ad1-bfd4-00c04fd430c8"));
    }

    #[test]
    fn test_invalid_uuids() {
        assert!(!is_valid_uuid(""));
        assert!(!is_valid_uuid("not-a-uuid"));
        assert!(!is_valid_uuid("123e4567-e89b-42d3-a456-42661417400"));
        assert!(!is_valid_uuid("123e4567-e89b-42d3-a456-4266141740000"));
        assert!(!is_valid_uuid("123e4567-e89b-32d3-a456-426614174000"));
        assert!(!is_valid_uuid("123e4567-e89b-42d3-c456-426614174000"));
        assert!(!is_valid_uuid("123e4567e89b42d3a456426614174000"));
        assert!(!is_valid_uuid("123e4567-e89b-42d3-a456-426614174000; DROP TABLE users;"));
        assert!(!is_valid_uuid("123e4567-e89b-42d3-a456-426614174000/../../etc/passwd"));
        assert!(!is_valid_uuid(" 123e4567-e89b-42d3-a456-426614174000"));
    }

    #[test]
    fn test_mock_ids() {
        assert!(is_mock_id("mock-1"));
        assert!(is_mock_id("mock-anything"));
        assert!(!is_mock_id("Mock-1"));
        assert!(!is_mock_id("123e4567-e89b-42d3-a456-426614174000"));
    }

    #[test]
    fn test_validate_id() {
        assert_eq!(validate_id("mock-12"), Ok("mock-12"));
        assert_eq!(validate_id("mock-1234"), Err(ErrorCode::InvalidFormat));
        assert_eq!(validate_id("mock-abc"), Err(ErrorCode::InvalidFormat));
        assert!(validate_id("123e4567-e89b-42d3-a456-426614174000").is_ok());
        assert_eq!(validate_id("42"), Err(ErrorCode::InvalidFormat));
    }

    #[test]
    fn test_sanitize_html() {
        assert_eq!(
            sanitize_html("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;&#x2F;script&gt;"
        );
        assert_eq!(sanitize_html("a & \"b\""), "a &amp; &quot;b&quot;");
        assert_eq!(sanitize_html("&amp;"), "&amp;amp;");
        assert_eq!(sanitize_html("plain text"), "plain text");
    }

    #[test]
    fn test_strip_html_keeps_content() {
        assert_eq!(strip_html("<b>bold</b> text"), "bold text");
        assert_eq!(strip_html("<script>alert(1)</script>"), "alert(1)");
        assert_eq!(strip_html("no tags"), "no tags");
    }

    #[test]
    fn test_sanitize_for_storage() {
        assert_eq!(sanitize_for_storage("  hello   \n\n world  "), "hello world");
        assert_eq!(sanitize_for_storage("<p>Hi</p> <b>there</b>"), "Hi there");
        assert_eq!(sanitize_for_storage("a\0b"), "ab");
        assert_eq!(sanitize_for_storage("JavaScript:alert(1)"), "alert(1)");
        assert_eq!(sanitize_for_storage("x onclick=run()"), "x run()");
        assert_eq!(sanitize_for_storage("text <br> "), "text");
    }

    #[test]
    fn test_sanitize_email() {
        assert_eq!(sanitize_email("  User@Example.COM "), "user@example.com");
        let long = format!("{}@example.com", "a".repeat(300));
        assert_eq!(sanitize_email(&long).chars().count(), MAX_EMAIL_LEN);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("photo.jpg"), "photo.jpg");
        assert_eq!(sanitize_file_name("my-photo_2024.jpg"), "my-photo_2024.jpg");
        assert_eq!(sanitize_file_name("path/to/file.jpg"), "pathtofile.jpg");
        assert_eq!(sanitize_file_name("path\\to\\file.jpg"), "pathtofile.jpg");
        assert_eq!(sanitize_file_name("photo@#$%.jpg"), "photo____.jpg");
        assert_eq!(sanitize_file_name(""), "");
        assert_eq!(sanitize_file_name("./."), "");
    }

    #[test]
    fn test_sanitize_file_name_length() {
        let long = format!("{}.jpg", "a".repeat(150));
        assert_eq!(sanitize_file_name(&long).len(), MAX_FILE_NAME_LEN);
        let wide = "写".repeat(500);
        assert_eq!(sanitize_file_name(&wide).chars().count(), MAX_FILE_NAME_LEN);
    }

    #[test]
    fn test_sql_injection_patterns() {
        assert!(has_sql_injection_pattern("1; DROP TABLE users"));
        assert!(has_sql_injection_pattern("' OR 1=1"));
        assert!(has_sql_injection_pattern("admin'--"));
        assert!(has_sql_injection_pattern("x' or 'a'='a"));
        assert!(has_sql_injection_pattern("sleep(5)"));
        assert!(has_sql_injection_pattern("0x41424344"));
        assert!(has_sql_injection_pattern("information_schema.tables"));
        assert!(!has_sql_injection_pattern(""));
        assert!(!has_sql_injection_pattern("Room 301"));
        assert!(!has_sql_injection_pattern("hello world"));
    }

    #[test]
    fn test_validate_no_injection() {
        assert_eq!(validate_no_injection("tennis"), Ok("tennis"));
        assert_eq!(
            validate_no_injection("1 UNION SELECT password"),
            Err(ErrorCode::InvalidInput)
        );
    }

    #[test]
    fn test_mask_value() {
        assert_eq!(mask_value("secret-token"), "se***en");
        assert_eq!(mask_value("abcd"), "***");
        assert_eq!(mask_value(""), "***");
        assert_eq!(mask_prefix("user@example.com", 3), "use***");
        assert_eq!(mask_prefix("ab", 3), "ab***");
    }
}
