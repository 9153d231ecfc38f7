//! Input sanitization
//!
//! On endpoints that sanitize, every string is passed through [`sanitize_str`]
//! before any rule sees it. The transform is lossy: markup, SQL keywords,
//! inline event handlers and script-capable URI schemes are removed, the
//! remaining HTML specials are escaped. The output, not the raw input, is
//! what rules and persisted records see.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use shared::{FieldMap, FieldValue};

lazy_static! {
    /// Pattern to match HTML tags
    static ref HTML_TAG_PATTERN: Regex = Regex::new(r"<[^>]*>").unwrap();

    /// `&` that already starts a character reference we emit or accept
    static ref ENTITY_OR_AMP: Regex =
        Regex::new(r"&(?:amp|lt|gt|quot|apos|#0*39|#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6});|&").unwrap();

    static ref SQL_KEYWORDS: Regex = Regex::new(
        r"(?i)\b(?:SELECT|INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|EXEC|UNION|SCRIPT)\b"
    ).unwrap();

    /// `onclick=...` with a raw, escaped or bare value
    static ref EVENT_HANDLER: Regex = Regex::new(
        r#"(?i)\bon\w+\s*=\s*(?:"[^"]*"|'[^']*'|&quot;.*?&quot;|&#0*39;.*?&#0*39;|[^\s&>]*)"#
    ).unwrap();

    static ref SCRIPT_SCHEME: Regex = Regex::new(r"(?i)(?:javascript|data)\s*:").unwrap();
}

/// Sanitize every string in a field map, preserving keys and shape.
pub fn sanitize_fields(fields: &FieldMap) -> FieldMap {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), sanitize_value(value)))
        .collect()
}

/// Sanitize a value recursively; non-string scalars and files pass through.
pub fn sanitize_value(value: &FieldValue) -> FieldValue {
    match value {
        FieldValue::String(s) => FieldValue::String(sanitize_str(s)),
        FieldValue::List(items) => FieldValue::List(items.iter().map(sanitize_value).collect()),
        FieldValue::Map(map) => FieldValue::Map(sanitize_fields(map)),
        other => other.clone(),
    }
}

/// Sanitize one string until it stops changing, so that
/// `sanitize_str(sanitize_str(x)) == sanitize_str(x)`.
///
/// After the first pass every `&`, `<`, `>` and quote is already escaped, so
/// later passes can only remove text and the loop ends.
pub fn sanitize_str(value: &str) -> String {
    let mut current = sanitize_pass(value);
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_pass(value: &str) -> String {
    let stripped = strip_html(value);
    let escaped = escape_html(&stripped);
    let no_sql = remove_sql_keywords(&escaped);
    let no_handlers = remove_script_vectors(&no_sql);
    no_handlers.trim().to_string()
}

/// Strip all HTML tags from a string
pub fn strip_html(value: &str) -> String {
    HTML_TAG_PATTERN.replace_all(value, "").to_string()
}

/// Escape HTML specials, quotes included. Character references that are
/// already present are kept as they are.
pub fn escape_html(value: &str) -> String {
    let amp_safe = ENTITY_OR_AMP.replace_all(value, |caps: &Captures| {
        let m = &caps[0];
        if m == "&" {
            "&amp;".to_string()
        } else {
            m.to_string()
        }
    });

    amp_safe
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

pub fn remove_sql_keywords(value: &str) -> String {
    SQL_KEYWORDS.replace_all(value, "").to_string()
}

/// Remove inline event handlers and `javascript:` / `data:` prefixes.
pub fn remove_script_vectors(value: &str) -> String {
    let no_handlers = EVENT_HANDLER.replace_all(value, "");
    SCRIPT_SCHEME.replace_all(&no_handlers, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<b>bold</b>"), "bold");
        assert_eq!(strip_html("<p>paragraph</p><br/>more"), "paragraphmore");
        assert_eq!(strip_html("no tags here"), "no tags here");
    }

    #[test]
    fn test_script_tag_is_neutralized() {
        let out = sanitize_str("<script>alert('xss')</script>");
        assert!(!out.contains('<'));
        assert!(!out.contains('>'));
        assert!(!out.to_lowercase().contains("<script"));
        assert_eq!(out, "alert(&#039;xss&#039;)");
    }

    #[test]
    fn test_unclosed_markup_is_escaped() {
        let out = sanitize_str("1 < 2 <script");
        assert_eq!(out, "1 &lt; 2 &lt;");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"Tom & "Jerry""#), "Tom &amp; &quot;Jerry&quot;");
        assert_eq!(escape_html("O'Brien"), "O&#039;Brien");
        assert_eq!(escape_html("Acme &amp; Co."), "Acme &amp; Co.");
    }

    #[test]
    fn test_sql_keywords_removed() {
        assert_eq!(sanitize_str("1; DROP TABLE users"), "1;  TABLE users");
        assert_eq!(sanitize_str("union select password"), "password");
        // Not word bounded, left alone
        assert_eq!(sanitize_str("selection"), "selection");
        assert_eq!(sanitize_str("Updated recipe"), "Updated recipe");
    }

    #[test]
    fn test_event_handlers_and_schemes_removed() {
        assert_eq!(sanitize_str(r#"x onclick="steal()" y"#), "x  y");
        assert_eq!(sanitize_str("x onmouseover=steal() y"), "x  y");
        assert_eq!(sanitize_str("javascript:alert(1)"), "alert(1)");
        assert_eq!(sanitize_str("DATA : text/html"), "text/html");
        // Words that merely contain "on" survive
        assert_eq!(sanitize_str("salmon onion"), "salmon onion");
    }

    #[test]
    fn test_schemes_removed_inside_words() {
        assert_eq!(sanitize_str("xjavascript:alert(1)"), "xalert(1)");
        assert_eq!(sanitize_str("_data:payload"), "_payload");
    }

    #[test]
    fn test_deeply_nested_vectors_reach_fixpoint() {
        let schemes = format!("{}{}", "data ".repeat(10), ":".repeat(10));
        let handlers = format!("{}{}", "on".repeat(12), "x=1".repeat(12));
        let keywords = "SELSELSELSELSELSELSELSELSELSELECTECTECTECTECTECTECTECTECTECT";

        for sample in [schemes.as_str(), handlers.as_str(), keywords] {
            let once = sanitize_str(sample);
            assert_eq!(sanitize_str(&once), once, "not idempotent for {sample:?}");
        }
        assert_eq!(sanitize_str(&schemes), "");
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(sanitize_str("  \n\tspaces\t\n"), "spaces");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let samples = [
            "<script>alert('xss')</script>",
            "Acme & Co.",
            "dadata:ta:",
            "data data::",
            "&SELECT;",
            r#"<img src=x onerror="alert(1)">hello"#,
            "  SELECT * FROM users WHERE name = 'a' OR 1=1 --  ",
            "javajavascript:script:",
            "Tom &amp;amp; Jerry",
        ];
        for sample in samples {
            let once = sanitize_str(sample);
            assert_eq!(sanitize_str(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_sanitize_value_recurses_and_preserves_shape() {
        let mut nested = FieldMap::new();
        nested.insert("inner".to_string(), FieldValue::string(" <b>x</b> "));

        let value = FieldValue::List(vec![
            FieldValue::string("<i>vegan</i>"),
            FieldValue::Integer(7),
            FieldValue::Map(nested),
            FieldValue::Bool(true),
        ]);

        let mut expected_inner = FieldMap::new();
        expected_inner.insert("inner".to_string(), FieldValue::string("x"));

        assert_eq!(
            sanitize_value(&value),
            FieldValue::List(vec![
                FieldValue::string("vegan"),
                FieldValue::Integer(7),
                FieldValue::Map(expected_inner),
                FieldValue::Bool(true),
            ])
        );
    }
}
