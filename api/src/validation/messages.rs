//! Default validation messages and placeholder rendering.

/// Which measurement a `min` / `max` / `size` rule applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeKind {
    Numeric,
    File,
    String,
    Array,
}

/// Default template for `rule_key`. Password sub-rules use their own keys
/// (`letters`, `mixed`, `numbers`, `symbols`, `uncompromised`).
pub fn default_template(rule_key: &str, size: Option<SizeKind>) -> &'static str {
    match (rule_key, size) {
        ("required", _) => "The :attribute field is required.",
        ("string", _) => "The :attribute field must be a string.",
        ("integer", _) => "The :attribute field must be an integer.",
        ("numeric", _) => "The :attribute field must be a number.",
        ("boolean", _) => "The :attribute field must be true or false.",
        ("array", _) => "The :attribute field must be an array.",
        ("file", _) => "The :attribute field must be a file.",
        ("image", _) => "The :attribute field must be an image.",
        ("email", _) => "The :attribute field must be a valid email address.",
        ("url", _) => "The :attribute field must be a valid URL.",
        ("regex", _) => "The :attribute field format is invalid.",
        ("in", _) | ("exists", _) => "The selected :attribute is invalid.",
        ("confirmed", _) => "The :attribute field confirmation does not match.",
        ("different", _) => "The :attribute field and :other must be different.",
        ("unique", _) => "The :attribute has already been taken.",
        ("mimes", _) => "The :attribute field must be a file of type: :values.",
        ("dimensions", _) => "The :attribute field has invalid image dimensions.",

        ("min", Some(SizeKind::Numeric)) => "The :attribute field must be at least :min.",
        ("min", Some(SizeKind::File)) => "The :attribute field must be at least :min kilobytes.",
        ("min", Some(SizeKind::Array)) => "The :attribute field must have at least :min items.",
        ("min", _) => "The :attribute field must be at least :min characters.",

        ("max", Some(SizeKind::Numeric)) => "The :attribute field must not be greater than :max.",
        ("max", Some(SizeKind::File)) => {
            "The :attribute field must not be greater than :max kilobytes."
        }
        ("max", Some(SizeKind::Array)) => {
            "The :attribute field must not have more than :max items."
        }
        ("max", _) => "The :attribute field must not be greater than :max characters.",

        ("size", Some(SizeKind::Numeric)) => "The :attribute field must be :size.",
        ("size", Some(SizeKind::File)) => "The :attribute field must be :size kilobytes.",
        ("size", Some(SizeKind::Array)) => "The :attribute field must contain :size items.",
        ("size", _) => "The :attribute field must be :size characters.",

        ("letters", _) => "The :attribute field must contain at least one letter.",
        ("mixed", _) => {
            "The :attribute field must contain at least one uppercase and one lowercase letter."
        }
        ("numbers", _) => "The :attribute field must contain at least one number.",
        ("symbols", _) => "The :attribute field must contain at least one symbol.",
        ("uncompromised", _) => {
            "The given :attribute has appeared in a data leak. Please choose a different :attribute."
        }
        ("unverifiable", _) => {
            "The :attribute could not be verified right now. Please try again shortly."
        }

        _ => "The :attribute field is invalid.",
    }
}

/// Replace `:attribute` and any `(name, value)` placeholders in `template`.
///
/// Longer placeholder names are replaced first so `:min` never clobbers a
/// hypothetical `:min_width`.
pub fn render(template: &str, attribute: &str, replacements: &[(&str, String)]) -> String {
    let mut ordered: Vec<&(&str, String)> = replacements.iter().collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = template.replace(":attribute", attribute);
    for (name, value) in ordered {
        out = out.replace(&format!(":{name}"), value);
    }
    out
}

/// Render a bound the way a user would write it (`8`, not `8.0`).
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
