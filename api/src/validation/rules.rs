//! Declarative rule tables
//!
//! Each endpoint declares an [`EndpointSpec`]: an ordered list of fields, each
//! with an ordered list of [`Rule`]s, plus display labels, message overrides,
//! request defaults and post-validation hooks. The tables are plain data; the
//! evaluator in `validators` interprets them.

use std::collections::HashMap;

use regex::Regex;
use shared::{FieldMap, FieldValue};

use super::hooks::PostValidator;

/// A single constraint attached to a field.
#[derive(Debug, Clone)]
pub enum Rule {
    // Presence
    Required,
    Nullable,
    Sometimes,

    // Type / shape
    String,
    Integer,
    Numeric,
    Boolean,
    Array,
    File,
    Image,
    Email,
    Url,

    // Bounds (chars, numeric value, item count or kilobytes)
    Min(f64),
    Max(f64),
    Size(f64),

    Regex(&'static Regex),
    In(&'static [&'static str]),

    // Cross-field
    Confirmed,
    Different(&'static str),

    // Delegated to the record store
    Exists {
        table: &'static str,
        column: &'static str,
    },
    Unique {
        table: &'static str,
        column: &'static str,
        ignore_current: bool,
    },

    Password(PasswordPolicy),
    Mimes(&'static [&'static str]),
    Dimensions(DimensionBounds),
}

impl Rule {
    /// Name used for message overrides (`"<field>.<key>"` or `"<key>"`).
    pub fn key(&self) -> &'static str {
        match self {
            Rule::Required => "required",
            Rule::Nullable => "nullable",
            Rule::Sometimes => "sometimes",
            Rule::String => "string",
            Rule::Integer => "integer",
            Rule::Numeric => "numeric",
            Rule::Boolean => "boolean",
            Rule::Array => "array",
            Rule::File => "file",
            Rule::Image => "image",
            Rule::Email => "email",
            Rule::Url => "url",
            Rule::Min(_) => "min",
            Rule::Max(_) => "max",
            Rule::Size(_) => "size",
            Rule::Regex(_) => "regex",
            Rule::In(_) => "in",
            Rule::Confirmed => "confirmed",
            Rule::Different(_) => "different",
            Rule::Exists { .. } => "exists",
            Rule::Unique { .. } => "unique",
            Rule::Password(_) => "password",
            Rule::Mimes(_) => "mimes",
            Rule::Dimensions(_) => "dimensions",
        }
    }

    pub fn is_presence(&self) -> bool {
        matches!(self, Rule::Required | Rule::Nullable | Rule::Sometimes)
    }
}

/// Composite password strength requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub letters: bool,
    pub mixed_case: bool,
    pub numbers: bool,
    pub symbols: bool,
    /// Consult the breach corpus once every other requirement passes.
    pub uncompromised: bool,
}

impl PasswordPolicy {
    /// Eight characters, letters in both cases, a digit, a symbol, not breached.
    pub const fn strong() -> Self {
        Self {
            min_length: 8,
            letters: true,
            mixed_case: true,
            numbers: true,
            symbols: true,
            uncompromised: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimensionBounds {
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

/// Rules for one input field, with optional rules for each list element.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub rules: Vec<Rule>,
    pub each: Vec<Rule>,
}

impl FieldSpec {
    pub fn new(name: &'static str, rules: Vec<Rule>) -> Self {
        Self {
            name,
            rules,
            each: Vec::new(),
        }
    }

    /// Rules applied to every element when the value is a list (`field.*`).
    pub fn each(mut self, rules: Vec<Rule>) -> Self {
        self.each = rules;
        self
    }

    pub fn has(&self, key: &str) -> bool {
        self.rules.iter().any(|r| r.key() == key)
    }
}

/// The full rule table for one endpoint.
pub struct EndpointSpec {
    pub name: &'static str,
    fields: Vec<FieldSpec>,
    attributes: HashMap<&'static str, &'static str>,
    messages: HashMap<&'static str, &'static str>,
    defaults: Vec<(&'static str, FieldValue)>,
    hooks: Vec<Box<dyn PostValidator>>,
    sanitize: bool,
}

impl EndpointSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
            attributes: HashMap::new(),
            messages: HashMap::new(),
            defaults: Vec::new(),
            hooks: Vec::new(),
            sanitize: true,
        }
    }

    /// Skip input sanitization; values reach the rules exactly as sent.
    pub fn unsanitized(mut self) -> Self {
        self.sanitize = false;
        self
    }

    pub fn sanitizes(&self) -> bool {
        self.sanitize
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Display label substituted for `:attribute`.
    pub fn attribute(mut self, field: &'static str, label: &'static str) -> Self {
        self.attributes.insert(field, label);
        self
    }

    /// Message overrides keyed `"<field>.<rule>"` or `"<rule>"`; later
    /// entries win.
    pub fn messages(mut self, overrides: &[(&'static str, &'static str)]) -> Self {
        self.messages.extend(overrides.iter().copied());
        self
    }

    /// Value merged into the input when the client did not send the field.
    pub fn default_value(mut self, field: &'static str, value: impl Into<FieldValue>) -> Self {
        self.defaults.push((field, value.into()));
        self
    }

    pub fn hook(mut self, hook: impl PostValidator + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn hooks(&self) -> &[Box<dyn PostValidator>] {
        &self.hooks
    }

    pub fn declares(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.name == field)
    }

    /// Label for `key`; element keys (`health.2`) fall back to the `pattern`
    /// (`health.*`) before using the raw key with underscores spaced out.
    pub fn attribute_label(&self, key: &str, pattern: &str) -> String {
        self.attributes
            .get(key)
            .or_else(|| self.attributes.get(pattern))
            .map(|label| label.to_string())
            .unwrap_or_else(|| key.replace('_', " "))
    }

    pub fn message_override(&self, pattern: &str, rule_key: &str) -> Option<&'static str> {
        self.messages
            .get(format!("{pattern}.{rule_key}").as_str())
            .or_else(|| self.messages.get(rule_key))
            .copied()
    }

    /// Copy of `raw` with missing defaults filled in.
    pub fn apply_defaults(&self, raw: &FieldMap) -> FieldMap {
        let mut prepared = raw.clone();
        for (field, value) in &self.defaults {
            prepared
                .entry(field.to_string())
                .or_insert_with(|| value.clone());
        }
        prepared
    }
}

impl std::fmt::Debug for EndpointSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointSpec")
            .field("name", &self.name)
            .field("sanitize", &self.sanitize)
            .field("fields", &self.fields)
            .field("hooks", &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> EndpointSpec {
        EndpointSpec::new("test")
            .field(FieldSpec::new("full_name", vec![Rule::Required, Rule::String]))
            .field(FieldSpec::new("tags", vec![Rule::Array]).each(vec![Rule::String]))
            .attribute("full_name", "name")
            .attribute("tags.*", "tag")
            .messages(&[("regex", "generic"), ("full_name.regex", "specific")])
            .default_value("limit", 20i64)
    }

    #[test]
    fn test_attribute_labels() {
        let spec = spec();
        assert_eq!(spec.attribute_label("full_name", "full_name"), "name");
        assert_eq!(spec.attribute_label("tags.3", "tags.*"), "tag");
        assert_eq!(spec.attribute_label("contact_number", "contact_number"), "contact number");
    }

    #[test]
    fn test_message_override_precedence() {
        let spec = spec();
        assert_eq!(spec.message_override("full_name", "regex"), Some("specific"));
        assert_eq!(spec.message_override("tags", "regex"), Some("generic"));
        assert_eq!(spec.message_override("tags", "max"), None);
    }

    #[test]
    fn test_defaults_do_not_overwrite() {
        let spec = spec();
        let mut raw = FieldMap::new();
        assert_eq!(spec.apply_defaults(&raw)["limit"], FieldValue::Integer(20));

        raw.insert("limit".to_string(), FieldValue::Integer(5));
        assert_eq!(spec.apply_defaults(&raw)["limit"], FieldValue::Integer(5));
    }

    #[test]
    fn test_sanitization_is_on_unless_disabled() {
        assert!(spec().sanitizes());
        assert!(!spec().unsanitized().sanitizes());
    }

    #[test]
    fn test_field_rule_lookup() {
        let spec = spec();
        assert!(spec.declares("tags"));
        assert!(!spec.declares("limit"));
        assert!(spec.fields()[0].has("required"));
        assert!(!spec.fields()[1].has("required"));
    }
}
