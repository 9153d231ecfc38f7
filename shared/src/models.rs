use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// INPUT TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// Field name → value mapping for a single request.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A single request field value.
///
/// Bodies arrive as JSON, query strings or multipart forms; all of them are
/// normalized into this closed set before sanitization so that every later
/// stage can branch on shape without guessing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<FieldValue>),
    Map(FieldMap),
    File(UploadedFile),
}

impl FieldValue {
    pub fn string(value: impl Into<String>) -> Self {
        FieldValue::String(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&UploadedFile> {
        match self {
            FieldValue::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Null, whitespace-only strings and empty lists count as "not filled in".
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::String(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Scalar rendering used for comparisons and external lookups.
    pub fn to_scalar_string(&self) -> Option<String> {
        match self {
            FieldValue::String(s) => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::List(value)
    }
}

impl From<UploadedFile> for FieldValue {
    fn from(value: UploadedFile) -> Self {
        FieldValue::File(value)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => FieldValue::String(s),
            serde_json::Value::Array(items) => {
                FieldValue::List(items.into_iter().map(FieldValue::from).collect())
            }
            serde_json::Value::Object(obj) => FieldValue::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, FieldValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Convert a JSON body into a field map. Only objects are accepted.
pub fn fields_from_json(value: serde_json::Value) -> Option<FieldMap> {
    match FieldValue::from(value) {
        FieldValue::Map(map) => Some(map),
        _ => None,
    }
}

/// Metadata of an uploaded file, filled in by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub dimensions: Option<Dimensions>,
}

impl UploadedFile {
    /// Size in kilobytes, the unit used by `min`/`max` on files.
    pub fn size_kilobytes(&self) -> f64 {
        self.size_bytes as f64 / 1024.0
    }

    /// Extension derived from the MIME type (`image/jpeg` → `jpeg`).
    pub fn mime_extension(&self) -> Option<&str> {
        self.mime_type.split('/').nth(1).map(|sub| {
            sub.split(|c| c == ';' || c == '+')
                .next()
                .unwrap_or(sub)
                .trim()
        })
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self.mime_extension(),
            Some("jpeg" | "jpg" | "png" | "gif" | "bmp" | "svg" | "webp")
        ) && self.mime_type.starts_with("image/")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

// ═══════════════════════════════════════════════════════════════════════════
// REQUEST CONTEXT
// ═══════════════════════════════════════════════════════════════════════════

/// The authenticated caller, when the route sits behind authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub email: String,
}

/// Everything about the inbound request that is not a field value.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestContext {
    pub ip: String,
    pub user_agent: Option<String>,
    pub path: String,
    pub method: String,
    pub identity: Option<Identity>,
}

impl RequestContext {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Self::default()
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_route(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.method = method.into();
        self.path = path.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// OUTCOME TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// Field-keyed validation messages, in the order they were raised per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorBag {
    #[serde(flatten)]
    errors: BTreeMap<String, Vec<String>>,
    /// Seconds until a tripped rate limit resets; surfaced as `Retry-After`.
    #[serde(skip)]
    retry_after: Option<u64>,
}

impl ErrorBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, field: &str) -> Option<&str> {
        self.get(field).first().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of fields with at least one message.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn merge(&mut self, other: ErrorBag) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
        if other.retry_after.is_some() {
            self.retry_after = other.retry_after;
        }
    }

    pub fn set_retry_after(&mut self, seconds: u64) {
        self.retry_after = Some(seconds);
    }

    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    pub fn as_map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Valid(FieldMap),
    Invalid(ErrorBag),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }

    pub fn fields(&self) -> Option<&FieldMap> {
        match self {
            ValidationResult::Valid(fields) => Some(fields),
            ValidationResult::Invalid(_) => None,
        }
    }

    pub fn errors(&self) -> Option<&ErrorBag> {
        match self {
            ValidationResult::Valid(_) => None,
            ValidationResult::Invalid(errors) => Some(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_body_conversion() {
        let fields = fields_from_json(json!({
            "name": "Jane",
            "limit": 20,
            "ratio": 0.5,
            "health": ["vegan", "paleo"],
            "remember": true,
            "company": null
        }))
        .unwrap();

        assert_eq!(fields["name"], FieldValue::string("Jane"));
        assert_eq!(fields["limit"], FieldValue::Integer(20));
        assert_eq!(fields["ratio"], FieldValue::Float(0.5));
        assert_eq!(
            fields["health"],
            FieldValue::List(vec!["vegan".into(), "paleo".into()])
        );
        assert_eq!(fields["remember"], FieldValue::Bool(true));
        assert!(fields["company"].is_null());
    }

    #[test]
    fn test_non_object_body_rejected() {
        assert!(fields_from_json(json!(["a", "b"])).is_none());
        assert!(fields_from_json(json!("text")).is_none());
    }

    #[test]
    fn test_blank_values() {
        assert!(FieldValue::Null.is_blank());
        assert!(FieldValue::string("   ").is_blank());
        assert!(FieldValue::List(vec![]).is_blank());
        assert!(!FieldValue::Integer(0).is_blank());
        assert!(!FieldValue::Bool(false).is_blank());
    }

    #[test]
    fn test_error_bag_accumulates_per_field() {
        let mut bag = ErrorBag::new();
        bag.add("password", "first").add("password", "second").add("email", "bad");

        assert_eq!(bag.len(), 2);
        assert_eq!(bag.get("password"), ["first", "second"]);
        assert_eq!(bag.first("email"), Some("bad"));
        assert!(bag.get("name").is_empty());

        let body = serde_json::to_value(&bag).unwrap();
        assert_eq!(body, json!({"email": ["bad"], "password": ["first", "second"]}));
    }

    #[test]
    fn test_error_bag_merge_keeps_retry_after() {
        let mut left = ErrorBag::new();
        left.add("email", "invalid");
        let mut right = ErrorBag::new();
        right.add("email", "too many attempts");
        right.set_retry_after(42);

        left.merge(right);
        assert_eq!(left.get("email").len(), 2);
        assert_eq!(left.retry_after(), Some(42));
    }

    #[test]
    fn test_uploaded_file_helpers() {
        let file = UploadedFile {
            original_name: "me.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            size_bytes: 2048,
            dimensions: Some(Dimensions { width: 100, height: 100 }),
        };
        assert_eq!(file.mime_extension(), Some("jpeg"));
        assert!(file.is_image());
        assert_eq!(file.size_kilobytes(), 2.0);

        let pdf = UploadedFile {
            mime_type: "application/pdf".to_string(),
            ..file
        };
        assert!(!pdf.is_image());
    }
}
