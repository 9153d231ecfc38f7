//! Field rule evaluator
//!
//! Interprets an [`EndpointSpec`] against a sanitized [`FieldMap`]. Every rule
//! of a field is checked and every failure recorded; only the presence rules
//! short-circuit. Lookups that need the record store or the breach corpus are
//! awaited in rule order.

use lazy_static::lazy_static;
use regex::Regex;
use shared::{DependencyError, ErrorBag, FieldMap, FieldValue, RequestContext};

use super::messages::{self, format_number, SizeKind};
use super::pipeline::Collaborators;
use super::rules::{DimensionBounds, EndpointSpec, FieldSpec, PasswordPolicy, Rule};
use crate::error::PipelineError;
use crate::metrics;

lazy_static! {
    static ref EMAIL_PATTERN: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$"
    ).unwrap();

    static ref URL_PATTERN: Regex = Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").unwrap();

    static ref LETTER: Regex = Regex::new(r"\p{L}").unwrap();
    static ref MIXED_CASE: Regex = Regex::new(r"(\p{Ll}+.*\p{Lu})|(\p{Lu}+.*\p{Ll})").unwrap();
    static ref NUMBER: Regex = Regex::new(r"\p{N}").unwrap();
    static ref SYMBOL: Regex = Regex::new(r"[\p{Z}\p{S}\p{P}]").unwrap();
}

/// Where a rule is being applied: the error key (`health.2`) and the pattern
/// used for labels and overrides (`health.*`).
struct Target<'a> {
    key: &'a str,
    pattern: &'a str,
    value: Option<&'a FieldValue>,
}

/// Everything a rule may consult besides its own value.
struct Scope<'a> {
    spec: &'a EndpointSpec,
    input: &'a FieldMap,
    ctx: &'a RequestContext,
    deps: &'a Collaborators,
}

impl Scope<'_> {
    fn message(
        &self,
        target: &Target<'_>,
        rule_key: &str,
        size: Option<SizeKind>,
        replacements: &[(&str, String)],
    ) -> String {
        let attribute = self.spec.attribute_label(target.key, target.pattern);
        let template = self
            .spec
            .message_override(target.pattern, rule_key)
            .unwrap_or_else(|| messages::default_template(rule_key, size));
        messages::render(template, &attribute, replacements)
    }
}

/// Evaluate every declared field. Returns the accumulated errors and the
/// declared fields that were present, with coercions applied.
pub async fn validate_fields(
    input: &FieldMap,
    spec: &EndpointSpec,
    ctx: &RequestContext,
    deps: &Collaborators,
) -> Result<(ErrorBag, FieldMap), PipelineError> {
    let scope = Scope {
        spec,
        input,
        ctx,
        deps,
    };
    let mut errors = ErrorBag::new();
    let mut values = FieldMap::new();

    for field in spec.fields() {
        let target = Target {
            key: field.name,
            pattern: field.name,
            value: input.get(field.name),
        };
        let numeric = is_numeric_field(&field.rules);
        let Some(mut value) =
            evaluate(&scope, &target, &field.rules, numeric, &mut errors).await?
        else {
            continue;
        };

        if !field.each.is_empty() {
            if let FieldValue::List(items) = &value {
                value = FieldValue::List(evaluate_each(&scope, field, items, &mut errors).await?);
            }
        }

        values.insert(field.name.to_string(), value);
    }

    Ok((errors, values))
}

async fn evaluate_each(
    scope: &Scope<'_>,
    field: &FieldSpec,
    items: &[FieldValue],
    errors: &mut ErrorBag,
) -> Result<Vec<FieldValue>, PipelineError> {
    let pattern = format!("{}.*", field.name);
    let numeric = is_numeric_field(&field.each);
    let mut out = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let key = format!("{}.{index}", field.name);
        let target = Target {
            key: &key,
            pattern: &pattern,
            value: Some(item),
        };
        let coerced = evaluate(scope, &target, &field.each, numeric, errors).await?;
        out.push(coerced.unwrap_or_else(|| item.clone()));
    }

    Ok(out)
}

fn is_numeric_field(rules: &[Rule]) -> bool {
    rules
        .iter()
        .any(|r| matches!(r, Rule::Integer | Rule::Numeric))
}

/// Apply `rules` to one value. `None` means the value is absent and stays out
/// of the validated output.
async fn evaluate(
    scope: &Scope<'_>,
    target: &Target<'_>,
    rules: &[Rule],
    numeric: bool,
    errors: &mut ErrorBag,
) -> Result<Option<FieldValue>, PipelineError> {
    let has = |wanted: fn(&Rule) -> bool| rules.iter().any(wanted);

    let Some(value) = target.value else {
        if has(|r| matches!(r, Rule::Required)) && !has(|r| matches!(r, Rule::Sometimes)) {
            errors.add(target.key, scope.message(target, "required", None, &[]));
        }
        return Ok(None);
    };

    if value.is_null() && has(|r| matches!(r, Rule::Nullable)) {
        return Ok(Some(FieldValue::Null));
    }

    if value.is_blank() {
        if has(|r| matches!(r, Rule::Required)) {
            errors.add(target.key, scope.message(target, "required", None, &[]));
        }
        return Ok(Some(value.clone()));
    }

    let mut coerced = value.clone();

    for rule in rules.iter().filter(|r| !r.is_presence()) {
        let outcome = check_rule(scope, target, rule, value, numeric, errors).await?;
        if let Some(normalized) = outcome {
            coerced = normalized;
        }
    }

    Ok(Some(coerced))
}

/// Check one rule, recording failures in `errors`. Returns a normalized value
/// when the rule coerces its input.
async fn check_rule(
    scope: &Scope<'_>,
    target: &Target<'_>,
    rule: &Rule,
    value: &FieldValue,
    numeric: bool,
    errors: &mut ErrorBag,
) -> Result<Option<FieldValue>, PipelineError> {
    let key = rule.key();
    let fail = |errors: &mut ErrorBag, size: Option<SizeKind>, replacements: &[(&str, String)]| {
        errors.add(target.key, scope.message(target, key, size, replacements));
    };

    match rule {
        Rule::Required | Rule::Nullable | Rule::Sometimes => {}

        Rule::String => {
            if value.as_str().is_none() {
                fail(errors, None, &[]);
            }
        }
        Rule::Integer => match coerce_integer(value) {
            Some(i) => return Ok(Some(FieldValue::Integer(i))),
            None => fail(errors, None, &[]),
        },
        Rule::Numeric => {
            if as_number(value).is_none() {
                fail(errors, None, &[]);
            }
        }
        Rule::Boolean => match coerce_bool(value) {
            Some(b) => return Ok(Some(FieldValue::Bool(b))),
            None => fail(errors, None, &[]),
        },
        Rule::Array => {
            if !matches!(value, FieldValue::List(_) | FieldValue::Map(_)) {
                fail(errors, None, &[]);
            }
        }
        Rule::File => {
            if value.as_file().is_none() {
                fail(errors, None, &[]);
            }
        }
        Rule::Image => {
            if !value.as_file().map(|f| f.is_image()).unwrap_or(false) {
                fail(errors, None, &[]);
            }
        }
        Rule::Email => {
            if !value.as_str().map(is_valid_email).unwrap_or(false) {
                fail(errors, None, &[]);
            }
        }
        Rule::Url => {
            if !value.as_str().map(|s| URL_PATTERN.is_match(s)).unwrap_or(false) {
                fail(errors, None, &[]);
            }
        }

        Rule::Min(bound) | Rule::Max(bound) | Rule::Size(bound) => {
            if let Some((size, kind)) = measure(value, numeric) {
                let passes = match rule {
                    Rule::Min(_) => size >= *bound,
                    Rule::Max(_) => size <= *bound,
                    _ => (size - *bound).abs() < f64::EPSILON,
                };
                if !passes {
                    fail(errors, Some(kind), &[(key, format_number(*bound))]);
                }
            }
        }

        Rule::Regex(pattern) => {
            let matched = value
                .to_scalar_string()
                .map(|s| pattern.is_match(&s))
                .unwrap_or(false);
            if !matched {
                fail(errors, None, &[]);
            }
        }
        Rule::In(allowed) => {
            let listed = value
                .to_scalar_string()
                .map(|s| allowed.contains(&s.as_str()))
                .unwrap_or(false);
            if !listed {
                fail(errors, None, &[]);
            }
        }

        Rule::Confirmed => {
            let confirmation = scope.input.get(&format!("{}_confirmation", target.key));
            if confirmation != Some(value) {
                fail(errors, None, &[]);
            }
        }
        Rule::Different(other) => {
            if let Some(other_value) = scope.input.get(*other) {
                if other_value == value {
                    let label = scope.spec.attribute_label(other, other);
                    fail(errors, None, &[("other", label)]);
                }
            }
        }

        Rule::Exists { table, column } => {
            if let Some(needle) = value.to_scalar_string() {
                let found = tracked(scope.deps.records.exists(table, column, &needle).await)?;
                if !found {
                    fail(errors, None, &[]);
                }
            }
        }
        Rule::Unique {
            table,
            column,
            ignore_current,
        } => {
            if let Some(needle) = value.to_scalar_string() {
                let excluding = if *ignore_current {
                    scope.ctx.identity.as_ref().map(|identity| identity.id)
                } else {
                    None
                };
                let free = tracked(
                    scope
                        .deps
                        .records
                        .is_unique(table, column, &needle, excluding)
                        .await,
                )?;
                if !free {
                    fail(errors, None, &[]);
                }
            }
        }

        Rule::Password(policy) => check_password(scope, target, policy, value, errors).await,

        Rule::Mimes(extensions) => {
            let accepted = value
                .as_file()
                .and_then(|f| f.mime_extension())
                .map(|ext| {
                    extensions.contains(&ext)
                        || (ext == "jpeg" && extensions.contains(&"jpg"))
                        || (ext == "jpg" && extensions.contains(&"jpeg"))
                })
                .unwrap_or(false);
            if !accepted {
                fail(errors, None, &[("values", extensions.join(", "))]);
            }
        }
        Rule::Dimensions(bounds) => {
            let fits = value
                .as_file()
                .and_then(|f| f.dimensions)
                .map(|d| within_bounds(bounds, d.width, d.height))
                .unwrap_or(false);
            if !fits {
                fail(errors, None, &[]);
            }
        }
    }

    Ok(None)
}

fn tracked<T>(result: Result<T, DependencyError>) -> Result<T, PipelineError> {
    result.map_err(|e| {
        metrics::record_dependency_failure(e.service());
        PipelineError::from(e)
    })
}

/// Length, then composition, then (only if those pass) the breach corpus.
async fn check_password(
    scope: &Scope<'_>,
    target: &Target<'_>,
    policy: &PasswordPolicy,
    value: &FieldValue,
    errors: &mut ErrorBag,
) {
    let Some(password) = value.as_str() else {
        errors.add(target.key, scope.message(target, "string", None, &[]));
        return;
    };

    if password.chars().count() < policy.min_length {
        errors.add(
            target.key,
            scope.message(
                target,
                "min",
                Some(SizeKind::String),
                &[("min", policy.min_length.to_string())],
            ),
        );
        return;
    }

    let checks = [
        (policy.mixed_case, &*MIXED_CASE, "mixed"),
        (policy.letters, &*LETTER, "letters"),
        (policy.symbols, &*SYMBOL, "symbols"),
        (policy.numbers, &*NUMBER, "numbers"),
    ];

    let mut composed = true;
    for (enabled, pattern, rule_key) in checks {
        if enabled && !pattern.is_match(password) {
            errors.add(target.key, scope.message(target, rule_key, None, &[]));
            composed = false;
        }
    }

    if !composed || !policy.uncompromised {
        return;
    }

    match scope.deps.breaches.is_compromised(password).await {
        Ok(false) => {}
        Ok(true) => {
            metrics::BREACHED_PASSWORDS_TOTAL.inc();
            errors.add(target.key, scope.message(target, "uncompromised", None, &[]));
        }
        Err(e) => {
            tracing::warn!(field = target.key, error = %e, "breach corpus lookup failed");
            metrics::record_dependency_failure(e.service());
            errors.add(target.key, scope.message(target, "unverifiable", None, &[]));
        }
    }
}

fn within_bounds(bounds: &DimensionBounds, width: u32, height: u32) -> bool {
    bounds.min_width.map_or(true, |min| width >= min)
        && bounds.min_height.map_or(true, |min| height >= min)
        && bounds.max_width.map_or(true, |max| width <= max)
        && bounds.max_height.map_or(true, |max| height <= max)
}

pub fn is_valid_email(value: &str) -> bool {
    let Some((local, _domain)) = value.rsplit_once('@') else {
        return false;
    };
    EMAIL_PATTERN.is_match(value)
        && local.len() <= 64
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
}

/// 2^63; whole floats in `[-2^63, 2^63)` convert to `i64` exactly.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

pub fn coerce_integer(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Integer(i) => Some(*i),
        FieldValue::Float(f) if f.fract() == 0.0 && (-I64_LIMIT..I64_LIMIT).contains(f) => {
            Some(*f as i64)
        }
        FieldValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub fn coerce_bool(value: &FieldValue) -> Option<bool> {
    match value {
        FieldValue::Bool(b) => Some(*b),
        FieldValue::Integer(0) => Some(false),
        FieldValue::Integer(1) => Some(true),
        FieldValue::String(s) if s == "0" => Some(false),
        FieldValue::String(s) if s == "1" => Some(true),
        _ => None,
    }
}

fn as_number(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Integer(i) => Some(*i as f64),
        FieldValue::Float(f) => Some(*f),
        FieldValue::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// What `min` / `max` / `size` compare against.
fn measure(value: &FieldValue, numeric: bool) -> Option<(f64, SizeKind)> {
    if numeric {
        if let Some(n) = as_number(value) {
            return Some((n, SizeKind::Numeric));
        }
    }
    match value {
        FieldValue::List(items) => Some((items.len() as f64, SizeKind::Array)),
        FieldValue::Map(map) => Some((map.len() as f64, SizeKind::Array)),
        FieldValue::File(file) => Some((file.size_kilobytes(), SizeKind::File)),
        FieldValue::String(s) => Some((s.chars().count() as f64, SizeKind::String)),
        FieldValue::Integer(_) | FieldValue::Float(_) => value
            .to_scalar_string()
            .map(|s| (s.chars().count() as f64, SizeKind::String)),
        FieldValue::Null | FieldValue::Bool(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::BreachCorpus;
    use crate::records::InMemoryRecordStore;
    use shared::{Dimensions, Identity, UploadedFile};
    use std::sync::Arc;

    lazy_static! {
        static ref DIGITS: Regex = Regex::new(r"^[0-9]{6}$").unwrap();
    }

    fn fields(pairs: Vec<(&str, FieldValue)>) -> FieldMap {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    async fn run(spec: &EndpointSpec, input: FieldMap) -> (ErrorBag, FieldMap) {
        run_with(spec, input, &Collaborators::in_memory(), &RequestContext::new("127.0.0.1")).await
    }

    async fn run_with(
        spec: &EndpointSpec,
        input: FieldMap,
        deps: &Collaborators,
        ctx: &RequestContext,
    ) -> (ErrorBag, FieldMap) {
        validate_fields(&input, spec, ctx, deps).await.unwrap()
    }

    #[tokio::test]
    async fn test_required_stops_other_rules() {
        let spec = EndpointSpec::new("t").field(FieldSpec::new(
            "otp",
            vec![Rule::Required, Rule::String, Rule::Size(6.0)],
        ));
        let (errors, values) = run(&spec, FieldMap::new()).await;
        assert_eq!(errors.get("otp"), ["The otp field is required."]);
        assert!(values.is_empty());

        let (errors, _) = run(&spec, fields(vec![("otp", FieldValue::string("  "))])).await;
        assert_eq!(errors.get("otp").len(), 1);
    }

    #[tokio::test]
    async fn test_optional_fields_absent_or_blank_are_skipped() {
        let spec = EndpointSpec::new("t")
            .field(FieldSpec::new("company", vec![Rule::Nullable, Rule::String, Rule::Max(3.0)]))
            .field(FieldSpec::new("tax_id", vec![Rule::Sometimes, Rule::String]))
            .field(FieldSpec::new("note", vec![Rule::String, Rule::Min(5.0)]));

        let (errors, values) = run(
            &spec,
            fields(vec![("company", FieldValue::Null), ("note", FieldValue::string(""))]),
        )
        .await;
        assert!(errors.is_empty());
        assert_eq!(values["company"], FieldValue::Null);
        assert!(!values.contains_key("tax_id"));
    }

    #[tokio::test]
    async fn test_all_messages_accumulate() {
        let spec = EndpointSpec::new("t").field(FieldSpec::new(
            "otp",
            vec![Rule::Required, Rule::String, Rule::Size(6.0), Rule::Regex(&DIGITS)],
        ));
        let (errors, _) = run(&spec, fields(vec![("otp", FieldValue::string("12a"))])).await;
        assert_eq!(
            errors.get("otp"),
            [
                "The otp field must be 6 characters.",
                "The otp field format is invalid."
            ]
        );
    }

    #[tokio::test]
    async fn test_integer_and_boolean_coercion() {
        let spec = EndpointSpec::new("t")
            .field(FieldSpec::new("limit", vec![Rule::Integer, Rule::Min(1.0), Rule::Max(100.0)]))
            .field(FieldSpec::new("remember", vec![Rule::Nullable, Rule::Boolean]));

        let (errors, values) = run(
            &spec,
            fields(vec![
                ("limit", FieldValue::string("20")),
                ("remember", FieldValue::string("1")),
            ]),
        )
        .await;
        assert!(errors.is_empty());
        assert_eq!(values["limit"], FieldValue::Integer(20));
        assert_eq!(values["remember"], FieldValue::Bool(true));

        let (errors, _) = run(&spec, fields(vec![("limit", FieldValue::Integer(500))])).await;
        assert_eq!(errors.get("limit"), ["The limit field must not be greater than 100."]);
    }

    #[tokio::test]
    async fn test_each_rules_key_errors_by_index() {
        static HEALTH: &[&str] = &["vegan", "paleo"];
        let spec = EndpointSpec::new("t")
            .field(
                FieldSpec::new("health", vec![Rule::Sometimes, Rule::Array])
                    .each(vec![Rule::String, Rule::In(HEALTH)]),
            )
            .messages(&[("health.*.in", "Invalid health label provided.")]);

        let (errors, _) = run(
            &spec,
            fields(vec![(
                "health",
                FieldValue::List(vec!["vegan".into(), "carnivore".into()]),
            )]),
        )
        .await;
        assert!(!errors.has("health.0"));
        assert_eq!(errors.get("health.1"), ["Invalid health label provided."]);
    }

    #[tokio::test]
    async fn test_confirmed_error_on_declaring_field() {
        let spec = EndpointSpec::new("t").field(FieldSpec::new(
            "password",
            vec![Rule::Required, Rule::String, Rule::Confirmed],
        ));
        let (errors, _) = run(
            &spec,
            fields(vec![
                ("password", FieldValue::string("Abc12345!")),
                ("password_confirmation", FieldValue::string("Abc12345")),
            ]),
        )
        .await;
        assert_eq!(
            errors.get("password"),
            ["The password field confirmation does not match."]
        );
        assert!(!errors.has("password_confirmation"));
    }

    #[tokio::test]
    async fn test_different_uses_other_label() {
        let spec = EndpointSpec::new("t")
            .field(FieldSpec::new("password", vec![Rule::Different("current_password")]))
            .attribute("password", "new password")
            .attribute("current_password", "current password");
        let (errors, _) = run(
            &spec,
            fields(vec![
                ("password", FieldValue::string("same")),
                ("current_password", FieldValue::string("same")),
            ]),
        )
        .await;
        assert_eq!(
            errors.get("password"),
            ["The new password field and current password must be different."]
        );
    }

    #[tokio::test]
    async fn test_password_policy_stages() {
        let spec = EndpointSpec::new("t")
            .field(FieldSpec::new("password", vec![Rule::Password(PasswordPolicy::strong())]));
        let deps = Collaborators::in_memory()
            .with_breaches(Arc::new(BreachCorpus::from_passwords(["Sunny#Day42"])));
        let ctx = RequestContext::new("127.0.0.1");

        let (errors, _) = run_with(&spec, fields(vec![("password", "short".into())]), &deps, &ctx).await;
        assert_eq!(errors.get("password"), ["The password field must be at least 8 characters."]);

        let (errors, _) =
            run_with(&spec, fields(vec![("password", "alllowercase".into())]), &deps, &ctx).await;
        assert_eq!(errors.get("password").len(), 3);

        let (errors, _) =
            run_with(&spec, fields(vec![("password", "Sunny#Day42".into())]), &deps, &ctx).await;
        assert!(errors.first("password").unwrap().contains("data leak"));

        let (errors, _) =
            run_with(&spec, fields(vec![("password", "Quiet#Lake17".into())]), &deps, &ctx).await;
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_unique_ignores_current_identity() {
        let records = InMemoryRecordStore::new();
        records.insert("users", "email", "jane@example.com", 4);
        let deps = Collaborators::in_memory().with_records(Arc::new(records));

        let spec = EndpointSpec::new("t").field(FieldSpec::new(
            "email",
            vec![Rule::Unique {
                table: "users",
                column: "email",
                ignore_current: true,
            }],
        ));
        let input = fields(vec![("email", "jane@example.com".into())]);

        let own = RequestContext::new("127.0.0.1").with_identity(Identity {
            id: 4,
            email: "jane@example.com".into(),
        });
        let (errors, _) = run_with(&spec, input.clone(), &deps, &own).await;
        assert!(errors.is_empty());

        let (errors, _) = run_with(&spec, input, &deps, &RequestContext::new("127.0.0.1")).await;
        assert_eq!(errors.get("email"), ["The email has already been taken."]);
    }

    #[tokio::test]
    async fn test_image_rules() {
        static IMAGE_TYPES: &[&str] = &["jpeg", "png", "jpg", "gif"];
        let spec = EndpointSpec::new("t").field(FieldSpec::new(
            "avatar",
            vec![
                Rule::Image,
                Rule::Mimes(IMAGE_TYPES),
                Rule::Max(2048.0),
                Rule::Dimensions(DimensionBounds {
                    min_width: Some(50),
                    min_height: Some(50),
                    max_width: Some(1000),
                    max_height: Some(1000),
                }),
            ],
        ));

        let ok = UploadedFile {
            original_name: "me.jpg".into(),
            mime_type: "image/jpeg".into(),
            size_bytes: 100 * 1024,
            dimensions: Some(Dimensions { width: 200, height: 200 }),
        };
        let (errors, _) = run(&spec, fields(vec![("avatar", ok.clone().into())])).await;
        assert!(errors.is_empty());

        let huge = UploadedFile {
            size_bytes: 4096 * 1024,
            dimensions: Some(Dimensions { width: 20, height: 2000 }),
            ..ok
        };
        let (errors, _) = run(&spec, fields(vec![("avatar", huge.into())])).await;
        assert_eq!(
            errors.get("avatar"),
            [
                "The avatar field must not be greater than 2048 kilobytes.",
                "The avatar field has invalid image dimensions."
            ]
        );
    }

    #[test]
    fn test_email_syntax() {
        assert!(is_valid_email("jane.doe+diet@example.co.uk"));
        assert!(!is_valid_email("jane@"));
        assert!(!is_valid_email("jane..doe@example.com"));
        assert!(!is_valid_email("no-at-sign.example.com"));
        assert!(!is_valid_email("jane@-example.com"));
    }

    #[test]
    fn test_measure_prefers_numeric_value() {
        assert_eq!(measure(&FieldValue::string("250"), true), Some((250.0, SizeKind::Numeric)));
        assert_eq!(measure(&FieldValue::string("250"), false), Some((3.0, SizeKind::String)));
        assert_eq!(measure(&FieldValue::Bool(true), false), None);
    }

    #[test]
    fn test_integer_coercion_rejects_out_of_range_floats() {
        assert_eq!(coerce_integer(&FieldValue::Float(42.0)), Some(42));
        assert_eq!(coerce_integer(&FieldValue::Float(-I64_LIMIT)), Some(i64::MIN));
        assert_eq!(coerce_integer(&FieldValue::Float(1e19)), None);
        assert_eq!(coerce_integer(&FieldValue::Float(I64_LIMIT)), None);
        assert_eq!(coerce_integer(&FieldValue::Float(-1e19)), None);
        assert_eq!(coerce_integer(&FieldValue::Float(f64::NAN)), None);
        assert_eq!(coerce_integer(&FieldValue::Float(2.5)), None);
    }
}
