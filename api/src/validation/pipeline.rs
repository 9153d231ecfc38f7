use std::sync::Arc;

use shared::{FieldMap, RequestContext, ValidationResult};

use super::hooks::Flow;
use super::rules::EndpointSpec;
use super::sanitizers;
use super::validators;
use crate::audit::{AuditRecord, AuditSink, TracingAuditSink};
use crate::credentials::{BreachChecker, BreachCorpus, CredentialStore, InMemoryCredentialStore};
use crate::error::PipelineError;
use crate::metrics;
use crate::rate_limit::{InMemoryRateLimitStore, RateLimitPolicy, RateLimitStore};
use crate::records::{InMemoryRecordStore, RecordStore};

/// External services the pipeline delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub records: Arc<dyn RecordStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub breaches: Arc<dyn BreachChecker>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub audit: Arc<dyn AuditSink>,
    pub limits: RateLimitPolicy,
}

impl Collaborators {
    /// Process-local stores, the built-in breach list and tracing audit.
    pub fn in_memory() -> Self {
        Self {
            records: Arc::new(InMemoryRecordStore::new()),
            credentials: Arc::new(InMemoryCredentialStore::new()),
            breaches: Arc::new(BreachCorpus::with_common_passwords()),
            rate_limits: Arc::new(InMemoryRateLimitStore::new()),
            audit: Arc::new(TracingAuditSink),
            limits: RateLimitPolicy::default(),
        }
    }

    pub fn with_records(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = records;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_breaches(mut self, breaches: Arc<dyn BreachChecker>) -> Self {
        self.breaches = breaches;
        self
    }

    pub fn with_rate_limits(mut self, rate_limits: Arc<dyn RateLimitStore>) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_limits(mut self, limits: RateLimitPolicy) -> Self {
        self.limits = limits;
        self
    }
}

pub struct ValidationPipeline {
    deps: Collaborators,
}

impl ValidationPipeline {
    pub fn new(deps: Collaborators) -> Self {
        Self { deps }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.deps
    }

    /// Defaults, sanitize (unless the endpoint opts out), field rules, hooks.
    /// Field and hook failures come back as `Invalid`; only collaborator
    /// failures are errors.
    pub async fn run(
        &self,
        raw: &FieldMap,
        spec: &EndpointSpec,
        ctx: &RequestContext,
    ) -> Result<ValidationResult, PipelineError> {
        let prepared = spec.apply_defaults(raw);
        let sanitized = if spec.sanitizes() {
            sanitizers::sanitize_fields(&prepared)
        } else {
            prepared
        };

        let (mut errors, values) =
            validators::validate_fields(&sanitized, spec, ctx, &self.deps).await?;

        for hook in spec.hooks() {
            let flow = hook.check(&sanitized, ctx, &self.deps, &mut errors).await?;
            if flow == Flow::Halt {
                tracing::debug!(endpoint = spec.name, hook = hook.name(), "hook halted");
                break;
            }
        }

        metrics::record_validation(spec.name, errors.is_empty());

        if errors.is_empty() {
            tracing::debug!(endpoint = spec.name, fields = values.len(), "request validated");
            return Ok(ValidationResult::Valid(values));
        }

        self.deps
            .audit
            .warn(&AuditRecord::validation_failed(spec.name, ctx, &errors, &sanitized));
        Ok(ValidationResult::Invalid(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::RecordingAuditSink;
    use crate::validation::hooks::{PostValidator, SuspiciousContentCheck};
    use crate::validation::rules::{FieldSpec, Rule};
    use async_trait::async_trait;
    use shared::{DependencyError, ErrorBag, FieldValue};

    struct AlwaysFails;

    #[async_trait]
    impl PostValidator for AlwaysFails {
        fn name(&self) -> &'static str {
            "always_fails"
        }

        async fn check(
            &self,
            _input: &FieldMap,
            _ctx: &RequestContext,
            _deps: &Collaborators,
            errors: &mut ErrorBag,
        ) -> Result<Flow, PipelineError> {
            errors.add("extra", "should not run");
            Ok(Flow::Continue)
        }
    }

    struct BrokenRecords;

    #[async_trait]
    impl RecordStore for BrokenRecords {
        async fn exists(&self, _: &str, _: &str, _: &str) -> Result<bool, DependencyError> {
            Err(DependencyError::unavailable("record store", "connection refused"))
        }

        async fn is_unique(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: Option<i64>,
        ) -> Result<bool, DependencyError> {
            Err(DependencyError::unavailable("record store", "connection refused"))
        }
    }

    fn input(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::string(*v)))
            .collect()
    }

    #[tokio::test]
    async fn test_valid_result_holds_only_declared_sanitized_fields() {
        let spec = EndpointSpec::new("t")
            .field(FieldSpec::new("name", vec![Rule::Required, Rule::String]))
            .default_value("limit", 20i64);
        let pipeline = ValidationPipeline::new(Collaborators::in_memory());

        let result = pipeline
            .run(
                &input(&[("name", " <b>Jane</b> "), ("role", "owner")]),
                &spec,
                &RequestContext::new("127.0.0.1"),
            )
            .await
            .unwrap();

        let fields = result.fields().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["name"], FieldValue::string("Jane"));
    }

    #[tokio::test]
    async fn test_halt_stops_later_hooks_and_audits() {
        let spec = EndpointSpec::new("register")
            .field(FieldSpec::new("name", vec![Rule::Required, Rule::String]))
            .hook(SuspiciousContentCheck::registration())
            .hook(AlwaysFails);
        let audit = Arc::new(RecordingAuditSink::new());
        let pipeline =
            ValidationPipeline::new(Collaborators::in_memory().with_audit(audit.clone()));

        let mut raw = input(&[("name", "Bot Account")]);
        raw.insert("password".into(), FieldValue::string("Secret#123"));
        let result = pipeline
            .run(&raw, &spec, &RequestContext::new("10.1.1.1").with_route("POST", "/register"))
            .await
            .unwrap();

        let errors = result.errors().unwrap();
        assert!(errors.has("name"));
        assert!(!errors.has("extra"));

        let records = audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].endpoint, "register");
        assert_eq!(records[0].input["password"], FieldValue::string("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_record_store_failure_propagates() {
        let spec = EndpointSpec::new("t").field(FieldSpec::new(
            "plan",
            vec![Rule::Exists {
                table: "membership_plans",
                column: "id",
            }],
        ));
        let pipeline = ValidationPipeline::new(
            Collaborators::in_memory().with_records(Arc::new(BrokenRecords)),
        );

        let err = pipeline
            .run(&input(&[("plan", "3")]), &spec, &RequestContext::new("127.0.0.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Dependency(_)));
    }
}
