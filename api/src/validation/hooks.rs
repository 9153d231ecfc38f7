//! Checks that run after the field rules.
//!
//! Hooks see the sanitized input and the error bag built so far. They run in
//! declaration order whether or not field rules failed; a hook that returns
//! [`Flow::Halt`] stops the ones after it.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use shared::{ErrorBag, FieldMap, RequestContext};

use super::messages;
use super::pipeline::Collaborators;
use crate::error::PipelineError;
use crate::metrics;
use crate::rate_limit::{Attempt, RateLimitAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

#[async_trait]
pub trait PostValidator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(
        &self,
        input: &FieldMap,
        ctx: &RequestContext,
        deps: &Collaborators,
        errors: &mut ErrorBag,
    ) -> Result<Flow, PipelineError>;
}

/// Counts the attempt against `"<action>.<ip>"` and rejects it once the
/// action's threshold is reached.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitCheck {
    pub action: RateLimitAction,
}

impl RateLimitCheck {
    pub fn new(action: RateLimitAction) -> Self {
        Self { action }
    }
}

#[async_trait]
impl PostValidator for RateLimitCheck {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn check(
        &self,
        _input: &FieldMap,
        ctx: &RequestContext,
        deps: &Collaborators,
        errors: &mut ErrorBag,
    ) -> Result<Flow, PipelineError> {
        let key = self.action.counter_key(&ctx.ip);
        let limit = deps.limits.limit_for(self.action);

        let attempt = deps
            .rate_limits
            .attempt(&key, limit.max_attempts, limit.window)
            .await
            .inspect_err(|e| metrics::record_dependency_failure(e.service()))?;

        match attempt {
            Attempt::Admitted { attempts, remaining } => {
                tracing::debug!(%key, attempts, remaining, "attempt counted");
                Ok(Flow::Continue)
            }
            Attempt::Limited { retry_after } => {
                tracing::warn!(%key, retry_after, "attempt threshold reached");
                metrics::record_rate_limited(self.action.key_prefix());
                errors.add("email", self.action.rejection_message(retry_after));
                errors.set_retry_after(retry_after);
                Ok(Flow::Halt)
            }
        }
    }
}

const INCORRECT_CURRENT_PASSWORD: &str = "The current password is incorrect.";

/// Verifies `current_password` against the authenticated caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentPasswordCheck;

#[async_trait]
impl PostValidator for CurrentPasswordCheck {
    fn name(&self) -> &'static str {
        "current_password"
    }

    async fn check(
        &self,
        input: &FieldMap,
        ctx: &RequestContext,
        deps: &Collaborators,
        errors: &mut ErrorBag,
    ) -> Result<Flow, PipelineError> {
        let candidate = input
            .get("current_password")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let Some(identity) = ctx.identity.as_ref() else {
            errors.add("current_password", INCORRECT_CURRENT_PASSWORD);
            return Ok(Flow::Halt);
        };

        match deps.credentials.verify(identity.id, candidate).await {
            Ok(true) => Ok(Flow::Continue),
            Ok(false) => {
                tracing::info!(user_id = identity.id, "current password mismatch");
                errors.add("current_password", INCORRECT_CURRENT_PASSWORD);
                Ok(Flow::Halt)
            }
            Err(e) => {
                tracing::warn!(user_id = identity.id, error = %e, "credential check unavailable");
                metrics::record_dependency_failure(e.service());
                errors.add(
                    "current_password",
                    messages::render(
                        messages::default_template("unverifiable", None),
                        "current password",
                        &[],
                    ),
                );
                Ok(Flow::Halt)
            }
        }
    }
}

const SUSPICIOUS_WORDS: &[&str] = &["admin", "test", "bot", "script", "hack", "null", "undefined"];

const DISPOSABLE_DOMAINS: &[&str] = &[
    "10minutemail.com",
    "tempmail.org",
    "guerrillamail.com",
    "mailinator.com",
    "throwaway.email",
];

lazy_static! {
    static ref MARKUP_VECTOR: Regex = Regex::new(r"(?i)<script|javascript:|on\w+=").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspiciousScope {
    /// `name` and `email`; the first hit halts.
    Registration,
    /// `name` and `company`; a hit is recorded against `name`.
    Profile,
}

#[derive(Debug, Clone, Copy)]
pub struct SuspiciousContentCheck {
    pub scope: SuspiciousScope,
}

impl SuspiciousContentCheck {
    pub fn registration() -> Self {
        Self {
            scope: SuspiciousScope::Registration,
        }
    }

    pub fn profile() -> Self {
        Self {
            scope: SuspiciousScope::Profile,
        }
    }
}

fn text_field(input: &FieldMap, name: &str) -> String {
    input
        .get(name)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_lowercase()
}

fn contains_placeholder(text: &str, word: &str) -> bool {
    !text.is_empty() && text.contains(word)
}

/// Domain after the last `@`, lowercased.
pub fn email_domain(email: &str) -> Option<String> {
    email.rfind('@').map(|at| email[at + 1..].to_lowercase())
}

pub fn is_disposable_email(email: &str) -> bool {
    email_domain(email)
        .map(|domain| DISPOSABLE_DOMAINS.contains(&domain.as_str()))
        .unwrap_or(false)
}

#[async_trait]
impl PostValidator for SuspiciousContentCheck {
    fn name(&self) -> &'static str {
        "suspicious_content"
    }

    async fn check(
        &self,
        input: &FieldMap,
        ctx: &RequestContext,
        _deps: &Collaborators,
        errors: &mut ErrorBag,
    ) -> Result<Flow, PipelineError> {
        match self.scope {
            SuspiciousScope::Registration => {
                let name = text_field(input, "name");
                let email = text_field(input, "email");

                for word in SUSPICIOUS_WORDS {
                    if contains_placeholder(&name, word) {
                        tracing::info!(ip = %ctx.ip, word, "placeholder word in name");
                        errors.add(
                            "name",
                            "Please enter your real name (avoid placeholder words like \"test\", \"admin\", or code terms).",
                        );
                        return Ok(Flow::Halt);
                    }
                    if contains_placeholder(&email, word) {
                        tracing::info!(ip = %ctx.ip, word, "placeholder word in email");
                        errors.add(
                            "email",
                            "Please use a valid email address (avoid placeholder terms like \"test\" or \"admin\").",
                        );
                        return Ok(Flow::Halt);
                    }
                }

                if is_disposable_email(&email) {
                    tracing::info!(ip = %ctx.ip, "disposable email domain");
                    errors.add("email", "Please use a permanent email address.");
                    return Ok(Flow::Halt);
                }

                Ok(Flow::Continue)
            }
            SuspiciousScope::Profile => {
                let suspicious = ["name", "company"].iter().any(|field| {
                    let text = text_field(input, field);
                    SUSPICIOUS_WORDS
                        .iter()
                        .any(|word| contains_placeholder(&text, word))
                        || MARKUP_VECTOR.is_match(&text)
                });

                if suspicious {
                    tracing::info!(ip = %ctx.ip, "suspicious profile content");
                    errors.add("name", "The provided information appears to be invalid.");
                }
                Ok(Flow::Continue)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::pipeline::Collaborators;
    use shared::{FieldValue, Identity};

    fn input(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::string(*v)))
            .collect()
    }

    #[tokio::test]
    async fn test_registration_name_placeholder_halts() {
        let deps = Collaborators::in_memory();
        let mut errors = ErrorBag::new();
        let flow = SuspiciousContentCheck::registration()
            .check(
                &input(&[("name", "Test User"), ("email", "jane@example.com")]),
                &RequestContext::new("127.0.0.1"),
                &deps,
                &mut errors,
            )
            .await
            .unwrap();

        assert_eq!(flow, Flow::Halt);
        assert!(errors.first("name").unwrap().contains("real name"));
        assert!(!errors.has("email"));
    }

    #[tokio::test]
    async fn test_registration_disposable_domain() {
        let deps = Collaborators::in_memory();
        let mut errors = ErrorBag::new();
        SuspiciousContentCheck::registration()
            .check(
                &input(&[("name", "Jane Doe"), ("email", "jane@MAILINATOR.com")]),
                &RequestContext::new("127.0.0.1"),
                &deps,
                &mut errors,
            )
            .await
            .unwrap();

        assert_eq!(errors.get("email"), ["Please use a permanent email address."]);
    }

    #[tokio::test]
    async fn test_profile_hit_is_appended_without_halting() {
        let deps = Collaborators::in_memory();
        let mut errors = ErrorBag::new();
        errors.add("name", "existing");
        let flow = SuspiciousContentCheck::profile()
            .check(
                &input(&[("company", "Hackers Inc")]),
                &RequestContext::new("127.0.0.1"),
                &deps,
                &mut errors,
            )
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            errors.get("name"),
            ["existing", "The provided information appears to be invalid."]
        );
    }

    #[tokio::test]
    async fn test_current_password_requires_identity() {
        let deps = Collaborators::in_memory();
        let mut errors = ErrorBag::new();
        let flow = CurrentPasswordCheck
            .check(
                &input(&[("current_password", "whatever")]),
                &RequestContext::new("127.0.0.1"),
                &deps,
                &mut errors,
            )
            .await
            .unwrap();

        assert_eq!(flow, Flow::Halt);
        assert_eq!(errors.get("current_password"), [INCORRECT_CURRENT_PASSWORD]);
    }

    #[tokio::test]
    async fn test_current_password_accepts_match() {
        let credentials = crate::credentials::InMemoryCredentialStore::new();
        credentials.set_password(3, "0ld!Secret").unwrap();
        let deps = Collaborators::in_memory().with_credentials(std::sync::Arc::new(credentials));

        let ctx = RequestContext::new("127.0.0.1").with_identity(Identity {
            id: 3,
            email: "jane@example.com".into(),
        });
        let mut errors = ErrorBag::new();
        let flow = CurrentPasswordCheck
            .check(
                &input(&[("current_password", "0ld!Secret")]),
                &ctx,
                &deps,
                &mut errors,
            )
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_sets_retry_after() {
        let deps = Collaborators::in_memory().with_limits(
            crate::rate_limit::RateLimitPolicy::default().with_limit(
                RateLimitAction::Login,
                crate::rate_limit::AttemptLimit::new(1, std::time::Duration::from_secs(300)),
            ),
        );
        let check = RateLimitCheck::new(RateLimitAction::Login);
        let ctx = RequestContext::new("9.9.9.9");

        let mut errors = ErrorBag::new();
        assert_eq!(
            check.check(&FieldMap::new(), &ctx, &deps, &mut errors).await.unwrap(),
            Flow::Continue
        );

        let flow = check.check(&FieldMap::new(), &ctx, &deps, &mut errors).await.unwrap();
        assert_eq!(flow, Flow::Halt);
        assert!(errors.first("email").unwrap().starts_with("Too many login attempts"));
        assert!(errors.retry_after().unwrap() <= 300);
    }

    #[test]
    fn test_email_domain_uses_last_at() {
        assert_eq!(email_domain("a@b@Tempmail.org").as_deref(), Some("tempmail.org"));
        assert!(is_disposable_email("x@throwaway.email"));
        assert!(!is_disposable_email("x@sub.mailinator.com"));
        assert!(!is_disposable_email("no-at-sign"));
    }
}
