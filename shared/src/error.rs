use thiserror::Error;

/// Failure of an external collaborator the pipeline delegates to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("{service} is unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },

    #[error("{service} rejected the lookup: {reason}")]
    Rejected { service: &'static str, reason: String },
}

impl DependencyError {
    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            reason: reason.into(),
        }
    }

    pub fn rejected(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            service,
            reason: reason.into(),
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            Self::Unavailable { service, .. } | Self::Rejected { service, .. } => service,
        }
    }
}
