use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure kinds shared by every pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Data,
    UpstreamParse,
    Upstream,
    Authorization,
    Delivery,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::Data => "data_error",
            Self::UpstreamParse => "upstream_parse_error",
            Self::Upstream => "upstream_error",
            Self::Authorization => "authorization_error",
            Self::Delivery => "delivery_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("data error: {0}")]
    Data(String),
    #[error("could not interpret model reply: {0}")]
    UpstreamParse(String),
    #[error("completion service failure: {0}")]
    Upstream(String),
    #[error("authorization failed: {0}")]
    Authorization(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Data(_) => ErrorKind::Data,
            Self::UpstreamParse(_) => ErrorKind::UpstreamParse,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::Delivery(_) => ErrorKind::Delivery,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Configuration(detail)
            | Self::Data(detail)
            | Self::UpstreamParse(detail)
            | Self::Upstream(detail)
            | Self::Authorization(detail)
            | Self::Delivery(detail) => detail,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Preflight,
    BudgetAdvisor,
    ProductSearch,
    Notification,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::BudgetAdvisor => "budget_advisor",
            Self::ProductSearch => "product_search",
            Self::Notification => "notification",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Structured failure surfaced to the caller when a pipeline run aborts.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("{stage} failed ({}): {}", .source.kind(), .source.detail())]
    Stage { stage: StageName, source: StageError },
    #[error("{stage} produced an invalid state: {source}")]
    State { stage: StageName, source: DomainError },
}

impl PipelineError {
    pub fn stage(stage: StageName, source: StageError) -> Self {
        Self::Stage { stage, source }
    }

    pub fn stage_name(&self) -> StageName {
        match self {
            Self::Stage { stage, .. } | Self::State { stage, .. } => *stage,
        }
    }

    /// Stable class string used by command output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Stage { source, .. } => source.kind().as_str(),
            Self::State { .. } => "invariant_violation",
        }
    }
}
