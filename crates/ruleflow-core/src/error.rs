use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RuleflowError {
    #[error("not initialized: run 'ruleflow init'")]
    NotInitialized,

    #[error("rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("rule {0} is inactive")]
    RuleInactive(Uuid),

    #[error("rule {0} already has a run in progress")]
    RuleBusy(Uuid),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid action at actions[{index}] ({action_type}): {reason}")]
    InvalidAction {
        index: usize,
        action_type: String,
        reason: String,
    },

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("invalid organization id '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidOrg(String),

    #[error("actor '{actor}' may not {capability} in organization '{org}'")]
    Forbidden {
        actor: String,
        org: String,
        capability: &'static str,
    },

    #[error("execution {0} is finalized and cannot be modified")]
    ExecutionFinalized(Uuid),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("insufficient stock for '{item}': on hand {on_hand}, delta {delta}")]
    InsufficientStock { item: String, on_hand: i64, delta: i64 },

    #[error("stock delta {delta} overflows on-hand quantity {on_hand} for '{item}'")]
    StockOverflow { item: String, on_hand: i64, delta: i64 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleflowError>;

/// Coarse classification used by transports to pick a status or exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Internal,
}

impl ErrorClass {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorClass::Internal => 1,
            ErrorClass::Validation => 2,
            ErrorClass::NotFound => 3,
            ErrorClass::Forbidden => 4,
            ErrorClass::Conflict => 5,
        }
    }
}

impl RuleflowError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RuleflowError::RuleInactive(_)
            | RuleflowError::InvalidRule(_)
            | RuleflowError::InvalidAction { .. }
            | RuleflowError::InvalidCron { .. }
            | RuleflowError::InvalidOrg(_)
            | RuleflowError::StockOverflow { .. } => ErrorClass::Validation,
            RuleflowError::RuleNotFound(_)
            | RuleflowError::ExecutionNotFound(_)
            | RuleflowError::ItemNotFound(_) => ErrorClass::NotFound,
            RuleflowError::Forbidden { .. } => ErrorClass::Forbidden,
            RuleflowError::RuleBusy(_)
            | RuleflowError::ExecutionFinalized(_)
            | RuleflowError::InvalidTransition { .. }
            | RuleflowError::InsufficientStock { .. } => ErrorClass::Conflict,
            RuleflowError::NotInitialized
            | RuleflowError::Storage(_)
            | RuleflowError::Io(_)
            | RuleflowError::Yaml(_)
            | RuleflowError::Json(_) => ErrorClass::Internal,
        }
    }
}

/// Map any storage-engine error into [`RuleflowError::Storage`].
pub(crate) fn storage_err<E: std::fmt::Display>(e: E) -> RuleflowError {
    RuleflowError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_rule_is_a_validation_error() {
        let err = RuleflowError::RuleInactive(Uuid::new_v4());
        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(err.class().exit_code(), 2);
    }

    #[test]
    fn storage_errors_are_internal() {
        let err = storage_err("disk full");
        assert_eq!(err.class(), ErrorClass::Internal);
        assert_eq!(err.to_string(), "storage error: disk full");
    }
}
