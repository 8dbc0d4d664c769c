use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Actor, OrgId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RuleCreated,
    RuleUpdated,
    RuleDeleted,
    RuleExecuted,
    ExecutionHeld,
    ApprovalDecided,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::RuleCreated => "rule_created",
            AuditAction::RuleUpdated => "rule_updated",
            AuditAction::RuleDeleted => "rule_deleted",
            AuditAction::RuleExecuted => "rule_executed",
            AuditAction::ExecutionHeld => "execution_held",
            AuditAction::ApprovalDecided => "approval_decided",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub org: OrgId,
    pub at: DateTime<Utc>,
    /// Actor id or `system:` marker.
    pub actor: String,
    pub action: AuditAction,
    pub rule_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

impl AuditEntry {
    pub fn new(org: &OrgId, actor: impl Into<String>, action: AuditAction, rule_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            org: org.clone(),
            at: Utc::now(),
            actor: actor.into(),
            action,
            rule_id,
            execution_id: None,
            detail: Value::Null,
        }
    }

    pub fn by(org: &OrgId, actor: &Actor, action: AuditAction, rule_id: Uuid) -> Self {
        Self::new(org, actor.id(), action, rule_id)
    }

    pub fn with_execution(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Append-only audit sink. The engine writes, never reads.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> Result<()>;
}
