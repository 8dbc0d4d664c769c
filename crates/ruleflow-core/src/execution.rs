//! Execution records: one per invocation of a rule.
//!
//! An execution is created in `Running` before any action is attempted and
//! rewritten after every step. Once it reaches `Success` or `Failed` it is
//! immutable; corrections are new executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::action::Action;
use crate::error::{Result, RuleflowError};
use crate::rule::Rule;
use crate::types::{ExecutionStatus, OrgId, TriggerType};

pub const CONDITIONS_NOT_MET: &str = "conditions not met";

// ---------------------------------------------------------------------------
// ActionOutcome
// ---------------------------------------------------------------------------

/// How a successful action took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// The effect is confirmed.
    Applied,
    /// Accepted for later delivery by an outside system.
    Queued,
    /// Dry run; nothing happened.
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_id: Uuid,
    pub order: i32,
    pub action_type: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Approval {
    Pending,
    Approved {
        by: String,
        at: DateTime<Utc>,
    },
    Rejected {
        by: String,
        at: DateTime<Utc>,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub org: OrgId,
    pub rule_id: Uuid,
    pub rule_name: String,
    pub status: ExecutionStatus,
    /// Entry path that started this run.
    pub trigger: TriggerType,
    /// Actor id, or a `system:` marker for event and schedule runs.
    pub triggered_by: String,
    #[serde(default)]
    pub trigger_data: Value,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Vec<ActionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<Approval>,
    /// Snapshot of the actions a held run will perform once approved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub held_actions: Vec<Action>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// A fresh `Running` execution for `rule`.
    pub fn start(
        rule: &Rule,
        trigger: TriggerType,
        triggered_by: impl Into<String>,
        trigger_data: Value,
        dry_run: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org: rule.org.clone(),
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            status: ExecutionStatus::Running,
            trigger,
            triggered_by: triggered_by.into(),
            trigger_data,
            dry_run,
            message: None,
            result: Vec::new(),
            error: None,
            approval: None,
            held_actions: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Held for an approval decision: running, but nothing will happen until
    /// someone decides.
    pub fn is_awaiting_approval(&self) -> bool {
        !self.is_terminal() && matches!(self.approval, Some(Approval::Pending))
    }

    pub fn hold_for_approval(&mut self, actions: Vec<Action>) -> Result<()> {
        self.ensure_running("awaiting_approval")?;
        self.held_actions = actions;
        self.approval = Some(Approval::Pending);
        self.message = Some("awaiting approval".into());
        Ok(())
    }

    /// Record an approval and hand back the held action snapshot.
    pub fn approve(&mut self, by: impl Into<String>) -> Result<Vec<Action>> {
        self.ensure_pending("approved")?;
        self.approval = Some(Approval::Approved {
            by: by.into(),
            at: Utc::now(),
        });
        self.message = None;
        Ok(std::mem::take(&mut self.held_actions))
    }

    /// Record a rejection and fail the execution. Nothing ran, nothing will.
    pub fn reject(&mut self, by: impl Into<String>, reason: impl Into<String>) -> Result<()> {
        self.ensure_pending("rejected")?;
        let reason = reason.into();
        self.approval = Some(Approval::Rejected {
            by: by.into(),
            at: Utc::now(),
            reason: reason.clone(),
        });
        self.message = None;
        self.fail(format!("approval rejected: {reason}"))
    }

    pub fn record(&mut self, outcome: ActionOutcome) -> Result<()> {
        self.ensure_running("running")?;
        self.result.push(outcome);
        Ok(())
    }

    pub fn succeed(&mut self, message: Option<String>) -> Result<()> {
        self.ensure_running("success")?;
        self.status = ExecutionStatus::Success;
        self.message = message;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.ensure_running("failed")?;
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_pending(&self, to: &str) -> Result<()> {
        self.ensure_running(to)?;
        if !self.is_awaiting_approval() {
            return Err(RuleflowError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
                reason: "execution is not awaiting approval".into(),
            });
        }
        Ok(())
    }

    fn ensure_running(&self, to: &str) -> Result<()> {
        if self.is_terminal() {
            return Err(RuleflowError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
                reason: "execution is already terminal".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExecutionFilter / Page
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFilter {
    #[serde(default)]
    pub rule_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
    /// Inclusive lower bound on `started_at`.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `started_at`.
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub offset: usize,
    /// `None` returns everything after `offset`.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ExecutionFilter {
    pub fn for_rule(rule_id: Uuid) -> Self {
        Self {
            rule_id: Some(rule_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, execution: &Execution) -> bool {
        self.rule_id.map_or(true, |id| id == execution.rule_id)
            && self.status.map_or(true, |s| s == execution.status)
            && self.since.map_or(true, |s| execution.started_at >= s)
            && self.until.map_or(true, |u| execution.started_at < u)
    }

    /// Filter, sort newest first and cut one page out of `all`.
    pub fn paginate(&self, all: Vec<Execution>) -> Page<Execution> {
        let mut matching: Vec<Execution> = all.into_iter().filter(|e| self.matches(e)).collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();
        Page {
            items,
            total,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matching rows before pagination.
    pub total: usize,
    pub offset: usize,
}
