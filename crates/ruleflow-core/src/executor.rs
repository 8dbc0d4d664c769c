//! The per-run state machine.
//!
//! ```text
//! (create) -> Running -> Success | Failed
//!                \-> Running + approval=pending -> (decision) -> Success | Failed
//! ```
//!
//! The ledger row is written before the first action and rewritten after every
//! step, so a crash leaves a `Running` row behind rather than nothing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::action::{execution_order, Action};
use crate::audit::{AuditAction, AuditEntry, AuditSink};
use crate::condition;
use crate::error::{Result, RuleflowError};
use crate::execution::{Execution, CONDITIONS_NOT_MET};
use crate::handler::Handlers;
use crate::rule::Rule;
use crate::store::{ExecutionLedger, RuleStore};
use crate::types::{Actor, TriggerType};

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// What started a run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub trigger: TriggerType,
    /// Actor id or a `system:` marker.
    pub triggered_by: String,
    pub trigger_data: Value,
    /// Simulate even if the rule is not in dry-run mode.
    pub dry_run: bool,
}

impl Invocation {
    pub fn manual(actor: &Actor, trigger_data: Value) -> Self {
        Self {
            trigger: TriggerType::Manual,
            triggered_by: actor.id().to_string(),
            trigger_data,
            dry_run: false,
        }
    }

    pub fn system(trigger: TriggerType, marker: impl Into<String>, trigger_data: Value) -> Self {
        Self {
            trigger,
            triggered_by: marker.into(),
            trigger_data,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

// ---------------------------------------------------------------------------
// RunGuard
// ---------------------------------------------------------------------------

/// In-process set of rules with a run in progress.
#[derive(Default)]
struct RunGuard {
    active: Mutex<HashSet<Uuid>>,
}

struct RunPermit<'a> {
    guard: &'a RunGuard,
    rule_id: Uuid,
}

impl RunGuard {
    fn acquire(&self, rule_id: Uuid) -> Result<RunPermit<'_>> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(rule_id) {
            warn!(rule_id = %rule_id, "rule already has a run in progress");
            return Err(RuleflowError::RuleBusy(rule_id));
        }
        Ok(RunPermit {
            guard: self,
            rule_id,
        })
    }
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.guard
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.rule_id);
    }
}

// ---------------------------------------------------------------------------
// RuleExecutor
// ---------------------------------------------------------------------------

pub struct RuleExecutor {
    rules: Arc<dyn RuleStore>,
    ledger: Arc<dyn ExecutionLedger>,
    audit: Arc<dyn AuditSink>,
    handlers: Handlers,
    guard: Option<RunGuard>,
}

impl RuleExecutor {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        ledger: Arc<dyn ExecutionLedger>,
        audit: Arc<dyn AuditSink>,
        handlers: Handlers,
        serialize_runs: bool,
    ) -> Self {
        Self {
            rules,
            ledger,
            audit,
            handlers,
            guard: serialize_runs.then(RunGuard::default),
        }
    }

    fn permit(&self, rule_id: Uuid) -> Result<Option<RunPermit<'_>>> {
        self.guard
            .as_ref()
            .map(|g| g.acquire(rule_id))
            .transpose()
    }

    /// Run `rule` once. Returns the terminal execution, or the held one when
    /// the rule needs approval.
    pub fn execute(&self, rule: &Rule, invocation: Invocation) -> Result<Execution> {
        if !rule.is_active {
            return Err(RuleflowError::RuleInactive(rule.id));
        }
        let _permit = self.permit(rule.id)?;

        let dry_run = rule.dry_run_mode || invocation.dry_run;
        let mut exec = Execution::start(
            rule,
            invocation.trigger,
            invocation.triggered_by,
            invocation.trigger_data,
            dry_run,
        );
        self.ledger.create_execution(&exec)?;
        info!(
            org = %exec.org,
            rule_id = %rule.id,
            execution_id = %exec.id,
            trigger = %exec.trigger,
            dry_run,
            "execution started"
        );

        if !condition::evaluate(&rule.conditions, &exec.trigger_data) {
            debug!(execution_id = %exec.id, "conditions not met");
            exec.succeed(Some(CONDITIONS_NOT_MET.into()))?;
            return self.finish(exec);
        }

        let actions: Vec<Action> = execution_order(&rule.actions).into_iter().cloned().collect();

        if rule.approval_required && !dry_run {
            exec.hold_for_approval(actions)?;
            self.ledger.update_execution(&exec)?;
            info!(execution_id = %exec.id, held = exec.held_actions.len(), "execution awaiting approval");
            self.record_audit(
                AuditEntry::new(&exec.org, exec.triggered_by.clone(), AuditAction::ExecutionHeld, exec.rule_id)
                    .with_execution(exec.id),
            );
            return Ok(exec);
        }

        self.run_actions(exec, &actions)
    }

    /// Approve a held execution and run its action snapshot for real.
    pub fn approve(&self, mut exec: Execution, actor: &Actor) -> Result<Execution> {
        let _permit = self.permit(exec.rule_id)?;
        let actions = exec.approve(actor.id())?;
        self.ledger.update_execution(&exec)?;
        self.record_audit(
            AuditEntry::by(&exec.org, actor, AuditAction::ApprovalDecided, exec.rule_id)
                .with_execution(exec.id)
                .with_detail(json!({ "decision": "approve" })),
        );
        info!(execution_id = %exec.id, actor = %actor, "execution approved");
        self.run_actions(exec, &actions)
    }

    /// Reject a held execution. Nothing runs.
    pub fn reject(&self, mut exec: Execution, actor: &Actor, reason: &str) -> Result<Execution> {
        exec.reject(actor.id(), reason)?;
        let exec = self.finish(exec)?;
        self.record_audit(
            AuditEntry::by(&exec.org, actor, AuditAction::ApprovalDecided, exec.rule_id)
                .with_execution(exec.id)
                .with_detail(json!({ "decision": "reject", "reason": reason })),
        );
        info!(execution_id = %exec.id, actor = %actor, "execution rejected");
        Ok(exec)
    }

    /// Fail-fast: the first failed action ends the run. Earlier effects stay.
    fn run_actions(&self, mut exec: Execution, actions: &[Action]) -> Result<Execution> {
        for action in actions {
            let outcome = self.handlers.run(action, &exec.org, exec.dry_run);
            let failure = (!outcome.success).then(|| outcome.error.clone().unwrap_or_default());
            exec.record(outcome)?;

            if let Some(error) = failure {
                warn!(
                    execution_id = %exec.id,
                    action_id = %action.id,
                    action_type = %action.action_type,
                    error = %error,
                    "action failed"
                );
                exec.fail(error)?;
                return self.finish(exec);
            }
            self.ledger.update_execution(&exec)?;
        }
        exec.succeed(None)?;
        self.finish(exec)
    }

    /// Persist a terminal execution, then the advisory writes.
    fn finish(&self, exec: Execution) -> Result<Execution> {
        self.ledger.update_execution(&exec)?;

        if let Some(at) = exec.completed_at {
            if let Err(e) = self.rules.touch_last_run(&exec.org, exec.rule_id, at) {
                warn!(rule_id = %exec.rule_id, error = %e, "could not update last_run_at");
            }
        }
        self.record_audit(
            AuditEntry::new(&exec.org, exec.triggered_by.clone(), AuditAction::RuleExecuted, exec.rule_id)
                .with_execution(exec.id)
                .with_detail(json!({
                    "status": exec.status,
                    "dry_run": exec.dry_run,
                    "actions": exec.result.len(),
                })),
        );
        info!(
            execution_id = %exec.id,
            status = %exec.status,
            actions = exec.result.len(),
            "execution finished"
        );
        Ok(exec)
    }

    fn record_audit(&self, entry: AuditEntry) {
        if let Err(e) = self.audit.append(&entry) {
            warn!(rule_id = %entry.rule_id, error = %e, "could not write audit entry");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
