//! Turns a trigger (manual request, business event, schedule tick) into zero
//! or more executions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{self, Authorizer, Capability};
use crate::error::Result;
use crate::execution::Execution;
use crate::executor::{Invocation, RuleExecutor};
use crate::rule::{tick_payload, BusinessEvent, Rule};
use crate::store::RuleStore;
use crate::types::{Actor, ExecutionStatus, OrgId, TriggerType};

pub const SCHEDULE_MARKER: &str = "system:schedule";

pub fn event_marker(event: &str) -> String {
    format!("system:event:{event}")
}

// ---------------------------------------------------------------------------
// DispatchReport
// ---------------------------------------------------------------------------

/// One matched rule's fate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchedRun {
    pub rule_id: Uuid,
    pub rule_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub awaiting_approval: bool,
    /// Set when the rule could not be run at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchedRun {
    fn ran(rule: &Rule, exec: &Execution) -> Self {
        Self {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            execution_id: Some(exec.id),
            status: Some(exec.status),
            awaiting_approval: exec.is_awaiting_approval(),
            error: None,
        }
    }

    fn errored(rule: &Rule, error: String) -> Self {
        Self {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            execution_id: None,
            status: None,
            awaiting_approval: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Event name or tick time.
    pub source: String,
    /// In the order the rules ran.
    pub runs: Vec<DispatchedRun>,
}

impl DispatchReport {
    pub fn failed(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| r.error.is_some() || r.status == Some(ExecutionStatus::Failed))
            .count()
    }
}

// ---------------------------------------------------------------------------
// TriggerDispatcher
// ---------------------------------------------------------------------------

pub struct TriggerDispatcher {
    rules: Arc<dyn RuleStore>,
    authorizer: Arc<dyn Authorizer>,
    executor: Arc<RuleExecutor>,
}

/// Highest priority first; ties go to the oldest rule.
fn run_order(rules: &mut [Rule]) {
    rules.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

impl TriggerDispatcher {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        authorizer: Arc<dyn Authorizer>,
        executor: Arc<RuleExecutor>,
    ) -> Self {
        Self {
            rules,
            authorizer,
            executor,
        }
    }

    /// Run one rule now on behalf of `actor`, synchronously.
    pub fn run_manual(
        &self,
        actor: &Actor,
        org: &OrgId,
        rule_id: Uuid,
        payload: Value,
        dry_run: bool,
    ) -> Result<Execution> {
        auth::require(self.authorizer.as_ref(), actor, org, Capability::RunRules)?;
        let rule = self.rules.get_rule(org, rule_id)?;
        self.executor
            .execute(&rule, Invocation::manual(actor, payload).dry_run(dry_run))
    }

    /// Run every active rule listening for `event`. Event triggers match on
    /// name; threshold triggers also need their threshold crossed.
    pub fn dispatch_event(&self, org: &OrgId, event: &BusinessEvent) -> Result<DispatchReport> {
        let mut matched: Vec<Rule> = self
            .rules
            .list_active(org, TriggerType::Event)?
            .into_iter()
            .chain(self.rules.list_active(org, TriggerType::Threshold)?)
            .filter(|r| r.trigger.matches_event(event))
            .collect();
        run_order(&mut matched);
        info!(org = %org, event = %event.name, matched = matched.len(), "dispatching event");

        let marker = event_marker(&event.name);
        let runs = matched
            .iter()
            .map(|rule| {
                let invocation =
                    Invocation::system(rule.trigger_type(), marker.clone(), event.payload.clone());
                self.run_isolated(rule, invocation)
            })
            .collect();
        Ok(DispatchReport {
            source: event.name.clone(),
            runs,
        })
    }

    /// Run every active schedule rule whose cron matches `tick`.
    pub fn dispatch_tick(&self, org: &OrgId, tick: DateTime<Utc>) -> Result<DispatchReport> {
        let mut matched: Vec<Rule> = self
            .rules
            .list_active(org, TriggerType::Schedule)?
            .into_iter()
            .filter(|r| r.trigger.matches_tick(tick))
            .collect();
        run_order(&mut matched);
        info!(org = %org, tick = %tick, matched = matched.len(), "dispatching schedule tick");

        let payload = tick_payload(tick);
        let runs = matched
            .iter()
            .map(|rule| {
                let invocation =
                    Invocation::system(TriggerType::Schedule, SCHEDULE_MARKER, payload.clone());
                self.run_isolated(rule, invocation)
            })
            .collect();
        Ok(DispatchReport {
            source: tick.to_rfc3339(),
            runs,
        })
    }

    /// One rule's error never stops the others.
    fn run_isolated(&self, rule: &Rule, invocation: Invocation) -> DispatchedRun {
        match self.executor.execute(rule, invocation) {
            Ok(exec) => DispatchedRun::ran(rule, &exec),
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "dispatched rule could not run");
                DispatchedRun::errored(rule, e.to_string())
            }
        }
    }
}
