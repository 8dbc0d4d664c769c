//! Persistence seams: rule definitions and run history.
//!
//! Every call takes the organization explicitly. Implementations must never
//! return or touch another organization's rows.

mod memory;
mod redb;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, RuleflowError};
use crate::execution::{Approval, Execution, ExecutionFilter, Page};
use crate::rule::Rule;
use crate::types::{OrgId, TriggerType};

pub use self::memory::MemoryStore;
pub use self::redb::RedbStore;

pub trait RuleStore: Send + Sync {
    fn insert_rule(&self, rule: &Rule) -> Result<()>;

    /// `RuleNotFound` if `id` is not a rule of `org`.
    fn get_rule(&self, org: &OrgId, id: Uuid) -> Result<Rule>;

    /// Replace the stored definition with `rule` as a whole.
    fn replace_rule(&self, rule: &Rule) -> Result<()>;

    fn delete_rule(&self, org: &OrgId, id: Uuid) -> Result<()>;

    /// All rules of `org`, oldest first.
    fn list_rules(&self, org: &OrgId) -> Result<Vec<Rule>>;

    fn list_active(&self, org: &OrgId, trigger: TriggerType) -> Result<Vec<Rule>> {
        Ok(self
            .list_rules(org)?
            .into_iter()
            .filter(|r| r.is_active && r.trigger_type() == trigger)
            .collect())
    }

    fn touch_last_run(&self, org: &OrgId, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

pub trait ExecutionLedger: Send + Sync {
    fn create_execution(&self, execution: &Execution) -> Result<()>;

    /// Overwrite a stored execution. `ExecutionFinalized` if the stored row is
    /// already terminal.
    fn update_execution(&self, execution: &Execution) -> Result<()>;

    fn get_execution(&self, org: &OrgId, id: Uuid) -> Result<Execution>;

    fn list_executions(&self, org: &OrgId, filter: &ExecutionFilter) -> Result<Page<Execution>>;

    /// Returns the number of rows removed.
    fn delete_executions_for_rule(&self, org: &OrgId, rule_id: Uuid) -> Result<usize>;
}

fn sort_rules(rules: &mut [Rule]) {
    rules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

/// On-hand quantity after applying `delta`, refusing arithmetic overflow.
fn stock_after(item_id: &str, on_hand: i64, delta: i64) -> Result<i64> {
    on_hand
        .checked_add(delta)
        .ok_or_else(|| RuleflowError::StockOverflow {
            item: item_id.to_string(),
            on_hand,
            delta,
        })
}

/// Guards an execution rewrite against the stored row. Terminal rows are
/// frozen, and once an approval decision is stored only writes carrying
/// that same decision are accepted, so two racing approvers cannot both
/// release the held actions.
fn check_update(stored: &Execution, next: &Execution) -> Result<()> {
    if stored.is_terminal() {
        return Err(RuleflowError::ExecutionFinalized(next.id));
    }
    match &stored.approval {
        Some(decided @ (Approval::Approved { .. } | Approval::Rejected { .. }))
            if next.approval.as_ref() != Some(decided) =>
        {
            Err(RuleflowError::InvalidTransition {
                from: "decided".into(),
                to: "decided".into(),
                reason: "approval was already decided".into(),
            })
        }
        _ => Ok(()),
    }
}
