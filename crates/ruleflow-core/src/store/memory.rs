use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{check_update, sort_rules, stock_after, ExecutionLedger, RuleStore};
use crate::audit::{AuditEntry, AuditSink};
use crate::entity::{CatalogItem, Inventory, Notification, Notifier, PurchaseDraft, Purchasing};
use crate::error::{Result, RuleflowError};
use crate::execution::{Execution, ExecutionFilter, Page};
use crate::rule::Rule;
use crate::types::OrgId;

type Key = (OrgId, Uuid);

#[derive(Default)]
struct Inner {
    rules: HashMap<Key, Rule>,
    executions: HashMap<Key, Execution>,
    items: HashMap<(OrgId, String), CatalogItem>,
    purchases: Vec<(OrgId, PurchaseDraft)>,
    notifications: Vec<(OrgId, Notification)>,
    audit: Vec<AuditEntry>,
}

/// Everything in one process-local map. Implements every collaborator trait
/// so an engine can run without a database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn put_item(&self, org: &OrgId, item_id: &str, unit_cost: f64, on_hand: i64) {
        self.lock().items.insert(
            (org.clone(), item_id.to_string()),
            CatalogItem {
                id: item_id.to_string(),
                name: None,
                unit_cost,
                on_hand,
            },
        );
    }

    pub fn on_hand(&self, org: &OrgId, item_id: &str) -> Option<i64> {
        self.lock()
            .items
            .get(&(org.clone(), item_id.to_string()))
            .map(|i| i.on_hand)
    }

    pub fn purchases(&self, org: &OrgId) -> Vec<PurchaseDraft> {
        self.lock()
            .purchases
            .iter()
            .filter(|(o, _)| o == org)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn notifications(&self, org: &OrgId) -> Vec<Notification> {
        self.lock()
            .notifications
            .iter()
            .filter(|(o, _)| o == org)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.lock().audit.clone()
    }
}

impl RuleStore for MemoryStore {
    fn insert_rule(&self, rule: &Rule) -> Result<()> {
        self.lock()
            .rules
            .insert((rule.org.clone(), rule.id), rule.clone());
        Ok(())
    }

    fn get_rule(&self, org: &OrgId, id: Uuid) -> Result<Rule> {
        self.lock()
            .rules
            .get(&(org.clone(), id))
            .cloned()
            .ok_or(RuleflowError::RuleNotFound(id))
    }

    fn replace_rule(&self, rule: &Rule) -> Result<()> {
        let mut inner = self.lock();
        match inner.rules.get_mut(&(rule.org.clone(), rule.id)) {
            Some(slot) => {
                *slot = rule.clone();
                Ok(())
            }
            None => Err(RuleflowError::RuleNotFound(rule.id)),
        }
    }

    fn delete_rule(&self, org: &OrgId, id: Uuid) -> Result<()> {
        self.lock()
            .rules
            .remove(&(org.clone(), id))
            .map(|_| ())
            .ok_or(RuleflowError::RuleNotFound(id))
    }

    fn list_rules(&self, org: &OrgId) -> Result<Vec<Rule>> {
        let mut rules: Vec<Rule> = self
            .lock()
            .rules
            .values()
            .filter(|r| &r.org == org)
            .cloned()
            .collect();
        sort_rules(&mut rules);
        Ok(rules)
    }

    fn touch_last_run(&self, org: &OrgId, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.lock();
        let rule = inner
            .rules
            .get_mut(&(org.clone(), id))
            .ok_or(RuleflowError::RuleNotFound(id))?;
        rule.last_run_at = Some(at);
        Ok(())
    }
}

impl ExecutionLedger for MemoryStore {
    fn create_execution(&self, execution: &Execution) -> Result<()> {
        self.lock()
            .executions
            .insert((execution.org.clone(), execution.id), execution.clone());
        Ok(())
    }

    fn update_execution(&self, execution: &Execution) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner
            .executions
            .get_mut(&(execution.org.clone(), execution.id))
            .ok_or(RuleflowError::ExecutionNotFound(execution.id))?;
        check_update(slot, execution)?;
        *slot = execution.clone();
        Ok(())
    }

    fn get_execution(&self, org: &OrgId, id: Uuid) -> Result<Execution> {
        self.lock()
            .executions
            .get(&(org.clone(), id))
            .cloned()
            .ok_or(RuleflowError::ExecutionNotFound(id))
    }

    fn list_executions(&self, org: &OrgId, filter: &ExecutionFilter) -> Result<Page<Execution>> {
        let all: Vec<Execution> = self
            .lock()
            .executions
            .values()
            .filter(|e| &e.org == org)
            .cloned()
            .collect();
        Ok(filter.paginate(all))
    }

    fn delete_executions_for_rule(&self, org: &OrgId, rule_id: Uuid) -> Result<usize> {
        let mut inner = self.lock();
        let before = inner.executions.len();
        inner
            .executions
            .retain(|_, e| !(&e.org == org && e.rule_id == rule_id));
        Ok(before - inner.executions.len())
    }
}

impl Inventory for MemoryStore {
    fn unit_cost(&self, org: &OrgId, item_id: &str) -> Result<f64> {
        self.lock()
            .items
            .get(&(org.clone(), item_id.to_string()))
            .map(|i| i.unit_cost)
            .ok_or_else(|| RuleflowError::ItemNotFound(item_id.to_string()))
    }

    fn adjust_stock(&self, org: &OrgId, item_id: &str, delta: i64) -> Result<i64> {
        let mut inner = self.lock();
        let item = inner
            .items
            .get_mut(&(org.clone(), item_id.to_string()))
            .ok_or_else(|| RuleflowError::ItemNotFound(item_id.to_string()))?;
        let next = stock_after(item_id, item.on_hand, delta)?;
        if next < 0 {
            return Err(RuleflowError::InsufficientStock {
                item: item_id.to_string(),
                on_hand: item.on_hand,
                delta,
            });
        }
        item.on_hand = next;
        Ok(next)
    }
}

impl Purchasing for MemoryStore {
    fn create_draft(&self, org: &OrgId, draft: &PurchaseDraft) -> Result<()> {
        self.lock().purchases.push((org.clone(), draft.clone()));
        Ok(())
    }
}

impl Notifier for MemoryStore {
    fn enqueue(&self, org: &OrgId, notification: &Notification) -> Result<()> {
        self.lock()
            .notifications
            .push((org.clone(), notification.clone()));
        Ok(())
    }
}

impl AuditSink for MemoryStore {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        self.lock().audit.push(entry.clone());
        Ok(())
    }
}
