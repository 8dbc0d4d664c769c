//! Local persistence in a single redb file.
//!
//! # Table design
//!
//! Every table is keyed by a `&str` that starts with the organization id:
//! ```text
//! rules, executions, items      "{org}/{id}"
//! purchases, notifications,     "{org}/{millis:020}/{uuid}"
//! audit
//! ```
//! so a prefix range scan over `"{org}/"` returns exactly one organization's
//! rows, and the append-only tables come back in insertion-time order.
//! Values are JSON.

use std::path::Path;

use ::redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::{check_update, sort_rules, stock_after, ExecutionLedger, RuleStore};
use crate::audit::{AuditEntry, AuditSink};
use crate::entity::{CatalogItem, Inventory, Notification, Notifier, PurchaseDraft, Purchasing};
use crate::error::{storage_err, Result, RuleflowError};
use crate::execution::{Execution, ExecutionFilter, Page};
use crate::rule::Rule;
use crate::types::OrgId;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

const RULES: Table = TableDefinition::new("rules");
const EXECUTIONS: Table = TableDefinition::new("executions");
const ITEMS: Table = TableDefinition::new("items");
const PURCHASES: Table = TableDefinition::new("purchases");
const NOTIFICATIONS: Table = TableDefinition::new("notifications");
const AUDIT: Table = TableDefinition::new("audit");

const ALL_TABLES: [Table; 6] = [RULES, EXECUTIONS, ITEMS, PURCHASES, NOTIFICATIONS, AUDIT];

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn key(org: &OrgId, id: impl std::fmt::Display) -> String {
    format!("{org}/{id}")
}

fn timed_key(org: &OrgId, at: DateTime<Utc>, id: Uuid) -> String {
    let ms = at.timestamp_millis().max(0) as u64;
    format!("{org}/{ms:020}/{id}")
}

fn prefix(org: &OrgId) -> String {
    format!("{org}/")
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

/// Implements every collaborator trait over one database file.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path`, creating all tables.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(storage_err)?;
        let wt = db.begin_write().map_err(storage_err)?;
        for table in ALL_TABLES {
            wt.open_table(table).map_err(storage_err)?;
        }
        wt.commit().map_err(storage_err)?;
        Ok(Self { db })
    }

    fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> Result<T>) -> Result<T> {
        let wt = self.db.begin_write().map_err(storage_err)?;
        let out = f(&wt)?;
        wt.commit().map_err(storage_err)?;
        Ok(out)
    }

    fn put<T: Serialize>(&self, table: Table, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.write(|wt| {
            let mut t = wt.open_table(table).map_err(storage_err)?;
            t.insert(key, bytes.as_slice()).map_err(storage_err)?;
            Ok(())
        })
    }

    fn get<T: DeserializeOwned>(&self, table: Table, key: &str) -> Result<Option<T>> {
        let rt = self.db.begin_read().map_err(storage_err)?;
        let t = rt.open_table(table).map_err(storage_err)?;
        match t.get(key).map_err(storage_err)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// Every row of `org` in `table`, in key order.
    fn scan<T: DeserializeOwned>(&self, table: Table, org: &OrgId) -> Result<Vec<T>> {
        let prefix = prefix(org);
        let rt = self.db.begin_read().map_err(storage_err)?;
        let t = rt.open_table(table).map_err(storage_err)?;
        let mut out = Vec::new();
        for entry in t.range(prefix.as_str()..).map_err(storage_err)? {
            let (k, v) = entry.map_err(storage_err)?;
            if !k.value().starts_with(&prefix) {
                break;
            }
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Local catalog / outbox access (CLI only)
    // -----------------------------------------------------------------------

    pub fn put_item(&self, org: &OrgId, item: &CatalogItem) -> Result<()> {
        self.put(ITEMS, &key(org, &item.id), item)
    }

    pub fn list_items(&self, org: &OrgId) -> Result<Vec<CatalogItem>> {
        self.scan(ITEMS, org)
    }

    pub fn list_purchases(&self, org: &OrgId) -> Result<Vec<PurchaseDraft>> {
        self.scan(PURCHASES, org)
    }

    pub fn list_notifications(&self, org: &OrgId) -> Result<Vec<Notification>> {
        self.scan(NOTIFICATIONS, org)
    }

    pub fn list_audit(&self, org: &OrgId) -> Result<Vec<AuditEntry>> {
        self.scan(AUDIT, org)
    }
}

// ---------------------------------------------------------------------------
// RuleStore
// ---------------------------------------------------------------------------

impl RuleStore for RedbStore {
    fn insert_rule(&self, rule: &Rule) -> Result<()> {
        self.put(RULES, &key(&rule.org, rule.id), rule)
    }

    fn get_rule(&self, org: &OrgId, id: Uuid) -> Result<Rule> {
        self.get(RULES, &key(org, id))?
            .ok_or(RuleflowError::RuleNotFound(id))
    }

    fn replace_rule(&self, rule: &Rule) -> Result<()> {
        let k = key(&rule.org, rule.id);
        let bytes = serde_json::to_vec(rule)?;
        self.write(|wt| {
            let mut t = wt.open_table(RULES).map_err(storage_err)?;
            let exists = t.get(k.as_str()).map_err(storage_err)?.is_some();
            if !exists {
                return Err(RuleflowError::RuleNotFound(rule.id));
            }
            t.insert(k.as_str(), bytes.as_slice()).map_err(storage_err)?;
            Ok(())
        })
    }

    fn delete_rule(&self, org: &OrgId, id: Uuid) -> Result<()> {
        let k = key(org, id);
        self.write(|wt| {
            let mut t = wt.open_table(RULES).map_err(storage_err)?;
            let removed = t.remove(k.as_str()).map_err(storage_err)?.is_some();
            if removed {
                Ok(())
            } else {
                Err(RuleflowError::RuleNotFound(id))
            }
        })
    }

    fn list_rules(&self, org: &OrgId) -> Result<Vec<Rule>> {
        let mut rules: Vec<Rule> = self.scan(RULES, org)?;
        sort_rules(&mut rules);
        Ok(rules)
    }

    fn touch_last_run(&self, org: &OrgId, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let k = key(org, id);
        self.write(|wt| {
            let mut t = wt.open_table(RULES).map_err(storage_err)?;
            let mut rule: Rule = match t.get(k.as_str()).map_err(storage_err)? {
                Some(v) => serde_json::from_slice(v.value())?,
                None => return Err(RuleflowError::RuleNotFound(id)),
            };
            rule.last_run_at = Some(at);
            let bytes = serde_json::to_vec(&rule)?;
            t.insert(k.as_str(), bytes.as_slice()).map_err(storage_err)?;
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// ExecutionLedger
// ---------------------------------------------------------------------------

impl ExecutionLedger for RedbStore {
    fn create_execution(&self, execution: &Execution) -> Result<()> {
        self.put(EXECUTIONS, &key(&execution.org, execution.id), execution)
    }

    fn update_execution(&self, execution: &Execution) -> Result<()> {
        let k = key(&execution.org, execution.id);
        let bytes = serde_json::to_vec(execution)?;
        self.write(|wt| {
            let mut t = wt.open_table(EXECUTIONS).map_err(storage_err)?;
            let stored: Execution = match t.get(k.as_str()).map_err(storage_err)? {
                Some(v) => serde_json::from_slice(v.value())?,
                None => return Err(RuleflowError::ExecutionNotFound(execution.id)),
            };
            check_update(&stored, execution)?;
            t.insert(k.as_str(), bytes.as_slice()).map_err(storage_err)?;
            Ok(())
        })
    }

    fn get_execution(&self, org: &OrgId, id: Uuid) -> Result<Execution> {
        self.get(EXECUTIONS, &key(org, id))?
            .ok_or(RuleflowError::ExecutionNotFound(id))
    }

    fn list_executions(&self, org: &OrgId, filter: &ExecutionFilter) -> Result<Page<Execution>> {
        let all: Vec<Execution> = self.scan(EXECUTIONS, org)?;
        Ok(filter.paginate(all))
    }

    fn delete_executions_for_rule(&self, org: &OrgId, rule_id: Uuid) -> Result<usize> {
        let prefix = prefix(org);
        self.write(|wt| {
            let mut t = wt.open_table(EXECUTIONS).map_err(storage_err)?;
            let mut doomed = Vec::new();
            for entry in t.range(prefix.as_str()..).map_err(storage_err)? {
                let (k, v) = entry.map_err(storage_err)?;
                if !k.value().starts_with(&prefix) {
                    break;
                }
                let exec: Execution = serde_json::from_slice(v.value())?;
                if exec.rule_id == rule_id {
                    doomed.push(k.value().to_string());
                }
            }
            for k in &doomed {
                t.remove(k.as_str()).map_err(storage_err)?;
            }
            Ok(doomed.len())
        })
    }
}

// ---------------------------------------------------------------------------
// Business entities and audit
// ---------------------------------------------------------------------------

impl Inventory for RedbStore {
    fn unit_cost(&self, org: &OrgId, item_id: &str) -> Result<f64> {
        self.get::<CatalogItem>(ITEMS, &key(org, item_id))?
            .map(|i| i.unit_cost)
            .ok_or_else(|| RuleflowError::ItemNotFound(item_id.to_string()))
    }

    fn adjust_stock(&self, org: &OrgId, item_id: &str, delta: i64) -> Result<i64> {
        let k = key(org, item_id);
        self.write(|wt| {
            let mut t = wt.open_table(ITEMS).map_err(storage_err)?;
            let mut item: CatalogItem = match t.get(k.as_str()).map_err(storage_err)? {
                Some(v) => serde_json::from_slice(v.value())?,
                None => return Err(RuleflowError::ItemNotFound(item_id.to_string())),
            };
            let next = stock_after(item_id, item.on_hand, delta)?;
            if next < 0 {
                return Err(RuleflowError::InsufficientStock {
                    item: item_id.to_string(),
                    on_hand: item.on_hand,
                    delta,
                });
            }
            item.on_hand = next;
            let bytes = serde_json::to_vec(&item)?;
            t.insert(k.as_str(), bytes.as_slice()).map_err(storage_err)?;
            Ok(next)
        })
    }
}

impl Purchasing for RedbStore {
    fn create_draft(&self, org: &OrgId, draft: &PurchaseDraft) -> Result<()> {
        self.put(PURCHASES, &timed_key(org, draft.created_at, draft.id), draft)
    }
}

impl Notifier for RedbStore {
    fn enqueue(&self, org: &OrgId, notification: &Notification) -> Result<()> {
        self.put(
            NOTIFICATIONS,
            &timed_key(org, notification.queued_at, notification.id),
            notification,
        )
    }
}

impl AuditSink for RedbStore {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        self.put(AUDIT, &timed_key(&entry.org, entry.at, entry.id), entry)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
