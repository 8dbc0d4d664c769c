//! The command surface: everything a transport (CLI, HTTP, job runner) may ask
//! of the engine.
//!
//! Capability checks and CRUD auditing live here. Reads need `run rules`;
//! writes and approval decisions need `manage rules`. Event and schedule
//! dispatch are system entry points and take no actor.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry, AuditSink};
use crate::auth::{self, Authorizer, Capability};
use crate::config::{Config, EngineSettings};
use crate::dispatcher::{DispatchReport, TriggerDispatcher};
use crate::entity::{Inventory, Notifier, Purchasing};
use crate::error::{Result, RuleflowError};
use crate::execution::{Execution, ExecutionFilter, Page};
use crate::executor::RuleExecutor;
use crate::handler::Handlers;
use crate::paths;
use crate::rule::{BusinessEvent, Rule, RuleDraft};
use crate::store::{ExecutionLedger, MemoryStore, RedbStore, RuleStore};
use crate::types::{Actor, ExecutionStatus, OrgId};

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// The collaborators an engine is wired from.
pub struct Components {
    pub rules: Arc<dyn RuleStore>,
    pub ledger: Arc<dyn ExecutionLedger>,
    pub authorizer: Arc<dyn Authorizer>,
    pub audit: Arc<dyn AuditSink>,
    pub inventory: Arc<dyn Inventory>,
    pub purchasing: Arc<dyn Purchasing>,
    pub notifier: Arc<dyn Notifier>,
}

impl Components {
    /// Wire every seam except authorization to one store.
    pub fn from_store<S>(store: Arc<S>, authorizer: Arc<dyn Authorizer>) -> Self
    where
        S: RuleStore + ExecutionLedger + AuditSink + Inventory + Purchasing + Notifier + 'static,
    {
        Self {
            rules: store.clone(),
            ledger: store.clone(),
            authorizer,
            audit: store.clone(),
            inventory: store.clone(),
            purchasing: store.clone(),
            notifier: store,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    rules: Arc<dyn RuleStore>,
    ledger: Arc<dyn ExecutionLedger>,
    authorizer: Arc<dyn Authorizer>,
    audit: Arc<dyn AuditSink>,
    executor: Arc<RuleExecutor>,
    dispatcher: TriggerDispatcher,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(components: Components, settings: &EngineSettings) -> Self {
        let handlers = Handlers::new(
            components.inventory,
            components.purchasing,
            components.notifier,
            settings.webhook_timeout(),
        );
        let executor = Arc::new(RuleExecutor::new(
            components.rules.clone(),
            components.ledger.clone(),
            components.audit.clone(),
            handlers,
            settings.serialize_runs,
        ));
        let dispatcher = TriggerDispatcher::new(
            components.rules.clone(),
            components.authorizer.clone(),
            executor.clone(),
        );
        Self {
            rules: components.rules,
            ledger: components.ledger,
            authorizer: components.authorizer,
            audit: components.audit,
            executor,
            dispatcher,
            settings: settings.clone(),
        }
    }

    /// Engine over the workspace database under `root`, authorized by the
    /// config's access table. The store is returned for local listings.
    pub fn open_local(root: &Path, config: &Config) -> Result<(Self, Arc<RedbStore>)> {
        let store = Arc::new(RedbStore::open(&paths::db_path(root))?);
        let authorizer = Arc::new(config.access.clone());
        let engine = Self::new(Components::from_store(store.clone(), authorizer), &config.engine);
        Ok((engine, store))
    }

    /// Engine over a fresh in-process store.
    pub fn in_memory(
        authorizer: Arc<dyn Authorizer>,
        settings: &EngineSettings,
    ) -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = Self::new(Components::from_store(store.clone(), authorizer), settings);
        (engine, store)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn require(&self, actor: &Actor, org: &OrgId, capability: Capability) -> Result<()> {
        auth::require(self.authorizer.as_ref(), actor, org, capability)
    }

    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    pub fn create_rule(&self, actor: &Actor, org: &OrgId, draft: &RuleDraft) -> Result<Rule> {
        self.require(actor, org, Capability::ManageRules)?;
        draft.validate()?;
        let rule = Rule::from_draft(org.clone(), actor, draft);
        self.rules.insert_rule(&rule)?;
        self.audit.append(
            &AuditEntry::by(org, actor, AuditAction::RuleCreated, rule.id)
                .with_detail(json!({ "name": rule.name })),
        )?;
        info!(org = %org, rule_id = %rule.id, name = %rule.name, "rule created");
        Ok(rule)
    }

    /// Replace the whole definition, action list included.
    pub fn update_rule(
        &self,
        actor: &Actor,
        org: &OrgId,
        rule_id: Uuid,
        draft: &RuleDraft,
    ) -> Result<Rule> {
        self.require(actor, org, Capability::ManageRules)?;
        draft.validate()?;
        let mut rule = self.rules.get_rule(org, rule_id)?;
        rule.apply_draft(draft);
        self.rules.replace_rule(&rule)?;
        self.audit.append(
            &AuditEntry::by(org, actor, AuditAction::RuleUpdated, rule.id)
                .with_detail(json!({ "name": rule.name, "actions": rule.actions.len() })),
        )?;
        info!(org = %org, rule_id = %rule.id, "rule updated");
        Ok(rule)
    }

    /// Delete a rule. Returns how many executions went with it.
    pub fn delete_rule(&self, actor: &Actor, org: &OrgId, rule_id: Uuid) -> Result<usize> {
        self.require(actor, org, Capability::ManageRules)?;
        self.rules.delete_rule(org, rule_id)?;
        let removed = if self.settings.delete_executions_with_rule {
            self.ledger.delete_executions_for_rule(org, rule_id)?
        } else {
            0
        };
        self.audit.append(
            &AuditEntry::by(org, actor, AuditAction::RuleDeleted, rule_id)
                .with_detail(json!({ "executions_removed": removed })),
        )?;
        info!(org = %org, rule_id = %rule_id, executions_removed = removed, "rule deleted");
        Ok(removed)
    }

    pub fn get_rule(&self, actor: &Actor, org: &OrgId, rule_id: Uuid) -> Result<Rule> {
        self.require(actor, org, Capability::RunRules)?;
        self.rules.get_rule(org, rule_id)
    }

    pub fn list_rules(&self, actor: &Actor, org: &OrgId) -> Result<Vec<Rule>> {
        self.require(actor, org, Capability::RunRules)?;
        self.rules.list_rules(org)
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    pub fn run_rule(
        &self,
        actor: &Actor,
        org: &OrgId,
        rule_id: Uuid,
        payload: Value,
        dry_run: bool,
    ) -> Result<Execution> {
        self.dispatcher
            .run_manual(actor, org, rule_id, payload, dry_run)
    }

    pub fn dispatch_event(&self, org: &OrgId, event: &BusinessEvent) -> Result<DispatchReport> {
        self.dispatcher.dispatch_event(org, event)
    }

    pub fn dispatch_tick(&self, org: &OrgId, tick: DateTime<Utc>) -> Result<DispatchReport> {
        self.dispatcher.dispatch_tick(org, tick)
    }

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    pub fn get_execution(&self, actor: &Actor, org: &OrgId, id: Uuid) -> Result<Execution> {
        self.require(actor, org, Capability::RunRules)?;
        self.ledger.get_execution(org, id)
    }

    /// A missing `limit` falls back to the configured page size.
    pub fn list_executions(
        &self,
        actor: &Actor,
        org: &OrgId,
        filter: &ExecutionFilter,
    ) -> Result<Page<Execution>> {
        self.require(actor, org, Capability::RunRules)?;
        let mut filter = filter.clone();
        filter.limit.get_or_insert(self.settings.page_size);
        self.ledger.list_executions(org, &filter)
    }

    pub fn decide_approval(
        &self,
        actor: &Actor,
        org: &OrgId,
        execution_id: Uuid,
        decision: Decision,
    ) -> Result<Execution> {
        self.require(actor, org, Capability::ManageRules)?;
        let exec = self.ledger.get_execution(org, execution_id)?;
        if !exec.is_awaiting_approval() {
            return Err(RuleflowError::InvalidTransition {
                from: exec.status.to_string(),
                to: "decided".into(),
                reason: "execution is not awaiting approval".into(),
            });
        }
        match decision {
            Decision::Approve => self.executor.approve(exec, actor),
            Decision::Reject { reason } => self.executor.reject(exec, actor, &reason),
        }
    }

    /// `Running` executions older than `older_than` (default from settings)
    /// that are not parked for approval. Evidence of an interrupted run.
    pub fn stale_executions(
        &self,
        actor: &Actor,
        org: &OrgId,
        older_than: Option<Duration>,
    ) -> Result<Vec<Execution>> {
        self.require(actor, org, Capability::RunRules)?;
        let age = older_than.unwrap_or_else(|| self.settings.stale_after());
        let age = chrono::Duration::from_std(age)
            .map_err(|e| RuleflowError::InvalidRule(format!("stale threshold: {e}")))?;
        let filter = ExecutionFilter {
            status: Some(ExecutionStatus::Running),
            until: Some(Utc::now() - age),
            ..ExecutionFilter::default()
        };
        Ok(self
            .ledger
            .list_executions(org, &filter)?
            .items
            .into_iter()
            .filter(|e| !e.is_awaiting_approval())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionDraft, ADJUST_STOCK, NOTIFY};
    use crate::auth::AllowAll;
    use crate::config::{AccessConfig, OrgAccess};
    use crate::error::ErrorClass;
    use crate::rule::Trigger;
    use tempfile::TempDir;

    fn org() -> OrgId {
        OrgId::new("acme").unwrap()
    }

    fn alice() -> Actor {
        Actor::new("alice")
    }

    fn engine() -> (Engine, Arc<MemoryStore>) {
        Engine::in_memory(Arc::new(AllowAll), &EngineSettings::default())
    }

    fn stock_action(item: &str, delta: i64) -> ActionDraft {
        ActionDraft {
            order: None,
            action_type: ADJUST_STOCK.into(),
            action_data: json!({"item_id": item, "delta": delta}),
        }
    }

    #[test]
    fn create_rejects_invalid_drafts_without_storing() {
        let (engine, store) = engine();
        let mut draft = RuleDraft::new("bad", Trigger::Manual);
        draft.actions = vec![ActionDraft {
            order: None,
            action_type: "send-fax".into(),
            action_data: json!({}),
        }];
        let err = engine.create_rule(&alice(), &org(), &draft).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);
        assert!(store.list_rules(&org()).unwrap().is_empty());
    }

    #[test]
    fn action_order_round_trips() {
        let (engine, _store) = engine();
        let mut draft = RuleDraft::new("ordered", Trigger::Manual);
        draft.actions = vec![
            ActionDraft {
                order: Some(3),
                ..stock_action("A", 1)
            },
            ActionDraft {
                order: Some(1),
                ..stock_action("B", 1)
            },
            ActionDraft {
                order: Some(2),
                ..stock_action("C", 1)
            },
        ];
        let created = engine.create_rule(&alice(), &org(), &draft).unwrap();
        let fetched = engine.get_rule(&alice(), &org(), created.id).unwrap();

        let shape = |r: &Rule| -> Vec<(i32, Value)> {
            r.actions
                .iter()
                .map(|a| (a.order, a.action_data.clone()))
                .collect()
        };
        assert_eq!(shape(&fetched), shape(&created));
        let orders: Vec<i32> = fetched.actions.iter().map(|a| a.order).collect();
        assert_eq!(orders, vec![3, 1, 2]);
    }

    #[test]
    fn update_replaces_the_action_list_wholesale() {
        let (engine, _store) = engine();
        let mut draft = RuleDraft::new("r", Trigger::Manual);
        draft.actions = vec![stock_action("A", 1), stock_action("B", 1)];
        let created = engine.create_rule(&alice(), &org(), &draft).unwrap();

        draft.actions = vec![stock_action("C", 2)];
        let updated = engine
            .update_rule(&alice(), &org(), created.id, &draft)
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.actions.len(), 1);
        assert_eq!(updated.actions[0].action_data["item_id"], "C");
    }

    #[test]
    fn delete_cascades_to_executions() {
        let (engine, store) = engine();
        let rule = engine
            .create_rule(&alice(), &org(), &RuleDraft::new("r", Trigger::Manual))
            .unwrap();
        engine
            .run_rule(&alice(), &org(), rule.id, json!({}), false)
            .unwrap();
        engine
            .run_rule(&alice(), &org(), rule.id, json!({}), false)
            .unwrap();

        assert_eq!(engine.delete_rule(&alice(), &org(), rule.id).unwrap(), 2);
        assert_eq!(
            store
                .list_executions(&org(), &ExecutionFilter::default())
                .unwrap()
                .total,
            0
        );
        let actions: Vec<_> = store.audit_entries().into_iter().map(|e| e.action).collect();
        assert!(actions.contains(&AuditAction::RuleCreated));
        assert!(actions.contains(&AuditAction::RuleDeleted));
    }

    #[test]
    fn delete_keeps_history_when_configured() {
        let settings = EngineSettings {
            delete_executions_with_rule: false,
            ..EngineSettings::default()
        };
        let (engine, store) = Engine::in_memory(Arc::new(AllowAll), &settings);
        let rule = engine
            .create_rule(&alice(), &org(), &RuleDraft::new("r", Trigger::Manual))
            .unwrap();
        engine
            .run_rule(&alice(), &org(), rule.id, json!({}), false)
            .unwrap();
        assert_eq!(engine.delete_rule(&alice(), &org(), rule.id).unwrap(), 0);
        assert_eq!(
            store
                .list_executions(&org(), &ExecutionFilter::default())
                .unwrap()
                .total,
            1
        );
    }

    #[test]
    fn runners_cannot_manage_rules() {
        let mut access = AccessConfig::default();
        access.orgs.insert(
            "acme".into(),
            OrgAccess {
                managers: vec!["alice".into()],
                runners: vec!["bob".into()],
            },
        );
        let (engine, _store) = Engine::in_memory(Arc::new(access), &EngineSettings::default());
        let bob = Actor::new("bob");

        let err = engine
            .create_rule(&bob, &org(), &RuleDraft::new("r", Trigger::Manual))
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Forbidden);

        let rule = engine
            .create_rule(&alice(), &org(), &RuleDraft::new("r", Trigger::Manual))
            .unwrap();
        assert!(engine.run_rule(&bob, &org(), rule.id, json!({}), false).is_ok());
        assert!(engine.list_rules(&bob, &org()).is_ok());
    }

    #[test]
    fn approval_decision_flow() {
        let (engine, store) = engine();
        store.put_item(&org(), "X", 1.0, 10);
        let mut draft = RuleDraft::new("gated", Trigger::Manual);
        draft.approval_required = true;
        draft.actions = vec![stock_action("X", -3)];
        let rule = engine.create_rule(&alice(), &org(), &draft).unwrap();

        let held = engine
            .run_rule(&alice(), &org(), rule.id, json!({}), false)
            .unwrap();
        assert!(held.is_awaiting_approval());
        assert_eq!(store.on_hand(&org(), "X"), Some(10));

        let done = engine
            .decide_approval(&alice(), &org(), held.id, Decision::Approve)
            .unwrap();
        assert_eq!(done.status, ExecutionStatus::Success);
        assert_eq!(store.on_hand(&org(), "X"), Some(7));

        let err = engine
            .decide_approval(&alice(), &org(), held.id, Decision::Approve)
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Conflict);
    }

    #[test]
    fn reject_decision_fails_the_run() {
        let (engine, store) = engine();
        let mut draft = RuleDraft::new("gated", Trigger::Manual);
        draft.approval_required = true;
        draft.actions = vec![ActionDraft {
            order: None,
            action_type: NOTIFY.into(),
            action_data: json!({"target": "ops", "title": "t"}),
        }];
        let rule = engine.create_rule(&alice(), &org(), &draft).unwrap();
        let held = engine
            .run_rule(&alice(), &org(), rule.id, json!({}), false)
            .unwrap();

        let done = engine
            .decide_approval(
                &alice(),
                &org(),
                held.id,
                Decision::Reject {
                    reason: "duplicate".into(),
                },
            )
            .unwrap();
        assert_eq!(done.status, ExecutionStatus::Failed);
        assert!(store.notifications(&org()).is_empty());
    }

    #[test]
    fn list_executions_applies_default_page_size() {
        let settings = EngineSettings {
            page_size: 2,
            ..EngineSettings::default()
        };
        let (engine, _store) = Engine::in_memory(Arc::new(AllowAll), &settings);
        let rule = engine
            .create_rule(&alice(), &org(), &RuleDraft::new("r", Trigger::Manual))
            .unwrap();
        for _ in 0..3 {
            engine
                .run_rule(&alice(), &org(), rule.id, json!({}), false)
                .unwrap();
        }
        let page = engine
            .list_executions(&alice(), &org(), &ExecutionFilter::for_rule(rule.id))
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn stale_listing_skips_held_and_recent_runs() {
        let (engine, store) = engine();
        let mut gated = RuleDraft::new("gated", Trigger::Manual);
        gated.approval_required = true;
        let gated = engine.create_rule(&alice(), &org(), &gated).unwrap();
        let plain = engine
            .create_rule(&alice(), &org(), &RuleDraft::new("plain", Trigger::Manual))
            .unwrap();

        let mut held = engine
            .run_rule(&alice(), &org(), gated.id, json!({}), false)
            .unwrap();
        held.started_at = Utc::now() - chrono::Duration::hours(2);
        store.update_execution(&held).unwrap();

        let mut stuck = Execution::start(
            &plain,
            crate::types::TriggerType::Manual,
            "alice",
            json!({}),
            false,
        );
        stuck.started_at = Utc::now() - chrono::Duration::hours(2);
        store.create_execution(&stuck).unwrap();

        let fresh = Execution::start(
            &plain,
            crate::types::TriggerType::Manual,
            "alice",
            json!({}),
            false,
        );
        store.create_execution(&fresh).unwrap();

        let stale = engine
            .stale_executions(&alice(), &org(), Some(Duration::from_secs(600)))
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, stuck.id);
    }

    #[test]
    fn local_engine_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::new(&org(), "alice");
        let rule_id = {
            let (engine, _store) = Engine::open_local(dir.path(), &cfg).unwrap();
            engine
                .create_rule(&alice(), &org(), &RuleDraft::new("kept", Trigger::Manual))
                .unwrap()
                .id
        };
        let (engine, store) = Engine::open_local(dir.path(), &cfg).unwrap();
        assert_eq!(engine.get_rule(&alice(), &org(), rule_id).unwrap().name, "kept");
        assert_eq!(store.list_audit(&org()).unwrap().len(), 1);
    }
}
