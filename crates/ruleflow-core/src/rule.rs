//! Rule definitions: trigger + conditions + ordered actions.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::action::{Action, ActionDraft, ActionKind};
use crate::condition::{resolve_path, Condition};
use crate::cron::CronSchedule;
use crate::error::{Result, RuleflowError};
use crate::types::{Actor, OrgId, TriggerType};

const MAX_NAME_LEN: usize = 120;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    /// Fires when the field is at or below the threshold.
    #[default]
    Below,
    /// Fires when the field is at or above the threshold.
    Above,
}

fn default_threshold_field() -> String {
    "quantity".to_string()
}

/// What causes a rule to be evaluated, with its per-type configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Event {
        event: String,
    },
    Schedule {
        cron: String,
    },
    Threshold {
        event: String,
        #[serde(default = "default_threshold_field")]
        field: String,
        threshold: f64,
        #[serde(default)]
        direction: ThresholdDirection,
    },
}

/// An internal business event, e.g. `order.created` or `stock.changed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessEvent {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl BusinessEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

impl Trigger {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            Trigger::Manual => TriggerType::Manual,
            Trigger::Event { .. } => TriggerType::Event,
            Trigger::Schedule { .. } => TriggerType::Schedule,
            Trigger::Threshold { .. } => TriggerType::Threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Trigger::Manual => Ok(()),
            Trigger::Event { event } => require_event_name(event),
            Trigger::Schedule { cron } => CronSchedule::parse(cron).map(|_| ()),
            Trigger::Threshold {
                event,
                field,
                threshold,
                ..
            } => {
                require_event_name(event)?;
                if field.trim().is_empty() {
                    return Err(RuleflowError::InvalidRule(
                        "threshold field must not be empty".into(),
                    ));
                }
                if !threshold.is_finite() {
                    return Err(RuleflowError::InvalidRule(
                        "threshold must be a finite number".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Whether this trigger is compatible with `event`. Threshold triggers
    /// also test the configured field before any condition is evaluated.
    pub fn matches_event(&self, event: &BusinessEvent) -> bool {
        match self {
            Trigger::Event { event: name } => *name == event.name,
            Trigger::Threshold {
                event: name,
                field,
                threshold,
                direction,
            } => {
                if *name != event.name {
                    return false;
                }
                let Some(value) = resolve_path(&event.payload, field).and_then(Value::as_f64)
                else {
                    return false;
                };
                match direction {
                    ThresholdDirection::Below => value <= *threshold,
                    ThresholdDirection::Above => value >= *threshold,
                }
            }
            Trigger::Manual | Trigger::Schedule { .. } => false,
        }
    }

    pub fn matches_tick(&self, tick: DateTime<Utc>) -> bool {
        let Trigger::Schedule { cron } = self else {
            return false;
        };
        match CronSchedule::parse(cron) {
            Ok(schedule) => schedule.matches(tick),
            Err(e) => {
                tracing::warn!(cron = %cron, error = %e, "stored schedule no longer parses");
                false
            }
        }
    }
}

fn require_event_name(event: &str) -> Result<()> {
    if event.trim().is_empty() {
        return Err(RuleflowError::InvalidRule(
            "event name must not be empty".into(),
        ));
    }
    Ok(())
}

/// Payload handed to rules fired by a schedule tick.
pub fn tick_payload(tick: DateTime<Utc>) -> Value {
    json!({
        "tick": tick.to_rfc3339(),
        "year": tick.year(),
        "month": tick.month(),
        "day": tick.day(),
        "hour": tick.hour(),
        "minute": tick.minute(),
        "weekday": tick.weekday().num_days_from_sunday(),
    })
}

// ---------------------------------------------------------------------------
// RuleDraft
// ---------------------------------------------------------------------------

fn default_active() -> bool {
    true
}

/// Caller-supplied rule definition for create and (full-replace) update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trigger: Trigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<ActionDraft>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub dry_run_mode: bool,
}

impl RuleDraft {
    pub fn new(name: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            name: name.into(),
            description: None,
            trigger,
            conditions: Vec::new(),
            actions: Vec::new(),
            priority: 0,
            is_active: true,
            approval_required: false,
            dry_run_mode: false,
        }
    }

    /// Reject malformed definitions before anything is stored. Reports the
    /// first problem found.
    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(RuleflowError::InvalidRule("name must not be empty".into()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(RuleflowError::InvalidRule(format!(
                "name is longer than {MAX_NAME_LEN} characters"
            )));
        }

        self.trigger.validate()?;

        for (i, condition) in self.conditions.iter().enumerate() {
            condition
                .validate()
                .map_err(|reason| RuleflowError::InvalidRule(format!("conditions[{i}]: {reason}")))?;
        }

        for (index, draft) in self.actions.iter().enumerate() {
            let invalid = |reason: String| RuleflowError::InvalidAction {
                index,
                action_type: draft.action_type.clone(),
                reason,
            };
            let kind = ActionKind::parse(&draft.action_type, &draft.action_data).map_err(invalid)?;
            if let ActionKind::Unknown(name) = kind {
                return Err(invalid(format!("unknown action type '{name}'")));
            }
        }
        Ok(())
    }

    fn build_actions(&self) -> Vec<Action> {
        self.actions
            .iter()
            .enumerate()
            .map(|(i, d)| {
                Action::new(
                    d.order.unwrap_or(i as i32),
                    d.action_type.clone(),
                    d.action_data.clone(),
                )
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub org: OrgId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub trigger: Trigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub priority: i32,
    pub is_active: bool,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub dry_run_mode: bool,
    /// Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Build a new rule from a draft. Does not validate; see [`RuleDraft::validate`].
    pub fn from_draft(org: OrgId, actor: &Actor, draft: &RuleDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            org,
            name: draft.name.trim().to_string(),
            description: draft.description.clone(),
            trigger: draft.trigger.clone(),
            conditions: draft.conditions.clone(),
            actions: draft.build_actions(),
            priority: draft.priority,
            is_active: draft.is_active,
            approval_required: draft.approval_required,
            dry_run_mode: draft.dry_run_mode,
            last_run_at: None,
            created_by: actor.id().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the whole definition, including the entire action list.
    /// Identity, ownership and run history fields are kept.
    pub fn apply_draft(&mut self, draft: &RuleDraft) {
        self.name = draft.name.trim().to_string();
        self.description = draft.description.clone();
        self.trigger = draft.trigger.clone();
        self.conditions = draft.conditions.clone();
        self.actions = draft.build_actions();
        self.priority = draft.priority;
        self.is_active = draft.is_active;
        self.approval_required = draft.approval_required;
        self.dry_run_mode = draft.dry_run_mode;
        self.updated_at = Utc::now();
    }

    pub fn trigger_type(&self) -> TriggerType {
        self.trigger.trigger_type()
    }
}
