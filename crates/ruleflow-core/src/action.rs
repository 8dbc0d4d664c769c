//! Action data model.
//!
//! A rule stores its actions in raw form (`action_type` + `action_data`) so
//! that the rule store never has to understand payloads. Handlers work on the
//! parsed form, [`ActionKind`], which has one variant per supported kind and
//! an `Unknown` catch-all that always fails.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const NOTIFY: &str = "notify";
pub const CREATE_PURCHASE_REQUEST: &str = "create-purchase-request";
pub const ADJUST_STOCK: &str = "adjust-stock";
pub const CALL_WEBHOOK: &str = "call-webhook";

// ---------------------------------------------------------------------------
// Action (stored form)
// ---------------------------------------------------------------------------

/// One ordered unit of effect belonging to a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    /// Execution sequence; ties are broken by position in the list.
    pub order: i32,
    pub action_type: String,
    #[serde(default)]
    pub action_data: Value,
}

impl Action {
    pub fn new(order: i32, action_type: impl Into<String>, action_data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            order,
            action_type: action_type.into(),
            action_data,
        }
    }

    /// Parse and validate the payload. `Ok(ActionKind::Unknown(_))` is
    /// returned for unrecognised types; callers decide how loudly to fail.
    pub fn kind(&self) -> Result<ActionKind, String> {
        ActionKind::parse(&self.action_type, &self.action_data)
    }
}

/// Actions in execution sequence: ascending `order`, insertion order on ties.
pub fn execution_order(actions: &[Action]) -> Vec<&Action> {
    let mut sorted: Vec<&Action> = actions.iter().collect();
    sorted.sort_by_key(|a| a.order);
    sorted
}

// ---------------------------------------------------------------------------
// ActionDraft
// ---------------------------------------------------------------------------

/// Action as supplied by a caller creating or updating a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDraft {
    /// Defaults to the action's position in the list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    pub action_type: String,
    #[serde(default)]
    pub action_data: Value,
}

// ---------------------------------------------------------------------------
// ActionKind (parsed form)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Notify(NotifyAction),
    CreatePurchaseRequest(PurchaseRequestAction),
    AdjustStock(AdjustStockAction),
    CallWebhook(WebhookAction),
    Unknown(String),
}

impl ActionKind {
    pub fn parse(action_type: &str, data: &Value) -> Result<Self, String> {
        match action_type {
            NOTIFY => decode::<NotifyAction>(data).map(ActionKind::Notify),
            CREATE_PURCHASE_REQUEST => {
                decode::<PurchaseRequestAction>(data).map(ActionKind::CreatePurchaseRequest)
            }
            ADJUST_STOCK => decode::<AdjustStockAction>(data).map(ActionKind::AdjustStock),
            CALL_WEBHOOK => decode::<WebhookAction>(data).map(ActionKind::CallWebhook),
            other => Ok(ActionKind::Unknown(other.to_string())),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            ActionKind::Notify(_) => NOTIFY,
            ActionKind::CreatePurchaseRequest(_) => CREATE_PURCHASE_REQUEST,
            ActionKind::AdjustStock(_) => ADJUST_STOCK,
            ActionKind::CallWebhook(_) => CALL_WEBHOOK,
            ActionKind::Unknown(name) => name,
        }
    }
}

trait Payload: DeserializeOwned {
    fn validate(&self) -> Result<(), String>;
}

fn decode<P: Payload>(data: &Value) -> Result<P, String> {
    let payload: P = serde_json::from_value(data.clone()).map_err(|e| e.to_string())?;
    payload.validate()?;
    Ok(payload)
}

fn require(name: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{name} must not be empty"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyAction {
    /// Recipient reference, e.g. `user:42` or `role:purchasing`.
    pub target: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Severity,
}

impl Payload for NotifyAction {
    fn validate(&self) -> Result<(), String> {
        require("target", &self.target)?;
        let has_text = [&self.title, &self.message]
            .iter()
            .any(|t| t.as_deref().is_some_and(|s| !s.trim().is_empty()));
        if !has_text {
            return Err("a title or message is required".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequestAction {
    pub item_id: String,
    pub quantity: u32,
    pub supplier_id: String,
    pub location_id: String,
    /// Overrides the catalog unit cost when set.
    #[serde(default)]
    pub unit_cost: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
}

impl Payload for PurchaseRequestAction {
    fn validate(&self) -> Result<(), String> {
        require("item_id", &self.item_id)?;
        require("supplier_id", &self.supplier_id)?;
        require("location_id", &self.location_id)?;
        if self.quantity == 0 {
            return Err("quantity must be greater than zero".into());
        }
        if let Some(cost) = self.unit_cost {
            if !cost.is_finite() || cost < 0.0 {
                return Err(format!("unit_cost {cost} is not a valid amount"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustStockAction {
    pub item_id: String,
    /// Signed quantity change.
    pub delta: i64,
}

impl Payload for AdjustStockAction {
    fn validate(&self) -> Result<(), String> {
        require("item_id", &self.item_id)?;
        if self.delta == 0 {
            return Err("delta must be non-zero".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookAction {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl Payload for WebhookAction {
    fn validate(&self) -> Result<(), String> {
        require("url", &self.url)?;
        let url = reqwest::Url::parse(&self.url).map_err(|e| format!("invalid url: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported url scheme '{}'", url.scheme()));
        }
        Ok(())
    }
}
