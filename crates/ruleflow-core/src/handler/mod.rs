//! Action handlers, one per action kind.
//!
//! A handler receives an already-parsed, already-validated payload and the
//! organization scope, and either succeeds with data or fails with a
//! message. The executor only sees [`ActionOutcome`]s; it knows nothing about
//! what a handler does.

pub mod notify;
pub mod purchase;
pub mod stock;
pub mod webhook;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::action::{Action, ActionKind};
use crate::entity::{Inventory, Notifier, Purchasing};
use crate::execution::{ActionOutcome, Delivery};
use crate::types::OrgId;

pub use notify::NotifyHandler;
pub use purchase::PurchaseRequestHandler;
pub use stock::AdjustStockHandler;
pub use webhook::WebhookHandler;

// ---------------------------------------------------------------------------
// HandlerOutcome / ActionFailure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutcome {
    pub delivery: Delivery,
    pub data: Value,
}

impl HandlerOutcome {
    pub fn applied(data: Value) -> Self {
        Self {
            delivery: Delivery::Applied,
            data,
        }
    }

    pub fn queued(data: Value) -> Self {
        Self {
            delivery: Delivery::Queued,
            data,
        }
    }

    pub fn simulated(data: Value) -> Self {
        Self {
            delivery: Delivery::Simulated,
            data,
        }
    }
}

/// A handler-reported failure. Not an engine error: it fails the run, not
/// the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure(pub String);

impl ActionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<crate::error::RuleflowError> for ActionFailure {
    fn from(e: crate::error::RuleflowError) -> Self {
        Self(e.to_string())
    }
}

pub type HandlerResult = std::result::Result<HandlerOutcome, ActionFailure>;

// ---------------------------------------------------------------------------
// ActionHandler
// ---------------------------------------------------------------------------

pub trait ActionHandler {
    type Payload;

    /// Perform the side effect.
    fn execute(&self, payload: &Self::Payload, org: &OrgId) -> HandlerResult;

    /// Describe what `execute` would do without touching anything.
    fn simulate(&self, payload: &Self::Payload) -> HandlerOutcome;
}

fn invoke<H: ActionHandler>(
    handler: &H,
    payload: &H::Payload,
    org: &OrgId,
    dry_run: bool,
) -> HandlerResult {
    if dry_run {
        Ok(handler.simulate(payload))
    } else {
        handler.execute(payload, org)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Routes each action to the handler for its kind.
pub struct Handlers {
    notify: NotifyHandler,
    purchase: PurchaseRequestHandler,
    stock: AdjustStockHandler,
    webhook: WebhookHandler,
}

impl Handlers {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        purchasing: Arc<dyn Purchasing>,
        notifier: Arc<dyn Notifier>,
        webhook_timeout: Duration,
    ) -> Self {
        Self {
            notify: NotifyHandler::new(notifier),
            purchase: PurchaseRequestHandler::new(inventory.clone(), purchasing),
            stock: AdjustStockHandler::new(inventory),
            webhook: WebhookHandler::new(webhook_timeout),
        }
    }

    /// Run (or simulate) one action. Payload problems and unknown kinds are
    /// reported as failed outcomes, never as errors.
    pub fn run(&self, action: &Action, org: &OrgId, dry_run: bool) -> ActionOutcome {
        let started = Instant::now();
        let result = match action.kind() {
            Err(reason) => Err(ActionFailure(format!(
                "invalid {} payload: {reason}",
                action.action_type
            ))),
            Ok(ActionKind::Unknown(name)) => {
                Err(ActionFailure(format!("unknown action type '{name}'")))
            }
            Ok(ActionKind::Notify(p)) => invoke(&self.notify, &p, org, dry_run),
            Ok(ActionKind::CreatePurchaseRequest(p)) => invoke(&self.purchase, &p, org, dry_run),
            Ok(ActionKind::AdjustStock(p)) => invoke(&self.stock, &p, org, dry_run),
            Ok(ActionKind::CallWebhook(p)) => invoke(&self.webhook, &p, org, dry_run),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => ActionOutcome {
                action_id: action.id,
                order: action.order,
                action_type: action.action_type.clone(),
                success: true,
                delivery: Some(outcome.delivery),
                result: Some(outcome.data),
                error: None,
                dry_run,
                duration_ms,
            },
            Err(failure) => ActionOutcome {
                action_id: action.id,
                order: action.order,
                action_type: action.action_type.clone(),
                success: false,
                delivery: None,
                result: None,
                error: Some(failure.0),
                dry_run,
                duration_ms,
            },
        }
    }
}
