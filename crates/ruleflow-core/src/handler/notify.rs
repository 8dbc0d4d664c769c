use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{ActionHandler, HandlerOutcome, HandlerResult};
use crate::action::NotifyAction;
use crate::entity::{Notification, Notifier};
use crate::types::OrgId;

/// Queues a notification on the outbox. Delivery is not confirmed here, so
/// the outcome is `queued`, never `applied`.
pub struct NotifyHandler {
    notifier: Arc<dyn Notifier>,
}

impl NotifyHandler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl ActionHandler for NotifyHandler {
    type Payload = NotifyAction;

    fn execute(&self, payload: &NotifyAction, org: &OrgId) -> HandlerResult {
        let notification = Notification {
            id: Uuid::new_v4(),
            target: payload.target.clone(),
            title: payload.title.clone(),
            message: payload.message.clone(),
            severity: payload.severity,
            queued_at: Utc::now(),
        };
        self.notifier.enqueue(org, &notification)?;
        Ok(HandlerOutcome::queued(json!({
            "notification_id": notification.id,
            "target": notification.target,
        })))
    }

    fn simulate(&self, payload: &NotifyAction) -> HandlerOutcome {
        HandlerOutcome::simulated(json!({
            "dry_run": true,
            "would_notify": payload.target,
        }))
    }
}
