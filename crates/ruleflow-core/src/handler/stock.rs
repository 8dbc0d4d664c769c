use std::sync::Arc;

use serde_json::json;

use super::{ActionHandler, HandlerOutcome, HandlerResult};
use crate::action::AdjustStockAction;
use crate::entity::Inventory;
use crate::types::OrgId;

pub struct AdjustStockHandler {
    inventory: Arc<dyn Inventory>,
}

impl AdjustStockHandler {
    pub fn new(inventory: Arc<dyn Inventory>) -> Self {
        Self { inventory }
    }
}

impl ActionHandler for AdjustStockHandler {
    type Payload = AdjustStockAction;

    fn execute(&self, payload: &AdjustStockAction, org: &OrgId) -> HandlerResult {
        let on_hand = self
            .inventory
            .adjust_stock(org, &payload.item_id, payload.delta)?;
        Ok(HandlerOutcome::applied(json!({
            "item_id": payload.item_id,
            "delta": payload.delta,
            "on_hand": on_hand,
        })))
    }

    fn simulate(&self, payload: &AdjustStockAction) -> HandlerOutcome {
        HandlerOutcome::simulated(json!({
            "dry_run": true,
            "item_id": payload.item_id,
            "delta": payload.delta,
        }))
    }
}
