use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{ActionHandler, HandlerOutcome, HandlerResult};
use crate::action::PurchaseRequestAction;
use crate::entity::{Inventory, PurchaseDraft, PurchaseStatus, Purchasing};
use crate::types::OrgId;

/// Creates a draft purchase record priced from the catalog.
pub struct PurchaseRequestHandler {
    inventory: Arc<dyn Inventory>,
    purchasing: Arc<dyn Purchasing>,
}

impl PurchaseRequestHandler {
    pub fn new(inventory: Arc<dyn Inventory>, purchasing: Arc<dyn Purchasing>) -> Self {
        Self {
            inventory,
            purchasing,
        }
    }
}

/// `quantity × unit_cost`, rounded to cents.
pub fn line_total(quantity: u32, unit_cost: f64) -> f64 {
    (f64::from(quantity) * unit_cost * 100.0).round() / 100.0
}

impl ActionHandler for PurchaseRequestHandler {
    type Payload = PurchaseRequestAction;

    fn execute(&self, payload: &PurchaseRequestAction, org: &OrgId) -> HandlerResult {
        let unit_cost = match payload.unit_cost {
            Some(cost) => cost,
            None => self.inventory.unit_cost(org, &payload.item_id)?,
        };
        let draft = PurchaseDraft {
            id: Uuid::new_v4(),
            item_id: payload.item_id.clone(),
            quantity: payload.quantity,
            unit_cost,
            total: line_total(payload.quantity, unit_cost),
            supplier_id: payload.supplier_id.clone(),
            location_id: payload.location_id.clone(),
            note: payload.note.clone(),
            status: PurchaseStatus::Draft,
            created_at: Utc::now(),
        };
        self.purchasing.create_draft(org, &draft)?;
        Ok(HandlerOutcome::applied(json!({
            "purchase_id": draft.id,
            "total": draft.total,
        })))
    }

    fn simulate(&self, payload: &PurchaseRequestAction) -> HandlerOutcome {
        HandlerOutcome::simulated(json!({
            "dry_run": true,
            "item_id": payload.item_id,
            "quantity": payload.quantity,
            "supplier_id": payload.supplier_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn payload(unit_cost: Option<f64>) -> PurchaseRequestAction {
        PurchaseRequestAction {
            item_id: "X".into(),
            quantity: 3,
            supplier_id: "S-1".into(),
            location_id: "WH-1".into(),
            unit_cost,
            note: None,
        }
    }

    #[test]
    fn prices_from_catalog_and_records_draft() {
        let store = Arc::new(MemoryStore::new());
        let org = OrgId::new("acme").unwrap();
        store.put_item(&org, "X", 2.35, 0);
        let handler = PurchaseRequestHandler::new(store.clone(), store.clone());

        let outcome = handler.execute(&payload(None), &org).unwrap();
        assert_eq!(outcome.data["total"], 7.05);

        let drafts = store.purchases(&org);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].status, PurchaseStatus::Draft);
        assert_eq!(outcome.data["purchase_id"], json!(drafts[0].id));
    }

    #[test]
    fn override_skips_catalog_lookup() {
        let store = Arc::new(MemoryStore::new());
        let org = OrgId::new("acme").unwrap();
        let handler = PurchaseRequestHandler::new(store.clone(), store.clone());
        let outcome = handler.execute(&payload(Some(10.0)), &org).unwrap();
        assert_eq!(outcome.data["total"], 30.0);
    }

    #[test]
    fn unknown_item_without_override_fails() {
        let store = Arc::new(MemoryStore::new());
        let org = OrgId::new("acme").unwrap();
        let handler = PurchaseRequestHandler::new(store.clone(), store.clone());
        assert!(handler.execute(&payload(None), &org).is_err());
        assert!(store.purchases(&org).is_empty());
    }

    #[test]
    fn line_total_rounds_to_cents() {
        assert_eq!(line_total(3, 0.1), 0.3);
        assert_eq!(line_total(4, 2.499), 10.0);
    }
}
