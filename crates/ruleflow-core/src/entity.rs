//! Narrow views of the business-entity store that action handlers need.
//!
//! The engine never sees the full schema of inventory, purchasing or
//! notification delivery; it depends only on these operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::Severity;
use crate::error::Result;
use crate::types::OrgId;

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub unit_cost: f64,
    pub on_hand: i64,
}

pub trait Inventory: Send + Sync {
    /// Unit cost of a catalog item. `ItemNotFound` if the item is unknown.
    fn unit_cost(&self, org: &OrgId, item_id: &str) -> Result<f64>;

    /// Apply a signed delta and return the new on-hand quantity.
    /// `InsufficientStock` if the result would be negative.
    fn adjust_stock(&self, org: &OrgId, item_id: &str, delta: i64) -> Result<i64>;
}

// ---------------------------------------------------------------------------
// Purchasing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Draft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseDraft {
    pub id: Uuid,
    pub item_id: String,
    pub quantity: u32,
    pub unit_cost: f64,
    pub total: f64,
    pub supplier_id: String,
    pub location_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
}

pub trait Purchasing: Send + Sync {
    fn create_draft(&self, org: &OrgId, draft: &PurchaseDraft) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub severity: Severity,
    pub queued_at: DateTime<Utc>,
}

/// Outbox for notifications. Delivery is somebody else's job.
pub trait Notifier: Send + Sync {
    fn enqueue(&self, org: &OrgId, notification: &Notification) -> Result<()>;
}
