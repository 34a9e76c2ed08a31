use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Order priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPriority {
    Routine,
    Urgent,
    Stat,
}

impl OrderPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPriority::Routine => "routine",
            OrderPriority::Urgent => "urgent",
            OrderPriority::Stat => "stat",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "urgent" => OrderPriority::Urgent,
            "stat" => OrderPriority::Stat,
            _ => OrderPriority::Routine,
        }
    }
}

/// A patient's request for one or more diagnostic tests.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub order_id: Uuid,
    pub lab_id: Uuid,
    pub code: String,
    pub patient_id: Uuid,
    pub priority: String,
    pub registered_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// One ordered test within an order. The price is a snapshot taken at order
/// time and never changes once an invoice references it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub order_item_id: Uuid,
    pub order_id: Uuid,
    pub lab_id: Uuid,
    pub test_id: Uuid,
    pub price: Decimal,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl OrderItem {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }
}

/// Input for creating an order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub patient_id: Uuid,
    pub test_ids: Vec<Uuid>,
    pub priority: OrderPriority,
    pub discount_amount: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
    pub rate_card_id: Option<Uuid>,
}
