use crate::models::{Invoice, Order, OrderItem, OrderPriority};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub patient_id: Uuid,
    #[validate(length(min = 1))]
    pub test_ids: Vec<Uuid>,
    #[serde(default = "default_priority")]
    pub priority: OrderPriority,
    pub discount_amount: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
    pub rate_card_id: Option<Uuid>,
}

fn default_priority() -> OrderPriority {
    OrderPriority::Routine
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub invoice: Invoice,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelRequest {
    #[validate(length(min = 1, max = 512))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemsRequest {
    #[validate(length(min = 1))]
    pub test_ids: Vec<Uuid>,
    pub rate_card_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AddItemsResponse {
    pub items: Vec<OrderItem>,
    pub invoice: Invoice,
}

#[derive(Debug, Serialize)]
pub struct OrderDetailResponse {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub invoices: Vec<Invoice>,
}
