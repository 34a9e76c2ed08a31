use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status, derived from paid/due amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Issued,
    Partial,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::Partial => "partial",
            InvoiceStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partial" => InvoiceStatus::Partial,
            "paid" => InvoiceStatus::Paid,
            _ => InvoiceStatus::Issued,
        }
    }
}

/// Invoice for an order, created atomically with it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub lab_id: Uuid,
    pub order_id: Uuid,
    pub code: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub status: String,
    pub supplementary: bool,
    pub created_utc: DateTime<Utc>,
}

/// Payment mode accepted at the front desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Cash,
    Card,
    Upi,
    BankTransfer,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::Card => "card",
            PaymentMode::Upi => "upi",
            PaymentMode::BankTransfer => "bank_transfer",
        }
    }
}

/// Append-only payment row; never mutated or deleted once created.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub lab_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub mode: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub received_by: Uuid,
    pub created_utc: DateTime<Utc>,
}

/// Input for recording a payment against an invoice.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub mode: PaymentMode,
    pub reference: Option<String>,
    pub notes: Option<String>,
}
