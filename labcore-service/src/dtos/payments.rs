use crate::models::{Invoice, Payment, PaymentMode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub mode: PaymentMode,
    #[validate(length(max = 128))]
    pub reference: Option<String>,
    #[validate(length(max = 512))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordPaymentResponse {
    pub payment: Payment,
    pub invoice: Invoice,
}

#[derive(Debug, Serialize)]
pub struct InvoiceDetailResponse {
    pub invoice: Invoice,
    pub payments: Vec<Payment>,
}
