use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A diagnostic test offered by a lab.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestDefinition {
    pub test_id: Uuid,
    pub lab_id: Uuid,
    pub code: String,
    pub name: String,
    pub specimen_type: String,
    pub default_price: Decimal,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

/// One measurable parameter within a test definition.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestParameter {
    pub parameter_id: Uuid,
    pub test_id: Uuid,
    pub name: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub sort_order: i32,
}

/// Input for creating a test definition with its parameters.
#[derive(Debug, Clone)]
pub struct CreateTestDefinition {
    pub code: String,
    pub name: String,
    pub specimen_type: String,
    pub default_price: Decimal,
    pub parameters: Vec<NewTestParameter>,
}

#[derive(Debug, Clone)]
pub struct NewTestParameter {
    pub name: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
}

/// Optional per-lab price list overriding default test prices.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RateCard {
    pub rate_card_id: Uuid,
    pub lab_id: Uuid,
    pub name: String,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RateCardItem {
    pub rate_card_id: Uuid,
    pub test_id: Uuid,
    pub price: Decimal,
}

/// Input for creating a rate card with its override prices.
#[derive(Debug, Clone)]
pub struct CreateRateCard {
    pub name: String,
    pub items: Vec<(Uuid, Decimal)>,
}
