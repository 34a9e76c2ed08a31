use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTestDefinitionRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub specimen_type: String,
    pub default_price: Decimal,
    #[serde(default)]
    pub parameters: Vec<NewParameterRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewParameterRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 32))]
    pub unit: Option<String>,
    #[validate(length(max = 128))]
    pub reference_range: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRateCardRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub items: Vec<RateCardItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RateCardItemRequest {
    pub test_id: Uuid,
    pub price: Decimal,
}
