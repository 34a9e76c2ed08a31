//! Pricing resolver.
//!
//! Resolves a unit price per test: the rate card's override wins when one is
//! supplied, otherwise the test definition's default price applies. A rate
//! card id that does not resolve within the lab is an error rather than an
//! empty override map.

use crate::models::TestDefinition;
use crate::services::database::Database;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::BTreeMap;
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct PricingResolver {
    db: Database,
}

impl PricingResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Resolve the unit price for each of the given tests.
    #[instrument(skip(self, tests), fields(lab_id = %lab_id, rate_card_id = ?rate_card_id))]
    pub async fn resolve_prices(
        &self,
        lab_id: Uuid,
        rate_card_id: Option<Uuid>,
        tests: &[TestDefinition],
    ) -> Result<BTreeMap<Uuid, Decimal>, AppError> {
        let overrides = match rate_card_id {
            Some(id) => {
                let rate_card = self
                    .db
                    .get_rate_card(lab_id, id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Rate card not found")))?;

                self.db
                    .get_rate_card_items(rate_card.rate_card_id)
                    .await?
                    .into_iter()
                    .map(|item| (item.test_id, item.price))
                    .collect()
            }
            None => BTreeMap::new(),
        };

        Ok(resolve_against_overrides(tests, &overrides))
    }
}

/// Pure price resolution: override wins, default price otherwise.
fn resolve_against_overrides(
    tests: &[TestDefinition],
    overrides: &BTreeMap<Uuid, Decimal>,
) -> BTreeMap<Uuid, Decimal> {
    tests
        .iter()
        .map(|test| {
            let price = overrides
                .get(&test.test_id)
                .copied()
                .unwrap_or(test.default_price);
            (test.test_id, price)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_definition(price: Decimal) -> TestDefinition {
        TestDefinition {
            test_id: Uuid::new_v4(),
            lab_id: Uuid::new_v4(),
            code: "CBC".to_string(),
            name: "Complete Blood Count".to_string(),
            specimen_type: "whole_blood".to_string(),
            default_price: price,
            active: true,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn default_price_applies_without_overrides() {
        let tests = vec![test_definition(Decimal::new(15000, 2))];
        let prices = resolve_against_overrides(&tests, &BTreeMap::new());
        assert_eq!(prices[&tests[0].test_id], Decimal::new(15000, 2));
    }

    #[test]
    fn override_wins_over_default_price() {
        let tests = vec![test_definition(Decimal::new(15000, 2))];
        let mut overrides = BTreeMap::new();
        overrides.insert(tests[0].test_id, Decimal::new(12000, 2));
        let prices = resolve_against_overrides(&tests, &overrides);
        assert_eq!(prices[&tests[0].test_id], Decimal::new(12000, 2));
    }

    #[test]
    fn tests_absent_from_the_rate_card_fall_back() {
        let discounted = test_definition(Decimal::new(15000, 2));
        let full_price = test_definition(Decimal::new(8000, 2));
        let mut overrides = BTreeMap::new();
        overrides.insert(discounted.test_id, Decimal::new(10000, 2));

        let tests = vec![discounted.clone(), full_price.clone()];
        let prices = resolve_against_overrides(&tests, &overrides);

        assert_eq!(prices[&discounted.test_id], Decimal::new(10000, 2));
        assert_eq!(prices[&full_price.test_id], Decimal::new(8000, 2));
    }
}
