use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Result entry/review/authorisation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    Entered,
    Reviewed,
    Authorised,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Entered => "entered",
            ResultStatus::Reviewed => "reviewed",
            ResultStatus::Authorised => "authorised",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ResultStatus::Pending),
            "entered" => Some(ResultStatus::Entered),
            "reviewed" => Some(ResultStatus::Reviewed),
            "authorised" => Some(ResultStatus::Authorised),
            _ => None,
        }
    }

    /// Whether values may be entered at this status. Re-entry over an
    /// already-entered result is allowed (idempotent resubmission).
    pub fn accepts_values(&self) -> bool {
        matches!(self, ResultStatus::Pending | ResultStatus::Entered)
    }

    /// Explicit status transitions requested through the review workflow.
    /// Values entry is handled separately by `accepts_values`; amendment
    /// reverts authorised results to reviewed as a system action.
    pub fn can_transition_to(&self, next: ResultStatus) -> bool {
        use ResultStatus::*;
        match (self, next) {
            // Reviewing requires values to have been entered first.
            (Entered, Reviewed) => true,
            // Authorisation may skip the review step but never the entry step.
            (Entered, Authorised) | (Reviewed, Authorised) => true,
            // An entered result can be pushed back for re-entry.
            (Entered, Pending) => true,
            _ => false,
        }
    }
}

/// The value-entry record for one order item.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LabResult {
    pub result_id: Uuid,
    pub lab_id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub status: String,
    pub notes: Option<String>,
    pub entered_by: Option<Uuid>,
    pub entered_utc: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_utc: Option<DateTime<Utc>>,
    pub authorised_by: Option<Uuid>,
    pub authorised_utc: Option<DateTime<Utc>>,
}

/// One stored value per (result, test parameter) pair.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResultValue {
    pub result_id: Uuid,
    pub parameter_id: Uuid,
    pub value: String,
    pub numeric_value: Option<Decimal>,
    pub unit: Option<String>,
    pub updated_utc: DateTime<Utc>,
}

/// Input value for one parameter during result entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterValue {
    pub parameter_id: Uuid,
    pub value: String,
    pub numeric_value: Option<Decimal>,
    pub unit: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_only_enterable_before_review() {
        assert!(ResultStatus::Pending.accepts_values());
        assert!(ResultStatus::Entered.accepts_values());
        assert!(!ResultStatus::Reviewed.accepts_values());
        assert!(!ResultStatus::Authorised.accepts_values());
    }

    #[test]
    fn authorisation_never_skips_entry() {
        assert!(!ResultStatus::Pending.can_transition_to(ResultStatus::Authorised));
        assert!(ResultStatus::Entered.can_transition_to(ResultStatus::Authorised));
        assert!(ResultStatus::Reviewed.can_transition_to(ResultStatus::Authorised));
    }

    #[test]
    fn review_requires_entered_values() {
        assert!(!ResultStatus::Pending.can_transition_to(ResultStatus::Reviewed));
        assert!(ResultStatus::Entered.can_transition_to(ResultStatus::Reviewed));
    }

    #[test]
    fn only_entered_results_revert_to_pending() {
        assert!(ResultStatus::Entered.can_transition_to(ResultStatus::Pending));
        assert!(!ResultStatus::Reviewed.can_transition_to(ResultStatus::Pending));
        assert!(!ResultStatus::Authorised.can_transition_to(ResultStatus::Pending));
    }

    #[test]
    fn authorised_is_terminal_for_the_review_workflow() {
        for next in [
            ResultStatus::Pending,
            ResultStatus::Entered,
            ResultStatus::Reviewed,
            ResultStatus::Authorised,
        ] {
            assert!(!ResultStatus::Authorised.can_transition_to(next));
        }
    }
}
