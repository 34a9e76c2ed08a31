use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Sample lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    Ordered,
    Collected,
    Received,
    InProcess,
    Completed,
    Stored,
    Disposed,
    Rejected,
}

impl SampleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleStatus::Ordered => "ordered",
            SampleStatus::Collected => "collected",
            SampleStatus::Received => "received",
            SampleStatus::InProcess => "in_process",
            SampleStatus::Completed => "completed",
            SampleStatus::Stored => "stored",
            SampleStatus::Disposed => "disposed",
            SampleStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ordered" => Some(SampleStatus::Ordered),
            "collected" => Some(SampleStatus::Collected),
            "received" => Some(SampleStatus::Received),
            "in_process" => Some(SampleStatus::InProcess),
            "completed" => Some(SampleStatus::Completed),
            "stored" => Some(SampleStatus::Stored),
            "disposed" => Some(SampleStatus::Disposed),
            "rejected" => Some(SampleStatus::Rejected),
            _ => None,
        }
    }

    /// Forward edges of the sample lifecycle. Terminal states accept no
    /// further transitions; rejection is reachable from any live state.
    pub fn can_transition_to(&self, next: SampleStatus) -> bool {
        use SampleStatus::*;
        match (self, next) {
            (Ordered, Collected) => true,
            (Collected, Received) => true,
            (Received, InProcess) => true,
            (InProcess, Completed) => true,
            (Completed, Stored) | (Completed, Disposed) => true,
            (Stored, Disposed) => true,
            (Ordered | Collected | Received | InProcess, Rejected) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SampleStatus::Disposed | SampleStatus::Rejected)
    }
}

/// Physical sample backing one order item (1:1). The barcode value is the
/// order item id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Sample {
    pub sample_id: Uuid,
    pub lab_id: Uuid,
    pub order_item_id: Uuid,
    pub code: String,
    pub barcode: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub collected_by: Option<Uuid>,
    pub collected_utc: Option<DateTime<Utc>>,
    pub received_utc: Option<DateTime<Utc>>,
    pub updated_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_fully_connected() {
        let path = [
            SampleStatus::Ordered,
            SampleStatus::Collected,
            SampleStatus::Received,
            SampleStatus::InProcess,
            SampleStatus::Completed,
            SampleStatus::Stored,
            SampleStatus::Disposed,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{:?} -> {:?} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn no_skipping_ahead() {
        assert!(!SampleStatus::Ordered.can_transition_to(SampleStatus::Received));
        assert!(!SampleStatus::Collected.can_transition_to(SampleStatus::Completed));
    }

    #[test]
    fn no_transitions_out_of_terminal_states() {
        assert!(!SampleStatus::Rejected.can_transition_to(SampleStatus::Collected));
        assert!(!SampleStatus::Disposed.can_transition_to(SampleStatus::Stored));
        assert!(SampleStatus::Rejected.is_terminal());
        assert!(SampleStatus::Disposed.is_terminal());
    }

    #[test]
    fn rejection_only_from_live_states() {
        assert!(SampleStatus::Ordered.can_transition_to(SampleStatus::Rejected));
        assert!(SampleStatus::InProcess.can_transition_to(SampleStatus::Rejected));
        assert!(!SampleStatus::Completed.can_transition_to(SampleStatus::Rejected));
        assert!(!SampleStatus::Stored.can_transition_to(SampleStatus::Rejected));
    }
}
