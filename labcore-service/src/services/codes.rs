//! Human-readable code allocation.
//!
//! Codes look like `ORD-20260806-0042`: a prefix, the day, and a per-lab,
//! per-day sequence number. The sequence comes from the `next_code_seq`
//! database function, a single atomic increment-and-return, so concurrent
//! allocations never observe the same value. The unique constraint on each
//! coded table stays as a backstop; callers treat a violation as retryable.

use chrono::NaiveDate;
use service_core::error::AppError;
use sqlx::PgExecutor;
use uuid::Uuid;

/// Code prefixes, one per coded entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePrefix {
    Patient,
    Order,
    Invoice,
}

impl CodePrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePrefix::Patient => "LC",
            CodePrefix::Order => "ORD",
            CodePrefix::Invoice => "INV",
        }
    }
}

/// Format a code from its parts: `{PREFIX}-{YYYYMMDD}-{NNNN}`.
pub fn format_code(prefix: CodePrefix, date: NaiveDate, seq: i32) -> String {
    format!(
        "{}-{}-{:04}",
        prefix.as_str(),
        date.format("%Y%m%d"),
        seq
    )
}

/// Allocate the next code for a lab/prefix/day. Callable inside a transaction
/// by passing the transaction's executor.
pub async fn allocate_code<'e, E>(
    executor: E,
    lab_id: Uuid,
    prefix: CodePrefix,
    date: NaiveDate,
) -> Result<String, AppError>
where
    E: PgExecutor<'e>,
{
    let seq: i32 = sqlx::query_scalar("SELECT next_code_seq($1, $2, $3)")
        .bind(lab_id)
        .bind(prefix.as_str())
        .bind(date)
        .fetch_one(executor)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to allocate code: {}", e)))?;

    Ok(format_code(prefix, date, seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn codes_are_zero_padded_to_four_digits() {
        assert_eq!(
            format_code(CodePrefix::Order, day(2026, 8, 6), 1),
            "ORD-20260806-0001"
        );
        assert_eq!(
            format_code(CodePrefix::Invoice, day(2026, 8, 6), 42),
            "INV-20260806-0042"
        );
        assert_eq!(
            format_code(CodePrefix::Patient, day(2026, 1, 2), 9999),
            "LC-20260102-9999"
        );
    }

    #[test]
    fn sequences_past_four_digits_widen_rather_than_truncate() {
        assert_eq!(
            format_code(CodePrefix::Order, day(2026, 8, 6), 12345),
            "ORD-20260806-12345"
        );
    }

    #[test]
    fn codes_for_a_day_sort_in_allocation_order() {
        let a = format_code(CodePrefix::Order, day(2026, 8, 6), 7);
        let b = format_code(CodePrefix::Order, day(2026, 8, 6), 8);
        assert!(a < b);
    }
}
