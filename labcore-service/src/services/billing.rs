//! Billing ledger: order totals arithmetic and payment recording.

use crate::middleware::auth::AuthContext;
use crate::models::{actions, Action, AuditEntry, Invoice, InvoiceStatus, Payment, RecordPayment};
use crate::services::audit::AuditService;
use crate::services::database::Database;
use crate::services::metrics::{DB_QUERY_DURATION, PAYMENTS_TOTAL};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

/// GST applied to the discounted subtotal.
pub const GST_RATE: Decimal = Decimal::from_parts(18, 0, 0, false, 2);

/// Monetary rounding: two decimals, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Computed totals for one invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
}

/// Compute invoice totals from a subtotal and the requested discount.
///
/// A fixed discount amount takes priority over a percentage when both are
/// supplied. The discount never exceeds the subtotal. Tax is GST on the
/// discounted subtotal.
pub fn compute_order_totals(
    subtotal: Decimal,
    discount_amount: Option<Decimal>,
    discount_percent: Option<Decimal>,
) -> Result<OrderTotals, AppError> {
    let amount = discount_amount.unwrap_or(Decimal::ZERO);
    let percent = discount_percent.unwrap_or(Decimal::ZERO);

    if amount < Decimal::ZERO || percent < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Discount must not be negative"
        )));
    }

    let discount_total = if amount > Decimal::ZERO {
        amount.min(subtotal)
    } else if percent > Decimal::ZERO {
        round_money(subtotal * percent / Decimal::ONE_HUNDRED).min(subtotal)
    } else {
        Decimal::ZERO
    };

    let tax_total = round_money((subtotal - discount_total) * GST_RATE);
    let grand_total = round_money(subtotal - discount_total + tax_total);

    Ok(OrderTotals {
        subtotal,
        discount_total,
        tax_total,
        grand_total,
    })
}

#[derive(Clone)]
pub struct BillingService {
    db: Database,
    audit: AuditService,
}

impl BillingService {
    pub fn new(db: Database, audit: AuditService) -> Self {
        Self { db, audit }
    }

    /// Record a payment against an invoice and recompute its paid/due totals.
    ///
    /// The payment row is append-only; there is no edit, void, or refund
    /// path. The amount must not exceed the current amount due, and a
    /// rejected payment leaves the invoice untouched.
    #[instrument(skip(self, ctx, input), fields(lab_id = %ctx.lab_id, invoice_id = %input.invoice_id))]
    pub async fn record_payment(
        &self,
        ctx: &AuthContext,
        input: &RecordPayment,
    ) -> Result<(Payment, Invoice), AppError> {
        ctx.require(Action::RecordPayment)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        if input.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be positive"
            )));
        }

        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Lock the invoice row so concurrent payments serialize on it.
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, lab_id, order_id, code, subtotal, discount_total, tax_total,
                grand_total, amount_paid, amount_due, status, supplementary, created_utc
            FROM invoices
            WHERE lab_id = $1 AND invoice_id = $2
            FOR UPDATE
            "#,
        )
        .bind(ctx.lab_id)
        .bind(input.invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        if input.amount > invoice.amount_due {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount {} exceeds amount due {}",
                input.amount,
                invoice.amount_due
            )));
        }

        let payment_id = Uuid::new_v4();
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (payment_id, lab_id, invoice_id, amount, mode, reference, notes, received_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING payment_id, lab_id, invoice_id, amount, mode, reference, notes, received_by, created_utc
            "#,
        )
        .bind(payment_id)
        .bind(ctx.lab_id)
        .bind(input.invoice_id)
        .bind(input.amount)
        .bind(input.mode.as_str())
        .bind(&input.reference)
        .bind(&input.notes)
        .bind(ctx.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record payment: {}", e)))?;

        let amount_paid = round_money(invoice.amount_paid + input.amount);
        let amount_due = round_money(invoice.grand_total - amount_paid);
        let status = if amount_due <= Decimal::ZERO {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Partial
        };

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET amount_paid = $3,
                amount_due = $4,
                status = $5
            WHERE lab_id = $1 AND invoice_id = $2
            RETURNING invoice_id, lab_id, order_id, code, subtotal, discount_total, tax_total,
                grand_total, amount_paid, amount_due, status, supplementary, created_utc
            "#,
        )
        .bind(ctx.lab_id)
        .bind(input.invoice_id)
        .bind(amount_paid)
        .bind(amount_due)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        PAYMENTS_TOTAL
            .with_label_values(&[input.mode.as_str()])
            .inc();

        info!(
            payment_id = %payment.payment_id,
            invoice_code = %invoice.code,
            amount = %payment.amount,
            amount_due = %invoice.amount_due,
            "Payment recorded"
        );

        self.audit.log_async(
            AuditEntry::new(
                ctx.lab_id,
                ctx.user_id,
                actions::PAYMENT_RECORD,
                "invoice",
                invoice.invoice_id,
            )
            .with_new(json!({
                "amount": payment.amount,
                "mode": payment.mode,
                "amount_paid": invoice.amount_paid,
                "amount_due": invoice.amount_due,
                "status": invoice.status,
            })),
        );

        Ok((payment, invoice))
    }

    /// Get an invoice, checking tenant scope.
    pub async fn get_invoice(&self, ctx: &AuthContext, invoice_id: Uuid) -> Result<Invoice, AppError> {
        self.db
            .get_invoice(ctx.lab_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
    }

    /// List payments recorded against an invoice.
    pub async fn list_payments(
        &self,
        ctx: &AuthContext,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        // 404 on a cross-tenant or unknown invoice before listing.
        self.get_invoice(ctx, invoice_id).await?;
        self.db.get_payments(ctx.lab_id, invoice_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn totals_without_discount_match_the_reference_scenario() {
        // Two tests at 150 and 80: subtotal 230, tax 41.40, grand total 271.40.
        let totals = compute_order_totals(dec("230"), None, None).unwrap();
        assert_eq!(totals.subtotal, dec("230"));
        assert_eq!(totals.discount_total, Decimal::ZERO);
        assert_eq!(totals.tax_total, dec("41.40"));
        assert_eq!(totals.grand_total, dec("271.40"));
    }

    #[test]
    fn fixed_amount_wins_over_percentage() {
        let totals =
            compute_order_totals(dec("1000"), Some(dec("100")), Some(dec("50"))).unwrap();
        assert_eq!(totals.discount_total, dec("100"));
    }

    #[test]
    fn discount_amount_is_clamped_to_subtotal() {
        let totals = compute_order_totals(dec("200"), Some(dec("500")), None).unwrap();
        assert_eq!(totals.discount_total, dec("200"));
        assert_eq!(totals.tax_total, Decimal::ZERO);
        assert_eq!(totals.grand_total, Decimal::ZERO);
    }

    #[test]
    fn percentage_discount_rounds_to_two_decimals() {
        // 12.5% of 333 = 41.625 -> 41.63
        let totals = compute_order_totals(dec("333"), None, Some(dec("12.5"))).unwrap();
        assert_eq!(totals.discount_total, dec("41.63"));
        // tax = 18% of 291.37 = 52.4466 -> 52.45
        assert_eq!(totals.tax_total, dec("52.45"));
        assert_eq!(totals.grand_total, dec("343.82"));
    }

    #[test]
    fn grand_total_identity_holds() {
        for (subtotal, amount, percent) in [
            ("230", None, None),
            ("999.99", Some("50"), None),
            ("120.50", None, Some("10")),
            ("75", Some("75"), None),
        ] {
            let totals = compute_order_totals(
                dec(subtotal),
                amount.map(dec),
                percent.map(dec),
            )
            .unwrap();
            assert_eq!(
                totals.grand_total,
                round_money(totals.subtotal - totals.discount_total + totals.tax_total)
            );
        }
    }

    #[test]
    fn negative_discounts_are_rejected() {
        assert!(compute_order_totals(dec("100"), Some(dec("-1")), None).is_err());
        assert!(compute_order_totals(dec("100"), None, Some(dec("-5"))).is_err());
    }

    #[test]
    fn gst_rate_is_eighteen_percent() {
        assert_eq!(GST_RATE, dec("0.18"));
    }
}
