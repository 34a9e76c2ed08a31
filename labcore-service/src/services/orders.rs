//! Order orchestrator.
//!
//! Creates the full order graph (order, items, samples, pending results) and
//! the invoice in one transaction; a failure anywhere rolls back everything.
//! Cancellation and post-creation item additions are separate transactions
//! guarded by result status.

use crate::middleware::auth::AuthContext;
use crate::models::{
    actions, Action, AuditEntry, CreateOrder, Invoice, Order, OrderItem, ResultStatus,
    SampleStatus, TestDefinition,
};
use crate::services::audit::AuditService;
use crate::services::billing::{compute_order_totals, OrderTotals};
use crate::services::codes::{allocate_code, CodePrefix};
use crate::services::database::Database;
use crate::services::metrics::{DB_QUERY_DURATION, ORDERS_TOTAL};
use crate::services::pricing::PricingResolver;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use service_core::error::AppError;
use sqlx::{PgConnection, Postgres, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Bounded retries for the unique-code backstop. The sequence allocator is
/// atomic, so a collision means an out-of-band insert; retrying re-allocates.
const CODE_RETRY_ATTEMPTS: u32 = 3;

/// The order graph returned from creation.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub invoice: Invoice,
}

#[derive(Clone)]
pub struct OrderService {
    db: Database,
    audit: AuditService,
    pricing: PricingResolver,
}

impl OrderService {
    pub fn new(db: Database, audit: AuditService, pricing: PricingResolver) -> Self {
        Self { db, audit, pricing }
    }

    /// Create an order with its items, samples, pending results, and invoice.
    #[instrument(skip(self, ctx, input), fields(lab_id = %ctx.lab_id, patient_id = %input.patient_id))]
    pub async fn create_order(
        &self,
        ctx: &AuthContext,
        input: &CreateOrder,
    ) -> Result<CreatedOrder, AppError> {
        ctx.require(Action::CreateOrder)?;

        if input.test_ids.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "An order requires at least one test"
            )));
        }

        let patient = self
            .db
            .get_patient(ctx.lab_id, input.patient_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Patient not found")))?;

        let tests = self.load_tests_strict(ctx.lab_id, &input.test_ids).await?;
        let prices = self
            .pricing
            .resolve_prices(ctx.lab_id, input.rate_card_id, &tests)
            .await?;

        let subtotal: Decimal = input.test_ids.iter().map(|id| prices[id]).sum();
        let totals =
            compute_order_totals(subtotal, input.discount_amount, input.discount_percent)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_order"])
            .start_timer();

        let mut attempt = 0;
        let created = loop {
            attempt += 1;
            match self.try_create_order_graph(ctx, input, &prices, &totals).await {
                Ok(created) => break created,
                Err(CreateOrderError::CodeCollision) if attempt < CODE_RETRY_ATTEMPTS => {
                    warn!(attempt = attempt, "Order code collision, retrying allocation");
                    continue;
                }
                Err(CreateOrderError::CodeCollision) => {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Could not allocate a unique order code"
                    )));
                }
                Err(CreateOrderError::Other(e)) => return Err(e),
            }
        };

        timer.observe_duration();
        ORDERS_TOTAL
            .with_label_values(&[input.priority.as_str()])
            .inc();

        info!(
            order_id = %created.order.order_id,
            order_code = %created.order.code,
            invoice_code = %created.invoice.code,
            patient_code = %patient.code,
            items = created.items.len(),
            grand_total = %created.invoice.grand_total,
            "Order created"
        );

        self.audit.log_async(
            AuditEntry::new(
                ctx.lab_id,
                ctx.user_id,
                actions::ORDER_CREATE,
                "order",
                created.order.order_id,
            )
            .with_new(json!({
                "code": created.order.code,
                "patient_id": created.order.patient_id,
                "tests": input.test_ids,
                "subtotal": created.invoice.subtotal,
                "discount_total": created.invoice.discount_total,
                "tax_total": created.invoice.tax_total,
                "grand_total": created.invoice.grand_total,
            })),
        );

        Ok(created)
    }

    /// Load the requested tests, failing unless every id resolves to an
    /// active test of this lab. The count match is strict against the
    /// request list, so duplicate ids fail too.
    async fn load_tests_strict(
        &self,
        lab_id: Uuid,
        test_ids: &[Uuid],
    ) -> Result<Vec<TestDefinition>, AppError> {
        let unique: Vec<Uuid> = test_ids
            .iter()
            .copied()
            .collect::<BTreeSet<Uuid>>()
            .into_iter()
            .collect();
        let tests = self.db.get_test_definitions(lab_id, &unique, true).await?;

        if tests.len() != test_ids.len() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "One or more tests not found"
            )));
        }

        Ok(tests)
    }

    async fn try_create_order_graph(
        &self,
        ctx: &AuthContext,
        input: &CreateOrder,
        prices: &BTreeMap<Uuid, Decimal>,
        totals: &OrderTotals,
    ) -> Result<CreatedOrder, CreateOrderError> {
        let today = Utc::now().date_naive();

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to begin transaction: {}", e))
            .map_err(db_err)?;

        let order_code = allocate_code(&mut *tx, ctx.lab_id, CodePrefix::Order, today)
            .await
            .map_err(CreateOrderError::Other)?;

        let order_id = Uuid::new_v4();
        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (order_id, lab_id, code, patient_id, priority, registered_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING order_id, lab_id, code, patient_id, priority, registered_by, deleted_at, created_utc
            "#,
        )
        .bind(order_id)
        .bind(ctx.lab_id)
        .bind(&order_code)
        .bind(input.patient_id)
        .bind(input.priority.as_str())
        .bind(ctx.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(unique_or_db)?;

        let mut items = Vec::with_capacity(input.test_ids.len());
        for (index, test_id) in input.test_ids.iter().enumerate() {
            let item = insert_item_graph(
                &mut tx,
                ctx.lab_id,
                order_id,
                &order_code,
                index,
                *test_id,
                prices[test_id],
            )
            .await
            .map_err(CreateOrderError::Other)?;
            items.push(item);
        }

        let invoice = insert_invoice(
            &mut tx,
            ctx.lab_id,
            order_id,
            totals,
            false,
            today,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to commit transaction: {}", e))
            .map_err(db_err)?;

        Ok(CreatedOrder {
            order,
            items,
            invoice,
        })
    }

    /// Cancel every item of an order that does not have an authorised result.
    /// Already-cancelled items are skipped; the call is idempotent.
    #[instrument(skip(self, ctx), fields(lab_id = %ctx.lab_id, order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        ctx: &AuthContext,
        order_id: Uuid,
        reason: &str,
    ) -> Result<Vec<OrderItem>, AppError> {
        ctx.require(Action::CancelOrder)?;

        let order = self
            .db
            .get_order(ctx.lab_id, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

        let items = self.db.get_order_items(ctx.lab_id, order_id).await?;
        let results = self.db.get_results_for_order(ctx.lab_id, order_id).await?;
        let authorised: BTreeSet<Uuid> = results
            .iter()
            .filter(|r| ResultStatus::parse(&r.status) == Some(ResultStatus::Authorised))
            .map(|r| r.order_item_id)
            .collect();

        let mut cancelled = Vec::new();
        for item in items {
            if item.is_cancelled() || authorised.contains(&item.order_item_id) {
                continue;
            }
            let updated = self
                .mark_item_cancelled(ctx.lab_id, item.order_item_id, reason)
                .await?;

            self.audit.log_async(
                AuditEntry::new(
                    ctx.lab_id,
                    ctx.user_id,
                    actions::ORDER_ITEM_CANCEL,
                    "order_item",
                    updated.order_item_id,
                )
                .with_new(json!({ "order_code": order.code, "reason": reason })),
            );
            cancelled.push(updated);
        }

        info!(order_code = %order.code, cancelled = cancelled.len(), "Order cancelled");

        Ok(cancelled)
    }

    /// Cancel a single order item. Fails when the item is already cancelled
    /// or its result has been authorised.
    #[instrument(skip(self, ctx), fields(lab_id = %ctx.lab_id, order_item_id = %order_item_id))]
    pub async fn cancel_order_item(
        &self,
        ctx: &AuthContext,
        order_item_id: Uuid,
        reason: &str,
    ) -> Result<OrderItem, AppError> {
        ctx.require(Action::CancelOrder)?;

        let item = self
            .db
            .get_order_item(ctx.lab_id, order_item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order item not found")))?;

        if item.is_cancelled() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Order item is already cancelled"
            )));
        }

        if let Some(result) = self
            .db
            .get_result_for_order_item(ctx.lab_id, order_item_id)
            .await?
        {
            if ResultStatus::parse(&result.status) == Some(ResultStatus::Authorised) {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Cannot cancel an item with an authorised result"
                )));
            }
        }

        let updated = self
            .mark_item_cancelled(ctx.lab_id, order_item_id, reason)
            .await?;

        self.audit.log_async(
            AuditEntry::new(
                ctx.lab_id,
                ctx.user_id,
                actions::ORDER_ITEM_CANCEL,
                "order_item",
                updated.order_item_id,
            )
            .with_new(json!({ "reason": reason })),
        );

        Ok(updated)
    }

    /// Add tests to an existing order. The added items get their own samples
    /// and pending results plus a supplementary invoice; the original invoice
    /// is never touched.
    #[instrument(skip(self, ctx, test_ids), fields(lab_id = %ctx.lab_id, order_id = %order_id))]
    pub async fn add_items_to_order(
        &self,
        ctx: &AuthContext,
        order_id: Uuid,
        test_ids: &[Uuid],
        rate_card_id: Option<Uuid>,
    ) -> Result<(Vec<OrderItem>, Invoice), AppError> {
        ctx.require(Action::CreateOrder)?;

        if test_ids.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "At least one test is required"
            )));
        }

        let order = self
            .db
            .get_order(ctx.lab_id, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

        let tests = self.load_tests_strict(ctx.lab_id, test_ids).await?;
        let prices = self
            .pricing
            .resolve_prices(ctx.lab_id, rate_card_id, &tests)
            .await?;

        let existing = self.db.get_order_items(ctx.lab_id, order_id).await?;
        let subtotal: Decimal = test_ids.iter().map(|id| prices[id]).sum();
        let totals = compute_order_totals(subtotal, None, None)?;

        let today = Utc::now().date_naive();
        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let mut items = Vec::with_capacity(test_ids.len());
        for (offset, test_id) in test_ids.iter().enumerate() {
            let item = insert_item_graph(
                &mut tx,
                ctx.lab_id,
                order_id,
                &order.code,
                existing.len() + offset,
                *test_id,
                prices[test_id],
            )
            .await?;
            items.push(item);
        }

        let invoice = insert_invoice(&mut tx, ctx.lab_id, order_id, &totals, true, today)
            .await
            .map_err(|e| match e {
                CreateOrderError::CodeCollision => {
                    AppError::Conflict(anyhow::anyhow!("Could not allocate a unique invoice code"))
                }
                CreateOrderError::Other(e) => e,
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        info!(
            order_code = %order.code,
            added = items.len(),
            supplementary_invoice = %invoice.code,
            "Items added to order"
        );

        self.audit.log_async(
            AuditEntry::new(
                ctx.lab_id,
                ctx.user_id,
                actions::ORDER_ITEMS_ADD,
                "order",
                order_id,
            )
            .with_new(json!({
                "tests": test_ids,
                "supplementary_invoice": invoice.code,
                "grand_total": invoice.grand_total,
            })),
        );

        Ok((items, invoice))
    }

    async fn mark_item_cancelled(
        &self,
        lab_id: Uuid,
        order_item_id: Uuid,
        reason: &str,
    ) -> Result<OrderItem, AppError> {
        let item = sqlx::query_as::<_, OrderItem>(
            r#"
            UPDATE order_items
            SET cancelled_at = NOW(),
                cancel_reason = $3
            WHERE lab_id = $1 AND order_item_id = $2 AND cancelled_at IS NULL
            RETURNING order_item_id, order_id, lab_id, test_id, price, cancelled_at, cancel_reason, created_utc
            "#,
        )
        .bind(lab_id)
        .bind(order_item_id)
        .bind(reason)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel item: {}", e)))?
        .ok_or_else(|| AppError::Conflict(anyhow::anyhow!("Order item was cancelled concurrently")))?;

        Ok(item)
    }
}

enum CreateOrderError {
    /// Unique violation on an allocated code; retryable.
    CodeCollision,
    Other(AppError),
}

fn db_err(e: anyhow::Error) -> CreateOrderError {
    CreateOrderError::Other(AppError::DatabaseError(e))
}

fn unique_or_db(e: sqlx::Error) -> CreateOrderError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            CreateOrderError::CodeCollision
        }
        _ => CreateOrderError::Other(AppError::DatabaseError(anyhow::anyhow!(
            "Failed to insert: {}",
            e
        ))),
    }
}

/// Insert one order item with its sample and pending result.
async fn insert_item_graph(
    tx: &mut Transaction<'_, Postgres>,
    lab_id: Uuid,
    order_id: Uuid,
    order_code: &str,
    index: usize,
    test_id: Uuid,
    price: Decimal,
) -> Result<OrderItem, AppError> {
    let conn: &mut PgConnection = tx;

    let order_item_id = Uuid::new_v4();
    let item = sqlx::query_as::<_, OrderItem>(
        r#"
        INSERT INTO order_items (order_item_id, order_id, lab_id, test_id, price)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING order_item_id, order_id, lab_id, test_id, price, cancelled_at, cancel_reason, created_utc
        "#,
    )
    .bind(order_item_id)
    .bind(order_id)
    .bind(lab_id)
    .bind(test_id)
    .bind(price)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert order item: {}", e)))?;

    // Sample code is the order code plus a 1-based, zero-padded index; the
    // barcode value is the order item id.
    let sample_code = format!("{}-{:02}", order_code, index + 1);
    sqlx::query(
        r#"
        INSERT INTO samples (sample_id, lab_id, order_item_id, code, barcode, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(lab_id)
    .bind(order_item_id)
    .bind(&sample_code)
    .bind(order_item_id.to_string())
    .bind(SampleStatus::Ordered.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert sample: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO results (result_id, lab_id, order_id, order_item_id, status)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(lab_id)
    .bind(order_id)
    .bind(order_item_id)
    .bind(ResultStatus::Pending.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert result: {}", e)))?;

    Ok(item)
}

/// Insert an invoice for the computed totals, allocating its code.
async fn insert_invoice(
    tx: &mut Transaction<'_, Postgres>,
    lab_id: Uuid,
    order_id: Uuid,
    totals: &OrderTotals,
    supplementary: bool,
    today: chrono::NaiveDate,
) -> Result<Invoice, CreateOrderError> {
    let invoice_code = allocate_code(&mut **tx, lab_id, CodePrefix::Invoice, today)
        .await
        .map_err(CreateOrderError::Other)?;

    let invoice = sqlx::query_as::<_, Invoice>(
        r#"
        INSERT INTO invoices (
            invoice_id, lab_id, order_id, code, subtotal, discount_total, tax_total,
            grand_total, amount_paid, amount_due, status, supplementary
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $8, 'issued', $9)
        RETURNING invoice_id, lab_id, order_id, code, subtotal, discount_total, tax_total,
            grand_total, amount_paid, amount_due, status, supplementary, created_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(lab_id)
    .bind(order_id)
    .bind(&invoice_code)
    .bind(totals.subtotal)
    .bind(totals.discount_total)
    .bind(totals.tax_total)
    .bind(totals.grand_total)
    .bind(supplementary)
    .fetch_one(&mut **tx)
    .await
    .map_err(unique_or_db)?;

    Ok(invoice)
}
