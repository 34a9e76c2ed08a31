//! Database service for labcore-service.
//!
//! Owns the connection pool and the shared entity lookups. Multi-step
//! transactional flows live in the domain services and borrow the pool.

use crate::models::{
    CreateRateCard, CreateTestDefinition, Invoice, Lab, LabResult, ListPatientsFilter, Order,
    OrderItem, Patient, Payment, RateCard, RateCardItem, Report, ResultValue, Sample,
    TestDefinition, TestParameter,
};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "labcore-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Lab Operations
    // -------------------------------------------------------------------------

    /// Get a lab by ID.
    #[instrument(skip(self), fields(lab_id = %lab_id))]
    pub async fn get_lab(&self, lab_id: Uuid) -> Result<Option<Lab>, AppError> {
        let timer = DB_QUERY_DURATION.with_label_values(&["get_lab"]).start_timer();

        let lab = sqlx::query_as::<_, Lab>(
            r#"
            SELECT lab_id, name, slug, max_users, gstin, branding, created_utc
            FROM labs
            WHERE lab_id = $1
            "#,
        )
        .bind(lab_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get lab: {}", e)))?;

        timer.observe_duration();

        Ok(lab)
    }

    // -------------------------------------------------------------------------
    // Patient Operations
    // -------------------------------------------------------------------------

    /// Get an active (not soft-deleted) patient by ID.
    #[instrument(skip(self), fields(lab_id = %lab_id, patient_id = %patient_id))]
    pub async fn get_patient(
        &self,
        lab_id: Uuid,
        patient_id: Uuid,
    ) -> Result<Option<Patient>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_patient"])
            .start_timer();

        let patient = sqlx::query_as::<_, Patient>(
            r#"
            SELECT patient_id, lab_id, code, full_name, sex, date_of_birth, phone, email,
                address_line, deleted_at, created_utc
            FROM patients
            WHERE lab_id = $1 AND patient_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(lab_id)
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get patient: {}", e)))?;

        timer.observe_duration();

        Ok(patient)
    }

    /// List active patients, optionally matching name or code.
    #[instrument(skip(self, filter), fields(lab_id = %lab_id))]
    pub async fn list_patients(
        &self,
        lab_id: Uuid,
        filter: &ListPatientsFilter,
    ) -> Result<Vec<Patient>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_patients"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;
        let search = filter.search.as_ref().map(|s| format!("%{}%", s));

        let patients = if let Some(cursor) = filter.page_token {
            sqlx::query_as::<_, Patient>(
                r#"
                SELECT patient_id, lab_id, code, full_name, sex, date_of_birth, phone, email,
                    address_line, deleted_at, created_utc
                FROM patients
                WHERE lab_id = $1
                  AND deleted_at IS NULL
                  AND ($2::varchar IS NULL OR full_name ILIKE $2 OR code ILIKE $2)
                  AND patient_id > $3
                ORDER BY patient_id
                LIMIT $4
                "#,
            )
            .bind(lab_id)
            .bind(&search)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Patient>(
                r#"
                SELECT patient_id, lab_id, code, full_name, sex, date_of_birth, phone, email,
                    address_line, deleted_at, created_utc
                FROM patients
                WHERE lab_id = $1
                  AND deleted_at IS NULL
                  AND ($2::varchar IS NULL OR full_name ILIKE $2 OR code ILIKE $2)
                ORDER BY patient_id
                LIMIT $3
                "#,
            )
            .bind(lab_id)
            .bind(&search)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list patients: {}", e)))?;

        timer.observe_duration();

        Ok(patients)
    }

    // -------------------------------------------------------------------------
    // Catalog Operations
    // -------------------------------------------------------------------------

    /// Get test definitions by ID set. Order validation passes
    /// `active_only = true`; report assembly reads historical orders and
    /// includes tests retired since.
    #[instrument(skip(self, test_ids), fields(lab_id = %lab_id, requested = test_ids.len()))]
    pub async fn get_test_definitions(
        &self,
        lab_id: Uuid,
        test_ids: &[Uuid],
        active_only: bool,
    ) -> Result<Vec<TestDefinition>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_test_definitions"])
            .start_timer();

        let tests = sqlx::query_as::<_, TestDefinition>(
            r#"
            SELECT test_id, lab_id, code, name, specimen_type, default_price, active, created_utc
            FROM test_definitions
            WHERE lab_id = $1
              AND test_id = ANY($2)
              AND ($3::bool = FALSE OR active = TRUE)
            "#,
        )
        .bind(lab_id)
        .bind(test_ids)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get test definitions: {}", e))
        })?;

        timer.observe_duration();

        Ok(tests)
    }

    /// Get parameters for a set of tests, in display order.
    #[instrument(skip(self, test_ids))]
    pub async fn get_test_parameters(
        &self,
        test_ids: &[Uuid],
    ) -> Result<Vec<TestParameter>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_test_parameters"])
            .start_timer();

        let parameters = sqlx::query_as::<_, TestParameter>(
            r#"
            SELECT parameter_id, test_id, name, unit, reference_range, sort_order
            FROM test_parameters
            WHERE test_id = ANY($1)
            ORDER BY test_id, sort_order
            "#,
        )
        .bind(test_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get test parameters: {}", e))
        })?;

        timer.observe_duration();

        Ok(parameters)
    }

    /// Create a test definition with its parameters.
    #[instrument(skip(self, input), fields(lab_id = %lab_id, code = %input.code))]
    pub async fn create_test_definition(
        &self,
        lab_id: Uuid,
        input: &CreateTestDefinition,
    ) -> Result<TestDefinition, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_test_definition"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let test_id = Uuid::new_v4();
        let test = sqlx::query_as::<_, TestDefinition>(
            r#"
            INSERT INTO test_definitions (test_id, lab_id, code, name, specimen_type, default_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING test_id, lab_id, code, name, specimen_type, default_price, active, created_utc
            "#,
        )
        .bind(test_id)
        .bind(lab_id)
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.specimen_type)
        .bind(input.default_price)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Test code '{}' already exists for this lab",
                    input.code
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create test: {}", e)),
        })?;

        for (i, parameter) in input.parameters.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO test_parameters (parameter_id, test_id, name, unit, reference_range, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(test_id)
            .bind(&parameter.name)
            .bind(&parameter.unit)
            .bind(&parameter.reference_range)
            .bind(i as i32)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create parameter: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(test_id = %test.test_id, code = %test.code, "Test definition created");

        Ok(test)
    }

    /// List a lab's active test definitions, in code order.
    #[instrument(skip(self), fields(lab_id = %lab_id))]
    pub async fn list_test_definitions(
        &self,
        lab_id: Uuid,
    ) -> Result<Vec<TestDefinition>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_test_definitions"])
            .start_timer();

        let tests = sqlx::query_as::<_, TestDefinition>(
            r#"
            SELECT test_id, lab_id, code, name, specimen_type, default_price, active, created_utc
            FROM test_definitions
            WHERE lab_id = $1 AND active = TRUE
            ORDER BY code
            "#,
        )
        .bind(lab_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list test definitions: {}", e))
        })?;

        timer.observe_duration();

        Ok(tests)
    }

    /// List a lab's rate cards.
    #[instrument(skip(self), fields(lab_id = %lab_id))]
    pub async fn list_rate_cards(&self, lab_id: Uuid) -> Result<Vec<RateCard>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_rate_cards"])
            .start_timer();

        let rate_cards = sqlx::query_as::<_, RateCard>(
            r#"
            SELECT rate_card_id, lab_id, name, active, created_utc
            FROM rate_cards
            WHERE lab_id = $1
            ORDER BY name
            "#,
        )
        .bind(lab_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list rate cards: {}", e)))?;

        timer.observe_duration();

        Ok(rate_cards)
    }

    /// Get a rate card by ID.
    #[instrument(skip(self), fields(lab_id = %lab_id, rate_card_id = %rate_card_id))]
    pub async fn get_rate_card(
        &self,
        lab_id: Uuid,
        rate_card_id: Uuid,
    ) -> Result<Option<RateCard>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_rate_card"])
            .start_timer();

        let rate_card = sqlx::query_as::<_, RateCard>(
            r#"
            SELECT rate_card_id, lab_id, name, active, created_utc
            FROM rate_cards
            WHERE lab_id = $1 AND rate_card_id = $2
            "#,
        )
        .bind(lab_id)
        .bind(rate_card_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get rate card: {}", e)))?;

        timer.observe_duration();

        Ok(rate_card)
    }

    /// Get override prices for a rate card.
    #[instrument(skip(self), fields(rate_card_id = %rate_card_id))]
    pub async fn get_rate_card_items(
        &self,
        rate_card_id: Uuid,
    ) -> Result<Vec<RateCardItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_rate_card_items"])
            .start_timer();

        let items = sqlx::query_as::<_, RateCardItem>(
            r#"
            SELECT rate_card_id, test_id, price
            FROM rate_card_items
            WHERE rate_card_id = $1
            "#,
        )
        .bind(rate_card_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get rate card items: {}", e))
        })?;

        timer.observe_duration();

        Ok(items)
    }

    /// Create a rate card with its override prices.
    #[instrument(skip(self, input), fields(lab_id = %lab_id, name = %input.name))]
    pub async fn create_rate_card(
        &self,
        lab_id: Uuid,
        input: &CreateRateCard,
    ) -> Result<RateCard, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_rate_card"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let rate_card_id = Uuid::new_v4();
        let rate_card = sqlx::query_as::<_, RateCard>(
            r#"
            INSERT INTO rate_cards (rate_card_id, lab_id, name)
            VALUES ($1, $2, $3)
            RETURNING rate_card_id, lab_id, name, active, created_utc
            "#,
        )
        .bind(rate_card_id)
        .bind(lab_id)
        .bind(&input.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Rate card '{}' already exists for this lab",
                    input.name
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create rate card: {}", e)),
        })?;

        for (test_id, price) in &input.items {
            sqlx::query(
                r#"
                INSERT INTO rate_card_items (rate_card_id, test_id, price)
                VALUES ($1, $2, $3)
                ON CONFLICT (rate_card_id, test_id) DO UPDATE SET price = EXCLUDED.price
                "#,
            )
            .bind(rate_card_id)
            .bind(test_id)
            .bind(price)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create rate card item: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(rate_card_id = %rate_card.rate_card_id, "Rate card created");

        Ok(rate_card)
    }

    // -------------------------------------------------------------------------
    // Order Operations
    // -------------------------------------------------------------------------

    /// Get an order by ID.
    #[instrument(skip(self), fields(lab_id = %lab_id, order_id = %order_id))]
    pub async fn get_order(&self, lab_id: Uuid, order_id: Uuid) -> Result<Option<Order>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_order"])
            .start_timer();

        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT order_id, lab_id, code, patient_id, priority, registered_by, deleted_at, created_utc
            FROM orders
            WHERE lab_id = $1 AND order_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(lab_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get order: {}", e)))?;

        timer.observe_duration();

        Ok(order)
    }

    /// Get all items of an order.
    #[instrument(skip(self), fields(lab_id = %lab_id, order_id = %order_id))]
    pub async fn get_order_items(
        &self,
        lab_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<OrderItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_order_items"])
            .start_timer();

        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT order_item_id, order_id, lab_id, test_id, price, cancelled_at, cancel_reason, created_utc
            FROM order_items
            WHERE lab_id = $1 AND order_id = $2
            ORDER BY created_utc, order_item_id
            "#,
        )
        .bind(lab_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get order items: {}", e)))?;

        timer.observe_duration();

        Ok(items)
    }

    /// Get a single order item.
    #[instrument(skip(self), fields(lab_id = %lab_id, order_item_id = %order_item_id))]
    pub async fn get_order_item(
        &self,
        lab_id: Uuid,
        order_item_id: Uuid,
    ) -> Result<Option<OrderItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_order_item"])
            .start_timer();

        let item = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT order_item_id, order_id, lab_id, test_id, price, cancelled_at, cancel_reason, created_utc
            FROM order_items
            WHERE lab_id = $1 AND order_item_id = $2
            "#,
        )
        .bind(lab_id)
        .bind(order_item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get order item: {}", e)))?;

        timer.observe_duration();

        Ok(item)
    }

    // -------------------------------------------------------------------------
    // Sample / Result Operations
    // -------------------------------------------------------------------------

    /// Get the result attached to an order item.
    #[instrument(skip(self), fields(lab_id = %lab_id, order_item_id = %order_item_id))]
    pub async fn get_result_for_order_item(
        &self,
        lab_id: Uuid,
        order_item_id: Uuid,
    ) -> Result<Option<LabResult>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_result_for_order_item"])
            .start_timer();

        let result = sqlx::query_as::<_, LabResult>(
            r#"
            SELECT result_id, lab_id, order_id, order_item_id, status, notes,
                entered_by, entered_utc, reviewed_by, reviewed_utc, authorised_by, authorised_utc
            FROM results
            WHERE lab_id = $1 AND order_item_id = $2
            "#,
        )
        .bind(lab_id)
        .bind(order_item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get result: {}", e)))?;

        timer.observe_duration();

        Ok(result)
    }

    /// Get a sample by ID.
    #[instrument(skip(self), fields(lab_id = %lab_id, sample_id = %sample_id))]
    pub async fn get_sample(
        &self,
        lab_id: Uuid,
        sample_id: Uuid,
    ) -> Result<Option<Sample>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_sample"])
            .start_timer();

        let sample = sqlx::query_as::<_, Sample>(
            r#"
            SELECT sample_id, lab_id, order_item_id, code, barcode, status, rejection_reason,
                collected_by, collected_utc, received_utc, updated_utc
            FROM samples
            WHERE lab_id = $1 AND sample_id = $2
            "#,
        )
        .bind(lab_id)
        .bind(sample_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get sample: {}", e)))?;

        timer.observe_duration();

        Ok(sample)
    }

    /// Get a result by ID.
    #[instrument(skip(self), fields(lab_id = %lab_id, result_id = %result_id))]
    pub async fn get_result(
        &self,
        lab_id: Uuid,
        result_id: Uuid,
    ) -> Result<Option<LabResult>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_result"])
            .start_timer();

        let result = sqlx::query_as::<_, LabResult>(
            r#"
            SELECT result_id, lab_id, order_id, order_item_id, status, notes,
                entered_by, entered_utc, reviewed_by, reviewed_utc, authorised_by, authorised_utc
            FROM results
            WHERE lab_id = $1 AND result_id = $2
            "#,
        )
        .bind(lab_id)
        .bind(result_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get result: {}", e)))?;

        timer.observe_duration();

        Ok(result)
    }

    /// Get all results of an order.
    #[instrument(skip(self), fields(lab_id = %lab_id, order_id = %order_id))]
    pub async fn get_results_for_order(
        &self,
        lab_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<LabResult>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_results_for_order"])
            .start_timer();

        let results = sqlx::query_as::<_, LabResult>(
            r#"
            SELECT result_id, lab_id, order_id, order_item_id, status, notes,
                entered_by, entered_utc, reviewed_by, reviewed_utc, authorised_by, authorised_utc
            FROM results
            WHERE lab_id = $1 AND order_id = $2
            "#,
        )
        .bind(lab_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get results: {}", e)))?;

        timer.observe_duration();

        Ok(results)
    }

    /// Get stored values of a result.
    #[instrument(skip(self), fields(result_id = %result_id))]
    pub async fn get_result_values(&self, result_id: Uuid) -> Result<Vec<ResultValue>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_result_values"])
            .start_timer();

        let values = sqlx::query_as::<_, ResultValue>(
            r#"
            SELECT result_id, parameter_id, value, numeric_value, unit, updated_utc
            FROM result_values
            WHERE result_id = $1
            "#,
        )
        .bind(result_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get result values: {}", e))
        })?;

        timer.observe_duration();

        Ok(values)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Get an invoice by ID.
    #[instrument(skip(self), fields(lab_id = %lab_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        lab_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, lab_id, order_id, code, subtotal, discount_total, tax_total,
                grand_total, amount_paid, amount_due, status, supplementary, created_utc
            FROM invoices
            WHERE lab_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(lab_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Get invoices of an order (primary first, then supplementary).
    #[instrument(skip(self), fields(lab_id = %lab_id, order_id = %order_id))]
    pub async fn get_invoices_for_order(
        &self,
        lab_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoices_for_order"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, lab_id, order_id, code, subtotal, discount_total, tax_total,
                grand_total, amount_paid, amount_due, status, supplementary, created_utc
            FROM invoices
            WHERE lab_id = $1 AND order_id = $2
            ORDER BY supplementary, created_utc
            "#,
        )
        .bind(lab_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Get payments recorded against an invoice, oldest first.
    #[instrument(skip(self), fields(lab_id = %lab_id, invoice_id = %invoice_id))]
    pub async fn get_payments(
        &self,
        lab_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, lab_id, invoice_id, amount, mode, reference, notes, received_by, created_utc
            FROM payments
            WHERE lab_id = $1 AND invoice_id = $2
            ORDER BY created_utc, payment_id
            "#,
        )
        .bind(lab_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payments: {}", e)))?;

        timer.observe_duration();

        Ok(payments)
    }

    // -------------------------------------------------------------------------
    // Report Operations
    // -------------------------------------------------------------------------

    /// Get a report by ID.
    #[instrument(skip(self), fields(lab_id = %lab_id, report_id = %report_id))]
    pub async fn get_report(
        &self,
        lab_id: Uuid,
        report_id: Uuid,
    ) -> Result<Option<Report>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_report"])
            .start_timer();

        let report = sqlx::query_as::<_, Report>(
            r#"
            SELECT report_id, lab_id, order_id, report_code, version, render_status, pdf_path,
                is_amended, amendment_reason, generated_by, created_utc, rendered_utc
            FROM reports
            WHERE lab_id = $1 AND report_id = $2
            "#,
        )
        .bind(lab_id)
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get report: {}", e)))?;

        timer.observe_duration();

        Ok(report)
    }

    /// Get the latest report version for an order, if any.
    #[instrument(skip(self), fields(lab_id = %lab_id, order_id = %order_id))]
    pub async fn get_latest_report_for_order(
        &self,
        lab_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<Report>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_latest_report_for_order"])
            .start_timer();

        let report = sqlx::query_as::<_, Report>(
            r#"
            SELECT report_id, lab_id, order_id, report_code, version, render_status, pdf_path,
                is_amended, amendment_reason, generated_by, created_utc, rendered_utc
            FROM reports
            WHERE lab_id = $1 AND order_id = $2
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(lab_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get report: {}", e)))?;

        timer.observe_duration();

        Ok(report)
    }
}
