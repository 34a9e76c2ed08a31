//! Application startup and lifecycle management.

use crate::config::LabcoreConfig;
use crate::handlers;
use crate::middleware::metrics::http_metrics_middleware;
use crate::services::{
    AuditService, BillingService, Database, LocalStorage, OrderService, PatientService,
    PricingResolver, ReportService, ResultService, S3Storage, SampleService, Storage,
};
use aws_config::BehaviorVersion;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::security_headers::security_headers_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: LabcoreConfig,
    pub db: Database,
    pub audit: AuditService,
    pub storage: Arc<dyn Storage>,
    pub patients: PatientService,
    pub orders: OrderService,
    pub samples: SampleService,
    pub results: ResultService,
    pub billing: BillingService,
    pub reports: ReportService,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: LabcoreConfig) -> Result<Self, AppError> {
        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;

        db.run_migrations().await?;

        let storage: Arc<dyn Storage> = match config.storage.backend.as_str() {
            "s3" => {
                let bucket = config.storage.s3_bucket.clone().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "LABCORE_S3_BUCKET is required for the s3 storage backend"
                    ))
                })?;
                let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
                let client = aws_sdk_s3::Client::new(&aws_config);
                tracing::info!(bucket = %bucket, "Using S3 report storage");
                Arc::new(S3Storage::new(client, bucket))
            }
            _ => {
                tracing::info!(path = %config.storage.local_path, "Using local report storage");
                Arc::new(LocalStorage::new(config.storage.local_path.clone()).await?)
            }
        };

        let audit = AuditService::new(db.pool().clone());
        let pricing = PricingResolver::new(db.clone());

        let state = AppState {
            patients: PatientService::new(db.clone(), audit.clone()),
            orders: OrderService::new(db.clone(), audit.clone(), pricing),
            samples: SampleService::new(db.clone(), audit.clone()),
            results: ResultService::new(db.clone(), audit.clone()),
            billing: BillingService::new(db.clone(), audit.clone()),
            reports: ReportService::new(db.clone(), audit.clone(), storage.clone()),
            config,
            db,
            audit,
            storage,
        };

        // Port 0 binds a random port for tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("labcore-service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the application state (shared with tests).
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        axum::serve(self.listener, router).await
    }
}

/// Assemble the full route table.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::metrics_endpoint))
        .route(
            "/patients",
            post(handlers::patients::register_patient).get(handlers::patients::list_patients),
        )
        .route(
            "/patients/:patient_id",
            get(handlers::patients::get_patient)
                .patch(handlers::patients::update_patient)
                .delete(handlers::patients::delete_patient),
        )
        .route(
            "/catalog/tests",
            post(handlers::catalog::create_test_definition)
                .get(handlers::catalog::list_test_definitions),
        )
        .route(
            "/catalog/rate-cards",
            post(handlers::catalog::create_rate_card).get(handlers::catalog::list_rate_cards),
        )
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/:order_id", get(handlers::orders::get_order))
        .route("/orders/:order_id/cancel", post(handlers::orders::cancel_order))
        .route("/orders/:order_id/items", post(handlers::orders::add_items_to_order))
        .route(
            "/order-items/:order_item_id/cancel",
            post(handlers::orders::cancel_order_item),
        )
        .route("/samples/:sample_id", get(handlers::samples::get_sample))
        .route(
            "/samples/:sample_id/status",
            post(handlers::samples::update_sample_status),
        )
        .route("/results/:result_id", get(handlers::results::get_result))
        .route(
            "/results/:result_id/values",
            post(handlers::results::submit_values),
        )
        .route(
            "/results/:result_id/status",
            post(handlers::results::update_result_status),
        )
        .route("/invoices/:invoice_id", get(handlers::invoices::get_invoice))
        .route(
            "/invoices/:invoice_id/payments",
            post(handlers::invoices::record_payment),
        )
        .route(
            "/orders/:order_id/report",
            post(handlers::reports::generate_report),
        )
        .route("/reports/:report_id/pdf", get(handlers::reports::get_report_pdf))
        .route("/reports/:report_id/amend", post(handlers::reports::amend_report))
        .route(
            "/reports/:report_id/share-url",
            get(handlers::reports::share_url),
        )
        .route("/reports/:report_id/share", post(handlers::reports::mark_shared))
        .route("/audit", get(handlers::audit::list_audit_logs))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(axum_middleware::from_fn(http_metrics_middleware))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
