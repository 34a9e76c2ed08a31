//! Common test utilities for labcore-service integration tests.
//!
//! Tests run against a real PostgreSQL instance named by `TEST_DATABASE_URL`
//! and are skipped with a note when none is configured.

#![allow(dead_code)]

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use labcore_service::config::{
    AuthConfig, DatabaseConfig, LabcoreConfig, ServerConfig, StorageConfig,
};
use labcore_service::middleware::auth::Claims;
use labcore_service::startup::{AppState, Application};
use labcore_service::models::Role;
use rust_decimal::Decimal;
use secrecy::Secret;
use std::sync::Once;
use tempfile::TempDir;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "labcore-test-secret";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,labcore_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub struct TestApp {
    pub port: u16,
    pub state: AppState,
    pub client: reqwest::Client,
    pub lab_id: Uuid,
    _storage_dir: TempDir,
}

impl TestApp {
    /// Spawn a test application, or return None (with a note) when no test
    /// database is configured.
    pub async fn spawn() -> Option<TestApp> {
        init_tracing();

        let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("skipping: TEST_DATABASE_URL is not set");
            return None;
        };

        let storage_dir = TempDir::new().expect("Failed to create storage dir");

        let config = LabcoreConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: Secret::new(database_url),
                max_connections: 4,
                min_connections: 1,
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(TEST_JWT_SECRET.to_string()),
            },
            storage: StorageConfig {
                backend: "local".to_string(),
                local_path: storage_dir.path().display().to_string(),
                s3_bucket: None,
            },
            service_name: "labcore-service-test".to_string(),
            log_level: "debug".to_string(),
            otlp_endpoint: None,
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build application");

        let port = app.port();
        let state = app.state();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let lab_id = seed_lab(&state).await;

        Some(TestApp {
            port,
            state,
            client: reqwest::Client::new(),
            lab_id,
            _storage_dir: storage_dir,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Mint an access token for a user of the test lab.
    pub fn token(&self, role: Role) -> String {
        mint_token(self.lab_id, Uuid::new_v4(), role, "access")
    }

    /// Mint an access token scoped to a different lab.
    pub fn token_for_lab(&self, lab_id: Uuid, role: Role) -> String {
        mint_token(lab_id, Uuid::new_v4(), role, "access")
    }

    pub async fn post(
        &self,
        path: &str,
        role: Role,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(self.token(role))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn get(&self, path: &str, role: Role) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(self.token(role))
            .send()
            .await
            .expect("Request failed")
    }

    /// Register a patient through the API and return its id.
    pub async fn register_patient(&self, name: &str) -> Uuid {
        let response = self
            .post(
                "/patients",
                Role::Receptionist,
                &serde_json::json!({ "full_name": name, "sex": "female" }),
            )
            .await;
        assert_eq!(response.status(), 201, "Failed to register patient");
        let body: serde_json::Value = response.json().await.unwrap();
        body["patient_id"].as_str().unwrap().parse().unwrap()
    }

    /// Seed a test definition with parameters directly in the database.
    pub async fn seed_test(&self, code: &str, name: &str, price: &str) -> Uuid {
        let test_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO test_definitions (test_id, lab_id, code, name, specimen_type, default_price)
            VALUES ($1, $2, $3, $4, 'whole_blood', $5)
            "#,
        )
        .bind(test_id)
        .bind(self.lab_id)
        .bind(code)
        .bind(name)
        .bind(price.parse::<Decimal>().unwrap())
        .execute(self.state.db.pool())
        .await
        .expect("Failed to seed test definition");

        for (i, parameter) in ["Value A", "Value B"].into_iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO test_parameters (parameter_id, test_id, name, unit, reference_range, sort_order)
                VALUES ($1, $2, $3, 'g/dL', '1.0-10.0', $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(test_id)
            .bind(parameter)
            .bind(i as i32)
            .execute(self.state.db.pool())
            .await
            .expect("Failed to seed test parameter");
        }

        test_id
    }

    /// First parameter id of a test, in display order.
    pub async fn first_parameter(&self, test_id: Uuid) -> Uuid {
        sqlx::query_scalar(
            "SELECT parameter_id FROM test_parameters WHERE test_id = $1 ORDER BY sort_order LIMIT 1",
        )
        .bind(test_id)
        .fetch_one(self.state.db.pool())
        .await
        .expect("Failed to fetch parameter")
    }

    /// Create an order through the API and return the parsed response body.
    pub async fn create_order(&self, patient_id: Uuid, test_ids: &[Uuid]) -> serde_json::Value {
        let response = self
            .post(
                "/orders",
                Role::Receptionist,
                &serde_json::json!({ "patient_id": patient_id, "test_ids": test_ids }),
            )
            .await;
        assert_eq!(response.status(), 201, "Failed to create order");
        response.json().await.unwrap()
    }

    /// Result ids of an order, in item order.
    pub async fn result_ids(&self, order_id: Uuid) -> Vec<Uuid> {
        sqlx::query_scalar(
            r#"
            SELECT r.result_id
            FROM results r
            JOIN order_items i ON i.order_item_id = r.order_item_id
            WHERE r.order_id = $1
            ORDER BY i.created_utc, i.order_item_id
            "#,
        )
        .bind(order_id)
        .fetch_all(self.state.db.pool())
        .await
        .expect("Failed to fetch result ids")
    }

    /// Drive one result to authorised: enter a value, then authorise.
    pub async fn authorise_result(&self, result_id: Uuid, parameter_id: Uuid) {
        let response = self
            .post(
                &format!("/results/{}/values", result_id),
                Role::Technician,
                &serde_json::json!({
                    "values": [{ "parameter_id": parameter_id, "value": "5.2", "numeric_value": "5.2" }]
                }),
            )
            .await;
        assert_eq!(response.status(), 200, "Failed to submit values");

        let response = self
            .post(
                &format!("/results/{}/status", result_id),
                Role::Pathologist,
                &serde_json::json!({ "status": "authorised" }),
            )
            .await;
        assert_eq!(response.status(), 200, "Failed to authorise result");
    }
}

fn mint_token(lab_id: Uuid, user_id: Uuid, role: Role, token_type: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        lab_id,
        role: role.as_str().to_string(),
        token_type: token_type.to_string(),
        exp: now + 3600,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("Failed to mint token")
}

/// Insert a lab row for this test run.
async fn seed_lab(state: &AppState) -> Uuid {
    let lab_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO labs (lab_id, name, slug, max_users, gstin)
        VALUES ($1, 'Test Diagnostics', $2, 25, '29ABCDE1234F1Z5')
        "#,
    )
    .bind(lab_id)
    .bind(format!("test-lab-{}", lab_id.simple()))
    .execute(state.db.pool())
    .await
    .expect("Failed to seed lab");

    lab_id
}
