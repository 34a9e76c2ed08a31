use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct LabcoreConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: Secret<String>,
}

/// Storage backend selection: local filesystem for dev/tests, S3 otherwise.
#[derive(Deserialize, Clone, Debug)]
pub struct StorageConfig {
    pub backend: String,
    pub local_path: String,
    pub s3_bucket: Option<String>,
}

impl LabcoreConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("LABCORE_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("LABCORE_SERVICE_PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse()?;

        let db_url = env::var("LABCORE_DATABASE_URL").expect("LABCORE_DATABASE_URL must be set");
        let max_connections = env::var("LABCORE_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("LABCORE_DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let jwt_secret = env::var("LABCORE_JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string());

        let storage_backend =
            env::var("LABCORE_STORAGE_BACKEND").unwrap_or_else(|_| "local".to_string());
        let local_path =
            env::var("LABCORE_STORAGE_PATH").unwrap_or_else(|_| "./storage".to_string());
        let s3_bucket = env::var("LABCORE_S3_BUCKET").ok();

        let log_level = env::var("LABCORE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let otlp_endpoint = env::var("LABCORE_OTLP_ENDPOINT").ok();

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(jwt_secret),
            },
            storage: StorageConfig {
                backend: storage_backend,
                local_path,
                s3_bucket,
            },
            service_name: "labcore-service".to_string(),
            log_level,
            otlp_endpoint,
        })
    }
}
