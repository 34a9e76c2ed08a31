//! Authenticated tenant context.
//!
//! Extracts and validates the bearer access token on every request. The
//! service layer trusts the resulting `AuthContext` and receives it as an
//! explicit parameter; no handler or service reads token material again.

use crate::models::{Action, Role};
use crate::startup::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

/// Claims carried by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Tenant the token is scoped to
    pub lab_id: Uuid,
    /// Role within the lab
    pub role: String,
    /// "access" or "refresh"
    pub token_type: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Validated tenant + user context for one request.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub lab_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    /// Capability check applied at the service boundary.
    pub fn require(&self, action: Action) -> Result<(), AppError> {
        if self.role.permits(action) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "Role '{}' is not permitted to perform this action",
                self.role.as_str()
            )))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::AuthError(anyhow::anyhow!("Missing bearer token"))
            })?;

        let decoding_key =
            DecodingKey::from_secret(state.config.auth.jwt_secret.expose_secret().as_bytes());
        let claims = decode::<Claims>(token, &decoding_key, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)?;

        if claims.token_type != "access" {
            return Err(AppError::AuthError(anyhow::anyhow!(
                "Refresh tokens cannot be used for API calls"
            )));
        }

        let role = Role::parse(&claims.role).ok_or_else(|| {
            AppError::AuthError(anyhow::anyhow!("Unknown role '{}'", claims.role))
        })?;

        let span = tracing::Span::current();
        span.record("lab_id", claims.lab_id.to_string());
        span.record("user_id", claims.sub.to_string());

        Ok(AuthContext {
            lab_id: claims.lab_id,
            user_id: claims.sub,
            role,
        })
    }
}
