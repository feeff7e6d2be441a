use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use mintour_core::{IdentityProvider, UserId};
use mintour_store::app_config::AuthConfig;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

pub const ADMIN_ROLE: &str = "admin";

// ============================================================================
// JWT Claims
// ============================================================================

/// Session token issued by the identity provider
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

/// The authenticated caller, inserted into request extensions
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserId);

// ============================================================================
// Identity provider backed by JWT verification
// ============================================================================

pub struct JwtIdentity {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentity {
    /// RS256 when a public key is configured, otherwise HS256 with the shared secret
    pub fn from_config(auth: &AuthConfig) -> anyhow::Result<Self> {
        let (key, algorithm) = match (&auth.jwt_public_key_pem, &auth.jwt_secret) {
            (Some(pem), _) => (DecodingKey::from_rsa_pem(pem.as_bytes())?, Algorithm::RS256),
            (None, Some(secret)) => (
                DecodingKey::from_secret(secret.expose().as_bytes()),
                Algorithm::HS256,
            ),
            (None, None) => anyhow::bail!("auth.jwt_secret or auth.jwt_public_key_pem must be set"),
        };

        let mut validation = Validation::new(algorithm);
        if let Some(issuer) = &auth.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }

        Ok(Self { key, validation })
    }

    pub fn hs256(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    fn claims(&self, bearer: Option<&str>) -> Option<SessionClaims> {
        let token = bearer?;
        match decode::<SessionClaims>(token, &self.key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected session token");
                None
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentity {
    async fn current_user_id(&self, bearer: Option<&str>) -> Option<UserId> {
        self.claims(bearer)
            .filter(|claims| !claims.sub.trim().is_empty())
            .map(|claims| UserId::new(claims.sub))
    }

    async fn current_admin_id(&self, bearer: Option<&str>) -> Option<UserId> {
        self.claims(bearer)
            .filter(|claims| claims.role.as_deref() == Some(ADMIN_ROLE))
            .map(|claims| UserId::new(claims.sub))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

// ============================================================================
// Customer Authentication Middleware
// ============================================================================

pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = bearer_token(req.headers());
    let user = state
        .identity
        .current_user_id(bearer.as_deref())
        .await
        .ok_or_else(|| AppError::AuthRequired {
            sign_in_url: state.settings.sign_in_url.clone(),
        })?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

// ============================================================================
// Admin Authentication Middleware
// ============================================================================

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = bearer_token(req.headers());
    if bearer.is_none() {
        return Err(AppError::AuthRequired {
            sign_in_url: state.settings.sign_in_url.clone(),
        });
    }

    let admin = state
        .identity
        .current_admin_id(bearer.as_deref())
        .await
        .ok_or_else(|| AppError::Forbidden("Administrator role required".to_string()))?;

    tracing::info!(admin_id = %admin, path = %req.uri().path(), "Admin request");
    req.extensions_mut().insert(CurrentUser(admin));
    Ok(next.run(req).await)
}
