/*!
 * # Authentication
 *
 * The application has a single operator account defined in configuration.
 * A successful login returns a signed HS256 JWT; every other `/api` route
 * requires it as a bearer token. Logging out revokes the token's `jti`
 * until the token would have expired anyway.
 */

use crate::{config::AppConfig, errors::ServiceError, metrics};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

pub const OPERATOR_ROLE: &str = "admin";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub role: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub username: String,
    pub name: String,
    pub role: String,
    #[serde(skip)]
    pub token_id: String,
    #[serde(skip)]
    pub expires_at: i64,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            username: claims.sub,
            name: claims.name,
            role: claims.role,
            token_id: claims.jti,
            expires_at: claims.exp,
        }
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub token_expiration: Duration,
    pub username: String,
    pub display_name: String,
    /// Argon2 PHC string; without it every login is refused
    pub password_hash: Option<String>,
}

impl AuthConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_audience: cfg.auth_audience.clone(),
            jwt_issuer: cfg.auth_issuer.clone(),
            token_expiration: Duration::from_secs(cfg.jwt_expiration_secs),
            username: cfg.auth_username.clone(),
            display_name: cfg.auth_display_name.clone(),
            password_hash: cfg.auth_password_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginCredentials {
    #[validate(length(min = 1, message = "username is required"))]
    #[serde(default)]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    #[serde(default)]
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: AuthUser,
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingToken,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenCreation(msg) => ServiceError::InternalError(msg),
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

/// Hashes a password into an argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::InternalError(format!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "Configured password hash is not a valid PHC string");
            false
        }
    }
}

/// Authentication service that handles token issuance and validation
#[derive(Debug)]
pub struct AuthService {
    config: AuthConfig,
    /// Revoked token ids and the expiry after which they can be forgotten
    revoked: DashMap<String, i64>,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        if config.password_hash.is_none() {
            warn!("No operator password hash configured; logins will be refused");
        }
        Self {
            config,
            revoked: DashMap::new(),
        }
    }

    /// Checks the operator credentials and issues a token.
    pub fn login(&self, credentials: &LoginCredentials) -> Result<TokenResponse, AuthError> {
        let username_ok = credentials.username.trim() == self.config.username;
        let password_ok = self
            .config
            .password_hash
            .as_deref()
            .map(|hash| verify_password(&credentials.password, hash))
            .unwrap_or(false);

        metrics::record_auth_attempt(username_ok && password_ok);
        if !(username_ok && password_ok) {
            warn!(username = %credentials.username, "Rejected login attempt");
            return Err(AuthError::InvalidCredentials);
        }

        let response = self.issue_token()?;
        info!(username = %response.user.username, "Operator logged in");
        Ok(response)
    }

    fn issue_token(&self) -> Result<TokenResponse, AuthError> {
        let now = Utc::now().timestamp();
        let lifetime = self.config.token_expiration.as_secs();
        let claims = Claims {
            sub: self.config.username.clone(),
            name: self.config.display_name.clone(),
            role: OPERATOR_ROLE.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + lifetime as i64,
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: lifetime,
            user: claims.into(),
        })
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        if self.revoked.contains_key(&claims.jti) {
            return Err(AuthError::RevokedToken);
        }
        Ok(claims)
    }

    /// Revokes the token until its natural expiry.
    pub fn revoke(&self, user: &AuthUser) {
        let now = Utc::now().timestamp();
        self.revoked.retain(|_, expiry| *expiry > now);
        self.revoked.insert(user.token_id.clone(), user.expires_at);
        debug!(jti = %user.token_id, revoked = self.revoked.len(), "Token revoked");
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware that extracts and validates bearer tokens
pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(request.headers()).ok_or(AuthError::MissingToken)?;
    let claims = auth.validate_token(token)?;
    request.extensions_mut().insert(AuthUser::from(claims));
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}
