/*!
 * # Authentication Module
 *
 * Turns the bearer token on a request into the caller's identity and role.
 * Tokens are issued elsewhere; this module only verifies HS256 signatures,
 * expiry and (optionally) the issuer.
 */

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{Requester, Role};

/// JWT claims understood by the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id (UUID)
    pub sub: String,
    /// `admin`, `agent` / `delivery_agent` or `customer`
    pub role: String,
    /// Expiry as seconds since the epoch
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Unsupported authorization scheme")]
    InvalidScheme,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token subject is not a valid user id")]
    InvalidSubject,

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        ServiceError::Unauthorized(err.to_string())
    }
}

/// Authenticated caller extracted from the `Authorization` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn requester(&self) -> Requester {
        Requester::new(self.user_id, self.role)
    }
}

/// Verifies bearer tokens
#[derive(Clone)]
pub struct AuthService {
    decoding_key: DecodingKey,
    issuer: Option<String>,
}

impl AuthService {
    pub fn new(jwt_secret: &str, issuer: Option<String>) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            issuer,
        }
    }

    /// Validate a JWT and return its claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }

    /// Validate a token and resolve the caller it names
    pub fn authenticate(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidSubject)?;
        let role = claims
            .role
            .parse::<Role>()
            .map_err(|_| AuthError::UnknownRole(claims.role.clone()))?;

        Ok(AuthUser { user_id, role })
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_service = Arc::<AuthService>::from_ref(state);

        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingAuth)?;
        let token = header_value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::InvalidScheme)?;

        let user = auth_service.authenticate(token).map_err(|e| {
            debug!(error = %e, "Rejected bearer token");
            e
        })?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "unit_test_secret_that_is_long_enough_for_hs256";

    fn token(sub: &str, role: &str, exp_offset: i64, iss: Option<&str>) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset) as usize;
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            exp,
            iss: iss.map(str::to_string),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn authenticates_valid_token() {
        let service = AuthService::new(SECRET, None);
        let user_id = Uuid::new_v4();

        let user = service
            .authenticate(&token(&user_id.to_string(), "agent", 600, None))
            .unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.role, Role::DeliveryAgent);
        assert_eq!(user.requester(), Requester::agent(user_id));
    }

    #[test]
    fn extra_claims_are_ignored() {
        let service = AuthService::new(SECRET, None);
        let user_id = Uuid::new_v4();
        let claims = serde_json::json!({
            "sub": user_id.to_string(),
            "role": "customer",
            "exp": chrono::Utc::now().timestamp() + 600,
            "name": "Asha",
            "email": "asha@example.com",
        });
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let user = service.authenticate(&token).unwrap();
        assert_eq!(
            user,
            AuthUser {
                user_id,
                role: Role::Customer
            }
        );
    }

    #[test]
    fn rejects_expired_and_foreign_tokens() {
        let service = AuthService::new(SECRET, None);
        let sub = Uuid::new_v4().to_string();

        assert_matches!(
            service.authenticate(&token(&sub, "admin", -3600, None)),
            Err(AuthError::TokenExpired)
        );

        let other = AuthService::new("a_completely_different_secret_value_123456", None);
        assert_matches!(
            other.authenticate(&token(&sub, "admin", 600, None)),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn rejects_bad_subject_and_role() {
        let service = AuthService::new(SECRET, None);
        assert_matches!(
            service.authenticate(&token("not-a-uuid", "admin", 600, None)),
            Err(AuthError::InvalidSubject)
        );
        assert_matches!(
            service.authenticate(&token(&Uuid::new_v4().to_string(), "supplier", 600, None)),
            Err(AuthError::UnknownRole(role)) if role == "supplier"
        );
    }

    #[test]
    fn enforces_issuer_when_configured() {
        let service = AuthService::new(SECRET, Some("storefront".into()));
        let sub = Uuid::new_v4().to_string();

        assert!(service
            .authenticate(&token(&sub, "customer", 600, Some("storefront")))
            .is_ok());
        assert_matches!(
            service.authenticate(&token(&sub, "customer", 600, Some("elsewhere"))),
            Err(AuthError::InvalidToken)
        );
    }
}
