//! HS256 access tokens.

use axum::extract::{ Request, State };
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{ Duration, Utc };
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{ decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation };
use log::debug;
use serde::{ Deserialize, Serialize };
use thiserror::Error;

use super::error::ApiError;
use super::AppState;

const ACCESS_TOKEN_TYPE: &str = "access";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,
    #[error("malformed token")]
    Malformed,
    #[error("unsupported token algorithm")]
    Algorithm,
    #[error("bad token signature")]
    Signature,
    #[error("token expired")]
    Expired,
    #[error("not an access token")]
    WrongType,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            JwtErrorKind::ExpiredSignature => AuthError::Expired,
            JwtErrorKind::InvalidSignature => AuthError::Signature,
            JwtErrorKind::InvalidAlgorithm | JwtErrorKind::InvalidAlgorithmName => AuthError::Algorithm,
            _ => AuthError::Malformed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "type")]
    pub token_type: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// The authenticated caller, placed in request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn sign_access_token(&self, user_id: &str, email: Option<&str>, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = AccessClaims {
            user_id: user_id.to_string(),
            email: email.map(str::to_string),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            exp: (now + ttl).timestamp(),
            iat: Some(now.timestamp()),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Signature and expiry are checked by `jsonwebtoken`; only the token
    /// type is ours.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let claims = decode::<AccessClaims>(token, &self.decoding, &self.validation)?.claims;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::WrongType);
        }
        Ok(claims)
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = bearer_token(&req)
        .ok_or(AuthError::Missing)
        .and_then(|token| state.jwt.verify(token))
        .map_err(|e| {
            debug!("Rejected request to {}: {}", req.uri().path(), e);
            ApiError::unauthorized()
        })?;

    req.extensions_mut().insert(AuthUser { user_id: claims.user_id, email: claims.email });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_token_verifies() {
        let keys = JwtKeys::new("secret");
        let token = keys.sign_access_token("user_123", Some("a@b.test"), Duration::minutes(15)).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.user_id, "user_123");
        assert_eq!(claims.email.as_deref(), Some("a@b.test"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = JwtKeys::new("one").sign_access_token("u", None, Duration::minutes(5)).unwrap();
        assert_eq!(JwtKeys::new("two").verify(&token), Err(AuthError::Signature));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = JwtKeys::new("secret");
        let token = keys.sign_access_token("u", None, Duration::seconds(-10)).unwrap();
        assert_eq!(keys.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn refresh_tokens_are_not_access_tokens() {
        let keys = JwtKeys::new("secret");
        let claims = AccessClaims {
            user_id: "u".into(),
            email: None,
            token_type: "refresh".into(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iat: None,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(b"secret")).unwrap();
        assert_eq!(keys.verify(&token), Err(AuthError::WrongType));
    }

    #[test]
    fn other_algorithms_are_rejected() {
        let keys = JwtKeys::new("secret");
        let claims = AccessClaims {
            user_id: "u".into(),
            email: None,
            token_type: "access".into(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iat: None,
        };
        let token = encode(&Header::new(Algorithm::HS512), &claims, &EncodingKey::from_secret(b"secret")).unwrap();
        assert_eq!(keys.verify(&token), Err(AuthError::Algorithm));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let keys = JwtKeys::new("secret");
        let token = keys.sign_access_token("u", None, Duration::minutes(5)).unwrap();
        let admin = JwtKeys::new("guessed").sign_access_token("admin", None, Duration::minutes(5)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = admin.split('.').nth(1).unwrap();
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert_eq!(keys.verify(&forged), Err(AuthError::Signature));
        assert_eq!(keys.verify("not-a-token"), Err(AuthError::Malformed));
    }
}
