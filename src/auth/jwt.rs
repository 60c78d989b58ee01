//! JWT bearer token validation
//!
//! Tokens are issued by the external login provider; Codex only verifies
//! them (HS256) and turns the claims into a [`Principal`].

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::{Principal, Role};
use crate::types::{CodexError, Result};

/// Claims carried by Codex access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Expiry (seconds since epoch)
    pub exp: u64,
    #[serde(default)]
    pub iat: u64,
}

impl Claims {
    pub fn into_principal(self) -> Principal {
        Principal::new(self.sub, self.username, self.roles)
    }
}

/// Verifies HS256 tokens with a shared secret
#[derive(Clone)]
pub struct JwtValidator {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(CodexError::Config("JWT secret must not be empty".into()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;

        Ok(Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Verify a token and return the principal it names
    pub fn verify(&self, token: &str) -> Result<Principal> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims.into_principal())
            .map_err(|e| CodexError::Auth(format!("Invalid token: {e}")))
    }

    /// Sign claims. Used by tooling and tests; production tokens come from
    /// the login provider.
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| CodexError::Internal(format!("Failed to sign token: {e}")))
    }

    /// Sign a token for a principal valid for `ttl_secs`
    pub fn issue(&self, principal: &Principal, ttl_secs: u64) -> Result<String> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.sign(&Claims {
            sub: principal.user_id.clone(),
            username: principal.username.clone(),
            roles: principal.roles.iter().copied().collect(),
            exp: now + ttl_secs,
            iat: now,
        })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn extract_token_from_header(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
