//! JWT validation for caller identity
//!
//! Only verification lives here; tokens are issued elsewhere. A token is
//! accepted when its HS256 signature and `exp` check out, and its `sub`
//! becomes the rate-limit identity.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims the gateway reads from a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the caller's stable user id
    pub sub: String,
    /// Expiry (seconds since epoch)
    pub exp: u64,
    /// Issued at (seconds since epoch)
    #[serde(default)]
    pub iat: u64,
}

/// Outcome of verifying a token
#[derive(Debug, Clone)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

/// HS256 token verifier
#[derive(Clone)]
pub struct JwtValidator {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Create a validator for the given shared secret
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a token and extract its claims
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) if !data.claims.sub.trim().is_empty() => TokenValidationResult {
                valid: true,
                claims: Some(data.claims),
                error: None,
            },
            Ok(_) => TokenValidationResult {
                valid: false,
                claims: None,
                error: Some("token has an empty subject".to_string()),
            },
            Err(e) => TokenValidationResult {
                valid: false,
                claims: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Sign claims with this validator's secret
    pub fn issue_token(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn extract_token_from_header(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
