//! Module `bearer`
//!
//! Write and delete authorization through HMAC-signed JWTs. Only the `exp`
//! claim is inspected.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::error::AccessDenied;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, Deserialize)]
struct Claims {
    exp: Option<f64>,
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    // Expiry is checked below against the caller's clock, without leeway.
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

/// Checks an `Authorization` header value, reporting why it was refused.
pub fn check_authorization(
    header: Option<&str>,
    now: i64,
    signing_key: &[u8],
) -> Result<(), AccessDenied> {
    if signing_key.is_empty() {
        return Err(AccessDenied::NoSigningKey);
    }

    let header = header
        .filter(|value| !value.is_empty())
        .ok_or(AccessDenied::MissingAuthorization)?;
    let token = header.strip_prefix(BEARER_PREFIX).unwrap_or(header).trim();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(signing_key), &validation())?;
    let expires_at = data.claims.exp.ok_or(AccessDenied::MissingExpiration)?;

    if expires_at < now as f64 {
        return Err(AccessDenied::TokenExpired);
    }
    Ok(())
}

/// Whether the `Authorization` header grants write access at `now`.
pub fn is_authorized(header: Option<&str>, now: i64, signing_key: &[u8]) -> bool {
    check_authorization(header, now, signing_key).is_ok()
}
