//! Module `signed_url`
//!
//! Read access to private paths. A link carries `e` (expiry, Unix seconds)
//! and `t`, the hex HMAC-SHA256 of `"<file name>.<e>"` under the folder secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

use crate::error::AccessDenied;
use crate::folders::FolderConfig;

type HmacSha256 = Hmac<Sha256>;

/// Query parameter carrying the signature.
pub const TOKEN_PARAM: &str = "t";
/// Query parameter carrying the expiry.
pub const EXPIRY_PARAM: &str = "e";

/// Signature for `file_name` valid until `expiry`.
pub fn sign(
    file_name: &str,
    expiry: &str,
    secret: &str,
) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(file_name.as_bytes());
    mac.update(b".");
    mac.update(expiry.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Query string (without `?`) granting read access to `file_name` until `expiry`.
pub fn signed_query(
    file_name: &str,
    expiry: i64,
    secret: &str,
) -> Result<String, hmac::digest::InvalidLength> {
    let expiry = expiry.to_string();
    let token = sign(file_name, &expiry, secret)?;
    Ok(format!("{EXPIRY_PARAM}={expiry}&{TOKEN_PARAM}={token}"))
}

/// Checks read access to `file_name`, reporting why access was refused.
pub fn check_read_access(
    folder: &FolderConfig,
    file_name: &str,
    query: &HashMap<String, String>,
    now: i64,
) -> Result<(), AccessDenied> {
    if !folder.is_private(file_name) {
        return Ok(());
    }

    let token = query.get(TOKEN_PARAM).filter(|value| !value.is_empty());
    let expiry = query.get(EXPIRY_PARAM).filter(|value| !value.is_empty());
    let (Some(token), Some(expiry)) = (token, expiry) else {
        return Err(AccessDenied::MissingSignature);
    };

    let expires_at: i64 = expiry.parse().map_err(|_| AccessDenied::MalformedExpiry)?;
    if expires_at < now {
        return Err(AccessDenied::LinkExpired { expiry: expires_at });
    }

    let expected = sign(file_name, expiry, &folder.private.secret)
        .map_err(|_| AccessDenied::SignatureMismatch)?;
    if bool::from(expected.as_bytes().ct_eq(token.as_bytes())) {
        Ok(())
    } else {
        Err(AccessDenied::SignatureMismatch)
    }
}

/// Whether `file_name` may be read with the given query parameters at `now`.
pub fn is_read_allowed(
    folder: &FolderConfig,
    file_name: &str,
    query: &HashMap<String, String>,
    now: i64,
) -> bool {
    check_read_access(folder, file_name, query, now).is_ok()
}
