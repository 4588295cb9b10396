//! Access control
//!
//! Signed-link verification for private reads and bearer-token verification
//! for writes and deletes.

pub mod bearer;
pub mod signed_url;

pub use bearer::{check_authorization, is_authorized};
pub use signed_url::{check_read_access, is_read_allowed, sign, signed_query};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as Unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
