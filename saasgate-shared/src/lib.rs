//! # saasgate shared library
//!
//! Domain logic for the saasgate API: accounts and tokens, billing state and
//! plan entitlements, apps and their collaborators.
//!
//! ## Module Organization
//!
//! - `models`: database rows and queries
//! - `db`: connection pool and migrations
//! - `auth`: tokens, account lifecycle, middleware and role checks
//! - `billing`: plan catalog, payment processor client, entitlement ledger, webhooks
//! - `quota`: plan-limited app creation
//! - `email`: outbound transactional email

pub mod auth;
pub mod billing;
pub mod db;
pub mod email;
pub mod models;
pub mod quota;

/// Current version of the saasgate shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
