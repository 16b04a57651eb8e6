/// Database layer
///
/// - `pool`: PostgreSQL connection pool with a health check
/// - `migrations`: embedded schema migrations
///
/// Row types and queries are in the crate-level `models` module.

pub mod migrations;
pub mod pool;
