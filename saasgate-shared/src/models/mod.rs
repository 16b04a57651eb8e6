/// Database models for saasgate
///
/// Each model exposes its CRUD operations as associated functions taking a
/// pool (or a connection when the caller owns a transaction).
///
/// # Models
///
/// - `user`: accounts, activation state and plan tier
/// - `blacklisted_token`: consumed or revoked refresh tokens
/// - `subscription`: billing state synchronized from the payment processor
/// - `app`: owned resources
/// - `app_user`: role-based app memberships

pub mod app;
pub mod app_user;
pub mod blacklisted_token;
pub mod subscription;
pub mod user;
