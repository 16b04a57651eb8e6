/// API route handlers
///
/// Handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, verification, login, refresh, logout, password reset
/// - `subscriptions`: Checkout, billing portal, current subscription, processor webhook
/// - `apps`: App CRUD scoped to membership
/// - `collaborators`: App membership management
/// - `admin`: Staff-only user management

pub mod admin;
pub mod apps;
pub mod auth;
pub mod collaborators;
pub mod health;
pub mod subscriptions;
