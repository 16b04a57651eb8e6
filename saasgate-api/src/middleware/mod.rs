/// Middleware for the API server
///
/// - `security`: response security headers
/// - `rate_limit`: per-client throttling of the anonymous auth endpoints
///
/// Bearer authentication lives in `saasgate_shared::auth::middleware`.

pub mod rate_limit;
pub mod security;
