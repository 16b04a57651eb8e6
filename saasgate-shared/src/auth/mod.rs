/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and the password policy
/// - [`jwt`]: JWT claims, signing and validation
/// - [`session`]: token service (access/refresh issuance, refresh rotation, blacklist)
/// - [`action_token`]: purpose-tagged tokens for email verification and password reset
/// - [`flow`]: register, verify, login, refresh, logout, forgot/reset password
/// - [`middleware`]: bearer-token middleware for Axum
/// - [`authorization`]: app-role and staff checks
///
/// # Example
///
/// ```no_run
/// use saasgate_shared::auth::password::{hash_password, verify_password};
/// use saasgate_shared::auth::jwt::{create_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), TokenType::Access);
/// let token = create_token(&claims, "secret-key")?;
/// # Ok(())
/// # }
/// ```

pub mod action_token;
pub mod authorization;
pub mod flow;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod session;
