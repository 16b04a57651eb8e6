/// Configuration management for the API server
///
/// Loads configuration from environment variables (a `.env` file is read
/// first when present) into a typed struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `JWT_SECRET`: secret for token signing, at least 32 characters (required)
/// - `API_HOST` / `API_PORT`: bind address (default: 0.0.0.0:8080)
/// - `FRONTEND_URL`: base for email links and billing redirects
/// - `STRIPE_*`: payment processor credentials and price ids
/// - `PLAN_LIMIT_*`: owned-app limits per tier
/// - `EMAIL_API_KEY`: unset means emails are logged instead of sent
/// - `RUST_LOG` / `LOG_FORMAT`: log filter and `json` output
///
/// # Example
///
/// ```no_run
/// use saasgate_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use saasgate_shared::billing::ledger::BillingUrls;
use saasgate_shared::billing::PlanCatalog;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

pub const PLAN_BASIC: &str = "basic";
pub const PLAN_PRO: &str = "pro";

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    pub frontend: FrontendConfig,
    pub stripe: StripeConfig,
    pub plans: PlansConfig,
    pub email: EmailConfig,
    pub throttle: ThrottleConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Enables HSTS
    pub production: bool,

    /// Allowed CORS origins; `*` means permissive
    pub cors_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT and action-token signing
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,
    pub access_lifetime_minutes: i64,
    pub refresh_lifetime_days: i64,
    pub rotate_refresh_tokens: bool,
    pub action_token_ttl_hours: i64,
}

/// Refresh-token cookie attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    pub name: String,
    pub secure: bool,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    pub url: String,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub portal_return_url: String,
}

/// Payment processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
    pub price_basic_id: String,
    pub price_pro_id: String,
}

/// Owned-app limits per tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlansConfig {
    pub default_tier: String,
    pub limit_basic: i64,
    pub limit_pro: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub api_key: Option<String>,
    pub from: String,
}

/// Requests per minute per client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub login_per_minute: u32,
    pub register_per_minute: u32,
    pub password_reset_per_minute: u32,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value: {}", name, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does not
    /// parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let webhook_secret = optional_var("STRIPE_WEBHOOK_SECRET").ok_or_else(|| {
            anyhow::anyhow!("STRIPE_WEBHOOK_SECRET environment variable is required")
        })?;

        let frontend_url = var_or("FRONTEND_URL", "http://localhost:3000")
            .trim_end_matches('/')
            .to_string();

        let cors_origins = var_or("CORS_ALLOWED_ORIGINS", &frontend_url)
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            api: ApiConfig {
                host: var_or("API_HOST", "0.0.0.0"),
                port: parse_var("API_PORT", 8080)?,
                production: parse_var("API_PRODUCTION", false)?,
                cors_origins,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                access_lifetime_minutes: parse_var("ACCESS_TOKEN_LIFETIME_MINUTES", 5)?,
                refresh_lifetime_days: parse_var("REFRESH_TOKEN_LIFETIME_DAYS", 7)?,
                rotate_refresh_tokens: parse_var("ROTATE_REFRESH_TOKENS", true)?,
                action_token_ttl_hours: parse_var("ACTION_TOKEN_TTL_HOURS", 24)?,
            },
            cookie: CookieConfig {
                name: var_or("REFRESH_COOKIE_NAME", "refresh_token"),
                secure: parse_var("REFRESH_COOKIE_SECURE", false)?,
                domain: optional_var("REFRESH_COOKIE_DOMAIN"),
            },
            frontend: FrontendConfig {
                checkout_success_url: var_or(
                    "CHECKOUT_SUCCESS_URL",
                    &format!("{}/billing/success", frontend_url),
                ),
                checkout_cancel_url: var_or(
                    "CHECKOUT_CANCEL_URL",
                    &format!("{}/billing/cancel", frontend_url),
                ),
                portal_return_url: var_or(
                    "PORTAL_RETURN_URL",
                    &format!("{}/billing/portal/return", frontend_url),
                ),
                url: frontend_url,
            },
            stripe: StripeConfig {
                secret_key: var_or("STRIPE_SECRET_KEY", ""),
                webhook_secret,
                api_base: var_or(
                    "STRIPE_API_BASE",
                    saasgate_shared::billing::stripe::DEFAULT_API_BASE,
                ),
                price_basic_id: var_or("STRIPE_PRICE_BASIC_ID", "price_basic_placeholder"),
                price_pro_id: var_or("STRIPE_PRICE_PRO_ID", "price_pro_placeholder"),
            },
            plans: PlansConfig {
                default_tier: PLAN_BASIC.to_string(),
                limit_basic: parse_var("PLAN_LIMIT_BASIC", 3)?,
                limit_pro: parse_var("PLAN_LIMIT_PRO", 50)?,
            },
            email: EmailConfig {
                api_key: optional_var("EMAIL_API_KEY"),
                from: var_or("EMAIL_FROM", "no-reply@saasgate.local"),
            },
            throttle: ThrottleConfig {
                login_per_minute: parse_var("THROTTLE_LOGIN_PER_MINUTE", 30)?,
                register_per_minute: parse_var("THROTTLE_REGISTER_PER_MINUTE", 3)?,
                password_reset_per_minute: parse_var("THROTTLE_PASSWORD_RESET_PER_MINUTE", 10)?,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Builds the price and limit tables
    pub fn plan_catalog(&self) -> PlanCatalog {
        PlanCatalog::new(self.plans.default_tier.clone())
            .with_plan(
                PLAN_BASIC,
                Some(self.stripe.price_basic_id.clone()),
                self.plans.limit_basic,
            )
            .with_plan(
                PLAN_PRO,
                Some(self.stripe.price_pro_id.clone()),
                self.plans.limit_pro,
            )
    }

    pub fn billing_urls(&self) -> BillingUrls {
        BillingUrls {
            checkout_success: self.frontend.checkout_success_url.clone(),
            checkout_cancel: self.frontend.checkout_cancel_url.clone(),
            portal_return: self.frontend.portal_return_url.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample() -> Config {
        Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                production: false,
                cors_origins: vec!["http://localhost:3000".to_string()],
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/test".to_string(),
                max_connections: 10,
            },
            jwt: JwtConfig {
                secret: "test-secret-key-at-least-32-bytes-long".to_string(),
                access_lifetime_minutes: 5,
                refresh_lifetime_days: 7,
                rotate_refresh_tokens: true,
                action_token_ttl_hours: 24,
            },
            cookie: CookieConfig {
                name: "refresh_token".to_string(),
                secure: false,
                domain: None,
            },
            frontend: FrontendConfig {
                url: "http://localhost:3000".to_string(),
                checkout_success_url: "http://localhost:3000/billing/success".to_string(),
                checkout_cancel_url: "http://localhost:3000/billing/cancel".to_string(),
                portal_return_url: "http://localhost:3000/billing/portal/return".to_string(),
            },
            stripe: StripeConfig {
                secret_key: "sk_test".to_string(),
                webhook_secret: "whsec_test".to_string(),
                api_base: "https://api.stripe.com/v1".to_string(),
                price_basic_id: "price_basic_placeholder".to_string(),
                price_pro_id: "price_pro_placeholder".to_string(),
            },
            plans: PlansConfig {
                default_tier: PLAN_BASIC.to_string(),
                limit_basic: 3,
                limit_pro: 50,
            },
            email: EmailConfig {
                api_key: None,
                from: "no-reply@saasgate.local".to_string(),
            },
            throttle: ThrottleConfig {
                login_per_minute: 30,
                register_per_minute: 3,
                password_reset_per_minute: 10,
            },
        }
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(sample().bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_plan_catalog_from_config() {
        let catalog = sample().plan_catalog();

        assert_eq!(catalog.default_tier(), "basic");
        assert_eq!(catalog.price_for("pro"), Some("price_pro_placeholder"));
        assert_eq!(catalog.plan_for_price("price_basic_placeholder"), Some("basic"));
        assert_eq!(catalog.limit_for("basic"), 3);
        assert_eq!(catalog.limit_for("pro"), 50);
    }
}
