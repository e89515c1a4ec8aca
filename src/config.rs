//! Application Configuration
//!
//! Every environment variable the service reads is collected here into a
//! single [`AppConfig`] at startup. Missing or invalid required variables are
//! a configuration error; the binary maps that to exit code 1 so operators
//! can distinguish misconfiguration from runtime failure.

use std::collections::HashSet;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;

use crate::db::DbPool;
use crate::middleware::rate_limit::RateLimiter;
use crate::security::csrf::CsrfProtect;
use crate::security::token::TokenCodec;
use crate::service::auth::AuthService;

/// Default HTTP listen port.
const DEFAULT_LISTEN_PORT: u16 = 3000;

/// Default name of the primary bearer-token cookie.
const DEFAULT_COOKIE_NAME: &str = "oh_session";

/// Default name of the legacy bearer-token cookie (accepted on read only).
const DEFAULT_LEGACY_COOKIE_NAME: &str = "session_token";

/// Default sign-in rate limit: 10 attempts per window.
const DEFAULT_RATE_LIMIT_SIGNIN_LIMIT: u32 = 10;

/// Default sign-in rate-limit window in seconds (3 minutes).
const DEFAULT_RATE_LIMIT_SIGNIN_WINDOW_SECS: u64 = 180;

/// Default server-side session lifetime in seconds (7 days).
const DEFAULT_SESSION_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// Minimum length for the signing and CSRF secrets.
const MIN_SECRET_LENGTH: usize = 32;

/// Minimum number of unique characters required in a secret.
/// Catches low-entropy values like repeated characters.
const MIN_UNIQUE_CHARS: usize = 10;

/// Deployment environment. Controls the `Secure` cookie flag and whether
/// localhost origins are admitted to the redirect/CORS allowlists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" => Ok(Environment::Production),
            other => Err(ConfigError::new(format!(
                "ENVIRONMENT must be one of development, test, production (got '{other}')"
            ))),
        }
    }
}

/// A startup configuration problem. The message names the offending
/// variable; main logs it and exits with code 1.
#[derive(Debug)]
pub struct ConfigError(String);

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        ConfigError(message.into())
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Immutable service configuration, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_port: u16,
    pub database_url: String,
    /// Secret used to sign bearer tokens. Shared with sibling services.
    pub signing_secret: String,
    /// Secret used to sign CSRF tokens. Falls back to the signing secret.
    pub csrf_secret: String,
    /// Value written as the `iss` claim and required on verification.
    pub token_issuer: String,
    /// Parent DNS domain, e.g. `.example.com`. Set as the `Domain` attribute
    /// on the shared auth cookies so sibling subdomains receive them.
    pub cookie_parent_domain: String,
    pub environment: Environment,
    /// Name of the primary bearer-token cookie.
    pub cookie_name: String,
    /// Name of the legacy bearer-token cookie. Read for migration, never set.
    pub legacy_cookie_name: String,
    pub rate_limit_signin_limit: u32,
    pub rate_limit_signin_window: Duration,
    pub session_lifetime: Duration,
    /// Extra exact hosts allowed as `returnTo` redirect targets.
    pub return_to_allowed_hosts: Vec<String>,
}

impl AppConfig {
    /// Loads and validates the full configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_port = parse_or_default("LISTEN_PORT", DEFAULT_LISTEN_PORT)?;
        let database_url = required("DATABASE_URL")?;

        let signing_secret = required("SIGNING_SECRET")?;
        validate_secret("SIGNING_SECRET", &signing_secret)?;

        // CSRF tokens fall back to the signing secret when no dedicated
        // secret is configured.
        let csrf_secret = match optional("CSRF_SECRET") {
            Some(secret) => {
                validate_secret("CSRF_SECRET", &secret)?;
                secret
            }
            None => signing_secret.clone(),
        };

        let token_issuer = required("TOKEN_ISSUER")?;

        let cookie_parent_domain = required("COOKIE_PARENT_DOMAIN")?;
        if parent_domain_labels(&cookie_parent_domain).count() < 2 {
            return Err(ConfigError::new(
                "COOKIE_PARENT_DOMAIN must be a registrable domain like '.example.com'",
            ));
        }

        let environment = Environment::parse(&required("ENVIRONMENT")?)?;

        let rate_limit_signin_limit =
            parse_or_default("RATE_LIMIT_SIGNIN_LIMIT", DEFAULT_RATE_LIMIT_SIGNIN_LIMIT)?;
        if rate_limit_signin_limit == 0 {
            return Err(ConfigError::new("RATE_LIMIT_SIGNIN_LIMIT must be positive"));
        }
        let window_secs = parse_or_default(
            "RATE_LIMIT_SIGNIN_WINDOW",
            DEFAULT_RATE_LIMIT_SIGNIN_WINDOW_SECS,
        )?;
        if window_secs == 0 {
            return Err(ConfigError::new("RATE_LIMIT_SIGNIN_WINDOW must be positive"));
        }

        let lifetime_secs = parse_or_default("SESSION_LIFETIME", DEFAULT_SESSION_LIFETIME_SECS)?;
        if lifetime_secs == 0 {
            return Err(ConfigError::new("SESSION_LIFETIME must be positive"));
        }

        let return_to_allowed_hosts = optional("RETURN_TO_ALLOWED_HOSTS")
            .map(|raw| {
                raw.split(',')
                    .map(|host| host.trim().to_ascii_lowercase())
                    .filter(|host| !host.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(AppConfig {
            listen_port,
            database_url,
            signing_secret,
            csrf_secret,
            token_issuer,
            cookie_parent_domain,
            environment,
            cookie_name: optional("COOKIE_NAME")
                .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string()),
            legacy_cookie_name: optional("LEGACY_COOKIE_NAME")
                .unwrap_or_else(|| DEFAULT_LEGACY_COOKIE_NAME.to_string()),
            rate_limit_signin_limit,
            rate_limit_signin_window: Duration::from_secs(window_secs),
            session_lifetime: Duration::from_secs(lifetime_secs),
            return_to_allowed_hosts,
        })
    }

    /// Parent domain without its leading dot, e.g. `example.com`.
    /// This is the form used for the cookie `Domain` attribute and for
    /// host matching.
    pub fn parent_domain(&self) -> &str {
        self.cookie_parent_domain.trim_start_matches('.')
    }

    /// Whether cookies must carry the `Secure` flag.
    pub fn cookies_secure(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Whether a host is an acceptable redirect target or browser origin:
    /// the parent domain itself, a direct (single-label) subdomain of it, an
    /// explicitly allowlisted host, or localhost outside production.
    pub fn host_is_trusted(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let parent = self.parent_domain();

        if host == parent {
            return true;
        }
        if let Some(label) = host.strip_suffix(parent).and_then(|h| h.strip_suffix('.')) {
            // Exactly one extra label: `app.example.com` yes,
            // `a.b.example.com` no.
            if !label.is_empty() && !label.contains('.') {
                return true;
            }
        }
        if self.return_to_allowed_hosts.iter().any(|h| h == &host) {
            return true;
        }
        if self.environment != Environment::Production {
            return host == "localhost" || host == "127.0.0.1";
        }
        false
    }
}

/// Shared application state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
    pub limiter: Arc<RateLimiter>,
    pub csrf: Arc<CsrfProtect>,
}

impl AppState {
    pub fn new(pool: DbPool, config: Arc<AppConfig>) -> Self {
        let codec = Arc::new(TokenCodec::new(&config.signing_secret, &config.token_issuer));
        let auth = AuthService::new(pool.clone(), codec, config.session_lifetime);
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_signin_limit,
            config.rate_limit_signin_window,
        ));
        let csrf = Arc::new(CsrfProtect::new(&config.csrf_secret));
        AppState {
            pool,
            config,
            auth,
            limiter,
            csrf,
        }
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> DbPool {
        state.pool.clone()
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::new(format!(
            "{key} environment variable not set"
        ))),
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or_default<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::new(format!("{key} has an invalid value: '{raw}'"))),
        None => Ok(default),
    }
}

fn parent_domain_labels(domain: &str) -> impl Iterator<Item = &str> {
    domain
        .trim_start_matches('.')
        .split('.')
        .filter(|label| !label.is_empty())
}

/// Rejects secrets that are too short or too uniform to have been generated
/// randomly.
fn validate_secret(key: &str, secret: &str) -> Result<(), ConfigError> {
    if secret.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::new(format!(
            "{key} must be at least {MIN_SECRET_LENGTH} characters; generate one with `openssl rand -base64 48`"
        )));
    }
    let unique_chars = secret.chars().collect::<HashSet<_>>().len();
    if unique_chars < MIN_UNIQUE_CHARS {
        return Err(ConfigError::new(format!(
            "{key} must contain at least {MIN_UNIQUE_CHARS} unique characters"
        )));
    }
    Ok(())
}
