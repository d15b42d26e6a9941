//! Authentication Module
//!
//! Bearer JWT authentication for the SmartCampus API. Tokens arrive either in
//! the `Authorization` header of a GraphQL HTTP request or in the
//! `Authorization`/`authorization` connection parameter of a GraphQL
//! WebSocket handshake.
//!
//! A missing or invalid token never fails the transport: it decodes to an
//! anonymous [`AuthContext`] and individual resolvers decide whether a
//! principal is required.

use crate::constants::{
    DEFAULT_JWT_CLOCK_SKEW_SECS, DEFAULT_JWT_EXPIRATION_SECS, INSECURE_DEFAULT_SECRET,
    MIN_JWT_SECRET_LENGTH,
};
use crate::error::{ApiError, ApiResult};
use campus_core::{EntityId, User, UserRole};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock abstraction for JWT time validation.
///
/// Time checks are done here instead of inside `jsonwebtoken` so tests can
/// inject a fixed instant.
pub trait JwtClock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// JWT SECRET (TYPE-SAFE)
// ============================================================================

/// JWT signing secret that never shows up in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Create a new JWT secret.
    ///
    /// # Errors
    /// Returns error if the secret is empty.
    pub fn new(secret: String) -> ApiResult<Self> {
        if secret.trim().is_empty() {
            return Err(ApiError::missing_field("jwt_secret"));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    fn insecure_default() -> Self {
        Self(SecretString::new(INSECURE_DEFAULT_SECRET.to_string().into()))
    }

    /// Expose the secret value (only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared secret for signing and verification (HS256)
    pub jwt_secret: JwtSecret,

    pub jwt_algorithm: Algorithm,

    /// Token lifetime in seconds (default: 7 days)
    pub jwt_expiration_secs: i64,

    /// Tolerance for clock drift when checking `exp` (default: 60)
    pub jwt_clock_skew_secs: i64,

    /// Clock for JWT time validation (injected for testing)
    pub clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: JwtSecret::insecure_default(),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: DEFAULT_JWT_EXPIRATION_SECS,
            jwt_clock_skew_secs: DEFAULT_JWT_CLOCK_SKEW_SECS,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: JWT signing secret
    /// - `CAMPUS_JWT_EXPIRATION_SECS`: token lifetime (default: 604800)
    /// - `CAMPUS_JWT_CLOCK_SKEW_SECS`: clock skew tolerance (default: 60)
    pub fn from_env() -> Self {
        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .and_then(|s| JwtSecret::new(s).ok())
            .unwrap_or_else(JwtSecret::insecure_default);

        Self {
            jwt_secret,
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: std::env::var("CAMPUS_JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_JWT_EXPIRATION_SECS),
            jwt_clock_skew_secs: std::env::var("CAMPUS_JWT_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_JWT_CLOCK_SKEW_SECS),
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a config with an explicit secret, used by tests and tooling.
    pub fn with_secret(secret: impl Into<String>) -> ApiResult<Self> {
        Ok(Self {
            jwt_secret: JwtSecret::new(secret.into())?,
            ..Default::default()
        })
    }

    /// Refuse to start in production with a missing or weak secret.
    ///
    /// Outside production the insecure default is accepted with a warning.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        let is_production = crate::config::is_production_environment();

        if self.jwt_secret.is_insecure_default() {
            if is_production {
                return Err(ApiError::invalid_input(
                    "Cannot start server in production without JWT_SECRET",
                ));
            }
            tracing::warn!(
                "Using insecure default JWT secret. Set JWT_SECRET before deploying."
            );
            return Ok(());
        }

        if self.jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "JWT secret is too short for production use ({} chars). \
                     It must be at least {} characters long.",
                    self.jwt_secret.len(),
                    MIN_JWT_SECRET_LENGTH
                )));
            }
            tracing::warn!(
                secret_len = self.jwt_secret.len(),
                "JWT secret is short; use at least {} characters in production",
                MIN_JWT_SECRET_LENGTH
            );
        }

        Ok(())
    }
}

// ============================================================================
// JWT CLAIMS
// ============================================================================

/// JWT claims issued at login/registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    pub email: String,

    pub role: UserRole,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn for_user(user: &User, expiration_secs: i64, clock: &dyn JwtClock) -> Self {
        let now = clock.now_epoch_secs();
        Self {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now + expiration_secs,
        }
    }

    pub fn is_expired(&self, clock: &dyn JwtClock) -> bool {
        self.exp < clock.now_epoch_secs()
    }
}

// ============================================================================
// AUTHENTICATION CONTEXT
// ============================================================================

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: EntityId,
    pub email: String,
    pub role: UserRole,
}

impl TryFrom<Claims> for Principal {
    type Error = ApiError;

    fn try_from(claims: Claims) -> ApiResult<Self> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ApiError::invalid_token("Token subject is not a valid id"))?;
        Ok(Self {
            user_id,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// Per-request authentication context handed to resolvers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub principal: Option<Principal>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// The principal, or an Unauthorized error for anonymous callers.
    pub fn require(&self) -> ApiResult<&Principal> {
        self.principal
            .as_ref()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }

    /// The principal if it holds one of `roles`.
    pub fn require_role(&self, roles: &[UserRole]) -> ApiResult<&Principal> {
        let principal = self.require()?;
        if roles.contains(&principal.role) {
            Ok(principal)
        } else {
            Err(ApiError::forbidden(format!(
                "Role {} may not perform this operation",
                principal.role
            )))
        }
    }

    pub fn role(&self) -> Option<UserRole> {
        self.principal.as_ref().map(|p| p.role)
    }
}

// ============================================================================
// AUTHENTICATION FUNCTIONS
// ============================================================================

fn validate_claim_times(now: i64, exp: i64, leeway_secs: i64) -> ApiResult<()> {
    if exp < now - leeway_secs {
        return Err(ApiError::token_expired());
    }
    Ok(())
}

/// Validate a JWT token and extract claims.
///
/// Signature is checked by `jsonwebtoken`; expiry is checked against the
/// configured clock.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

    let token_data =
        decode::<Claims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            jsonwebtoken::errors::ErrorKind::InvalidToken => {
                ApiError::invalid_token("Token is invalid")
            }
            _ => ApiError::invalid_token(format!("Token validation failed: {}", e)),
        })?;

    let claims = token_data.claims;

    let now = config.clock.now_epoch_secs();
    if now < 0 {
        tracing::error!(
            timestamp = now,
            "System clock returned pre-epoch time - server time is broken"
        );
        return Err(ApiError::internal_error(
            "Server time configuration error - please contact support",
        ));
    }

    validate_claim_times(now, claims.exp, config.jwt_clock_skew_secs)?;

    Ok(claims)
}

/// Issue a signed token for `user`.
pub fn generate_jwt_token(config: &AuthConfig, user: &User) -> ApiResult<String> {
    let claims = Claims::for_user(user, config.jwt_expiration_secs, &*config.clock);

    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    let header = Header::new(config.jwt_algorithm);

    encode(&header, &claims, &encoding_key)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}

/// Extract the token from a `Bearer <token>` value.
///
/// Returns `None` for an empty value, a different scheme, or a blank token.
pub fn bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.trim().splitn(2, ' ');
    let scheme = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = parts.next()?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Decode an optional `Authorization` value into an [`AuthContext`].
///
/// Absent credentials are anonymous. Invalid credentials are anonymous too,
/// with a warning logged.
pub fn decode_principal(config: &AuthConfig, authorization: Option<&str>) -> AuthContext {
    let Some(token) = authorization.and_then(bearer_token) else {
        return AuthContext::anonymous();
    };

    match validate_jwt_token(config, token).and_then(Principal::try_from) {
        Ok(principal) => AuthContext::authenticated(principal),
        Err(e) => {
            tracing::warn!(code = %e.code, error = %e.message, "Rejected bearer token");
            AuthContext::anonymous()
        }
    }
}

/// Decode the `connection_init` payload of a GraphQL WebSocket handshake.
///
/// Both `Authorization` and `authorization` keys are accepted.
pub fn decode_connection_params(config: &AuthConfig, params: &serde_json::Value) -> AuthContext {
    // An empty `Authorization` falls through to the lowercase key.
    let authorization = ["Authorization", "authorization"]
        .into_iter()
        .filter_map(|key| params.get(key).and_then(|v| v.as_str()))
        .find(|value| !value.is_empty());
    decode_principal(config, authorization)
}
