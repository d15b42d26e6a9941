//! Constants for the SmartCampus API
//!
//! Centralizing defaults makes them easy to find, modify, and test.

// ============================================================================
// SERVER
// ============================================================================

/// Default listening port.
pub const DEFAULT_PORT: u16 = 10000;

/// Default bind host.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default broadcast channel capacity for domain events.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Default JWT token expiration time in seconds (7 days)
pub const DEFAULT_JWT_EXPIRATION_SECS: i64 = 7 * 24 * 60 * 60;

/// Default tolerance for clock drift when validating `exp`.
pub const DEFAULT_JWT_CLOCK_SKEW_SECS: i64 = 60;

/// Minimum required length for JWT secret keys in production.
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Placeholder secret used outside production when `JWT_SECRET` is unset.
pub const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

/// PBKDF2 rounds applied when hashing passwords.
pub const PASSWORD_HASH_ROUNDS: u32 = 10_000;

// ============================================================================
// CORS
// ============================================================================

/// Origins allowed when `CAMPUS_CORS_ORIGINS` is unset.
pub const DEFAULT_CORS_ORIGINS: [&str; 2] = [
    "http://localhost:3000",
    "https://smart-campus-alpha.vercel.app",
];

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// Minutes between notification checks (`*/2 * * * *`).
pub const NOTIFICATION_CHECK_EVERY_MINUTES: u32 = 2;

/// How far ahead of an appointment the reminder goes out.
pub const DEFAULT_REMINDER_LEAD_MINUTES: i64 = 30;
