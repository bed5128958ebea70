//! Domain-level constants.
//!
//! These constants define business rules and validation requirements.

// =============================================================================
// Validation
// =============================================================================

/// Minimum password length requirement
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Minimum name length requirement
pub const MIN_NAME_LENGTH: usize = 1;

/// Maximum todo title length
pub const MAX_TODO_TITLE_LENGTH: usize = 200;

/// Maximum todo description length
pub const MAX_TODO_DESCRIPTION_LENGTH: usize = 1000;

// =============================================================================
// Todos
// =============================================================================

/// Category assigned when a todo is created without one
pub const DEFAULT_TODO_CATEGORY: &str = "general";

/// Page size used by `GetTodos` when the caller sets no limit
pub const DEFAULT_TODO_LIST_LIMIT: u32 = 50;

// =============================================================================
// Profiles
// =============================================================================

/// Theme stored on a freshly materialised profile
pub const DEFAULT_THEME: &str = "light";

// =============================================================================
// Authentication
// =============================================================================

/// Default JWT token expiration in hours
pub const DEFAULT_JWT_EXPIRATION_HOURS: i64 = 24;

/// Minimum JWT secret length (security requirement)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Seconds per hour (for token expiration calculation)
pub const SECONDS_PER_HOUR: i64 = 3600;

/// Authorization header prefix for Bearer tokens
pub const BEARER_TOKEN_PREFIX: &str = "Bearer ";
