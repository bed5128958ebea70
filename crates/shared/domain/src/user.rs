//! User projection owned by the user service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_THEME;

/// Display preferences stored on a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Preferences {
    /// UI theme name
    pub theme: String,
    /// Whether the user wants notifications
    pub notifications: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.to_string(),
            notifications: true,
        }
    }
}

/// Service-local view of a registered user.
///
/// `id` equals the identity id issued by the auth service. `todo_count` is
/// maintained only by consuming todo events and may lag the todo store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub bio: String,
    pub preferences: Preferences,
    pub todo_count: u64,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Fresh projection built from a registration event.
    pub fn registered(id: String, email: String, name: String, todo_count: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            email,
            name,
            bio: String::new(),
            preferences: Preferences::default(),
            todo_count,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial profile update.
    pub fn apply(&mut self, update: ProfileUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(bio) = update.bio {
            self.bio = bio;
        }
        if let Some(preferences) = update.preferences {
            self.preferences = preferences;
        }
        self.updated_at = Utc::now();
    }

    /// Record a login time unless a later one is already stored.
    /// Returns whether the value changed.
    pub fn record_login(&mut self, at: DateTime<Utc>) -> bool {
        match self.last_login {
            Some(current) if current >= at => false,
            _ => {
                self.last_login = Some(at);
                true
            }
        }
    }
}

/// Partial update of the mutable profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub preferences: Option<Preferences>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.bio.is_none() && self.preferences.is_none()
    }
}

/// Profile as returned to HTTP clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    /// User identifier
    pub id: String,
    /// Email address
    pub email: String,
    /// Display name
    pub name: String,
    /// Free-form biography
    pub bio: String,
    /// Display preferences
    pub preferences: Preferences,
    /// Last successful login, if any has been observed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    /// Projection creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<&UserProfile> for UserResponse {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id.clone(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            bio: profile.bio.clone(),
            preferences: profile.preferences.clone(),
            last_login: profile.last_login,
            created_at: profile.created_at,
        }
    }
}

impl From<UserProfile> for UserResponse {
    fn from(profile: UserProfile) -> Self {
        UserResponse::from(&profile)
    }
}
