//! Authentication service - Handles registration, login and token checks.
//!
//! Uses the domain `Password` value object for hashing and publishes
//! identity events after the store write commits.

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use bus::EventPublisher;
use common::{AppError, AppResult};
use domain::{
    normalize_email, validate_email, validate_name, DomainEvent, NewIdentity, Password,
};

use super::token::{Claims, TokenIssuer};
use crate::repository::IdentityRepository;

/// Hash compared against when the email is unknown, so both login failure
/// paths do the same work.
static DUMMY_HASH: Lazy<Option<Password>> =
    Lazy::new(|| Password::hash_unchecked("timing-equalisation-placeholder").ok());

/// Result of a successful register or login.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: Uuid,
    pub email: String,
}

/// Authentication service trait for dependency injection.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Register a new identity and return a session token
    async fn register(&self, email: String, password: String, name: String)
        -> AppResult<AuthSession>;

    /// Check credentials and return a session token
    async fn login(&self, email: String, password: String) -> AppResult<AuthSession>;

    /// Verify JWT token and extract claims. Never touches the store.
    fn verify_token(&self, token: &str) -> AppResult<Claims>;
}

/// Concrete implementation of AuthService.
pub struct Authenticator {
    identities: Arc<dyn IdentityRepository>,
    publisher: EventPublisher,
    tokens: TokenIssuer,
}

impl Authenticator {
    pub fn new(
        identities: Arc<dyn IdentityRepository>,
        publisher: EventPublisher,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            identities,
            publisher,
            tokens,
        }
    }
}

#[async_trait]
impl AuthService for Authenticator {
    async fn register(
        &self,
        email: String,
        password: String,
        name: String,
    ) -> AppResult<AuthSession> {
        let email = normalize_email(&email);
        validate_email(&email)?;
        let name = validate_name(&name)?;
        let password_hash = Password::new(&password)?.into_string();

        if self.identities.find_by_email(&email).await?.is_some() {
            return Err(AppError::conflict("Email"));
        }

        let identity = self
            .identities
            .create(NewIdentity {
                email,
                password_hash,
                name,
            })
            .await?;
        let token = self.tokens.issue(&identity)?;

        info!(user_id = %identity.id, "Identity registered");
        self.publisher
            .publish(&DomainEvent::user_registered(
                identity.id.to_string(),
                &identity.email,
                &identity.name,
            ))
            .await;

        Ok(AuthSession {
            token,
            user_id: identity.id,
            email: identity.email,
        })
    }

    async fn login(&self, email: String, password: String) -> AppResult<AuthSession> {
        let email = normalize_email(&email);
        let found = self.identities.find_by_email(&email).await?;

        let identity = match found {
            Some(identity) if Password::from_hash(identity.password_hash.as_str()).verify(&password) => {
                identity
            }
            Some(_) => return Err(AppError::InvalidCredentials),
            None => {
                if let Some(dummy) = DUMMY_HASH.as_ref() {
                    dummy.verify(&password);
                }
                return Err(AppError::InvalidCredentials);
            }
        };

        let now = Utc::now();
        self.identities.record_login(identity.id, now).await?;
        let token = self.tokens.issue(&identity)?;

        info!(user_id = %identity.id, "Login succeeded");
        self.publisher
            .publish(&DomainEvent::user_logged_in(
                identity.id.to_string(),
                &identity.email,
            ))
            .await;

        Ok(AuthSession {
            token,
            user_id: identity.id,
            email: identity.email,
        })
    }

    fn verify_token(&self, token: &str) -> AppResult<Claims> {
        self.tokens.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockIdentityRepository;
    use bus::InMemoryBus;
    use common::JwtConfig;
    use domain::Identity;
    use std::time::Duration;

    fn tokens() -> TokenIssuer {
        TokenIssuer::new(&JwtConfig {
            secret: "unit-test-secret-that-is-long-enough".to_string(),
            expiration_hours: 24,
        })
    }

    fn service(repo: MockIdentityRepository) -> Authenticator {
        let publisher = EventPublisher::new(Arc::new(InMemoryBus::new()), Duration::from_millis(50));
        Authenticator::new(Arc::new(repo), publisher, tokens())
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_input_before_store() {
        // No expectations: any repository call would panic.
        let auth = service(MockIdentityRepository::new());

        let err = auth
            .register("bad-email".into(), "Password123".into(), "A".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = auth
            .register("a@x.com".into(), "short".into(), "A".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = auth
            .register("a@x.com".into(), "Password123".into(), "  ".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_register_normalizes_email_and_detects_duplicate() {
        let mut repo = MockIdentityRepository::new();
        repo.expect_find_by_email()
            .withf(|email| email == "alice@example.com")
            .times(1)
            .returning(|email| {
                Ok(Some(Identity::new(email.to_string(), "hash".into(), "Alice".into())))
            });
        repo.expect_create().never();

        let err = service(repo)
            .register("  Alice@Example.com ".into(), "Password123".into(), "Alice".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_login_unknown_email_is_invalid_credentials() {
        let mut repo = MockIdentityRepository::new();
        repo.expect_find_by_email().returning(|_| Ok(None));
        repo.expect_record_login().never();

        let err = service(repo)
            .login("nobody@x.com".into(), "Password123".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_wrong_password_matches_unknown_email() {
        let hash = Password::new("Password123").unwrap().into_string();
        let mut repo = MockIdentityRepository::new();
        repo.expect_find_by_email()
            .returning(move |email| Ok(Some(Identity::new(email.to_string(), hash.clone(), "A".into()))));
        repo.expect_record_login().never();

        let err = service(repo)
            .login("a@x.com".into(), "WrongPassword".into())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), AppError::InvalidCredentials.to_string());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut repo = MockIdentityRepository::new();
        repo.expect_find_by_email()
            .returning(|_| Err(AppError::transport("connection refused")));

        let err = service(repo)
            .login("a@x.com".into(), "Password123".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
    }
}
