//! JWT issuance and verification.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{AppResult, JwtConfig};
use domain::Identity;

/// JWT claims payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 token signer bound to one secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiration_hours: i64,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            expiration_hours: config.expiration_hours,
        }
    }

    /// Issue a token binding the identity's id and email.
    pub fn issue(&self, identity: &Identity) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: identity.id,
            email: identity.email.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.expiration_hours)).timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Check signature and expiry.
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    fn issuer(secret: &str, hours: i64) -> TokenIssuer {
        TokenIssuer::new(&JwtConfig {
            secret: secret.to_string(),
            expiration_hours: hours,
        })
    }

    fn identity() -> Identity {
        Identity::new("a@x.com".into(), "hash".into(), "A".into())
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = issuer("an-adequately-long-test-secret-value!", 24);
        let identity = identity();

        let claims = issuer.verify(&issuer.issue(&identity).unwrap()).unwrap();
        assert_eq!(claims.sub, identity.id);
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.exp - claims.iat, 24 * domain::SECONDS_PER_HOUR);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issuer("an-adequately-long-test-secret-value!", 24)
            .issue(&identity())
            .unwrap();
        assert!(issuer("another-adequately-long-secret-value!", 24)
            .verify(&token)
            .is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = issuer("an-adequately-long-test-secret-value!", -1);
        let token = issuer.issue(&identity()).unwrap();
        assert!(issuer.verify(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let issuer = issuer("an-adequately-long-test-secret-value!", 24);
        assert_err!(issuer.verify("not.a.jwt"));
        assert_err!(issuer.verify(""));
    }
}
