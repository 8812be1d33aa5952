//! JWT access-token generation and validation.
//!
//! Access tokens are HS256-signed JWTs carrying a [`Claims`] payload whose
//! subject is the login email.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value of the `type` claim on access tokens.
pub const ACCESS_TOKEN_TYPE: &str = "access";

/// Signing secret used when `AUTH_SECRET` is unset. Development only.
const DEV_SECRET: &str = "dev-secret-change-in-production";

/// Default access token expiry in minutes.
const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 60;

/// JWT claims embedded in every access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject -- the authenticated email.
    pub sub: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Token kind; only `"access"` is accepted.
    #[serde(rename = "type")]
    pub token_type: String,
    /// Unique token identifier (UUID v4).
    pub jti: String,
}

/// Configuration for JWT token generation and validation.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 secret used to sign and verify tokens.
    pub secret: String,
    /// Access token lifetime in minutes (default: 60).
    pub access_token_expiry_mins: i64,
}

/// Why a token was refused.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Unexpected token type '{0}'")]
    WrongType(String),
}

impl JwtConfig {
    /// Load JWT configuration from environment variables.
    ///
    /// | Env Var                  | Default          |
    /// |--------------------------|------------------|
    /// | `AUTH_SECRET`            | development key  |
    /// | `AUTH_TOKEN_EXPIRY_MINS` | `60`             |
    pub fn from_env() -> Self {
        let secret = match std::env::var("AUTH_SECRET") {
            Ok(s) if !s.is_empty() => s,
            _ => {
                tracing::warn!("AUTH_SECRET not set, using the development signing key");
                DEV_SECRET.to_string()
            }
        };

        let access_token_expiry_mins: i64 = std::env::var("AUTH_TOKEN_EXPIRY_MINS")
            .unwrap_or_else(|_| DEFAULT_ACCESS_EXPIRY_MINS.to_string())
            .parse()
            .expect("AUTH_TOKEN_EXPIRY_MINS must be a valid i64");

        Self {
            secret,
            access_token_expiry_mins,
        }
    }

    /// Access token lifetime in seconds.
    pub fn expires_in_secs(&self) -> i64 {
        self.access_token_expiry_mins * 60
    }
}

/// Generate an HS256 access token for `subject`.
pub fn generate_access_token(
    subject: &str,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: subject.to_string(),
        exp: now + config.expires_in_secs(),
        iat: now,
        token_type: ACCESS_TOKEN_TYPE.to_string(),
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Validate and decode an access token.
///
/// Checks the signature, expiry and that the token is an access token.
/// Expiry is enforced with no leeway.
pub fn validate_token(token: &str, config: &JwtConfig) -> Result<Claims, TokenError> {
    let mut validation = Validation::default(); // HS256, validates exp
    validation.leeway = 0;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )?;

    let claims = token_data.claims;
    if claims.token_type != ACCESS_TOKEN_TYPE {
        return Err(TokenError::WrongType(claims.token_type));
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 60,
        }
    }

    fn sign(claims: &Claims, config: &JwtConfig) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn generate_and_validate() {
        let config = test_config();
        let token = generate_access_token("test@example.com", &config).unwrap();

        let claims = validate_token(&token, &config).unwrap();
        assert_eq!(claims.sub, "test@example.com");
        assert_eq!(claims.token_type, ACCESS_TOKEN_TYPE);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn expired_token_fails() {
        let config = test_config();
        let now = chrono::Utc::now().timestamp();
        let token = sign(
            &Claims {
                sub: "test@example.com".into(),
                exp: now - 300,
                iat: now - 600,
                token_type: ACCESS_TOKEN_TYPE.into(),
                jti: Uuid::new_v4().to_string(),
            },
            &config,
        );

        assert!(matches!(
            validate_token(&token, &config),
            Err(TokenError::Jwt(_))
        ));
    }

    #[test]
    fn recently_expired_token_fails() {
        let config = test_config();
        let now = chrono::Utc::now().timestamp();
        let token = sign(
            &Claims {
                sub: "test@example.com".into(),
                exp: now - 30,
                iat: now - 3630,
                token_type: ACCESS_TOKEN_TYPE.into(),
                jti: Uuid::new_v4().to_string(),
            },
            &config,
        );

        assert!(matches!(
            validate_token(&token, &config),
            Err(TokenError::Jwt(_))
        ));
    }

    #[test]
    fn non_access_token_is_rejected() {
        let config = test_config();
        let now = chrono::Utc::now().timestamp();
        let token = sign(
            &Claims {
                sub: "test@example.com".into(),
                exp: now + 300,
                iat: now,
                token_type: "refresh".into(),
                jti: Uuid::new_v4().to_string(),
            },
            &config,
        );

        assert!(matches!(
            validate_token(&token, &config),
            Err(TokenError::WrongType(t)) if t == "refresh"
        ));
    }

    #[test]
    fn different_secret_fails() {
        let token = generate_access_token("test@example.com", &test_config()).unwrap();
        let other = JwtConfig {
            secret: "another-secret".into(),
            access_token_expiry_mins: 60,
        };
        assert!(validate_token(&token, &other).is_err());
    }
}
