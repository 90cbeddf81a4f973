use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::database::models::User;
use crate::database::{CredentialStore, StoreError};

/// Token purpose, carried in the `type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Email at issue time
    pub email: String,
    /// Visual impairment level, so clients can adapt before fetching the profile
    pub accessibility_level: String,
    /// Access or refresh
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
    /// JWT ID (unique identifier for this token)
    pub jti: String,
    /// Issuer
    pub iss: String,
}

/// Access and refresh tokens handed to a client after login
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to generate JWT token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues and checks signed tokens
pub struct TokenService {
    store: Arc<dyn CredentialStore>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        secret: &str,
        issuer: &str,
        access_minutes: i64,
        refresh_days: i64,
    ) -> Self {
        Self {
            store,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            access_ttl: Duration::minutes(access_minutes),
            refresh_ttl: Duration::days(refresh_days),
        }
    }

    pub fn from_config(store: Arc<dyn CredentialStore>, config: &SecurityConfig) -> Self {
        Self::new(
            store,
            &config.jwt_secret,
            &config.jwt_issuer,
            config.access_token_minutes,
            config.refresh_token_days,
        )
    }

    /// Issue a fresh access/refresh pair for a user
    pub fn issue_token_pair(&self, user: &User) -> Result<TokenPair, TokenError> {
        let access_token = self.sign(user, TokenType::Access, self.access_ttl)?;
        let refresh_token = self.sign(user, TokenType::Refresh, self.refresh_ttl)?;

        debug!("Issued token pair for user {}", user.id);
        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    fn sign(&self, user: &User, token_type: TokenType, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            accessibility_level: user.accessibility.visual_impairment_level.as_str().to_string(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Check signature, expiry and issuer only
    pub fn decode_claims(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Rejected token: {}", e);
                None
            }
        }
    }

    /// Claims of a valid token of the expected type whose subject is an active user
    pub fn verify_token(&self, token: &str, expected: TokenType) -> Result<Option<Claims>, TokenError> {
        Ok(self.resolve(token, expected)?.map(|(claims, _)| claims))
    }

    /// The active user an access token belongs to
    pub fn current_user(&self, access_token: &str) -> Result<Option<User>, TokenError> {
        Ok(self.resolve(access_token, TokenType::Access)?.map(|(_, user)| user))
    }

    /// Exchange a refresh token for a new pair
    pub fn refresh(&self, refresh_token: &str) -> Result<Option<TokenPair>, TokenError> {
        match self.resolve(refresh_token, TokenType::Refresh)? {
            Some((_, user)) => Ok(Some(self.issue_token_pair(&user)?)),
            None => Ok(None),
        }
    }

    fn resolve(&self, token: &str, expected: TokenType) -> Result<Option<(Claims, User)>, TokenError> {
        let Some(claims) = self.decode_claims(token) else {
            return Ok(None);
        };

        if claims.token_type != expected {
            debug!("Expected {} token but got {}", expected, claims.token_type);
            return Ok(None);
        }

        // Deactivation takes effect on the next request, without revocation lists
        match self.store.find_by_id(&claims.sub)? {
            Some(user) if user.is_active => Ok(Some((claims, user))),
            Some(_) => {
                debug!("Token subject {} is deactivated", claims.sub);
                Ok(None)
            }
            None => {
                debug!("Token subject {} no longer exists", claims.sub);
                Ok(None)
            }
        }
    }
}
