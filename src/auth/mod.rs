use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::HttpMessage;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::{Session, User};

pub const SESSION_COOKIE: &str = "classroom.session_token";
const ISSUER: &str = "classroom-api";

/// Session token claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // User ID
    pub sid: String, // Session ID
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub jti: String,
}

/// Auth flow failures, mapped to HTTP statuses by the handlers
#[derive(Debug)]
pub enum AuthError {
    InvalidCredentials,
    EmailTaken,
    Validation(String),
    Unauthorized,
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl AuthError {
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidCredentials | AuthError::Unauthorized => 401,
            AuthError::EmailTaken | AuthError::Validation(_) => 422,
            AuthError::Internal(_) => 500,
        }
    }

    /// Message safe to return to clients
    pub fn public_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => "Invalid email or password".to_string(),
            AuthError::EmailTaken => "User already exists".to_string(),
            AuthError::Validation(msg) => msg.clone(),
            AuthError::Unauthorized => "Unauthorized".to_string(),
            AuthError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Internal(e) => write!(f, "internal auth error: {}", e),
            other => write!(f, "{}", other.public_message()),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<Box<dyn std::error::Error + Send + Sync>> for AuthError {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        AuthError::Internal(e)
    }
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AuthError::Internal(Box::new(e))
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AuthError::Internal(Box::new(e))
    }
}

/// Password hashing and session token issuance
pub struct AuthService {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Hash a password using bcrypt
    pub fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        bcrypt::hash(password, self.config.bcrypt_cost)
    }

    /// Verify a password against its hash
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
        bcrypt::verify(password, hash)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::days(self.config.session_expiration_days)
    }

    /// Issue a signed token for `user` and the session row that backs it
    pub fn issue_session(
        &self,
        user: &User,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<(String, Session), jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let expires_at = now + self.session_ttl();
        let session_id = Uuid::new_v4();

        let claims = Claims {
            sub: user.id.to_string(),
            sid: session_id.to_string(),
            role: user.role.as_str().to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            iss: ISSUER.to_string(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        let session = Session {
            id: session_id,
            user_id: user.id,
            token_hash: self.hash_token(&token),
            expires_at,
            ip_address: ip_address.map(|s| s.to_string()),
            user_agent: user_agent.map(|s| s.to_string()),
            created_at: now,
        };

        Ok((token, session))
    }

    /// Validate signature, issuer and expiry of a session token
    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "sub", "iat"]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }

    /// Hash a token for storage (using SHA-256)
    pub fn hash_token(&self, token: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// HttpOnly cookie carrying the session token
    pub fn session_cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, token.to_string())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::days(self.config.session_expiration_days))
            .finish()
    }

    /// Expired cookie that clears the session token
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build(SESSION_COOKIE, "")
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .finish();
        cookie.make_removal();
        cookie
    }
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Extract token from request headers
pub fn extract_token_from_request(req: &impl HttpMessage) -> Option<String> {
    // Try Authorization header first
    if let Some(auth_header) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = extract_bearer_token(auth_str) {
                return Some(token.to_string());
            }
        }
    }

    // Session cookie as fallback
    if let Some(cookie_header) = req.headers().get("cookie") {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some((name, value)) = cookie.trim().split_once('=') {
                    if name == SESSION_COOKIE && !value.is_empty() {
                        return Some(value.to_string());
                    }
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use actix_web::test::TestRequest;

    fn service() -> AuthService {
        AuthService::new(AuthConfig {
            secret: "test-secret".to_string(),
            session_expiration_days: 7,
            bcrypt_cost: 4,
        })
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@school.edu".to_string(),
            email_verified: false,
            image: None,
            role: UserRole::Teacher,
            image_cld_pub_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn password_hash_verifies() {
        let auth = service();
        let hash = auth.hash_password("CorrectHorse9").unwrap();
        assert!(auth.verify_password("CorrectHorse9", &hash).unwrap());
        assert!(!auth.verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn issued_token_validates_and_matches_session() {
        let auth = service();
        let user = user();
        let (token, session) = auth.issue_session(&user, Some("127.0.0.1"), None).unwrap();

        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.sid, session.id.to_string());
        assert_eq!(claims.role, "teacher");
        assert_eq!(session.token_hash, auth.hash_token(&token));
        assert!(session.expires_at > session.created_at);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = AuthService::new(AuthConfig {
            secret: "another-secret".to_string(),
            session_expiration_days: 7,
            bcrypt_cost: 4,
        });
        let (token, _) = other.issue_session(&user(), None, None).unwrap();
        assert!(service().validate_token(&token).is_err());
    }

    #[test]
    fn token_extracted_from_bearer_or_cookie() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def"))
            .to_http_request();
        assert_eq!(extract_token_from_request(&req).as_deref(), Some("abc.def"));

        let req = TestRequest::default()
            .insert_header(("Cookie", "theme=dark; classroom.session_token=xyz"))
            .to_http_request();
        assert_eq!(extract_token_from_request(&req).as_deref(), Some("xyz"));

        let req = TestRequest::default().to_http_request();
        assert!(extract_token_from_request(&req).is_none());
    }

    #[test]
    fn auth_errors_map_to_statuses() {
        assert_eq!(AuthError::InvalidCredentials.status_code(), 401);
        assert_eq!(AuthError::EmailTaken.status_code(), 422);
        let internal = AuthError::Internal("db down".into());
        assert_eq!(internal.status_code(), 500);
        assert_eq!(internal.public_message(), "An internal error occurred");
    }
}
