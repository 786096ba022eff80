//! Session management: JWT access tokens, cron tokens, sign-up and login

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::domain::accounts;
use crate::services::Actor;
use crate::services::error::ServiceError;

const ACCESS_TOKEN_EXPIRY_DAYS: i64 = 7;
const PASSWORD_MIN_CHARS: usize = 6;
const PASSWORD_MAX_CHARS: usize = 128;

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id as string
    pub account: i64,
    pub exp: i64,
    pub iat: i64,
}

/// Claims of a token minted by the external scheduler
#[derive(Debug, Serialize, Deserialize)]
pub struct CronClaims {
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug)]
pub enum SessionError {
    InvalidToken,
    Expired,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::InvalidToken => write!(f, "Invalid token"),
            SessionError::Expired => write!(f, "Token expired"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Create a JWT access token for a user acting on an account
pub fn create_access_token(actor: Actor, secret: &[u8]) -> Result<String, SessionError> {
    let now = Utc::now();
    let exp = now + Duration::days(ACCESS_TOKEN_EXPIRY_DAYS);

    let claims = Claims {
        sub: actor.user_id.to_string(),
        account: actor.account_id,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret))
        .map_err(|_| SessionError::InvalidToken)
}

/// Validate a JWT access token and return who it was issued to
pub fn validate_access_token(token: &str, secret: &[u8]) -> Result<Actor, SessionError> {
    // HS256 only, to rule out algorithm confusion
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub", "iat"]);

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(classify)?;

    let user_id = token_data
        .claims
        .sub
        .parse::<i64>()
        .map_err(|_| SessionError::InvalidToken)?;

    Ok(Actor {
        user_id,
        account_id: token_data.claims.account,
    })
}

/// Validate a scheduler token signed with the cron secret
pub fn validate_cron_token(token: &str, secret: &[u8]) -> Result<(), SessionError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "iat"]);

    decode::<CronClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|_| ())
        .map_err(classify)
}

fn classify(e: jsonwebtoken::errors::Error) -> SessionError {
    tracing::debug!(error = %e, "JWT decode error");
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
        _ => SessionError::InvalidToken,
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let email = self.email.trim();
        let valid_email = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
            }
            None => false,
        };
        if !valid_email || email.contains(char::is_whitespace) {
            return Err(ServiceError::Validation("A valid email is required".to_string()));
        }

        let len = self.password.chars().count();
        if !(PASSWORD_MIN_CHARS..=PASSWORD_MAX_CHARS).contains(&len) {
            return Err(ServiceError::Validation(
                "Password must be between 6 and 128 characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// Create a user with a personal account, membership and empty profile.
pub async fn signup(db: &PgPool, request: &SignupRequest) -> Result<Actor, ServiceError> {
    request.validate()?;
    let email = request.email.trim().to_lowercase();
    let password_hash = hash_password(request.password.clone()).await?;

    let mut tx = db.begin().await?;

    let user_id = accounts::insert_user(&mut *tx, &email, &password_hash)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                ServiceError::AlreadyExists
            }
            other => ServiceError::Database(other),
        })?;
    let account_name = email.split('@').next().unwrap_or_default();
    let account_id = accounts::insert_account(&mut *tx, account_name).await?;
    accounts::insert_member(&mut *tx, account_id, user_id).await?;
    accounts::insert_profile(&mut *tx, user_id).await?;

    tx.commit().await?;

    tracing::info!(user_id, account_id, "Signed up");
    Ok(Actor { user_id, account_id })
}

/// Check the password and return the user with their first account
pub async fn login(db: &PgPool, request: &SignupRequest) -> Result<Actor, ServiceError> {
    let email = request.email.trim().to_lowercase();
    let login = accounts::find_login(db, &email)
        .await?
        .ok_or(ServiceError::InvalidCredentials)?;

    if !verify_password(request.password.clone(), login.password_hash).await? {
        return Err(ServiceError::InvalidCredentials);
    }

    Ok(Actor {
        user_id: login.id,
        account_id: login.account_id,
    })
}

/// bcrypt is CPU bound, so it runs on the blocking pool
async fn hash_password(password: String) -> Result<String, ServiceError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?
        .map_err(|e| ServiceError::Internal(e.to_string()))
}

async fn verify_password(password: String, hash: String) -> Result<bool, ServiceError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?
        .map_err(|e| ServiceError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn access_token_round_trip() {
        let actor = Actor {
            user_id: 42,
            account_id: 7,
        };
        let token = create_access_token(actor, SECRET).unwrap();
        assert_eq!(validate_access_token(&token, SECRET).unwrap(), actor);
        assert!(matches!(
            validate_access_token(&token, b"other"),
            Err(SessionError::InvalidToken)
        ));
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let claims = Claims {
            sub: "1".into(),
            account: 1,
            exp: Utc::now().timestamp() - 3600,
            iat: Utc::now().timestamp() - 7200,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap();
        assert!(matches!(
            validate_access_token(&token, SECRET),
            Err(SessionError::Expired)
        ));
    }

    #[test]
    fn cron_token_needs_cron_secret() {
        let now = Utc::now().timestamp();
        let claims = CronClaims {
            exp: now + 300,
            iat: now,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"cron")).unwrap();
        assert!(validate_cron_token(&token, b"cron").is_ok());
        assert!(validate_cron_token(&token, SECRET).is_err());
    }

    #[test]
    fn signup_request_validation() {
        let request = |email: &str, password: &str| SignupRequest {
            email: email.into(),
            password: password.into(),
        };
        assert!(request("ana@example.com", "hunter22").validate().is_ok());
        assert!(request("ana@example", "hunter22").validate().is_err());
        assert!(request("@example.com", "hunter22").validate().is_err());
        assert!(request("ana @example.com", "hunter22").validate().is_err());
        assert!(request("ana@example.com", "short").validate().is_err());
        assert!(request("ana@example.com", &"p".repeat(129)).validate().is_err());
    }

    #[tokio::test]
    async fn password_hash_verifies() {
        let hash = hash_password("hunter22".into()).await.unwrap();
        assert!(verify_password("hunter22".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("hunter23".into(), hash).await.unwrap());
    }
}
