use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use super::error::AppError;
use crate::db::{AccessTokenRepo, DbError};
use crate::server::AppState;

/// Bearer tokens are stored as their SHA-256 hex digest.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn new_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    Ok(bcrypt::hash(password, cost)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// The caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub token_hash: String,
}

/// Look up a presented token. Unknown tokens are a 401; store failures are not.
pub async fn resolve_token<R>(db: &R, token: &str) -> Result<AuthUser, AppError>
where
    R: AccessTokenRepo + ?Sized,
{
    let token_hash = hash_token(token);
    let stored = match db.get_token(&token_hash).await {
        Ok(stored) => stored,
        Err(DbError::NotFound(_)) => {
            return Err(AppError::Unauthorized("Invalid or expired token".to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    Ok(AuthUser {
        user_id: stored.user_id,
        token_hash,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        resolve_token(state.db.as_ref(), token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AccessToken, DbResult, SqliteRepository};
    use axum::http::HeaderValue;
    use chrono::Utc;

    struct BrokenStore;

    #[async_trait]
    impl AccessTokenRepo for BrokenStore {
        async fn get_token(&self, _token_hash: &str) -> DbResult<AccessToken> {
            Err(DbError::Sqlx(sqlx::Error::PoolClosed))
        }
        async fn insert_token(&self, _token: &AccessToken) -> DbResult<()> {
            Err(DbError::Sqlx(sqlx::Error::PoolClosed))
        }
        async fn delete_token(&self, _token_hash: &str) -> DbResult<()> {
            Err(DbError::Sqlx(sqlx::Error::PoolClosed))
        }
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let h = hash_token("secret");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_token("secret"));
        assert_ne!(h, hash_token("Secret"));
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("hunter22", 4).unwrap();
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_resolve_token() {
        let db = SqliteRepository::in_memory().await.unwrap();
        db.insert_token(&AccessToken {
            token_hash: hash_token("good"),
            user_id: "u1".to_string(),
            created: Utc::now(),
        })
        .await
        .unwrap();

        let user = resolve_token(&db, "good").await.unwrap();
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.token_hash, hash_token("good"));

        assert!(matches!(
            resolve_token(&db, "bad").await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_unauthorized() {
        let result = resolve_token(&BrokenStore, "good").await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
