//! Caller identity decoded from a bearer access token.
//!
//! The request-handling layer builds an `AuthContext` once per call and
//! passes it explicitly to whatever needs the caller's identity.

use crate::{auth::jwt::JwtService, error::AppError};
use axum::http::{header, HeaderMap};
use uuid::Uuid;

/// 认证上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub username: String,
}

impl AuthContext {
    /// Validate the bearer access token in `headers`
    pub fn authenticate(headers: &HeaderMap, jwt: &JwtService) -> Result<Self, AppError> {
        let token = extract_token(headers)?;
        Self::from_access_token(token, jwt)
    }

    pub fn from_access_token(token: &str, jwt: &JwtService) -> Result<Self, AppError> {
        let claims = jwt.validate_access_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;

        Ok(Self {
            user_id,
            username: claims.username.unwrap_or_default(),
        })
    }
}

/// 从 Authorization 头提取令牌
pub fn extract_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use secrecy::Secret;

    fn jwt() -> JwtService {
        JwtService::from_config(&JwtConfig {
            secret: Secret::new("test_secret_key_32_characters_long!".to_string()),
            access_token_exp_secs: 900,
            refresh_token_multiplier: 24,
        })
        .unwrap()
    }

    #[test]
    fn test_extract_token_valid() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer test_token_123".parse().unwrap());

        assert_eq!(extract_token(&headers).unwrap(), "test_token_123");
    }

    #[test]
    fn test_extract_token_missing() {
        let headers = HeaderMap::new();
        assert!(extract_token(&headers).is_err());
    }

    #[test]
    fn test_extract_token_invalid_format() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "InvalidFormat".parse().unwrap());
        assert!(extract_token(&headers).is_err());

        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert!(extract_token(&headers).is_err());
    }

    #[test]
    fn test_authenticate_access_token() {
        let jwt = jwt();
        let user_id = Uuid::new_v4();
        let token = jwt.generate_access_token(&user_id, "alice").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());

        let ctx = AuthContext::authenticate(&headers, &jwt).unwrap();
        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.username, "alice");
    }

    #[test]
    fn test_refresh_token_not_accepted() {
        let jwt = jwt();
        let token = jwt.generate_refresh_token(&Uuid::new_v4()).unwrap();
        assert!(matches!(
            AuthContext::from_access_token(&token, &jwt),
            Err(AppError::Unauthorized)
        ));
    }
}
