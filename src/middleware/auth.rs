use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::error::AppError;
use crate::models::auth::{AuthenticatedUser, Claims};
use crate::models::user::UserType;

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthenticated("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthenticated("Invalid Authorization header format".into()))?;

        let secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("JWT secret not configured")))?;

        decode_access_token(token, &secret.0)
            .map_err(|_| AppError::Unauthenticated("Invalid or expired token".into()))
    }
}

/// Extension type to carry the JWT secret through request extensions.
#[derive(Clone)]
pub struct JwtSecret(pub String);

pub fn decode_access_token(token: &str, secret: &str) -> Result<AuthenticatedUser, anyhow::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let claims = decode::<Claims>(token, &key, &validation)?.claims;
    if claims.sub.is_empty() {
        anyhow::bail!("token has no subject");
    }

    Ok(AuthenticatedUser {
        user_id: claims.sub,
        role: claims.role,
    })
}

/// Write routes are admin-only.
pub fn require_admin(user: &AuthenticatedUser) -> Result<(), AppError> {
    match user.role {
        UserType::Admin => Ok(()),
        _ => Err(AppError::Forbidden("Admin access required".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let claims = Claims {
            sub: "admin-1".into(),
            role: UserType::Admin,
            iat: 0,
            exp: usize::MAX / 2,
        };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"one"),
        )
        .unwrap();

        assert!(decode_access_token(&token, "two").is_err());
        let user = decode_access_token(&token, "one").unwrap();
        assert_eq!(user.user_id, "admin-1");
        assert!(require_admin(&user).is_ok());
    }

    #[test]
    fn parents_are_not_admins() {
        let user = AuthenticatedUser {
            user_id: "parent_1".into(),
            role: UserType::Parent,
        };
        assert_eq!(require_admin(&user).unwrap_err().kind(), "permission-denied");
    }
}
