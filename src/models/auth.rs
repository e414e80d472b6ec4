use serde::{Deserialize, Serialize};

use super::user::UserType;

/// Claims embedded in the JWT access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub role: UserType,
    pub exp: usize,
    pub iat: usize,
}

/// Identity from a validated JWT, available as an Axum extractor
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub role: UserType,
}
