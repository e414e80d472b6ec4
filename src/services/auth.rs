use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use tracing::{info, warn};

use super::metrics::LOGINS_COUNTER;
use super::session::{SessionAction, SessionRegistry, SessionState};
use crate::{
    error::{AppError, AppResult},
    models::{
        auth::Claims,
        user::{LoginResponse, User, UserType},
    },
    store::{DataSource, StoreError},
};

pub const PASSWORD_COST: u32 = 12;

/// Which roles a sign-in endpoint hands tokens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInScope {
    /// The admin console.
    Console,
    /// Parent and supervisor mobile apps. Their tokens can read their own
    /// data and register a device token; admin-only routes still refuse them.
    Device,
}

impl SignInScope {
    pub fn allows(self, role: UserType) -> bool {
        match self {
            SignInScope::Console => role == UserType::Admin,
            SignInScope::Device => matches!(role, UserType::Parent | UserType::Supervisor),
        }
    }

    fn denied(self) -> AppError {
        match self {
            SignInScope::Console => AppError::Forbidden("Admin access required".into()),
            SignInScope::Device => AppError::Forbidden("Use the admin console to sign in".into()),
        }
    }
}

pub struct AuthService;

impl AuthService {
    /// Email/password sign-in. Bad credentials are rejected without revealing
    /// which check failed; a role outside `scope` gets a permission error.
    /// The role check runs through the caller's session so that concurrent
    /// sign-ins for one user start a single check.
    pub async fn login(
        store: &dyn DataSource,
        sessions: &SessionRegistry,
        scope: SignInScope,
        email: &str,
        password: &str,
        jwt_secret: &str,
        ttl_seconds: u64,
    ) -> AppResult<LoginResponse> {
        let invalid = || AppError::Unauthenticated("Invalid credentials".into());

        let Some((user, hash)) = store.find_credentials(email).await? else {
            LOGINS_COUNTER.with_label_values(&["unknown_user"]).inc();
            return Err(invalid());
        };
        let hash = hash.ok_or_else(invalid)?;
        let valid = bcrypt::verify(password, &hash).map_err(|_| invalid())?;
        if !valid {
            LOGINS_COUNTER.with_label_values(&["rejected"]).inc();
            return Err(invalid());
        }
        if !user.is_active {
            sessions.sign_out(&user.id).await;
            LOGINS_COUNTER.with_label_values(&["rejected"]).inc();
            return Err(invalid());
        }

        match sessions.observe(&user.id).await {
            (SessionAction::CheckRole(user_id), _) => {
                let granted = match Self::check_role(store, &user_id, scope).await {
                    Ok(granted) => granted,
                    Err(e) => {
                        sessions.complete(&user_id, false).await;
                        return Err(e.into());
                    }
                };
                sessions.complete(&user_id, granted).await;
                if !granted {
                    LOGINS_COUNTER.with_label_values(&["wrong_role"]).inc();
                    warn!("{} sign-in by {} refused for role {}", scope_label(scope), user.id, user.user_type);
                    return Err(scope.denied());
                }
            }
            (_, SessionState::Processing(_)) => {
                LOGINS_COUNTER.with_label_values(&["in_progress"]).inc();
                return Err(AppError::Conflict("Sign-in already in progress".into()));
            }
            _ => {
                if !scope.allows(user.user_type) {
                    LOGINS_COUNTER.with_label_values(&["wrong_role"]).inc();
                    return Err(scope.denied());
                }
            }
        }

        let access_token = Self::generate_access_token(&user, jwt_secret, ttl_seconds)?;
        LOGINS_COUNTER.with_label_values(&["success"]).inc();
        info!("{} {} signed in", user.user_type, user.id);
        Ok(LoginResponse { access_token, user })
    }

    /// Fresh role lookup for a pending session.
    async fn check_role(store: &dyn DataSource, user_id: &str, scope: SignInScope) -> Result<bool, StoreError> {
        Ok(store
            .get_user(user_id)
            .await?
            .is_some_and(|u| u.is_active && scope.allows(u.user_type)))
    }

    pub fn generate_access_token(user: &User, secret: &str, ttl_seconds: u64) -> anyhow::Result<String> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user.id.clone(),
            role: user.user_type,
            iat: now,
            exp: now + ttl_seconds as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn hash_password(password: &str) -> anyhow::Result<String> {
        Ok(bcrypt::hash(password, PASSWORD_COST)?)
    }
}

fn scope_label(scope: SignInScope) -> &'static str {
    match scope {
        SignInScope::Console => "Console",
        SignInScope::Device => "Device",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::decode_access_token;
    use crate::services::users::UserService;
    use crate::store::FixtureStore;

    async fn with_password(store: &FixtureStore, id: &str, email: &str, password: &str) -> User {
        let hash = AuthService::hash_password(password).unwrap();
        let parent = store.get_user("parent_1").await.unwrap().unwrap();
        let user = User {
            id: id.into(),
            email: email.into(),
            children: Vec::new(),
            ..parent
        };
        store.insert_user(&user, Some(&hash)).await.unwrap();
        user
    }

    #[tokio::test]
    async fn admin_login_issues_decodable_token() {
        let store = FixtureStore::new();
        let sessions = SessionRegistry::new();
        UserService::ensure_admin(&store, "admin@mybus.com", "secret-pass").await.unwrap();

        let res = AuthService::login(
            &store,
            &sessions,
            SignInScope::Console,
            "ADMIN@mybus.com",
            "secret-pass",
            "jwt",
            60,
        )
        .await
        .unwrap();
        let identity = decode_access_token(&res.access_token, "jwt").unwrap();
        assert_eq!(identity.user_id, res.user.id);
        assert_eq!(identity.role, UserType::Admin);
        assert_eq!(sessions.state(&res.user.id).await, SessionState::Active(res.user.id.clone()));

        // An active session skips the role check and still signs in.
        let again = AuthService::login(
            &store,
            &sessions,
            SignInScope::Console,
            "admin@mybus.com",
            "secret-pass",
            "jwt",
            60,
        )
        .await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_and_non_admin_are_rejected() {
        let store = FixtureStore::seeded().await;
        let sessions = SessionRegistry::new();
        UserService::ensure_admin(&store, "admin@mybus.com", "secret-pass").await.unwrap();

        let err = AuthService::login(&store, &sessions, SignInScope::Console, "admin@mybus.com", "nope", "jwt", 60)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unauthenticated");

        let parent = with_password(&store, "p-login", "login-parent@mybus.com", "parent-pass").await;
        let err = AuthService::login(
            &store,
            &sessions,
            SignInScope::Console,
            "login-parent@mybus.com",
            "parent-pass",
            "jwt",
            60,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "permission-denied");
        assert_eq!(sessions.state(&parent.id).await, SessionState::Idle);
    }

    #[tokio::test]
    async fn device_login_serves_parents_not_admins() {
        let store = FixtureStore::seeded().await;
        let sessions = SessionRegistry::new();
        UserService::ensure_admin(&store, "admin@mybus.com", "secret-pass").await.unwrap();
        with_password(&store, "p-device", "device-parent@mybus.com", "parent-pass").await;

        let res = AuthService::login(
            &store,
            &sessions,
            SignInScope::Device,
            "device-parent@mybus.com",
            "parent-pass",
            "jwt",
            60,
        )
        .await
        .unwrap();
        let identity = decode_access_token(&res.access_token, "jwt").unwrap();
        assert_eq!(identity.role, UserType::Parent);

        let err = AuthService::login(&store, &sessions, SignInScope::Device, "admin@mybus.com", "secret-pass", "jwt", 60)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission-denied");
    }

    #[tokio::test]
    async fn sign_in_during_a_pending_role_check_is_refused() {
        let store = FixtureStore::new();
        let sessions = SessionRegistry::new();
        UserService::ensure_admin(&store, "admin@mybus.com", "secret-pass").await.unwrap();
        let (admin, _) = store.find_credentials("admin@mybus.com").await.unwrap().unwrap();

        sessions.observe(&admin.id).await;
        let err = AuthService::login(&store, &sessions, SignInScope::Console, "admin@mybus.com", "secret-pass", "jwt", 60)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "already-exists");

        sessions.complete(&admin.id, false).await;
        assert!(
            AuthService::login(&store, &sessions, SignInScope::Console, "admin@mybus.com", "secret-pass", "jwt", 60)
                .await
                .is_ok()
        );
    }
}
