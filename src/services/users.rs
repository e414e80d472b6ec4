use chrono::Utc;
use tracing::info;

use super::auth::AuthService;
use crate::{
    error::{AppError, AppResult},
    models::{
        student::Student,
        user::{CreateUserRequest, UpdateUserRequest, User, UserType},
    },
    store::{new_id, DataSource},
};

pub struct UserService;

impl UserService {
    pub async fn list(store: &dyn DataSource, user_type: UserType) -> AppResult<Vec<User>> {
        Ok(store.list_users(user_type, true).await?)
    }

    pub async fn get(store: &dyn DataSource, user_type: UserType, id: &str) -> AppResult<User> {
        match store.get_user(id).await? {
            Some(user) if user.user_type == user_type => Ok(user),
            _ => Err(AppError::not_found(&user_type.to_string(), id)),
        }
    }

    pub async fn create(
        store: &dyn DataSource,
        user_type: UserType,
        req: CreateUserRequest,
    ) -> AppResult<User> {
        let name = req.name.trim();
        let email = req.email.trim().to_lowercase();
        if name.is_empty() || email.is_empty() {
            return Err(AppError::Validation("Missing required fields: name, email".into()));
        }
        if !email.contains('@') {
            return Err(AppError::Validation(format!("Invalid email: {email}")));
        }

        let password_hash = match req.password.as_deref().filter(|p| !p.is_empty()) {
            Some(p) if p.len() < 6 => {
                return Err(AppError::Validation("Password must be at least 6 characters".into()))
            }
            Some(p) => Some(AuthService::hash_password(p)?),
            None => None,
        };

        let now = Utc::now();
        let user = User {
            id: new_id(),
            name: name.to_string(),
            email,
            phone: req.phone.trim().to_string(),
            user_type,
            is_active: true,
            children: Vec::new(),
            permissions: req.permissions,
            fcm_token: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_user(&user, password_hash.as_deref()).await?;
        info!("Created {} {}", user.user_type, user.id);
        Ok(user)
    }

    pub async fn update(
        store: &dyn DataSource,
        user_type: UserType,
        id: &str,
        req: UpdateUserRequest,
    ) -> AppResult<User> {
        let mut user = Self::get(store, user_type, id).await?;
        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("name must not be empty".into()));
            }
            user.name = name.to_string();
        }
        if let Some(email) = req.email {
            let email = email.trim().to_lowercase();
            if !email.contains('@') {
                return Err(AppError::Validation(format!("Invalid email: {email}")));
            }
            user.email = email;
        }
        if let Some(phone) = req.phone {
            user.phone = phone.trim().to_string();
        }
        if let Some(active) = req.is_active {
            user.is_active = active;
        }
        if req.permissions.is_some() {
            user.permissions = req.permissions;
        }
        user.updated_at = Utc::now();

        if !store.update_user_profile(&user).await? {
            return Err(AppError::not_found(&user_type.to_string(), id));
        }
        // The stored children list is authoritative; re-read to return it.
        Self::get(store, user_type, id).await
    }

    /// Soft delete. Linked students keep their `parentId`.
    pub async fn deactivate(store: &dyn DataSource, user_type: UserType, id: &str) -> AppResult<User> {
        Self::update(
            store,
            user_type,
            id,
            UpdateUserRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    /// Active students whose `parentId` is this parent.
    pub async fn children(store: &dyn DataSource, parent_id: &str) -> AppResult<Vec<Student>> {
        Self::get(store, UserType::Parent, parent_id).await?;
        Ok(store.list_students(Some(parent_id), true).await?)
    }

    pub async fn register_push_token(store: &dyn DataSource, user_id: &str, token: &str) -> AppResult<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Validation("Missing required field: token".into()));
        }
        if !store.set_fcm_token(user_id, token).await? {
            return Err(AppError::not_found("user", user_id));
        }
        Ok(())
    }

    /// Creates the bootstrap admin when no account with this email exists.
    pub async fn ensure_admin(store: &dyn DataSource, email: &str, password: &str) -> anyhow::Result<()> {
        if store.find_credentials(email).await?.is_some() {
            return Ok(());
        }
        let now = Utc::now();
        let admin = User {
            id: new_id(),
            name: "Administrator".into(),
            email: email.trim().to_lowercase(),
            phone: String::new(),
            user_type: UserType::Admin,
            is_active: true,
            children: Vec::new(),
            permissions: Some(vec!["all".into()]),
            fcm_token: None,
            created_at: now,
            updated_at: now,
        };
        let hash = AuthService::hash_password(password)?;
        store.insert_user(&admin, Some(&hash)).await?;
        info!("Bootstrap admin {} created", admin.email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::ChildRef;
    use crate::store::FixtureStore;

    #[tokio::test]
    async fn profile_update_keeps_children() {
        let store = FixtureStore::seeded().await;
        let req = UpdateUserRequest {
            phone: Some("0599999999".into()),
            ..Default::default()
        };
        let user = UserService::update(&store, UserType::Parent, "parent_1", req).await.unwrap();

        assert_eq!(user.phone, "0599999999");
        let ids: Vec<&str> = user.children.iter().map(|c: &ChildRef| c.id.as_str()).collect();
        assert_eq!(ids, vec!["student_1"]);
    }

    #[tokio::test]
    async fn wrong_user_type_is_not_found() {
        let store = FixtureStore::seeded().await;
        let err = UserService::get(&store, UserType::Supervisor, "parent_1").await.unwrap_err();
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = FixtureStore::seeded().await;
        let req = CreateUserRequest {
            name: "Someone".into(),
            email: "Parent1@mybus.com".into(),
            phone: String::new(),
            password: None,
            permissions: None,
        };
        let err = UserService::create(&store, UserType::Parent, req).await.unwrap_err();
        assert_eq!(err.kind(), "already-exists");
    }

    #[tokio::test]
    async fn children_lists_active_students_only() {
        let store = FixtureStore::seeded().await;
        let students = UserService::children(&store, "parent_3").await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, "student_3");
    }

    #[tokio::test]
    async fn ensure_admin_is_idempotent() {
        let store = FixtureStore::new();
        UserService::ensure_admin(&store, "admin@mybus.com", "pw123456").await.unwrap();
        UserService::ensure_admin(&store, "admin@mybus.com", "pw123456").await.unwrap();
        assert_eq!(store.list_users(UserType::Admin, true).await.unwrap().len(), 1);
    }
}
