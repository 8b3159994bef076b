use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::RepositoryError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Users keyed by lower-cased email
#[derive(Clone, Default)]
pub struct UserRepository {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl UserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_user(&self, user: User) -> Result<User, RepositoryError> {
        let key = user.email.to_lowercase();
        let mut users = self.users.write().await;
        if users.contains_key(&key) {
            return Err(RepositoryError::AlreadyExists("User".to_string()));
        }
        users.insert(key, user.clone());
        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Option<User> {
        self.users.read().await.get(&email.to_lowercase()).cloned()
    }

    pub async fn find_user_by_id(&self, id: &str) -> Option<User> {
        self.users
            .read()
            .await
            .values()
            .find(|user| user.id == id)
            .cloned()
    }

    pub async fn update_profile(
        &self,
        id: &str,
        name: &str,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Option<User> {
        let mut users = self.users.write().await;
        let user = users.values_mut().find(|user| user.id == id)?;
        user.name = name.to_string();
        user.phone = phone.to_string();
        user.updated_at = now;
        Some(user.clone())
    }

    pub async fn update_password(&self, id: &str, password_hash: String, now: DateTime<Utc>) -> bool {
        let mut users = self.users.write().await;
        match users.values_mut().find(|user| user.id == id) {
            Some(user) => {
                user.password_hash = password_hash;
                user.updated_at = now;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, email: &str) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            name: "Budi".to_string(),
            email: email.to_string(),
            phone: "+62812345678".to_string(),
            password_hash: "hash".to_string(),
            role: "user".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn email_is_unique_ignoring_case() {
        let repo = UserRepository::new();
        repo.create_user(user("u1", "budi@example.com")).await.unwrap();
        let err = repo.create_user(user("u2", "BUDI@example.com")).await.unwrap_err();
        assert_eq!(err, RepositoryError::AlreadyExists("User".to_string()));
        assert_eq!(repo.find_user_by_email("Budi@Example.com").await.unwrap().id, "u1");
    }

    #[tokio::test]
    async fn profile_update_touches_only_name_and_phone() {
        let repo = UserRepository::new();
        repo.create_user(user("u1", "budi@example.com")).await.unwrap();
        let updated = repo
            .update_profile("u1", "Budi Santoso", "+62899", Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.name, "Budi Santoso");
        assert_eq!(updated.phone, "+62899");
        assert_eq!(updated.email, "budi@example.com");
        assert!(repo.update_profile("missing", "x", "y", Utc::now()).await.is_none());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_value(user("u1", "budi@example.com")).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["isActive"], true);
    }
}
