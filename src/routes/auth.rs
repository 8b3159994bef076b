use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::utils::{ok, ok_with, validate_auth_token, ValidJson, Validator};
use crate::config::Config;
use crate::db::{user::User, user::UserRepository, RepositoryError};
use crate::error::Result;

const DEMO_USER_NAME: &str = "John Doe";
const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User already exists with this email")]
    UserAlreadyExists,

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("Access token required")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("token encoding failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::UserAlreadyExists | Self::IncorrectPassword => StatusCode::BAD_REQUEST,
            Self::InvalidToken => StatusCode::FORBIDDEN,
            Self::Hash(_) | Self::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to send to the client.
    pub fn public_message(&self) -> String {
        match self {
            Self::Hash(_) | Self::Token(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    name: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    current_password: Option<String>,
    new_password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: Some(user.phone),
            role: user.role,
            is_active: user.is_active,
            created_at: Some(user.created_at),
            updated_at: Some(user.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    user: Profile,
    token: String,
}

// Authentication service
pub struct AuthService {
    pub repo: UserRepository,
    jwt_secret: String,
    expire_hours: i64,
    demo_password: String,
    argon2: Argon2<'static>,
}

impl AuthService {
    pub fn new(repo: UserRepository, config: &Config) -> std::result::Result<Self, AuthError> {
        let params = Params::new(
            config.password_hash_memory_kib,
            Params::DEFAULT_T_COST,
            Params::DEFAULT_P_COST,
            None,
        )
        .map_err(|err| AuthError::Hash(err.to_string()))?;

        Ok(Self {
            repo,
            jwt_secret: config.jwt_secret.clone(),
            expire_hours: config.jwt_expire_hours,
            demo_password: config.demo_password.clone(),
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        let config = Config {
            password_hash_memory_kib: 64,
            ..Config::default()
        };
        Self::new(UserRepository::new(), &config).expect("test parameters are valid")
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        phone: &str,
    ) -> std::result::Result<AuthResponse, AuthError> {
        let password_hash = self.hash_password(password)?;
        let now = Utc::now();

        let user = User {
            id: format!("user_{}", Uuid::new_v4().simple()),
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            phone: phone.trim().to_string(),
            password_hash,
            role: DEFAULT_ROLE.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let user = match self.repo.create_user(user).await {
            Ok(user) => user,
            Err(RepositoryError::AlreadyExists(_)) => {
                tracing::warn!("Registration rejected, email already in use: {email}");
                return Err(AuthError::UserAlreadyExists);
            }
            Err(err) => {
                tracing::error!("Failed to store user: {err}");
                return Err(AuthError::Hash(err.to_string()));
            }
        };
        tracing::info!("user created with email: {}", user.email);

        let token = self.generate_token(&user.id, &user.email, &user.role, now)?;
        Ok(AuthResponse {
            user: user.into(),
            token,
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> std::result::Result<AuthResponse, AuthError> {
        tracing::info!("Attempting to log in user with email: {email}");
        let email = email.trim();
        let now = Utc::now();

        let profile = match self.repo.find_user_by_email(email).await {
            Some(user) => {
                if !user.is_active || !self.verify_password(password, &user.password_hash) {
                    tracing::warn!("Invalid credentials for user: {email}");
                    return Err(AuthError::InvalidCredentials);
                }
                Profile::from(user)
            }
            None => {
                if password != self.demo_password {
                    tracing::warn!("Invalid credentials for user: {email}");
                    return Err(AuthError::InvalidCredentials);
                }
                demo_profile(&demo_user_id(email), email, DEFAULT_ROLE)
            }
        };
        tracing::info!("Password verified for user: {email}");

        let token = self.generate_token(&profile.id, &profile.email, &profile.role, now)?;
        Ok(AuthResponse {
            user: profile,
            token,
        })
    }

    /// Stored profile for registered users, otherwise one built from the token.
    pub async fn profile(&self, claims: &Claims) -> Profile {
        match self.repo.find_user_by_id(&claims.user_id).await {
            Some(user) => user.into(),
            None => demo_profile(&claims.user_id, &claims.email, &claims.role),
        }
    }

    pub async fn update_profile(&self, claims: &Claims, name: &str, phone: &str) -> Profile {
        let now = Utc::now();
        match self
            .repo
            .update_profile(&claims.user_id, name.trim(), phone.trim(), now)
            .await
        {
            Some(user) => user.into(),
            None => Profile {
                name: name.trim().to_string(),
                phone: Some(phone.trim().to_string()),
                updated_at: Some(now),
                ..demo_profile(&claims.user_id, &claims.email, &claims.role)
            },
        }
    }

    pub async fn change_password(
        &self,
        claims: &Claims,
        current_password: &str,
        new_password: &str,
    ) -> std::result::Result<(), AuthError> {
        match self.repo.find_user_by_id(&claims.user_id).await {
            Some(user) => {
                if !self.verify_password(current_password, &user.password_hash) {
                    tracing::warn!("Incorrect current password for user: {}", user.email);
                    return Err(AuthError::IncorrectPassword);
                }
                let password_hash = self.hash_password(new_password)?;
                self.repo
                    .update_password(&user.id, password_hash, Utc::now())
                    .await;
                tracing::info!("Password changed for user: {}", user.email);
                Ok(())
            }
            // Demo identities have nothing stored to change
            None if current_password == self.demo_password => Ok(()),
            None => Err(AuthError::IncorrectPassword),
        }
    }

    pub fn verify_token(&self, token: &str) -> std::result::Result<Claims, AuthError> {
        let mut validation = jsonwebtoken::Validation::default();

        validation.leeway = 10;
        validation.validate_exp = true;
        validation.algorithms = vec![jsonwebtoken::Algorithm::HS256];

        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            tracing::warn!("Error decoding token: {:?}", err);
            AuthError::InvalidToken
        })?;

        Ok(token_data.claims)
    }

    pub fn generate_token(
        &self,
        user_id: &str,
        email: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<String, AuthError> {
        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.expire_hours)).timestamp(),
        };

        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok(token)
    }

    fn hash_password(&self, password: &str) -> std::result::Result<String, AuthError> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AuthError::Hash(err.to_string()))
    }

    fn verify_password(&self, password: &str, password_hash: &str) -> bool {
        match PasswordHash::new(password_hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(err) => {
                tracing::error!("Stored password hash is unreadable: {err}");
                false
            }
        }
    }
}

/// Stable id for an email that logs in with the demo password without
/// having registered. Case-insensitive on the email.
pub fn demo_user_id(email: &str) -> String {
    let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, email.trim().to_lowercase().as_bytes());
    format!("user_{}", id.simple())
}

fn demo_profile(user_id: &str, email: &str, role: &str) -> Profile {
    Profile {
        id: user_id.to_string(),
        name: DEMO_USER_NAME.to_string(),
        email: email.to_string(),
        phone: None,
        role: role.to_string(),
        is_active: true,
        created_at: None,
        updated_at: None,
    }
}

// Route for handling new user registration
pub async fn register_handler(
    State(service): State<Arc<AuthService>>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> Result<impl IntoResponse> {
    Validator::new()
        .required("name", req.name.as_deref(), "Name is required")
        .email("email", req.email.as_deref(), "Valid email is required")
        .min_len("password", req.password.as_deref(), 6, "Password must be at least 6 characters")
        .required("phone", req.phone.as_deref(), "Phone number is required")
        .finish()?;

    let response = service
        .register(
            req.name.as_deref().unwrap_or_default(),
            req.email.as_deref().unwrap_or_default(),
            req.password.as_deref().unwrap_or_default(),
            req.phone.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        ok_with(response, "User registered successfully"),
    ))
}

// Route for handling user login
pub async fn login_handler(
    State(service): State<Arc<AuthService>>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<impl IntoResponse> {
    Validator::new()
        .email("email", req.email.as_deref(), "Valid email is required")
        .required("password", req.password.as_deref(), "Password is required")
        .finish()?;

    let response = service
        .login(
            req.email.as_deref().unwrap_or_default(),
            req.password.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(ok_with(response, "Login successful"))
}

pub async fn profile_handler(
    headers: HeaderMap,
    State(service): State<Arc<AuthService>>,
) -> Result<impl IntoResponse> {
    let claims = validate_auth_token(&headers, &service)?;
    Ok(ok(service.profile(&claims).await))
}

pub async fn update_profile_handler(
    headers: HeaderMap,
    State(service): State<Arc<AuthService>>,
    ValidJson(req): ValidJson<ProfileRequest>,
) -> Result<impl IntoResponse> {
    let claims = validate_auth_token(&headers, &service)?;
    Validator::new()
        .required("name", req.name.as_deref(), "Name is required")
        .required("phone", req.phone.as_deref(), "Phone number is required")
        .finish()?;

    let profile = service
        .update_profile(
            &claims,
            req.name.as_deref().unwrap_or_default(),
            req.phone.as_deref().unwrap_or_default(),
        )
        .await;
    Ok(ok_with(profile, "Profile updated successfully"))
}

pub async fn change_password_handler(
    headers: HeaderMap,
    State(service): State<Arc<AuthService>>,
    ValidJson(req): ValidJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse> {
    let claims = validate_auth_token(&headers, &service)?;
    Validator::new()
        .required(
            "currentPassword",
            req.current_password.as_deref(),
            "Current password is required",
        )
        .min_len(
            "newPassword",
            req.new_password.as_deref(),
            6,
            "New password must be at least 6 characters",
        )
        .finish()?;

    service
        .change_password(
            &claims,
            req.current_password.as_deref().unwrap_or_default(),
            req.new_password.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(ok_with(serde_json::Value::Null, "Password changed successfully"))
}

pub fn auth_routes(service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/profile", get(profile_handler).put(update_profile_handler))
        .route("/auth/change-password", post(change_password_handler))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_ids_are_per_email() {
        assert_eq!(demo_user_id("Buyer@Example.com"), demo_user_id("buyer@example.com"));
        assert_ne!(demo_user_id("alice@example.com"), demo_user_id("bob@example.com"));
        assert!(demo_user_id("alice@example.com").starts_with("user_"));
    }

    #[tokio::test]
    async fn unregistered_email_logs_in_with_demo_password() {
        let service = AuthService::for_tests();
        let response = service.login("buyer@example.com", "password123").await.unwrap();

        let claims = service.verify_token(&response.token).unwrap();
        assert_eq!(claims.email, "buyer@example.com");
        assert_eq!(claims.user_id, demo_user_id("buyer@example.com"));
        assert_eq!(claims.role, "user");
        assert_eq!(claims.exp - claims.iat, 168 * 3600);

        assert!(matches!(
            service.login("buyer@example.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn registered_users_verify_their_own_password() {
        let service = AuthService::for_tests();
        let registered = service
            .register("Budi", "budi@example.com", "s3cret!", "+628111")
            .await
            .unwrap();
        assert_eq!(registered.user.email, "budi@example.com");

        assert!(service.login("budi@example.com", "s3cret!").await.is_ok());
        assert!(matches!(
            service.login("budi@example.com", "password123").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            service
                .register("Budi", "BUDI@example.com", "another", "+628111")
                .await,
            Err(AuthError::UserAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn change_password_requires_the_current_one() {
        let service = AuthService::for_tests();
        let registered = service
            .register("Sari", "sari@example.com", "first-pass", "+628222")
            .await
            .unwrap();
        let claims = service.verify_token(&registered.token).unwrap();

        assert!(matches!(
            service.change_password(&claims, "nope", "second-pass").await,
            Err(AuthError::IncorrectPassword)
        ));
        service
            .change_password(&claims, "first-pass", "second-pass")
            .await
            .unwrap();
        assert!(service.login("sari@example.com", "second-pass").await.is_ok());
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let service = AuthService::for_tests();
        let other = AuthService::new(
            UserRepository::new(),
            &Config {
                jwt_secret: "another-secret".to_string(),
                password_hash_memory_kib: 64,
                ..Config::default()
            },
        )
        .unwrap();

        let token = other
            .generate_token("u1", "a@a.com", "user", Utc::now())
            .unwrap();
        assert!(matches!(
            service.verify_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let service = AuthService::for_tests();
        let token = service
            .generate_token("u1", "a@a.com", "user", Utc::now() - Duration::days(8))
            .unwrap();
        assert!(matches!(
            service.verify_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }
}
