//! User service
//!
//! Registration, login/logout and session management. A session is an
//! opaque random token stored both in the `sessions` table and in the
//! session cookie; it ends on logout, on expiry, or when the user's password
//! changes.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 14;

/// Message shown for every failed login, whatever the cause
pub const INVALID_CREDENTIALS: &str = "Invalid username or password.";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("{0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A user with this email already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    /// Create a new user service with custom session expiration
    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Session lifetime in days
    pub fn session_expiration_days(&self) -> i64 {
        self.session_expiration_days
    }

    /// Register a new user.
    ///
    /// Field-level checks (format, confirmation, password policy) belong to
    /// the registration form; this only rejects blank input and taken emails.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        if input.email.trim().is_empty() {
            return Err(UserServiceError::ValidationError("Email cannot be empty".to_string()));
        }
        if input.password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Password cannot be empty".to_string(),
            ));
        }

        if self.email_taken(&input.email).await? {
            return Err(UserServiceError::UserExists(input.email));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(input.email, input.full_name, password_hash);

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = created.id, "User registered");
        Ok(created)
    }

    /// Whether an account with this email exists
    pub async fn email_taken(&self, email: &str) -> Result<bool, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to check email")?
            .is_some())
    }

    /// Check credentials and open a new session.
    ///
    /// Unknown email, wrong password and inactive account all produce the
    /// same [`INVALID_CREDENTIALS`] error.
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let user = self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to get user by email")?;

        let user = match user {
            Some(user) => user,
            None => {
                tracing::warn!("Login failed");
                return Err(Self::invalid_credentials());
            }
        };

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;

        if !password_valid || !user.is_active {
            tracing::warn!("Login failed");
            return Err(Self::invalid_credentials());
        }

        let session = self.create_session(user.id).await?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok(session)
    }

    /// End a session. Unknown tokens are ignored.
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Missing or expired sessions yield `None`; expired ones are removed.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user.filter(|u| u.is_active))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to get user by email")?)
    }

    /// Replace a user's password and end all of their sessions
    pub async fn set_password(&self, user_id: i64, password: &str) -> Result<(), UserServiceError> {
        let password_hash = hash_password(password).context("Failed to hash password")?;

        self.user_repo
            .update_password(user_id, &password_hash)
            .await
            .context("Failed to update password")?;

        let ended = self
            .session_repo
            .delete_by_user(user_id)
            .await
            .context("Failed to delete user sessions")?;

        tracing::info!(user_id, sessions_ended = ended, "Password changed");
        Ok(())
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    fn invalid_credentials() -> UserServiceError {
        UserServiceError::AuthenticationError(INVALID_CREDENTIALS.to_string())
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().simple().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };

        Ok(self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?)
    }
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub full_name: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(
        email: impl Into<String>,
        full_name: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            full_name: full_name.into(),
            password: password.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use proptest::prelude::*;

    async fn setup_property_test_service() -> UserService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(10))]

        /// Any registered credentials log in and resolve back to the same user
        #[test]
        fn login_roundtrip(
            local in "[a-z]{3,10}",
            password in "[a-zA-Z0-9!@#$%^&*]{8,20}"
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let service = setup_property_test_service().await;
                let email = format!("{}@example.com", local);

                let registered = service
                    .register(RegisterInput::new(email.clone(), "Prop", password.clone()))
                    .await
                    .expect("Registration should succeed");

                let session = service
                    .login(LoginInput::new(email, password.clone()))
                    .await
                    .expect("Login should succeed");

                let user = service.validate_session(&session.id).await
                    .expect("Validation should not error")
                    .expect("Session should resolve");

                prop_assert_eq!(user.id, registered.id);
                Ok(())
            });
            result?;
        }

        /// A password differing from the registered one never logs in
        #[test]
        fn wrong_password_rejected(
            password in "[a-z]{8,12}",
            suffix in "[A-Z0-9]{1,4}"
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let service = setup_property_test_service().await;
                service
                    .register(RegisterInput::new("p@example.com", "Prop", password.clone()))
                    .await
                    .expect("Registration should succeed");

                let err = service
                    .login(LoginInput::new("p@example.com", format!("{}{}", password, suffix)))
                    .await
                    .unwrap_err();
                prop_assert_eq!(err.to_string(), INVALID_CREDENTIALS);
                Ok(())
            });
            result?;
        }
    }
}
