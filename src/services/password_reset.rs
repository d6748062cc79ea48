//! Password reset links
//!
//! A reset link has the form `/reset/<uid>/<token>/`. `uid` is the user ID
//! in URL-safe base64. The token is `<timestamp>-<signature>`: the creation
//! time in base36 seconds, then the hex HMAC-SHA256 of the user's ID,
//! password hash, email and that timestamp, truncated to 16 bytes. Changing
//! the password changes the hash and so invalidates every outstanding link.

use crate::models::User;
use crate::services::mailer::{Mailer, OutgoingMail};
use crate::services::user::{UserService, UserServiceError};
use anyhow::anyhow;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::Utc;
use data_encoding::{BASE64URL_NOPAD, HEXLOWER};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of the HMAC kept in a token
const SIGNATURE_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum PasswordResetError {
    /// The uid/token pair is malformed, expired, or no longer matches the user
    #[error("The password reset link was invalid")]
    InvalidLink,

    #[error(transparent)]
    User(#[from] UserServiceError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct PasswordResetService {
    users: Arc<UserService>,
    mailer: Arc<dyn Mailer>,
    secret: Vec<u8>,
    timeout_seconds: i64,
    public_url: String,
}

impl PasswordResetService {
    pub fn new(
        users: Arc<UserService>,
        mailer: Arc<dyn Mailer>,
        secret: Vec<u8>,
        timeout_seconds: i64,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            mailer,
            secret,
            timeout_seconds,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Random signing key for when none is configured.
    ///
    /// Links signed with it stop working when the process restarts.
    pub fn random_secret() -> Vec<u8> {
        let mut key = vec![0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Mail a reset link to the account with this email.
    ///
    /// Returns whether a mail was sent. Unknown and inactive accounts get no
    /// mail; the caller decides whether to tell the visitor.
    pub async fn request_reset(&self, email: &str) -> Result<bool, PasswordResetError> {
        let user = match self.users.get_by_email(email).await? {
            Some(user) if user.is_active => user,
            _ => {
                tracing::info!("Password reset requested for unknown or inactive account");
                return Ok(false);
            }
        };

        let link = format!("{}{}", self.public_url, self.reset_path(&user)?);
        let body = format!(
            "You're receiving this email because you requested a password reset for your \
             user account.\n\n\
             Please go to the following page and choose a new password:\n\n{}\n\n\
             Your username, in case you've forgotten: {}\n\n\
             If you did not request this, you can ignore this email.\n",
            link, user.email
        );

        self.mailer
            .send(OutgoingMail {
                to: user.email.clone(),
                subject: "Password reset".to_string(),
                body,
            })
            .await?;

        tracing::info!(user_id = user.id, "Password reset mail sent");
        Ok(true)
    }

    /// Site-relative reset path for a user, e.g. `/reset/MQ/<token>/`
    pub fn reset_path(&self, user: &User) -> Result<String, PasswordResetError> {
        let token = self.make_token(user, Utc::now().timestamp())?;
        Ok(format!("/reset/{}/{}/", encode_uid(user.id), token))
    }

    /// Resolve a reset link to its user
    pub async fn check_link(&self, uid: &str, token: &str) -> Result<User, PasswordResetError> {
        let user_id = decode_uid(uid).ok_or(PasswordResetError::InvalidLink)?;
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(PasswordResetError::InvalidLink)?;

        if self.check_token(&user, token, Utc::now().timestamp())? {
            Ok(user)
        } else {
            Err(PasswordResetError::InvalidLink)
        }
    }

    /// Set a new password through a reset link.
    ///
    /// The password must already satisfy the password policy.
    pub async fn confirm(
        &self,
        uid: &str,
        token: &str,
        new_password: &str,
    ) -> Result<User, PasswordResetError> {
        let user = self.check_link(uid, token).await?;
        self.users.set_password(user.id, new_password).await?;
        Ok(user)
    }

    fn make_token(&self, user: &User, timestamp: i64) -> Result<String, PasswordResetError> {
        let mac = self.signature(user, timestamp)?.finalize().into_bytes();
        Ok(format!(
            "{}-{}",
            to_base36(timestamp.max(0) as u64),
            HEXLOWER.encode(&mac[..SIGNATURE_LEN])
        ))
    }

    fn check_token(&self, user: &User, token: &str, now: i64) -> Result<bool, PasswordResetError> {
        let Some((ts, signature)) = token.split_once('-') else {
            return Ok(false);
        };
        let Some(timestamp) = from_base36(ts) else {
            return Ok(false);
        };
        let Ok(signature) = HEXLOWER.decode(signature.as_bytes()) else {
            return Ok(false);
        };
        if signature.len() != SIGNATURE_LEN {
            return Ok(false);
        }

        if self
            .signature(user, timestamp as i64)?
            .verify_truncated_left(&signature)
            .is_err()
        {
            return Ok(false);
        }

        Ok(now - (timestamp as i64) <= self.timeout_seconds)
    }

    fn signature(&self, user: &User, timestamp: i64) -> Result<HmacSha256, PasswordResetError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| anyhow!("Invalid reset signing key: {}", e))?;
        mac.update(user.id.to_string().as_bytes());
        mac.update(user.password_hash.as_bytes());
        mac.update(user.email.as_bytes());
        mac.update(timestamp.to_string().as_bytes());
        Ok(mac)
    }
}

/// URL-safe base64 of the decimal user ID
pub fn encode_uid(id: i64) -> String {
    BASE64URL_NOPAD.encode(id.to_string().as_bytes())
}

pub fn decode_uid(uid: &str) -> Option<i64> {
    let bytes = BASE64URL_NOPAD.decode(uid.as_bytes()).ok()?;
    std::str::from_utf8(&bytes).ok()?.parse().ok()
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn from_base36(s: &str) -> Option<u64> {
    // Bounded so the value always fits
    if s.is_empty() || s.len() > 12 {
        return None;
    }
    u64::from_str_radix(s, 36).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::mailer::RecordingMailer;
    use crate::services::user::{LoginInput, RegisterInput};
    use proptest::prelude::*;

    const TIMEOUT: i64 = 3 * 24 * 60 * 60;

    async fn setup() -> (Arc<UserService>, Arc<RecordingMailer>, PasswordResetService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = Arc::new(UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
        ));
        let mailer = Arc::new(RecordingMailer::default());
        let service = PasswordResetService::new(
            users.clone(),
            mailer.clone(),
            b"test-secret".to_vec(),
            TIMEOUT,
            "http://blog.test/",
        );
        (users, mailer, service)
    }

    async fn register(users: &UserService) -> User {
        users
            .register(RegisterInput::new("a@example.com", "Ann", "password123"))
            .await
            .unwrap()
    }

    fn split_path(path: &str) -> (String, String) {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        (parts[1].to_string(), parts[2].to_string())
    }

    #[test]
    fn test_uid_roundtrip() {
        assert_eq!(encode_uid(1), "MQ");
        assert_eq!(decode_uid("MQ"), Some(1));
        assert_eq!(decode_uid(&encode_uid(123_456)), Some(123_456));
        assert_eq!(decode_uid("!!"), None);
        assert_eq!(decode_uid(&BASE64URL_NOPAD.encode(b"abc")), None);
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(from_base36("10"), Some(36));
        assert_eq!(from_base36(""), None);
        assert_eq!(from_base36("zzzzzzzzzzzzz"), None);
    }

    #[tokio::test]
    async fn test_request_reset_mails_link() {
        let (users, mailer, service) = setup().await;
        let user = register(&users).await;

        assert!(service.request_reset("a@example.com").await.unwrap());

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@example.com");
        let expected_prefix = format!("http://blog.test/reset/{}/", encode_uid(user.id));
        assert!(sent[0].body.contains(&expected_prefix));
    }

    #[tokio::test]
    async fn test_request_reset_unknown_email_sends_nothing() {
        let (_users, mailer, service) = setup().await;

        assert!(!service.request_reset("nobody@example.com").await.unwrap());
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_sets_password_and_invalidates_link() {
        let (users, _mailer, service) = setup().await;
        let user = register(&users).await;

        let (uid, token) = split_path(&service.reset_path(&user).unwrap());
        assert_eq!(service.check_link(&uid, &token).await.unwrap().id, user.id);

        service.confirm(&uid, &token, "new-password-1").await.unwrap();

        assert!(users
            .login(LoginInput::new("a@example.com", "new-password-1"))
            .await
            .is_ok());

        // The hash changed, so the same link no longer works
        assert!(matches!(
            service.check_link(&uid, &token).await,
            Err(PasswordResetError::InvalidLink)
        ));
    }

    #[tokio::test]
    async fn test_tampered_links_rejected() {
        let (users, _mailer, service) = setup().await;
        let user = register(&users).await;
        let (uid, token) = split_path(&service.reset_path(&user).unwrap());

        let mut forged = token.clone();
        let last = forged.pop().unwrap();
        forged.push(if last == '0' { '1' } else { '0' });

        for (u, t) in [
            (uid.as_str(), forged.as_str()),
            (uid.as_str(), "garbage"),
            (uid.as_str(), "abc-zz"),
            ("Mg", token.as_str()),
            ("???", token.as_str()),
        ] {
            assert!(
                matches!(service.check_link(u, t).await, Err(PasswordResetError::InvalidLink)),
                "accepted {}/{}",
                u,
                t
            );
        }
    }

    #[tokio::test]
    async fn test_token_expires() {
        let (users, _mailer, service) = setup().await;
        let user = register(&users).await;

        let issued = 1_700_000_000;
        let token = service.make_token(&user, issued).unwrap();

        assert!(service.check_token(&user, &token, issued + TIMEOUT).unwrap());
        assert!(!service.check_token(&user, &token, issued + TIMEOUT + 1).unwrap());
    }

    #[tokio::test]
    async fn test_token_bound_to_secret() {
        let (users, mailer, service) = setup().await;
        let user = register(&users).await;
        let other = PasswordResetService::new(users, mailer, b"other".to_vec(), TIMEOUT, "");

        let now = Utc::now().timestamp();
        let token = service.make_token(&user, now).unwrap();
        assert!(!other.check_token(&user, &token, now).unwrap());
    }

    proptest! {
        #[test]
        fn prop_uid_roundtrip(id in 0i64..i64::MAX) {
            prop_assert_eq!(decode_uid(&encode_uid(id)), Some(id));
        }

        #[test]
        fn prop_base36_roundtrip(n in 0u64..(1u64 << 53)) {
            prop_assert_eq!(from_base36(&to_base36(n)), Some(n));
        }
    }
}
