//! One-shot messages carried across a redirect
//!
//! A redirect stores its messages in the `messages` cookie as URL-encoded
//! JSON; the next page rendered for that browser shows them and clears the
//! cookie.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderValue},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

use super::middleware::cookie_value;

pub const COOKIE_NAME: &str = "messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub level: Level,
    pub text: String,
}

impl Message {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            text: text.into(),
        }
    }
}

/// Messages waiting in the request's cookie
#[derive(Debug, Clone, Default)]
pub struct Flash {
    messages: Vec<Message>,
}

impl Flash {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl<S> FromRequestParts<S> for Flash
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let messages = cookie_value(&parts.headers, COOKIE_NAME)
            .map(|raw| decode(&raw))
            .unwrap_or_default();
        Ok(Flash { messages })
    }
}

fn encode(messages: &[Message]) -> String {
    let json = serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string());
    urlencoding::encode(&json).into_owned()
}

/// Unreadable cookies carry no messages
fn decode(raw: &str) -> Vec<Message> {
    urlencoding::decode(raw)
        .ok()
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

pub fn set_cookie(messages: &[Message]) -> HeaderValue {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        COOKIE_NAME,
        encode(messages)
    );
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| clear_cookie())
}

pub fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static("messages=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// 303 redirect that leaves a message for the next page
pub fn redirect_with(to: &str, message: Message) -> Response {
    let mut response = Redirect::to(to).into_response();
    response
        .headers_mut()
        .append(header::SET_COOKIE, set_cookie(&[message]));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    #[test]
    fn test_encode_decode() {
        let messages = vec![
            Message::success("You are now logged in."),
            Message::error("Odd; text: with = signs"),
        ];
        assert_eq!(decode(&encode(&messages)), messages);
    }

    #[test]
    fn test_decode_ignores_garbage() {
        assert!(decode("%%%").is_empty());
        assert!(decode("nolevel").is_empty());

        let unknown_level = urlencoding::encode(r#"[{"level":"warning","text":"hi"}]"#);
        assert!(decode(&unknown_level).is_empty());

        let known = urlencoding::encode(r#"[{"level":"error","text":"hi"}]"#);
        assert_eq!(decode(&known), vec![Message::error("hi")]);
    }

    #[test]
    fn test_redirect_with_sets_cookie() {
        let response = redirect_with("/login/", Message::success("You have been logged out."));

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login/");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("messages="));
    }

    #[tokio::test]
    async fn test_extract_from_cookie() {
        let cookie = format!("{}={}", COOKIE_NAME, encode(&[Message::success("Saved")]));
        let request = Request::builder()
            .header(header::COOKIE, cookie)
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let flash = Flash::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(flash.messages(), [Message::success("Saved")]);
    }
}
