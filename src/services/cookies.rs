//! Cookie building utilities for session management
//!
//! Centralizes cookie formatting for the login and logout endpoints.

use axum::http::HeaderValue;
use axum::http::header::InvalidHeaderValue;

/// Access token cookie name
pub const ACCESS_TOKEN_NAME: &str = "access_token";
/// Matches the access token lifetime (7 days)
const ACCESS_TOKEN_MAX_AGE_SECS: u32 = 7 * 24 * 60 * 60;
const ACCESS_COOKIE_PATH: &str = "/";

/// Cookie attributes resolved from configuration
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: &'static str,
}

impl CookiePolicy {
    /// Build an access token Set-Cookie header value
    pub fn access_cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        let secure = if self.secure { " Secure;" } else { "" };
        format!(
            "{}={}; HttpOnly;{} SameSite={}; Path={}; Max-Age={}",
            ACCESS_TOKEN_NAME, token, secure, self.same_site, ACCESS_COOKIE_PATH, ACCESS_TOKEN_MAX_AGE_SECS
        )
        .parse()
    }

    /// Build a Set-Cookie header to clear the access token
    pub fn clear_access_cookie(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let secure = if self.secure { " Secure;" } else { "" };
        format!(
            "{}=; HttpOnly;{} SameSite={}; Path={}; Max-Age=0",
            ACCESS_TOKEN_NAME, secure, self.same_site, ACCESS_COOKIE_PATH
        )
        .parse()
    }
}
