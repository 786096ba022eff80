//! Publishing client for the X/Twitter API.
//!
//! Requests are signed with OAuth 1.0a user context: the app's consumer key
//! pair plus the account's stored token/secret.

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use sha1::Sha1;

use crate::domain::accounts::Credentials;

const TWEETS_URL: &str = "https://api.x.com/2/tweets";
const MEDIA_UPLOAD_URL: &str = "https://api.x.com/2/media/upload";

/// RFC 3986 unreserved characters stay as-is, everything else is escaped
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Outbound publish API used by dispatch
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Post one tweet, replying to `reply_to` when set. Returns the new tweet id.
    async fn publish_unit(
        &self,
        credentials: &Credentials,
        text: &str,
        reply_to: Option<String>,
        media_ids: Vec<String>,
    ) -> Result<String, TwitterError>;

    /// Upload an image, returning the media id to attach to a tweet
    async fn upload_media(&self, credentials: &Credentials, data: Vec<u8>) -> Result<String, TwitterError>;
}

#[derive(Clone)]
pub struct TwitterClient {
    api_key: String,
    api_secret: String,
    http: Client,
}

impl TwitterClient {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            http: Client::new(),
        }
    }

    /// Build the `Authorization: OAuth ...` header for a request without
    /// form-encoded parameters (JSON and multipart bodies are not signed).
    fn authorization_header(
        &self,
        method: &str,
        url: &str,
        credentials: &Credentials,
    ) -> Result<String, TwitterError> {
        let nonce = {
            let bytes: [u8; 16] = rand::rng().random();
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
        };
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let mut params = vec![
            ("oauth_consumer_key", self.api_key.as_str()),
            ("oauth_nonce", nonce.as_str()),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", credentials.token.as_str()),
            ("oauth_version", "1.0"),
        ];
        params.sort();

        let signature = sign(
            method,
            url,
            &params,
            &self.api_secret,
            &credentials.secret,
        )?;

        let header = params
            .iter()
            .map(|(k, v)| (*k, *v))
            .chain(std::iter::once(("oauth_signature", signature.as_str())))
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {}", header))
    }
}

#[async_trait]
impl Publisher for TwitterClient {
    async fn publish_unit(
        &self,
        credentials: &Credentials,
        text: &str,
        reply_to: Option<String>,
        media_ids: Vec<String>,
    ) -> Result<String, TwitterError> {
        let mut body = serde_json::json!({ "text": text });

        if let Some(parent_id) = reply_to {
            body["reply"] = serde_json::json!({
                "in_reply_to_tweet_id": parent_id
            });
        }

        if !media_ids.is_empty() {
            body["media"] = serde_json::json!({
                "media_ids": media_ids
            });
        }

        let resp = self
            .http
            .post(TWEETS_URL)
            .header(
                "Authorization",
                self.authorization_header("POST", TWEETS_URL, credentials)?,
            )
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(TwitterError::Api(format!("Status {}: {}", status, text)));
        }

        let wrapper: TweetResponseWrapper = resp.json().await?;
        Ok(wrapper.data.id)
    }

    async fn upload_media(&self, credentials: &Credentials, data: Vec<u8>) -> Result<String, TwitterError> {
        let media_type = match image::guess_format(&data) {
            Ok(image::ImageFormat::Png) => "image/png",
            Ok(image::ImageFormat::Jpeg) => "image/jpeg",
            _ => return Err(TwitterError::Api("Unsupported media type".to_string())),
        };

        let part = reqwest::multipart::Part::bytes(data)
            .mime_str(media_type)
            .map_err(|e| TwitterError::Api(format!("Invalid mime type: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .text("media_category", "tweet_image")
            .text("media_type", media_type)
            .part("media", part);

        let resp = self
            .http
            .post(MEDIA_UPLOAD_URL)
            .header(
                "Authorization",
                self.authorization_header("POST", MEDIA_UPLOAD_URL, credentials)?,
            )
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(TwitterError::Api(format!("Status {}: {}", status, text)));
        }

        let wrapper: MediaUploadResponse = serde_json::from_str(&text).map_err(|e| {
            TwitterError::Api(format!("Failed to parse response: {} - body: {}", e, text))
        })?;
        Ok(wrapper.data.id)
    }
}

fn encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// HMAC-SHA1 signature over the OAuth signature base string.
/// `params` must already be sorted by key.
fn sign(
    method: &str,
    url: &str,
    params: &[(&str, &str)],
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String, TwitterError> {
    let param_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let base = format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(url),
        encode(&param_string)
    );
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));

    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .map_err(|e| TwitterError::Api(format!("Invalid signing key: {}", e)))?;
    mac.update(base.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Deserialize)]
struct TweetResponseWrapper {
    data: TweetResponse,
}

#[derive(Debug, Deserialize)]
struct TweetResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    data: MediaUploadData,
}

#[derive(Debug, Deserialize)]
struct MediaUploadData {
    id: String,
}

#[derive(Debug)]
pub enum TwitterError {
    Http(reqwest::Error),
    Api(String),
}

impl From<reqwest::Error> for TwitterError {
    fn from(e: reqwest::Error) -> Self {
        TwitterError::Http(e)
    }
}

impl std::fmt::Display for TwitterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TwitterError::Http(e) => write!(f, "HTTP error: {}", e),
            TwitterError::Api(s) => write!(f, "Twitter API error: {}", s),
        }
    }
}

impl std::error::Error for TwitterError {}
