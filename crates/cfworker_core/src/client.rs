//! Blocking HTTP client that injects the current account's credentials.
//!
//! # Responsibility
//! - Attach `X-Auth-Email` / `X-Auth-Key` to Cloudflare-bound requests.
//! - Tag every request with an `X-Account-Context` hash of the account email.
//! - Classify non-2xx responses into [`ApiError`] variants.
//!
//! # Invariants
//! - Auth headers are never attached to non-Cloudflare hosts.
//! - The Global API Key never reaches the log.

use crate::i18n::{message, Language, MessageKey};
use crate::logging::mask_email;
use crate::model::account::Credentials;
use log::{debug, info, warn};
use reqwest::blocking::{Client, Request, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const HEADER_AUTH_EMAIL: &str = "X-Auth-Email";
pub const HEADER_AUTH_KEY: &str = "X-Auth-Key";
pub const HEADER_ACCOUNT_CONTEXT: &str = "X-Account-Context";

/// HTTP-layer failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 429
    RateLimited,
    /// 500
    Server,
    /// Any other non-2xx status, with the best message found in the body.
    Api { status: u16, message: Option<String> },
    /// Connection, TLS or timeout failure before a status was received.
    Transport(String),
    /// 2xx response whose body did not match the expected shape.
    Decode(String),
    /// Request could not be assembled (bad URL or header value).
    InvalidRequest(String),
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "authentication failed (401)"),
            Self::Forbidden => write!(f, "access denied (403)"),
            Self::RateLimited => write!(f, "rate limit exceeded (429)"),
            Self::Server => write!(f, "server error (500)"),
            Self::Api {
                status,
                message: Some(message),
            } => write!(f, "{message} ({status})"),
            Self::Api {
                status,
                message: None,
            } => write!(f, "request failed with status {status}"),
            Self::Transport(details) => write!(f, "network error: {details}"),
            Self::Decode(details) => write!(f, "unexpected response: {details}"),
            Self::InvalidRequest(details) => write!(f, "invalid request: {details}"),
        }
    }
}

impl Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_builder() {
            Self::InvalidRequest(value.to_string())
        } else if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Forbidden => Some(403),
            Self::RateLimited => Some(429),
            Self::Server => Some(500),
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Notification text for this error in `lang`.
    pub fn user_message(&self, lang: Language) -> String {
        match self {
            Self::Unauthorized => message(lang, MessageKey::AuthenticationFailed).to_string(),
            Self::Forbidden => message(lang, MessageKey::AccessDenied).to_string(),
            Self::RateLimited => message(lang, MessageKey::RateLimitExceeded).to_string(),
            Self::Server => message(lang, MessageKey::ServerError).to_string(),
            Self::Api {
                message: Some(text),
                ..
            } => format!("{}: {text}", message(lang, MessageKey::ApiErrorPrefix)),
            other => format!("{}: {other}", message(lang, MessageKey::ApiErrorPrefix)),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Maps a non-2xx status and its body to an [`ApiError`].
pub fn classify_response(status: u16, body: &str) -> ApiError {
    match status {
        401 => ApiError::Unauthorized,
        403 => ApiError::Forbidden,
        429 => ApiError::RateLimited,
        500 => ApiError::Server,
        _ => ApiError::Api {
            status,
            message: extract_error_message(body),
        },
    }
}

/// Best human message in an error body: joined `errors[].message`, then
/// `message`, then `error`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    if let Some(errors) = value.get("errors").and_then(|v| v.as_array()) {
        let joined = errors
            .iter()
            .map(|err| {
                err.get("message")
                    .map(json_text)
                    .unwrap_or_else(|| "Unknown error".to_string())
            })
            .collect::<Vec<_>>()
            .join(", ");
        return Some(joined);
    }

    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).filter(|v| !v.is_null()).map(json_text))
}

fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// True when `url` targets the Cloudflare API (`cloudflare.com` or `/api/...`).
pub fn is_cloudflare_api(url: &str) -> bool {
    url.contains("cloudflare.com") || url.starts_with("/api/")
}

/// Short per-account cache key: 32-bit rolling hash of the email's UTF-16
/// code units (`h = h * 31 + unit`, wrapping), absolute value in base 36.
pub fn account_hash(email: &str) -> String {
    let hash = email.encode_utf16().fold(0i32, |hash, unit| {
        (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit))
    });
    to_base36(hash.unsigned_abs())
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Shared HTTP client. Paths starting with `/` are resolved against the base URL.
pub struct ApiClient {
    http: Client,
    base_url: Option<String>,
    credentials: Option<Credentials>,
}

impl ApiClient {
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base_url: None,
            credentials: None,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    pub fn set_credentials(&mut self, credentials: Option<Credentials>) {
        self.credentials = credentials;
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn get<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let request = self.build_request(Method::GET, url, None::<&()>)?;
        self.execute_json(request)
    }

    pub fn post_json<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> ApiResult<T> {
        let request = self.build_request(Method::POST, url, Some(body))?;
        self.execute_json(request)
    }

    pub fn put_json<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> ApiResult<T> {
        let request = self.build_request(Method::PUT, url, Some(body))?;
        self.execute_json(request)
    }

    pub fn patch_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> ApiResult<T> {
        let request = self.build_request(Method::PATCH, url, Some(body))?;
        self.execute_json(request)
    }

    pub fn delete<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let request = self.build_request(Method::DELETE, url, None::<&()>)?;
        self.execute_json(request)
    }

    /// Builds a request with credential headers applied, without sending it.
    pub fn build_request<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> ApiResult<Request> {
        let mut builder = self.http.request(method, self.resolve_url(url));

        if let Some(credentials) = &self.credentials {
            if is_cloudflare_api(url) {
                builder = builder
                    .header(HEADER_AUTH_EMAIL, credentials.email.as_str())
                    .header(HEADER_AUTH_KEY, credentials.global_api_key.as_str());
            }
            builder = builder.header(HEADER_ACCOUNT_CONTEXT, account_hash(&credentials.email));
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        Ok(builder.build()?)
    }

    fn resolve_url(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if url.starts_with('/') => format!("{base}{url}"),
            _ => url.to_string(),
        }
    }

    fn execute_json<T: DeserializeOwned>(&self, request: Request) -> ApiResult<T> {
        let response = self.execute(request)?;
        response
            .json::<T>()
            .map_err(|err| ApiError::Decode(err.to_string()))
    }

    fn execute(&self, request: Request) -> ApiResult<Response> {
        let method = request.method().clone();
        let url = request.url().clone();
        let account = self
            .credentials
            .as_ref()
            .map(|c| mask_email(&c.email))
            .unwrap_or_else(|| "-".to_string());
        debug!("event=http_request module=client status=start method={method} url={url} account={account}");

        let started = Instant::now();
        let result = self.http.execute(request);
        let duration_ms = started.elapsed().as_millis();

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "event=http_request module=client status=error method={method} url={url} duration_ms={duration_ms} account={account} error={err}"
                );
                return Err(ApiError::from(err));
            }
        };

        let status = response.status();
        if status.is_success() {
            info!(
                "event=http_request module=client status=ok method={method} url={url} http_status={} duration_ms={duration_ms} account={account}",
                status.as_u16()
            );
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        let error = classify_response(status.as_u16(), &body);
        warn!(
            "event=http_request module=client status=error method={method} url={url} http_status={} duration_ms={duration_ms} account={account} error={error}",
            status.as_u16()
        );
        Err(error)
    }
}
