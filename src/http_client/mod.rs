//! HTTP client for Supabase endpoints
//!
//! Each [`SupabaseClient`] owns its own `reqwest::Client` with the
//! environment's credentials installed as default headers. Clients are never
//! shared between environments, so no authorization state can leak from one
//! handle to another.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::error::{DbError, StorageError};

/// Wait assumed when a 429 carries no usable Retry-After header
const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 1;

/// Authenticated HTTP client bound to one Supabase project
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
}

impl SupabaseClient {
    /// Build a client for `base_url` authenticated with `service_key`
    pub fn new(base_url: &str, service_key: &str, timeout: Duration) -> Result<Self, String> {
        let mut headers = HeaderMap::new();
        let mut apikey =
            HeaderValue::from_str(service_key).map_err(|e| format!("invalid service key: {}", e))?;
        apikey.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", service_key))
            .map_err(|e| format!("invalid service key: {}", e))?;
        bearer.set_sensitive(true);
        headers.insert("apikey", apikey);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL for a path below the project root
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// The underlying reqwest client
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Project root URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Map a transport failure of a storage request
pub fn storage_send_error(err: reqwest::Error) -> StorageError {
    if err.is_timeout() {
        StorageError::NetworkTimeout
    } else if err.is_connect() {
        StorageError::ConnectionRefused
    } else {
        StorageError::Network(err.to_string())
    }
}

/// Turn a non-success storage response into an error
///
/// Successful responses are passed through untouched.
pub async fn check_storage_response(
    response: Response,
    object: &str,
) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let wait = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RATE_LIMIT_WAIT_SECS);

            warn!(object = object, retry_after = wait, "Rate limited by storage");
            Err(StorageError::RateLimited(wait))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            warn!(object = object, status = ?status, "Unauthorized");
            Err(StorageError::Unauthorized)
        }
        status if status.is_server_error() => {
            warn!(object = object, status = status.as_u16(), "Server error");
            Err(StorageError::ServerError(status.as_u16()))
        }
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(classify_client_error(status, &body, object))
        }
    }
}

/// Classify a 4xx storage response by status and body
///
/// Storage reports some conditions with a 400 whose JSON body carries the
/// real status, so the body is inspected as well.
fn classify_client_error(status: StatusCode, body: &str, object: &str) -> StorageError {
    let lowered = body.to_lowercase();
    if status == StatusCode::CONFLICT
        || lowered.contains("duplicate")
        || lowered.contains("already exists")
    {
        debug!(object = object, "Object already exists");
        return StorageError::Duplicate(object.to_string());
    }
    if status == StatusCode::NOT_FOUND
        || lowered.contains("not_found")
        || lowered.contains("not found")
    {
        debug!(object = object, "Object not found");
        return StorageError::NotFound(object.to_string());
    }
    warn!(object = object, status = status.as_u16(), body = body, "Request rejected");
    StorageError::Rejected {
        status: status.as_u16(),
        message: body.to_string(),
    }
}

/// Turn a non-success REST response into a row error
pub async fn check_rest_response(response: Response) -> Result<Response, DbError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DbError::Status {
        status: status.as_u16(),
        message: if body.is_empty() {
            status.canonical_reason().unwrap_or("unknown").to_string()
        } else {
            body
        },
    })
}
