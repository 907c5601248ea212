use std::time::Duration;

use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub const TIMEOUT_ENV: &str = "TRUENAS_HTTP_TIMEOUT_SECS";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{method} {path} failed: {source}")]
    Transport {
        method: &'static str,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("appliance authentication failed ({status}) for {path}")]
    Unauthorized { path: String, status: StatusCode },
    #[error("appliance rate limit exceeded for {path}")]
    RateLimited { path: String },
    #[error("appliance API error {status} for {path}: {body}")]
    Status {
        path: String,
        status: StatusCode,
        body: String,
    },
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    pub fn from_status(path: &str, status: StatusCode, body: String) -> Self {
        let path = path.to_string();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return ApiError::Unauthorized { path, status };
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return ApiError::RateLimited { path };
        }
        ApiError::Status { path, status, body }
    }
}

/// Bearer-authenticated client for the appliance REST API.
///
/// Certificate verification is off: the appliance is usually still serving the
/// certificate this tool is about to replace.
pub struct ApplianceClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ApplianceClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(resolve_timeout())
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn send(
        &self,
        method: &'static str,
        path: &str,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        debug!("[appliance-http] {method} {path}");
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .map_err(|source| ApiError::Transport {
                method,
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            debug!("[appliance-http] {method} {path} returned {status}");
            return Err(ApiError::from_status(path, status, body));
        }
        Ok(response)
    }

    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send("GET", path, self.client.get(self.url(path)))?;
        response.json().map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }

    /// GET where only the status matters.
    pub fn get(&self, path: &str) -> Result<(), ApiError> {
        self.send("GET", path, self.client.get(self.url(path)))?;
        Ok(())
    }

    pub fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        self.send("POST", path, self.client.post(self.url(path)).json(body))?;
        Ok(())
    }

    pub fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        self.send("PUT", path, self.client.put(self.url(path)).json(body))?;
        Ok(())
    }

    pub fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send("DELETE", path, self.client.delete(self.url(path)))?;
        Ok(())
    }
}

fn resolve_timeout() -> Duration {
    const DEFAULT_TIMEOUT_SECS: u64 = 15;
    let timeout = std::env::var(TIMEOUT_ENV)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout == 0 {
        warn!("[appliance-http] invalid timeout value; using default");
        return Duration::from_secs(DEFAULT_TIMEOUT_SECS);
    }
    Duration::from_secs(timeout)
}
