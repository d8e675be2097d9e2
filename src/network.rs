//! Request/response snapshots and the live network fetcher
//!
//! The worker never talks to sockets directly: every network round trip goes
//! through a [`Fetcher`]. [`HttpFetcher`] is the production implementation;
//! tests substitute a stub that records calls.

use crate::error::{PrecacheError, PrecacheResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP request methods understood by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    /// Canonical upper-case method name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Method {
    type Err = PrecacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(PrecacheError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Case-insensitive header lookup over an ordered header list
fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// An intercepted or outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Plain GET with no headers, the shape used for precached assets
    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Add a header, keeping any existing values
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A full response snapshot: status line, headers and body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Final URL the response was served from
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether the status is in the 2xx range
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Lower-cased header names listed in `Vary`, in order
    pub fn vary_headers(&self) -> Vec<String> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("vary"))
            .flat_map(|(_, v)| v.split(','))
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// `Vary: *` makes a response unmatchable, so it is never stored
    pub fn varies_on_everything(&self) -> bool {
        self.vary_headers().iter().any(|name| name == "*")
    }
}

/// Performs live network round trips
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a request over the network.
    ///
    /// Any HTTP status, including 4xx/5xx, is returned as a [`Response`].
    /// Only transport failures (DNS, connect, timeout, reset) are errors.
    async fn fetch(&self, request: &Request) -> PrecacheResult<Response>;
}

/// Live fetcher backed by a `ureq` agent
#[derive(Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
    max_body: u64,
}

impl HttpFetcher {
    /// Create a fetcher with a global request timeout and user agent
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .user_agent(user_agent)
            .build();

        Self {
            agent: config.into(),
            max_body: u64::MAX,
        }
    }

    /// Fail responses whose body is larger than `bytes`
    pub fn with_body_limit(mut self, bytes: u64) -> Self {
        self.max_body = bytes;
        self
    }

    fn send_blocking(
        agent: &ureq::Agent,
        request: &Request,
        max_body: u64,
    ) -> PrecacheResult<Response> {
        let url = request.url.as_str();
        let headers = &request.headers;

        let result = match request.method {
            Method::Get => with_headers(agent.get(url), headers).call(),
            Method::Head => with_headers(agent.head(url), headers).call(),
            Method::Delete if request.body.is_empty() => {
                with_headers(agent.delete(url), headers).call()
            }
            Method::Delete => with_headers(agent.delete(url), headers)
                .force_send_body()
                .send(&request.body[..]),
            Method::Options if request.body.is_empty() => {
                with_headers(agent.options(url), headers).call()
            }
            Method::Options => with_headers(agent.options(url), headers)
                .force_send_body()
                .send(&request.body[..]),
            Method::Post => with_headers(agent.post(url), headers).send(&request.body[..]),
            Method::Put => with_headers(agent.put(url), headers).send(&request.body[..]),
            Method::Patch => with_headers(agent.patch(url), headers).send(&request.body[..]),
        };

        let mut response = result.map_err(|e| PrecacheError::network(url, e.to_string()))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let final_url = {
            use ureq::ResponseExt;
            response.get_uri().to_string()
        };

        let body = response
            .body_mut()
            .with_config()
            .limit(max_body)
            .read_to_vec()
            .map_err(|e| PrecacheError::network(url, format!("reading body: {}", e)))?;

        Ok(Response {
            url: final_url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> PrecacheResult<Response> {
        debug!("Network {} {}", request.method, request.url);

        let agent = self.agent.clone();
        let request = request.clone();
        let max_body = self.max_body;
        tokio::task::spawn_blocking(move || Self::send_blocking(&agent, &request, max_body))
            .await
            .map_err(|e| PrecacheError::Internal(format!("fetch task failed: {}", e)))?
    }
}
