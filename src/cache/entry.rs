//! Stored request/response pairs

use crate::cache::key::{MatchOptions, RequestKey};
use crate::network::{Method, Request, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One request/response pair held by a cache bucket
///
/// Only the request headers named by the response's `Vary` header are kept;
/// they are all that matching needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub method: Method,
    #[serde(default)]
    pub request_headers: Vec<(String, String)>,
    pub response: Response,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Snapshot a request/response pair for storage
    pub fn new(request: &Request, response: Response) -> Self {
        let request_headers = response
            .vary_headers()
            .into_iter()
            .filter_map(|name| {
                request
                    .header(&name)
                    .map(|value| (name.clone(), value.to_string()))
            })
            .collect();

        Self {
            key: RequestKey::from_url(&request.url),
            method: request.method,
            request_headers,
            response,
            stored_at: Utc::now(),
        }
    }

    /// Whether `request` selects this entry under `options`
    pub fn matches(&self, request: &Request, options: MatchOptions) -> bool {
        if !options.ignore_method && request.method != Method::Get {
            return false;
        }

        let key = RequestKey::from_url(&request.url);
        let same_url = if options.ignore_search {
            key.without_search() == self.key.without_search()
        } else {
            key == self.key
        };
        if !same_url {
            return false;
        }

        if options.ignore_vary {
            return true;
        }

        self.response.vary_headers().iter().all(|name| {
            if name == "*" {
                return false;
            }
            let stored = self
                .request_headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str());
            stored == request.header(name)
        })
    }
}
