//! Cache regions and the entries stored in them.

use crate::error::{CacheError, Result};
use bridge_traits::http::{HttpRequest, HttpResponse};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How a region answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStrategy {
    /// Serve the cached entry when present, touch the network only on a miss.
    CacheFirst,
    /// Always try the network, fall back to the cached entry.
    NetworkFirst,
    /// Serve the cached entry and refresh it in the background.
    StaleWhileRevalidate,
}

/// The three independently populated cache regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheRegion {
    StaticAssets,
    ApiResponses,
    LearningContent,
}

impl CacheRegion {
    pub const ALL: [CacheRegion; 3] = [
        CacheRegion::StaticAssets,
        CacheRegion::ApiResponses,
        CacheRegion::LearningContent,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CacheRegion::StaticAssets => "static-assets",
            CacheRegion::ApiResponses => "api-responses",
            CacheRegion::LearningContent => "learning-content",
        }
    }

    pub fn strategy(&self) -> CacheStrategy {
        match self {
            CacheRegion::StaticAssets => CacheStrategy::CacheFirst,
            CacheRegion::ApiResponses => CacheStrategy::NetworkFirst,
            CacheRegion::LearningContent => CacheStrategy::StaleWhileRevalidate,
        }
    }
}

impl fmt::Display for CacheRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CacheRegion {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        CacheRegion::ALL
            .into_iter()
            .find(|region| region.name() == s)
            .ok_or_else(|| CacheError::UnknownRegion(s.to_string()))
    }
}

/// Identity of a request inside a region: `"METHOD URL"`.
pub fn cache_key(request: &HttpRequest) -> String {
    format!("{} {}", request.method, request.url)
}

/// A full response as held by a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    /// Unix epoch milliseconds
    pub stored_at: i64,
}

impl CachedResponse {
    pub fn from_response(response: &HttpResponse, stored_at: i64) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at,
        }
    }

    pub fn to_response(&self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}
