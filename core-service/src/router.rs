//! # Request Router
//!
//! Classifies intercepted requests by URL path. Checks run in this order:
//!
//! 1. static assets (extension or prefix)
//! 2. learning content, `/{resource}/{pathId}(/chapters(/{chapterId})?)?`
//!    with an optional `/api/` prefix
//! 3. API prefixes
//! 4. everything else
//!
//! Content is checked before the API list so `/api/learning-paths/{id}` is
//! served stale-while-revalidate with a local-store fallback.

use crate::error::Result;
use bridge_traits::http::HttpRequest;
use core_runtime::config::RouteConfig;
use regex::Regex;

/// Granularity of a learning content request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentResource {
    Path { path_id: String },
    ChapterList { path_id: String },
    Chapter { path_id: String, chapter_id: String },
}

impl ContentResource {
    pub fn path_id(&self) -> &str {
        match self {
            ContentResource::Path { path_id }
            | ContentResource::ChapterList { path_id }
            | ContentResource::Chapter { path_id, .. } => path_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestClass {
    Static,
    Api,
    LearningContent(ContentResource),
    Other,
}

/// Whether the host is loading a page or a sub-resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Navigate,
    Resource,
}

/// A request handed over by the host's interception layer.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub request: HttpRequest,
    pub kind: RequestKind,
}

impl InterceptedRequest {
    pub fn navigate(request: HttpRequest) -> Self {
        Self {
            request,
            kind: RequestKind::Navigate,
        }
    }

    pub fn resource(request: HttpRequest) -> Self {
        Self {
            request,
            kind: RequestKind::Resource,
        }
    }

    pub fn is_navigation(&self) -> bool {
        self.kind == RequestKind::Navigate
    }
}

#[derive(Debug, Clone)]
pub struct RequestRouter {
    routes: RouteConfig,
    content_pattern: Regex,
}

impl RequestRouter {
    pub fn new(routes: RouteConfig) -> Result<Self> {
        let resources = routes
            .content_resources
            .iter()
            .map(|resource| regex::escape(resource))
            .collect::<Vec<_>>()
            .join("|");
        let content_pattern = Regex::new(&format!(
            r"^/(?:api/)?(?:{})/([^/]+)(/chapters(?:/([^/]+))?)?/?$",
            resources
        ))?;

        Ok(Self {
            routes,
            content_pattern,
        })
    }

    pub fn routes(&self) -> &RouteConfig {
        &self.routes
    }

    pub fn classify(&self, url: &str) -> RequestClass {
        let path = url_path(url);

        if self.is_static(&path) {
            return RequestClass::Static;
        }

        if let Some(resource) = self.content_resource(&path) {
            return RequestClass::LearningContent(resource);
        }

        if self
            .routes
            .api_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return RequestClass::Api;
        }

        RequestClass::Other
    }

    fn is_static(&self, path: &str) -> bool {
        let lower = path.to_ascii_lowercase();
        self.routes
            .static_extensions
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
            || self
                .routes
                .static_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn content_resource(&self, path: &str) -> Option<ContentResource> {
        let captures = self.content_pattern.captures(path)?;
        let path_id = captures.get(1)?.as_str().to_string();

        Some(match (captures.get(2), captures.get(3)) {
            (_, Some(chapter)) => ContentResource::Chapter {
                path_id,
                chapter_id: chapter.as_str().to_string(),
            },
            (Some(_), None) => ContentResource::ChapterList { path_id },
            (None, None) => ContentResource::Path { path_id },
        })
    }

    /// Absolute URL under which content for `resource` is cached explicitly.
    pub fn content_url(&self, base_url: &str, resource: &ContentResource) -> String {
        let name = self
            .routes
            .content_resources
            .first()
            .map(String::as_str)
            .unwrap_or("learning-paths");
        let base = base_url.trim_end_matches('/');

        match resource {
            ContentResource::Path { path_id } => format!("{base}/api/{name}/{path_id}"),
            ContentResource::ChapterList { path_id } => {
                format!("{base}/api/{name}/{path_id}/chapters")
            }
            ContentResource::Chapter {
                path_id,
                chapter_id,
            } => format!("{base}/api/{name}/{path_id}/chapters/{chapter_id}"),
        }
    }
}

/// Path component of an absolute or origin-relative URL.
fn url_path(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(&['?', '#'][..])
            .next()
            .unwrap_or(url)
            .to_string(),
    }
}
