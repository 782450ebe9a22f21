use crate::domain::{FetchRequest, RequestMode};
use reqwest::Method;

const STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "avif", "woff",
    "woff2", "ttf", "otf", "eot",
];

const STATIC_DIRECTORIES: &[&str] = &["/_next/static/", "/static/", "/icons/", "/images/", "/fonts/"];

/// Which caching policy a request gets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Non-GET: straight to the network
    Bypass,
    /// Cache-first
    StaticAsset,
    /// Network-first, JSON error when nothing is cached
    Api,
    /// Network-first, offline page when nothing is cached
    Navigation,
    /// Network-first, plain 404 when nothing is cached
    Other,
}

#[derive(Clone, Debug)]
pub struct RoutingRules {
    pub api_prefix: String,
    pub static_extensions: Vec<String>,
    pub static_directories: Vec<String>,
}

impl RoutingRules {
    pub fn new(api_prefix: impl Into<String>) -> Self {
        Self {
            api_prefix: api_prefix.into(),
            static_extensions: STATIC_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            static_directories: STATIC_DIRECTORIES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn route(&self, request: &FetchRequest) -> Route {
        if request.method != Method::GET {
            return Route::Bypass;
        }

        let path = request.path();
        if self.is_static_asset(path) {
            Route::StaticAsset
        } else if path.starts_with(&self.api_prefix) {
            Route::Api
        } else if is_navigation(request) {
            Route::Navigation
        } else {
            Route::Other
        }
    }

    fn is_static_asset(&self, path: &str) -> bool {
        if self
            .static_directories
            .iter()
            .any(|dir| path.starts_with(dir.as_str()))
        {
            return true;
        }

        let file = path.rsplit('/').next().unwrap_or_default();
        match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .static_extensions
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self::new("/api/")
    }
}

fn is_navigation(request: &FetchRequest) -> bool {
    request.mode == RequestMode::Navigate
        || request
            .header("sec-fetch-mode")
            .is_some_and(|mode| mode.eq_ignore_ascii_case("navigate"))
}
