use http::{HeaderMap, Method};
use url::Url;

use crate::core::{body::RequestBody, path_matcher::PathVars};

/// The route that matched a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchedRoute {
    /// Template of the matched route, method segment included.
    pub path: String,
    /// Path variables; values are never coerced.
    pub vars: PathVars,
}

/// Everything a handler gets to see about one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub route: MatchedRoute,
}

impl RequestContext {
    pub fn new(url: Url, method: Method) -> Self {
        Self {
            url,
            method,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            route: MatchedRoute::default(),
        }
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_route(mut self, route: MatchedRoute) -> Self {
        self.route = route;
        self
    }

    /// A path variable by name.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.route.vars.get(name).map(String::as_str)
    }

    /// Decoded query string pairs, in order of appearance.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url.query_pairs().into_owned().collect()
    }
}
