//! Route matching logic.
//!
//! # Responsibilities
//! - Match host (case-insensitive, optional `*.` wildcard)
//! - Match path prefix (case-sensitive)
//! - Match method (case-insensitive)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Matchers run against a body-less `RequestContext`, so the serving
//!   layer can build one cheaply from any request type
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use std::fmt;

use axum::http::{header, Request};

use crate::config::RouteMatch;

/// The parts of a request that routing and load balancing look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Upper-case method name.
    pub method: String,
    /// Lower-case host without port.
    pub host: Option<String>,
    pub path: String,
}

impl RequestContext {
    pub fn new(method: &str, host: Option<&str>, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            host: host.map(normalize_host),
            path: path.to_string(),
        }
    }

    /// Extract method, host and path from an HTTP request.
    ///
    /// The `Host` header wins over the URI authority.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| req.uri().host());
        Self::new(req.method().as_str(), host, req.uri().path())
    }
}

fn normalize_host(host: &str) -> String {
    let without_port = match host.rsplit_once(':') {
        // Leave bracketed IPv6 literals without a port alone.
        Some((name, port)) if !name.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    without_port.to_ascii_lowercase()
}

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &RequestContext) -> bool;
}

/// Matches the host against a list of names.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    exact: Vec<String>,
    /// Suffixes (with leading dot) from `*.example.com` entries.
    wildcard_suffixes: Vec<String>,
}

impl HostMatcher {
    /// Create a new host matcher.
    /// Hosts are normalized to lowercase for case-insensitive matching.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exact = Vec::new();
        let mut wildcard_suffixes = Vec::new();
        for host in hosts {
            let host = host.as_ref().trim().to_ascii_lowercase();
            match host.strip_prefix('*') {
                Some(suffix) if suffix.starts_with('.') => wildcard_suffixes.push(suffix.to_string()),
                _ => exact.push(host),
            }
        }
        Self {
            exact,
            wildcard_suffixes,
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &RequestContext) -> bool {
        let Some(host) = req.host.as_deref() else {
            return false;
        };
        self.exact.iter().any(|h| h == host)
            || self
                .wildcard_suffixes
                .iter()
                .any(|suffix| host.len() > suffix.len() && host.ends_with(suffix.as_str()))
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &RequestContext) -> bool {
        req.path.starts_with(&self.prefix)
    }
}

/// Matches the request method.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<String>,
}

impl MethodMatcher {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            methods: methods
                .into_iter()
                .map(|m| m.as_ref().trim().to_ascii_uppercase())
                .collect(),
        }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &RequestContext) -> bool {
        self.methods.iter().any(|m| *m == req.method)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    /// Compile route match criteria. Unset criteria are left out.
    pub fn from_route_match(route_match: &RouteMatch) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if !route_match.hosts.is_empty() {
            matchers.push(Box::new(HostMatcher::new(&route_match.hosts)));
        }
        if let Some(path) = &route_match.path {
            matchers.push(Box::new(PathPrefixMatcher::new(path.clone())));
        }
        if !route_match.methods.is_empty() {
            matchers.push(Box::new(MethodMatcher::new(&route_match.methods)));
        }
        Self::new(matchers)
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &RequestContext) -> bool {
        // All matchers must pass (AND)
        self.matchers.iter().all(|m| m.matches(req))
    }
}
