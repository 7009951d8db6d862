//! Routable entries published to the serving layer.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::model::{ClusterState, RouteState};
use crate::routing::matcher::{AndMatcher, Matcher, RequestContext};

/// One resolved route: its compiled matcher and the cluster it targets.
///
/// Built from the route config current at publish time; a later config
/// change republishes the table rather than mutating the entry.
#[derive(Debug)]
pub struct RouteEndpoint {
    route_id: String,
    priority: i32,
    matcher: AndMatcher,
    route: Arc<RouteState>,
    cluster: Arc<ClusterState>,
}

impl RouteEndpoint {
    pub fn new(route: Arc<RouteState>, cluster: Arc<ClusterState>) -> Self {
        let config = route.config();
        Self {
            route_id: config.id.clone(),
            priority: config.priority,
            matcher: AndMatcher::from_route_match(&config.route_match),
            route,
            cluster,
        }
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn route(&self) -> &Arc<RouteState> {
        &self.route
    }

    pub fn cluster(&self) -> &Arc<ClusterState> {
        &self.cluster
    }

    pub fn matches(&self, req: &RequestContext) -> bool {
        self.matcher.matches(req)
    }

    /// Table order: higher priority first, then route id.
    pub fn dispatch_order(a: &Arc<RouteEndpoint>, b: &Arc<RouteEndpoint>) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.route_id.cmp(&b.route_id))
    }
}
