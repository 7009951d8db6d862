//! Lock-free table of routable endpoints.
//!
//! # Responsibilities
//! - Publish the current endpoint list to the serving layer
//! - Signal staleness through a change token
//!
//! # Design Decisions
//! - The list is replaced wholesale; a reader iterating an old list is
//!   never disturbed by an update
//! - Publish order is list → new token → cancel old token, so anyone woken
//!   by the old token already sees the new list
//! - Updates are serialized; reads never lock

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use crate::routing::endpoint::RouteEndpoint;
use crate::routing::matcher::RequestContext;

/// Notification handle that fires once the table it was taken from is stale.
#[derive(Debug, Clone)]
pub struct ChangeToken {
    token: CancellationToken,
}

impl ChangeToken {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn has_changed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the table has been updated past this token.
    pub async fn changed(&self) {
        self.token.cancelled().await;
    }

    fn fire(&self) {
        self.token.cancel();
    }
}

/// The published route → cluster mapping.
#[derive(Debug)]
pub struct DynamicEndpointTable {
    endpoints: ArcSwap<Vec<Arc<RouteEndpoint>>>,
    change_token: ArcSwap<ChangeToken>,
    update_lock: Mutex<()>,
}

impl DynamicEndpointTable {
    pub fn new() -> Self {
        Self {
            endpoints: ArcSwap::from_pointee(Vec::new()),
            change_token: ArcSwap::from_pointee(ChangeToken::new()),
            update_lock: Mutex::new(()),
        }
    }

    /// Current endpoints in dispatch order.
    pub fn endpoints(&self) -> Arc<Vec<Arc<RouteEndpoint>>> {
        self.endpoints.load_full()
    }

    /// Token for the current endpoint list.
    pub fn change_token(&self) -> ChangeToken {
        ChangeToken::clone(&self.change_token.load())
    }

    pub fn len(&self) -> usize {
        self.endpoints.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole list and fire the previous change token.
    pub fn update(&self, mut endpoints: Vec<Arc<RouteEndpoint>>) {
        let _guard = self.update_lock.lock().expect("endpoint table mutex poisoned");

        endpoints.sort_by(RouteEndpoint::dispatch_order);
        let previous = self.change_token.load_full();
        self.endpoints.store(Arc::new(endpoints));
        self.change_token.store(Arc::new(ChangeToken::new()));
        previous.fire();
    }

    /// First endpoint, in dispatch order, whose match criteria accept `req`.
    pub fn find(&self, req: &RequestContext) -> Option<Arc<RouteEndpoint>> {
        self.endpoints
            .load()
            .iter()
            .find(|endpoint| endpoint.matches(req))
            .cloned()
    }
}

impl Default for DynamicEndpointTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterConfig, RouteConfig, RouteMatch};
    use crate::model::{ClusterState, RouteState};

    fn endpoint(id: &str, priority: i32, path: &str) -> Arc<RouteEndpoint> {
        let mut config = RouteConfig::new(id, "c1");
        config.priority = priority;
        config.route_match = RouteMatch {
            path: Some(path.to_string()),
            ..RouteMatch::default()
        };
        let cluster = ClusterState::new(ClusterConfig::new("c1"));
        Arc::new(RouteEndpoint::new(
            Arc::new(RouteState::new(config, Some(cluster.clone()))),
            cluster,
        ))
    }

    #[test]
    fn test_update_fires_previous_token() {
        let table = DynamicEndpointTable::new();
        let token = table.change_token();
        assert!(!token.has_changed());

        table.update(vec![endpoint("r1", 0, "/")]);

        assert!(token.has_changed());
        assert!(!table.change_token().has_changed());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_reader_keeps_old_list_during_update() {
        let table = DynamicEndpointTable::new();
        table.update(vec![endpoint("r1", 0, "/a"), endpoint("r2", 0, "/b")]);

        let old = table.endpoints();
        let mut seen = Vec::new();
        for (i, entry) in old.iter().enumerate() {
            if i == 0 {
                table.update(vec![endpoint("r3", 0, "/c")]);
            }
            seen.push(entry.route_id().to_string());
        }
        assert_eq!(seen, vec!["r1", "r2"]);

        let fresh: Vec<_> = table
            .endpoints()
            .iter()
            .map(|e| e.route_id().to_string())
            .collect();
        assert_eq!(fresh, vec!["r3"]);
    }

    #[test]
    fn test_find_respects_priority() {
        let table = DynamicEndpointTable::new();
        table.update(vec![
            endpoint("catch-all", 0, "/"),
            endpoint("api", 10, "/api"),
        ]);

        let api = table.find(&RequestContext::new("GET", None, "/api/users")).unwrap();
        assert_eq!(api.route_id(), "api");

        let other = table.find(&RequestContext::new("GET", None, "/index.html")).unwrap();
        assert_eq!(other.route_id(), "catch-all");
    }

    #[tokio::test]
    async fn test_woken_reader_sees_new_list() {
        let table = Arc::new(DynamicEndpointTable::new());
        let token = table.change_token();

        let reader = {
            let table = table.clone();
            tokio::spawn(async move {
                token.changed().await;
                table.endpoints().len()
            })
        };

        table.update(vec![endpoint("r1", 0, "/")]);
        assert_eq!(reader.await.unwrap(), 1);
    }
}
