//! # Route session
//!
//! Holds the route currently on display. Every query takes a generation
//! ticket; a result whose ticket was superseded by a newer query is dropped
//! instead of replacing the newer route.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use telemetry::{ApiClient, HttpRequest, RangeOptions, Reading, TimeWindow, fetch_range};
use tokio::sync::RwLock;
use tracing::info;

/// A fetched route.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub device_id: String,
    pub window: TimeWindow,
    pub readings: Vec<Reading>,
}

/// Generation of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
pub struct RouteSession {
    generation: AtomicU64,
    current: RwLock<Option<Arc<Route>>>,
}

impl RouteSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new query, superseding any in flight.
    pub fn begin(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[must_use]
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Store `route` if `ticket` is still the latest query. Returns whether it
    /// was stored.
    pub async fn apply(&self, ticket: Ticket, route: Route) -> bool {
        let mut current = self.current.write().await;
        if !self.is_current(ticket) {
            info!(device_id = %route.device_id, "discarding superseded route");
            return false;
        }
        *current = Some(Arc::new(route));
        true
    }

    /// Fetch a route and make it current. Returns `Ok(None)` when a newer
    /// query started while this one was in flight.
    ///
    /// # Errors
    ///
    /// Returns the fetch error of a query that is still current.
    pub async fn load<P: HttpRequest>(
        &self, client: &ApiClient<P>, device_id: &str, window: TimeWindow, options: &RangeOptions,
    ) -> telemetry::Result<Option<Arc<Route>>> {
        let ticket = self.begin();
        let result = fetch_range(client, device_id, &window, options).await;

        if !self.is_current(ticket) {
            info!(device_id, "query superseded, dropping result");
            return Ok(None);
        }

        let route = Route { device_id: device_id.to_string(), window, readings: result? };
        if self.apply(ticket, route).await { Ok(self.current().await) } else { Ok(None) }
    }

    /// The route on display.
    pub async fn current(&self) -> Option<Arc<Route>> {
        self.current.read().await.clone()
    }

    /// Drop the current route and invalidate queries in flight.
    pub async fn clear(&self) {
        self.begin();
        *self.current.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn route(device_id: &str) -> Route {
        let start = Utc.with_ymd_and_hms(2025, 10, 17, 10, 0, 0).unwrap();
        Route {
            device_id: device_id.to_string(),
            window: TimeWindow::new(start, start).unwrap(),
            readings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn newer_query_wins() {
        let session = RouteSession::new();
        let first = session.begin();
        let second = session.begin();

        assert!(session.apply(second, route("8")).await);
        assert!(!session.apply(first, route("7")).await);
        assert_eq!(session.current().await.map(|r| r.device_id.clone()).as_deref(), Some("8"));
    }

    #[tokio::test]
    async fn clear_invalidates() {
        let session = RouteSession::new();
        let ticket = session.begin();
        session.clear().await;

        assert!(!session.is_current(ticket));
        assert!(!session.apply(ticket, route("7")).await);
        assert_eq!(session.current().await, None);
    }
}
