//! Application state shared across ops request handlers.

use std::sync::Arc;

use crate::db::Database;
use crate::leader::LeaderElector;
use crate::metrics::PrometheusMetrics;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: Database,
    leader: Arc<dyn LeaderElector>,
    metrics: PrometheusMetrics,
}

impl AppState {
    pub fn new(db: Database, leader: Arc<dyn LeaderElector>, metrics: PrometheusMetrics) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                db,
                leader,
                metrics,
            }),
        }
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub fn leader(&self) -> &dyn LeaderElector {
        self.inner.leader.as_ref()
    }

    pub fn metrics(&self) -> &PrometheusMetrics {
        &self.inner.metrics
    }
}
