//! Leader gate.
//!
//! Every replica runs the monitor, but only the leader may mutate hosts.
//! Leadership can be lost at any moment, so callers query the gate right
//! before each mutation instead of caching the answer.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::{Connection, PgConnection};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Answers whether this replica is currently the exclusive writer.
pub trait LeaderElector: Send + Sync {
    /// Must be cheap and side-effect free.
    fn is_leader(&self) -> bool;
}

/// Leader gate for single-replica deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysLeader;

impl LeaderElector for AlwaysLeader {
    fn is_leader(&self) -> bool {
        true
    }
}

/// Leader election settings.
#[derive(Debug, Clone)]
pub struct LeaderConfig {
    /// When false, the replica assumes it is alone and always leads.
    pub enabled: bool,

    /// Postgres advisory lock key shared by all replicas.
    pub lock_key: i64,

    /// How often the lock holder is verified, and followers retry.
    pub renew_interval: Duration,
}

/// Advisory lock key used unless configured otherwise.
pub const DEFAULT_LEADER_LOCK_KEY: i64 = 0x686f_7374_6d6f_6e;

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_key: DEFAULT_LEADER_LOCK_KEY,
            renew_interval: Duration::from_secs(5),
        }
    }
}

/// Why an election round did not produce an answer.
#[derive(Debug, Error)]
enum RoundError {
    #[error(transparent)]
    Query(#[from] sqlx::Error),

    #[error("no reply from the database within {0:?}")]
    TimedOut(Duration),
}

/// Bound one database round trip so a silent connection cannot keep a
/// stale lease alive.
async fn within<T, F>(limit: Duration, round: F) -> Result<T, RoundError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, round).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(RoundError::TimedOut(limit)),
    }
}

/// Leader gate backed by a session-level Postgres advisory lock.
///
/// The lock lives as long as the dedicated connection that took it. The
/// election task holds that connection, checks it on every interval, and
/// drops leadership the moment a check fails.
#[derive(Debug, Clone)]
pub struct PgAdvisoryLeader {
    leading: Arc<AtomicBool>,
    lock_key: i64,
}

impl LeaderElector for PgAdvisoryLeader {
    fn is_leader(&self) -> bool {
        self.leading.load(Ordering::Acquire)
    }
}

impl PgAdvisoryLeader {
    /// Create a gate that reports follower until the election task wins.
    pub fn new(lock_key: i64) -> Self {
        Self {
            leading: Arc::new(AtomicBool::new(false)),
            lock_key,
        }
    }

    fn set_leading(&self, leading: bool) {
        let was = self.leading.swap(leading, Ordering::AcqRel);
        match (was, leading) {
            (false, true) => info!(lock_key = self.lock_key, "Acquired monitor leadership"),
            (true, false) => warn!(lock_key = self.lock_key, "Lost monitor leadership"),
            _ => {}
        }
    }

    /// Run the election loop until shutdown is signaled.
    #[instrument(skip(self, database_url, shutdown), fields(lock_key = self.lock_key))]
    pub async fn run(
        &self,
        database_url: String,
        renew_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            renew_interval_secs = renew_interval.as_secs(),
            "Starting leader election"
        );

        let mut conn: Option<PgConnection> = None;
        let mut interval = tokio::time::interval(renew_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    conn = self.step(&database_url, renew_interval, conn).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(mut conn) = conn {
            if self.is_leader() {
                let released = within(
                    renew_interval,
                    sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
                        .bind(self.lock_key)
                        .fetch_one(&mut conn),
                )
                .await;
                if let Err(e) = released {
                    warn!(error = %e, "Failed to release leader lock");
                }
            }
            if let Err(e) = within(renew_interval, conn.close()).await {
                debug!(error = %e, "Error closing leader connection");
            }
        }
        self.set_leading(false);
        info!("Leader election stopped");
    }

    /// One election round. Returns the connection to keep for the next round.
    ///
    /// Each database call gets at most `limit` to answer.
    async fn step(
        &self,
        database_url: &str,
        limit: Duration,
        conn: Option<PgConnection>,
    ) -> Option<PgConnection> {
        let mut conn = match conn {
            Some(conn) => conn,
            None => match within(limit, PgConnection::connect(database_url)).await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Leader election cannot reach the database");
                    self.set_leading(false);
                    return None;
                }
            },
        };

        let outcome = if self.is_leader() {
            // The session lock is held for as long as this connection lives.
            within(limit, conn.ping()).await.map(|()| true)
        } else {
            within(
                limit,
                sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
                    .bind(self.lock_key)
                    .fetch_one(&mut conn),
            )
            .await
        };

        self.settle(outcome, conn)
    }

    /// Apply a round's outcome. A failed or unanswered round drops both
    /// leadership and the connection.
    fn settle<C>(&self, outcome: Result<bool, RoundError>, conn: C) -> Option<C> {
        match outcome {
            Ok(leading) => {
                self.set_leading(leading);
                Some(conn)
            }
            Err(e) => {
                warn!(error = %e, "Leader election round failed, dropping connection");
                self.set_leading(false);
                None
            }
        }
    }
}
