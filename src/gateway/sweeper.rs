//! Pending-call eviction.
//!
//! # Responsibilities
//! - Periodically answer calls older than the time-to-live with 504
//! - Stop on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time;

use crate::gateway::pending::PendingCalls;
use crate::http::ResponseSink;
use crate::observability::metrics;

pub struct PendingSweeper {
    pending: Arc<PendingCalls>,
    ttl: Duration,
    interval: Duration,
}

impl PendingSweeper {
    pub fn new(pending: Arc<PendingCalls>, ttl: Duration, interval: Duration) -> Self {
        Self {
            pending,
            ttl,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            ttl_secs = self.ttl.as_secs(),
            interval_ms = self.interval.as_millis() as u64,
            "Pending-call sweeper starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Pending-call sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Evict every expired call. Returns how many were answered.
    pub async fn sweep(&self) -> usize {
        let expired = self.pending.take_expired(self.ttl);
        let count = expired.len();

        for (request_id, call) in expired {
            tracing::warn!(
                request_id = %request_id,
                microservice = %call.microservice,
                waited_ms = call.created.elapsed().as_millis() as u64,
                "Pending call timed out"
            );
            metrics::record_pending_timeout(&call.microservice);
            if let Err(e) = call
                .reply
                .send(StatusCode::GATEWAY_TIMEOUT, Bytes::from_static(b"Gateway Timeout"))
                .await
            {
                tracing::debug!(
                    request_id = %request_id,
                    error = %e,
                    "Client gone before timeout reply"
                );
            }
        }
        count
    }
}
