//! Tracking of in-flight streaming calls and coordinated shutdown.
//!
//! Every streaming RPC registers itself through [`StreamLifecycle::begin`]
//! and holds the returned [`StreamGuard`] until it finishes. Shutdown stops
//! new calls, gives in-flight calls a grace period to drain, then cancels the
//! shared [`CancellationToken`] that every streaming loop selects on.

use crate::server::telemetry::{decrement_streams_inflight, increment_streams_inflight};
use core::time::Duration;
use ordermgmt_core::Error;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

pub struct StreamLifecycle {
    inflight: AtomicUsize,
    accepting: AtomicBool,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl StreamLifecycle {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            inflight: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// Registers a new streaming call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has begun.
    pub fn begin(self: &Arc<Self>) -> Result<StreamGuard, Error> {
        // Register before checking, so a drain that has already observed the
        // refusal flag also observes this call.
        self.inflight.fetch_add(1, Ordering::SeqCst);
        if !self.accepting.load(Ordering::SeqCst) {
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::ServiceShutdown);
        }
        increment_streams_inflight();
        Ok(StreamGuard {
            lifecycle: Arc::clone(self),
        })
    }

    /// Token cancelled when in-flight calls must stop.
    pub fn token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    /// Gracefully shuts down all streaming calls.
    ///
    /// - Refuses new streaming calls.
    /// - Waits up to the configured timeout for in-flight calls to finish.
    /// - Cancels the shared token so whatever is left terminates promptly.
    pub async fn shutdown(&self) -> Result<(), Error> {
        // === Phase 0: Stop accepting new requests ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new requests");
        self.accepting.store(false, Ordering::SeqCst);

        // === Phase 1: Wait for in-flight streams to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight streams ({} active)", self.inflight());
        let drain_result = timeout(self.shutdown_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight streams drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} streams still active)",
                    self.inflight()
                );
            }
        }

        // === Phase 2: Cancel any remaining work ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining streams via shutdown token");
        self.shutdown_token.cancel();

        Ok(())
    }
}

/// Marks one streaming call as in flight until dropped.
pub struct StreamGuard {
    lifecycle: Arc<StreamLifecycle>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.lifecycle.inflight.fetch_sub(1, Ordering::SeqCst);
        decrement_streams_inflight();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guards_track_inflight_calls() {
        let lifecycle = Arc::new(StreamLifecycle::new(Duration::from_secs(1)));
        let first = lifecycle.begin().unwrap();
        let second = lifecycle.begin().unwrap();
        assert_eq!(lifecycle.inflight(), 2);

        drop(first);
        assert_eq!(lifecycle.inflight(), 1);
        drop(second);
        assert_eq!(lifecycle.inflight(), 0);
    }

    #[tokio::test]
    async fn shutdown_refuses_new_calls_and_cancels() {
        let lifecycle = Arc::new(StreamLifecycle::new(Duration::from_secs(1)));
        lifecycle.shutdown().await.unwrap();

        assert!(matches!(lifecycle.begin(), Err(Error::ServiceShutdown)));
        assert!(lifecycle.token().is_cancelled());
    }

    #[tokio::test]
    async fn refused_calls_leave_no_inflight_count() {
        let lifecycle = Arc::new(StreamLifecycle::new(Duration::from_millis(50)));
        lifecycle.shutdown().await.unwrap();

        for _ in 0..3 {
            assert!(lifecycle.begin().is_err());
        }
        assert_eq!(lifecycle.inflight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn calls_racing_shutdown_are_either_refused_or_drained() {
        let lifecycle = Arc::new(StreamLifecycle::new(Duration::from_secs(5)));

        let racers: Vec<_> = (0..32)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                tokio::spawn(async move {
                    let guard = lifecycle.begin().ok()?;
                    sleep(Duration::from_millis(20)).await;
                    // Drain must wait for this call, so cancellation has not
                    // happened yet.
                    let finished_before_cancel = !lifecycle.token().is_cancelled();
                    drop(guard);
                    Some(finished_before_cancel)
                })
            })
            .collect();

        lifecycle.shutdown().await.unwrap();

        for racer in racers {
            if let Some(finished_before_cancel) = racer.await.unwrap() {
                assert!(finished_before_cancel);
            }
        }
        assert_eq!(lifecycle.inflight(), 0);
    }

    #[tokio::test]
    async fn shutdown_waits_for_drain() {
        let lifecycle = Arc::new(StreamLifecycle::new(Duration::from_secs(5)));
        let guard = lifecycle.begin().unwrap();
        let token = lifecycle.token().clone();

        tokio::spawn(async move {
            sleep(Duration::from_millis(150)).await;
            drop(guard);
        });

        lifecycle.shutdown().await.unwrap();
        assert_eq!(lifecycle.inflight(), 0);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_cancels_stragglers_after_timeout() {
        let lifecycle = Arc::new(StreamLifecycle::new(Duration::from_millis(50)));
        let _guard = lifecycle.begin().unwrap();

        lifecycle.shutdown().await.unwrap();
        assert_eq!(lifecycle.inflight(), 1);
        assert!(lifecycle.token().is_cancelled());
    }
}
