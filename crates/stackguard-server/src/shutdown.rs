//! Graceful shutdown coordination.
//!
//! A [`ShutdownCoordinator`] listens for SIGTERM / SIGINT, stops the HTTP
//! listener from accepting new connections, and then waits for open
//! connections and predictions already running on the blocking pool. The
//! whole drain is bounded by `shutdown.timeout_seconds`.

use std::future::IntoFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Shutdown coordinator
// ---------------------------------------------------------------------------

/// Coordinates shutdown between the signal handler, the server, and
/// in-flight predictions.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    in_flight: Arc<AtomicUsize>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a coordinator that waits at most `timeout_seconds` for
    /// in-flight predictions.
    pub fn new(timeout_seconds: u64) -> Self {
        Self {
            token: CancellationToken::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register an in-flight prediction. The returned guard releases it on
    /// drop.
    pub fn track_task(&self) -> TaskGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for in-flight predictions until `deadline`.
    ///
    /// Returns `false` if the deadline passed first.
    pub async fn wait_for_tasks_until(&self, deadline: Instant) -> bool {
        let poll_interval = Duration::from_millis(50);

        loop {
            let count = self.in_flight_count();
            if count == 0 {
                info!("All in-flight predictions completed");
                return true;
            }
            if Instant::now() >= deadline {
                warn!(
                    remaining = count,
                    timeout_seconds = self.timeout.as_secs(),
                    "Shutdown timeout expired with predictions still running"
                );
                return false;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// RAII guard that decrements the in-flight counter on drop.
pub struct TaskGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Signal handling
// ---------------------------------------------------------------------------

/// Resolves when SIGTERM or SIGINT (Ctrl-C elsewhere) is received, or when
/// the coordinator is triggered programmatically.
pub async fn shutdown_signal(coordinator: ShutdownCoordinator) {
    let token = coordinator.token();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Shutdown signal received (SIGTERM)"),
                    _ = sigint.recv() => info!("Shutdown signal received (SIGINT)"),
                    _ = token.cancelled() => info!("Shutdown signal received (token cancelled)"),
                }
            }
            _ => {
                warn!("Failed to install signal handlers, falling back to Ctrl-C");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Shutdown signal received (Ctrl-C)"),
                    _ = token.cancelled() => info!("Shutdown signal received (token cancelled)"),
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Shutdown signal received (Ctrl-C)"),
            _ = token.cancelled() => info!("Shutdown signal received (token cancelled)"),
        }
    }

    coordinator.trigger();
}

// ---------------------------------------------------------------------------
// Serving
// ---------------------------------------------------------------------------

/// Serve `app` on `listener` until a shutdown signal, then drain.
///
/// Open connections and in-flight predictions share one deadline of
/// `timeout` from the moment shutdown starts. Connections still open at the
/// deadline are dropped.
pub async fn serve_until_shutdown(
    listener: TcpListener,
    app: Router,
    coordinator: ShutdownCoordinator,
) -> std::io::Result<()> {
    let token = coordinator.token();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(coordinator.clone()))
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = token.cancelled() => {}
    }

    let deadline = Instant::now() + coordinator.timeout();
    match tokio::time::timeout_at(deadline, &mut server).await {
        Ok(result) => result?,
        Err(_) => warn!(
            timeout_seconds = coordinator.timeout().as_secs(),
            "Shutdown timeout expired with connections still open"
        ),
    }

    coordinator.wait_for_tasks_until(deadline).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger() {
        let coord = ShutdownCoordinator::new(30);
        assert!(!coord.token().is_cancelled());
        coord.clone().trigger();
        assert!(coord.token().is_cancelled());
    }

    #[test]
    fn test_task_guard_counts() {
        let coord = ShutdownCoordinator::new(30);
        let a = coord.track_task();
        let b = coord.track_task();
        assert_eq!(coord.in_flight_count(), 2);
        drop(a);
        assert_eq!(coord.in_flight_count(), 1);
        drop(b);
        assert_eq!(coord.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_tasks_immediate_when_empty() {
        let coord = ShutdownCoordinator::new(1);
        assert!(coord.wait_for_tasks_until(Instant::now() + coord.timeout()).await);
    }

    #[tokio::test]
    async fn test_wait_for_tasks_times_out() {
        let coord = ShutdownCoordinator::new(0);
        let _guard = coord.track_task();
        assert!(!coord.wait_for_tasks_until(Instant::now() + coord.timeout()).await);
    }

    #[tokio::test]
    async fn test_shutdown_signal_via_token() {
        let coord = ShutdownCoordinator::new(30);
        let trigger = coord.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });
        shutdown_signal(coord.clone()).await;
        assert!(coord.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_guard_moved_into_blocking_task_is_counted() {
        let coord = ShutdownCoordinator::new(5);
        let guard = coord.track_task();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let _ = release_rx.recv();
        });

        assert_eq!(coord.in_flight_count(), 1);
        let _ = release_tx.send(());
        handle.await.unwrap();
        assert_eq!(coord.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_tasks_sees_late_completion() {
        let coord = ShutdownCoordinator::new(5);
        let guard = coord.track_task();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            drop(guard);
        });
        assert!(coord.wait_for_tasks_until(Instant::now() + coord.timeout()).await);
    }
}
