//! Runtime helper for spawning cancellable background loops.

use crate::observability::events;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const COMPONENT: &str = "loop_runtime";

/// Owns one spawned loop: its name, its cancellation token and its join handle.
pub(crate) struct BackgroundLoopHandle {
    loop_name: String,
    cancel: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl BackgroundLoopHandle {
    pub(crate) fn loop_name(&self) -> &str {
        &self.loop_name
    }

    /// Signals the loop and waits until it has returned.
    pub(crate) async fn shutdown(self) {
        debug!(
            component = COMPONENT,
            loop_name = self.loop_name(),
            "stopping background loop"
        );
        self.cancel.cancel();
        if let Err(err) = self.join_handle.await {
            warn!(
                event = events::RUNTIME_LOOP_JOIN_FAILED,
                component = COMPONENT,
                loop_name = self.loop_name.as_str(),
                err = %err,
                "background loop ended abnormally"
            );
        }
    }
}

/// Spawns `run_loop` on the ambient tokio runtime.
///
/// The loop receives a clone of `cancel` and must return promptly once it is
/// cancelled.
pub(crate) fn spawn_background_loop<F, Fut>(
    loop_name: impl Into<String>,
    cancel: CancellationToken,
    run_loop: F,
) -> BackgroundLoopHandle
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let loop_name = loop_name.into();
    debug!(
        event = events::RUNTIME_LOOP_SPAWN,
        component = COMPONENT,
        loop_name = loop_name.as_str(),
        "spawning background loop"
    );
    let join_handle = tokio::spawn(run_loop(cancel.clone()));

    BackgroundLoopHandle {
        loop_name,
        cancel,
        join_handle,
    }
}

#[cfg(test)]
mod tests {
    use super::spawn_background_loop;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn shutdown_cancels_and_joins_the_loop() {
        let finished = Arc::new(AtomicBool::new(false));
        let finished_in_loop = finished.clone();

        let handle = spawn_background_loop("test-loop", CancellationToken::new(), |cancel| {
            async move {
                cancel.cancelled().await;
                finished_in_loop.store(true, Ordering::SeqCst);
            }
        });

        assert_eq!(handle.loop_name(), "test-loop");
        handle.shutdown().await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
