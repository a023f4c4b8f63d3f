use std::future::pending;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Resolves on the first SIGINT or SIGTERM and returns the signal's name.
///
/// A handler that cannot be installed is logged and that signal is ignored; the other one still
/// works.
pub async fn wait_for_shutdown_signal() -> &'static str {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGINT");
                pending::<()>().await;
            }
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                pending::<()>().await;
            }
        }
    };

    let received = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!(signal = received, "shutdown signal received");
    received
}
