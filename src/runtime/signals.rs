//! OS signal wiring.

use tracing::{info, warn};

use super::shutdown::ShutdownSignal;

/// Trigger `signal` on Ctrl-C, and on SIGTERM where supported.
///
/// Spawns a background task that ends once either signal arrives or the
/// shutdown signal fires for another reason.
pub fn install(signal: ShutdownSignal) {
    tokio::spawn(async move {
        tokio::select! {
            () = wait_for_os_signal() => signal.trigger(),
            () = signal.wait() => {}
        }
    });
}

#[cfg(unix)]
async fn wait_for_os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler; relying on Ctrl-C");
            ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        () = ctrl_c() => {}
        _ = term.recv() => info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C"),
        Err(e) => {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
