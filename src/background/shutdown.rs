use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels `cancelation` on Ctrl-C. Returns early when something else cancels it first, e.g. the
/// event loop after the browser disconnected.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => {},
    };
}
