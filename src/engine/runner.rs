use std::future::Future;

use super::{Engine, EngineError};
use crate::api::{Broker, Notifier};
use crate::schedule::{wait_for_next_boundary, NotificationGate};

/// Run frames on every `interval_secs` boundary until `shutdown` resolves
///
/// Shutdown is only observed while waiting for the next boundary; a frame
/// that has started always runs to completion so its orders get recorded.
pub async fn run_until<B, F>(
    engine: &Engine<B>,
    notifier: &dyn Notifier,
    gate: &mut NotificationGate,
    interval_secs: u64,
    shutdown: F,
) -> Result<(), EngineError>
where
    B: Broker,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("⚠️  Shutdown requested, stopping between frames");
                return Ok(());
            }
            boundary = wait_for_next_boundary(interval_secs) => {
                tracing::debug!("⏰ Frame boundary {}", boundary);
            }
        }

        let outcome = engine.run_frame().await?;

        if let Some(message) = outcome.message() {
            if gate.is_due() {
                if let Err(e) = notifier.publish(&message.to_string()).await {
                    tracing::warn!("✗ Failed to publish status update: {}", e);
                }
            }
        }
    }
}
