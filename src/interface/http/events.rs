use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info};

use crate::application::StatusBatch;

/// Per-client buffer; slow SSE clients skip ahead rather than stall others
pub const EVENT_BUFFER: usize = 16;

/// Fan the watcher's single update stream out to every connected client
pub async fn forward_updates(mut updates: mpsc::Receiver<StatusBatch>, hub: broadcast::Sender<StatusBatch>) {
    while let Some(batch) = updates.recv().await {
        let size = batch.len();
        match hub.send(batch) {
            Ok(clients) => debug!("Forwarded {} statuses to {} clients", size, clients),
            Err(_) => debug!("No clients connected; discarded {} statuses", size),
        }
    }
    info!("Update stream closed");
}

/// Resolves once shutdown is requested or the sending side is gone
pub async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|requested| *requested).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceStatus;

    #[tokio::test]
    async fn test_forwards_until_watcher_side_closes() {
        let (tx, rx) = mpsc::channel(4);
        let (hub, mut client) = broadcast::channel(EVENT_BUFFER);

        let forwarder = tokio::spawn(forward_updates(rx, hub));
        tx.send(vec![ResourceStatus::stopped("a".into())]).await.unwrap();
        drop(tx);

        let batch = client.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        forwarder.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_requested_resolves_on_signal() {
        let (tx, rx) = watch::channel(false);
        let waiting = tokio::spawn(shutdown_requested(rx));
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        tx.send(true).unwrap();
        waiting.await.unwrap();
    }
}
