//! Consumes hub events and surfaces notice changes in the log.

use tokio::sync::broadcast;

use crate::services::hub::{HubEvent, NoticeUpdate};

/// Log every event until the hub goes away.
pub async fn run_notifier(mut events: broadcast::Receiver<HubEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => log_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Notifier: fell behind, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Notifier: event channel closed");
                return;
            }
        }
    }
}

fn log_event(event: &HubEvent) {
    match &event.notice {
        NoticeUpdate::Posted(notice) => tracing::info!(
            "Notice ({:?}): {} | {} | icon {}",
            event.reason,
            notice.title,
            notice.text.replace('\n', " / "),
            notice.icon_index
        ),
        NoticeUpdate::Cancelled => tracing::info!("Notice cancelled ({:?})", event.reason),
        NoticeUpdate::Retained => tracing::debug!("Notice unchanged ({:?})", event.reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::hub::UpdateReason;
    use chrono::Utc;

    #[tokio::test]
    async fn test_notifier_stops_when_channel_closes() {
        let (tx, rx) = broadcast::channel(4);
        tx.send(HubEvent {
            reason: UpdateReason::Startup,
            notice: NoticeUpdate::Cancelled,
            at: Utc::now(),
        })
        .unwrap();
        drop(tx);

        tokio::time::timeout(std::time::Duration::from_secs(1), run_notifier(rx))
            .await
            .unwrap();
    }
}
