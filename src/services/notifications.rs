//! Hold-ready notifications.
//!
//! Dispatch happens after the engine transaction commits and never feeds back
//! into it: a failed delivery is logged and dropped.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{error::AppResult, models::HoldReadyNotice};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn hold_ready(&self, notice: HoldReadyNotice) -> AppResult<()>;
}

/// Writes notices to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn hold_ready(&self, notice: HoldReadyNotice) -> AppResult<()> {
        tracing::info!(
            patron_id = %notice.patron_id,
            item_id = %notice.item_id,
            loan_id = %notice.loan_id,
            "Hold ready, due {}",
            notice.due_date
        );
        Ok(())
    }
}

/// Send a notice in the background
pub fn dispatch(notifier: &Arc<dyn NotificationDispatcher>, notice: HoldReadyNotice) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        let reservation_id = notice.reservation_id;
        if let Err(e) = notifier.hold_ready(notice).await {
            tracing::warn!("Failed to notify hold {} ready: {}", reservation_id, e);
        }
    });
}
