//! Forwarding of settlement events to an outbound notification channel.
//!
//! Dispatch is best effort: failures are logged and the forwarder keeps
//! running. Settlement never waits on a consumer.

use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use wagerline_core::SettlementEvent;

/// An outbound channel for settlement notifications (push, email, chat, ...).
pub trait NotificationDispatcher: Send + Sync + 'static {
    fn dispatch(&self, payload: &NotificationPayload) -> Result<(), String>;
}

/// Writes each notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn dispatch(&self, payload: &NotificationPayload) -> Result<(), String> {
        log::info!(
            "notification {} for bet {}: {}",
            payload.kind,
            payload.bet_id,
            payload.detail
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub kind: String,
    pub bet_id: i64,
    pub detail: serde_json::Value,
}

fn ids(users: &std::collections::BTreeSet<wagerline_core::UserId>) -> Vec<i64> {
    users.iter().map(|u| u.0).collect()
}

impl From<&SettlementEvent> for NotificationPayload {
    fn from(event: &SettlementEvent) -> Self {
        let detail = match event {
            SettlementEvent::BetCreated { creator, .. } => json!({ "creatorId": creator.0 }),
            SettlementEvent::BetClosed { .. } | SettlementEvent::BetFulfilled { .. } => json!({}),
            SettlementEvent::VoteSubmitted {
                resolver, replaced, ..
            } => json!({ "resolverId": resolver.0, "replaced": replaced }),
            SettlementEvent::ResolutionPending { tied_outcomes, .. } => {
                json!({ "tiedOutcomes": tied_outcomes })
            }
            SettlementEvent::BetResolved {
                outcome,
                winners,
                correlation_id,
                overridden,
                ..
            } => json!({
                "outcome": outcome,
                "winnerIds": ids(winners),
                "correlationId": correlation_id.to_hex(),
                "overridden": overridden,
            }),
            SettlementEvent::BetCancelled {
                previous_status,
                reason,
                correlation_id,
                ..
            } => json!({
                "previousStatus": previous_status.as_str(),
                "reason": reason,
                "correlationId": correlation_id.to_hex(),
            }),
            SettlementEvent::FulfillmentSubmitted { winner, status, .. } => {
                json!({ "winnerId": winner.0, "status": status })
            }
        };
        Self {
            kind: event.kind().to_string(),
            bet_id: event.bet_id().0,
            detail,
        }
    }
}

/// Spawn a task that forwards every event from `events` to `dispatcher`.
///
/// The task ends when the service (and with it every sender) is dropped.
pub fn spawn_notification_forwarder<D: NotificationDispatcher>(
    mut events: broadcast::Receiver<SettlementEvent>,
    dispatcher: D,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let payload = NotificationPayload::from(&event);
                    if let Err(e) = dispatcher.dispatch(&payload) {
                        log::error!(
                            "failed to dispatch {} notification for bet {}: {}",
                            payload.kind,
                            payload.bet_id,
                            e
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("notification forwarder lagged, {skipped} events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wagerline_core::{BetId, BetStatus, CorrelationId};

    #[test]
    fn cancelled_payload_carries_reason_and_previous_status() {
        let payload = NotificationPayload::from(&SettlementEvent::BetCancelled {
            bet_id: BetId(4),
            previous_status: BetStatus::Closed,
            reason: "creator withdrew".into(),
            correlation_id: CorrelationId([7; 16]),
        });
        assert_eq!(payload.kind, "bet_cancelled");
        assert_eq!(payload.bet_id, 4);
        assert_eq!(payload.detail["reason"], "creator withdrew");
        assert_eq!(payload.detail["previousStatus"], BetStatus::Closed.as_str());
        assert_eq!(payload.detail["correlationId"], "07".repeat(16));
    }

    #[test]
    fn log_dispatcher_accepts_everything() {
        let payload = NotificationPayload::from(&SettlementEvent::BetClosed { bet_id: BetId(1) });
        assert!(LogDispatcher.dispatch(&payload).is_ok());
    }
}
