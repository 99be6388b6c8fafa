//! Recording notifier.

use std::sync::{Arc, Mutex, PoisonError};

use crate::collab::{Notifier, NotifyEvent};
use crate::model::Ticket;
use crate::state::TicketStatus;

/// A delivered notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub ticket_id: u64,
    pub status: TicketStatus,
    pub event: NotifyEvent,
    pub receivers: Vec<String>,
}

/// Notifier that logs and keeps every notification.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn sent_for(&self, ticket_id: u64) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.ticket_id == ticket_id)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, ticket: &Ticket, event: NotifyEvent, receivers: &[String]) {
        tracing::info!(
            ticket_id = ticket.id,
            status = %ticket.status,
            event = ?event,
            receivers = ?receivers,
            "notify"
        );
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Notification {
                ticket_id: ticket.id,
                status: ticket.status,
                event,
                receivers: receivers.to_vec(),
            });
    }
}
