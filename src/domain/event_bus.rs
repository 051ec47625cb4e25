//! Fan-out of view notifications to UI layers.
//!
//! Every open view publishes its [`SyncEvent`]s onto one shared
//! [`EventBus`]. A screen that renders a single order or post takes a
//! [`SubjectEvents`] receiver, which skips notifications for other
//! subjects and rides over lag: a lagging renderer only needs the latest
//! snapshot, and the next `SnapshotUpdated` carries it in full.

use tokio::sync::broadcast::{self, error::RecvError};

use super::{SubjectId, SyncEvent};

/// Shared bus for [`SyncEvent`]s of every open view.
///
/// Events published with no receiver attached are dropped; views never
/// wait on the UI.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a bus retaining up to `capacity` undelivered events per
    /// receiver (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `event` and returns how many receivers got it.
    pub fn publish(&self, event: SyncEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Receives every future event of every subject.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Receives future events of `subject_id` only.
    #[must_use]
    pub fn subscribe_subject(&self, subject_id: SubjectId) -> SubjectEvents {
        SubjectEvents {
            subject_id,
            rx: self.sender.subscribe(),
            missed: 0,
        }
    }
}

/// Receiver of one subject's notifications.
#[derive(Debug)]
pub struct SubjectEvents {
    subject_id: SubjectId,
    rx: broadcast::Receiver<SyncEvent>,
    missed: u64,
}

impl SubjectEvents {
    /// Subject this receiver follows.
    #[must_use]
    pub const fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    /// Events dropped so far because this receiver fell behind.
    #[must_use]
    pub const fn missed(&self) -> u64 {
        self.missed
    }

    /// Waits for the next event of the followed subject.
    ///
    /// Returns `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.subject_id() == &self.subject_id => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    self.missed = self.missed.saturating_add(skipped);
                    tracing::warn!(subject_id = %self.subject_id, skipped, "view notifications lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
