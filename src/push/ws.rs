//! WebSocket push channel.
//!
//! [`WsPushChannel`] keeps one connection to the push server, joins a room
//! per subscribed filter and hands every incoming event payload to every
//! subscriber; the engine filters by subject identity. Disconnects are
//! logged and retried after a fixed delay, re-joining every live room.
//! The channel never reports silence: polling covers it.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::channel::{EventCallback, PushChannel, SubjectFilter, SubscriptionHandle};
use super::messages::{WsCommand, incoming_payload};
use super::subscription::SubscriptionManager;
use crate::error::SyncError;

#[derive(Debug, Default)]
struct Shared {
    subscriptions: Mutex<SubscriptionManager>,
}

impl Shared {
    fn with<R>(&self, f: impl FnOnce(&mut SubscriptionManager) -> R) -> R {
        let mut subs = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut subs)
    }

    fn dispatch(&self, text: &str) -> usize {
        let Some(payload) = incoming_payload(text) else {
            return 0;
        };
        let callbacks = self.with(|subs| subs.callbacks());
        for callback in &callbacks {
            callback(&payload);
        }
        callbacks.len()
    }
}

/// Push channel over a persistent WebSocket connection.
#[derive(Debug)]
pub struct WsPushChannel {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<WsCommand>,
    task: JoinHandle<()>,
}

impl WsPushChannel {
    /// Starts the connection task for `url`.
    ///
    /// Returns immediately; connection failures are logged and retried every
    /// `reconnect_delay`. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        let url = url.into();
        let shared = Arc::new(Shared::default());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(
            url,
            reconnect_delay,
            Arc::clone(&shared),
            command_rx,
        ));
        Self {
            shared,
            commands,
            task,
        }
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.with(|subs| subs.count())
    }

    /// Stops the connection task. Subscriptions stay registered but no
    /// further payloads are delivered.
    pub fn shutdown(&self) {
        self.task.abort();
    }

    fn send(&self, command: WsCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("push connection task gone; command dropped");
        }
    }
}

impl PushChannel for WsPushChannel {
    fn subscribe(&self, filter: SubjectFilter, on_event: EventCallback) -> SubscriptionHandle {
        let topic = filter.topic();
        let (handle, first) = self.shared.with(|subs| {
            let first = !subs.has_filter(&filter);
            (subs.insert(filter, on_event), first)
        });
        if first {
            self.send(WsCommand::Subscribe {
                topics: vec![topic],
            });
        }
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        let orphaned = self.shared.with(|subs| {
            subs.remove(handle)
                .filter(|filter| !subs.has_filter(filter))
        });
        if let Some(filter) = orphaned {
            self.send(WsCommand::Unsubscribe {
                topics: vec![filter.topic()],
            });
        }
    }
}

impl Drop for WsPushChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_connection(
    url: String,
    reconnect_delay: Duration,
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<WsCommand>,
) {
    loop {
        let connected = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|err| SyncError::Push(format!("connect failed: {err}")));
        match connected {
            Ok((stream, _)) => {
                tracing::info!(%url, "push channel connected");
                let (mut ws_tx, mut ws_rx) = stream.split();

                let topics: Vec<String> = shared.with(|subs| subs.topics().into_iter().collect());
                let mut alive = topics.is_empty()
                    || stays_alive(send_command(&mut ws_tx, WsCommand::Subscribe { topics }).await);

                while alive {
                    tokio::select! {
                        command = commands.recv() => match command {
                            Some(command) => alive = stays_alive(send_command(&mut ws_tx, command).await),
                            None => return,
                        },
                        frame = ws_rx.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                let delivered = shared.dispatch(text.as_str());
                                tracing::trace!(delivered, "push payload dispatched");
                            }
                            Some(Ok(Message::Close(_))) | None => alive = false,
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                let err = SyncError::Push(format!("read failed: {err}"));
                                tracing::warn!(error = %err, "push channel dropped");
                                alive = false;
                            }
                        }
                    }
                }
                tracing::warn!(%url, "push channel disconnected");
            }
            Err(err) => {
                tracing::warn!(%url, error = %err, code = err.error_code(), "push channel unavailable");
            }
        }

        tokio::time::sleep(reconnect_delay).await;

        // Rooms are re-joined from the subscription table on reconnect.
        loop {
            match commands.try_recv() {
                Ok(_) => {}
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => return,
            }
        }
    }
}

async fn send_command<S>(sink: &mut S, command: WsCommand) -> Result<(), SyncError>
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let json = serde_json::to_string(&command.into_message())?;
    sink.send(Message::text(json))
        .await
        .map_err(|err| SyncError::Push(format!("send failed: {err}")))
}

/// Only a transport failure ends the connection; an unencodable command is
/// dropped.
fn stays_alive(sent: Result<(), SyncError>) -> bool {
    match sent {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, code = err.error_code(), "push command not sent");
            !matches!(err, SyncError::Push(_))
        }
    }
}
