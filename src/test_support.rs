//! Scripted backend and engine harnesses shared by unit tests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::backend::ResourceBackend;
use crate::config::SyncSettings;
use crate::domain::{EventBus, SubjectId, SyncEvent, Versioned};
use crate::error::SyncError;
use crate::features::like_toggle::{decode_like, project_like};
use crate::features::order_status::{decode_order, order_regresses, project_order};
use crate::features::{LikeChange, LikeState, OrderChange, OrderStatus};
use crate::push::{InMemoryPushChannel, PushChannel};
use crate::sync::{SubjectView, SyncEngine};

type Reply<S> = Result<Versioned<S>, SyncError>;

/// Backend whose server state is set by the test and whose mutation
/// responses are released one by one through [`Replies`].
pub(crate) struct ScriptedBackend<S, C> {
    kind: &'static str,
    keys: &'static [&'static str],
    project: fn(&S, &C) -> Result<S, SyncError>,
    regresses: fn(&S, &S) -> bool,
    decode: fn(&serde_json::Value) -> Option<Versioned<S>>,
    server: Mutex<Option<Versioned<S>>>,
    replies: tokio::sync::Mutex<mpsc::UnboundedReceiver<Reply<S>>>,
    fetch_calls: AtomicUsize,
    mutate_calls: AtomicUsize,
}

impl<S, C> fmt::Debug for ScriptedBackend<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedBackend")
            .field("kind", &self.kind)
            .field("fetch_calls", &self.fetch_calls)
            .field("mutate_calls", &self.mutate_calls)
            .finish_non_exhaustive()
    }
}

impl<S: Clone, C> ScriptedBackend<S, C> {
    /// Replaces the state returned by `fetch`; `None` makes fetch fail
    /// with status 503.
    pub(crate) fn set_server(&self, state: Option<Versioned<S>>) {
        *self.server.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn mutate_calls(&self) -> usize {
        self.mutate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S, C> ResourceBackend for ScriptedBackend<S, C>
where
    S: Clone + PartialEq + fmt::Debug + Serialize + Send + Sync + 'static,
    C: Clone + fmt::Debug + Send + Sync + 'static,
{
    type State = S;
    type Change = C;

    fn kind(&self) -> &'static str {
        self.kind
    }

    fn subject_keys(&self) -> &'static [&'static str] {
        self.keys
    }

    fn project(&self, current: &S, change: &C) -> Result<S, SyncError> {
        (self.project)(current, change)
    }

    fn regresses(&self, current: &S, candidate: &S) -> bool {
        (self.regresses)(current, candidate)
    }

    fn decode_event(&self, body: &serde_json::Value) -> Option<Versioned<S>> {
        (self.decode)(body)
    }

    async fn fetch(&self, _subject_id: &SubjectId) -> Result<Versioned<S>, SyncError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SyncError::Status(503))
    }

    async fn mutate(&self, _subject_id: &SubjectId, _change: &C) -> Result<Versioned<S>, SyncError> {
        self.mutate_calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().await;
        replies.recv().await.unwrap_or(Err(SyncError::Status(503)))
    }
}

/// Releases scripted mutation responses.
#[derive(Debug)]
pub(crate) struct Replies<S>(mpsc::UnboundedSender<Reply<S>>);

impl<S> Replies<S> {
    pub(crate) fn ok(&self, state: S) {
        let _ = self.0.send(Ok(Versioned::unversioned(state)));
    }

    pub(crate) fn ok_versioned(&self, value: Versioned<S>) {
        let _ = self.0.send(Ok(value));
    }

    pub(crate) fn fail(&self, err: SyncError) {
        let _ = self.0.send(Err(err));
    }
}

/// Engine over a scripted backend and an in-memory push channel.
#[derive(Debug)]
pub(crate) struct Harness<B: ResourceBackend> {
    pub(crate) engine: SyncEngine<B>,
    pub(crate) backend: Arc<B>,
    pub(crate) push: Arc<InMemoryPushChannel>,
    pub(crate) replies: Replies<B::State>,
}

pub(crate) type LikeBackend = ScriptedBackend<LikeState, LikeChange>;
pub(crate) type LikeHarness = Harness<LikeBackend>;
pub(crate) type OrderBackend = ScriptedBackend<OrderStatus, OrderChange>;

fn harness<B: ResourceBackend>(
    backend: B,
    replies: Replies<B::State>,
    settings: SyncSettings,
) -> Harness<B> {
    let backend = Arc::new(backend);
    let push = Arc::new(InMemoryPushChannel::new());
    let engine = SyncEngine::new(
        Arc::clone(&backend),
        Arc::clone(&push) as Arc<dyn PushChannel>,
        EventBus::new(256),
        settings,
    );
    Harness {
        engine,
        backend,
        push,
        replies,
    }
}

fn scripted<S, C>(
    kind: &'static str,
    keys: &'static [&'static str],
    project: fn(&S, &C) -> Result<S, SyncError>,
    regresses: fn(&S, &S) -> bool,
    decode: fn(&serde_json::Value) -> Option<Versioned<S>>,
    initial: Versioned<S>,
) -> (ScriptedBackend<S, C>, Replies<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let backend = ScriptedBackend {
        kind,
        keys,
        project,
        regresses,
        decode,
        server: Mutex::new(Some(initial)),
        replies: tokio::sync::Mutex::new(rx),
        fetch_calls: AtomicUsize::new(0),
        mutate_calls: AtomicUsize::new(0),
    };
    (backend, Replies(tx))
}

/// Like engine whose server starts at `initial` (unversioned).
pub(crate) fn like_harness(initial: LikeState, settings: SyncSettings) -> LikeHarness {
    let (backend, replies) = scripted::<LikeState, LikeChange>(
        "post_like",
        &["postId", "post_id", "subjectId", "id"],
        project_like,
        |_, _| false,
        decode_like,
        Versioned::unversioned(initial),
    );
    harness(backend, replies, settings)
}

/// Order engine whose server starts at `initial`.
pub(crate) fn order_harness(
    initial: Versioned<OrderStatus>,
    settings: SyncSettings,
) -> Harness<OrderBackend> {
    let (backend, replies) = scripted::<OrderStatus, OrderChange>(
        "order",
        &["orderId", "order_id", "subjectId", "id"],
        project_order,
        order_regresses,
        decode_order,
        initial,
    );
    harness(backend, replies, settings)
}

/// Collects every event already queued on `rx`.
pub(crate) fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Yields until the view reports a pending mutation.
#[allow(clippy::panic)]
pub(crate) async fn wait_until_busy<B: ResourceBackend>(view: &SubjectView<B>) {
    for _ in 0..1_000 {
        if view.is_busy() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("view never became busy");
}
