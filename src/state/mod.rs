//! Shared application state and the queue state machines.

/// Authenticated caller.
pub mod actor;
/// Time source.
pub mod clock;
/// Queue status transitions.
pub mod lifecycle;
/// Queue, participant and board types.
pub mod queue;
mod sse;
/// Turn operations on a board.
pub mod turns;

use std::sync::Arc;

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard, RwLock, watch};

use crate::{
    config::AppConfig,
    dao::queue_store::QueueStore,
    error::ServiceError,
    services::notifier::NotificationPort,
    state::{clock::Clock, queue::QueueId},
};

pub use self::sse::{DEFAULT_SSE_CAPACITY, SseHub};

/// Handle shared by every request handler and background task.
pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, per-queue locks, the SSE hub and
/// the injected collaborators (clock, notification port, configuration).
pub struct AppState {
    queue_store: RwLock<Option<Arc<dyn QueueStore>>>,
    degraded: watch::Sender<bool>,
    queue_locks: DashMap<QueueId, Arc<Mutex<()>>>,
    creation_lock: Mutex<()>,
    sse: SseHub,
    notifications: Arc<dyn NotificationPort>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        notifications: Arc<dyn NotificationPort>,
    ) -> SharedState {
        Self::build(config, clock, notifications, None)
    }

    /// Same as [`AppState::new`] with a store installed from the start.
    pub fn with_store(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        notifications: Arc<dyn NotificationPort>,
        store: Arc<dyn QueueStore>,
    ) -> SharedState {
        Self::build(config, clock, notifications, Some(store))
    }

    fn build(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        notifications: Arc<dyn NotificationPort>,
        store: Option<Arc<dyn QueueStore>>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(store.is_none());
        Arc::new(Self {
            queue_store: RwLock::new(store),
            degraded: degraded_tx,
            queue_locks: DashMap::new(),
            creation_lock: Mutex::new(()),
            sse: SseHub::default(),
            notifications,
            clock,
            config,
        })
    }

    /// Obtain a handle to the current queue store, if one is installed.
    pub async fn queue_store(&self) -> Option<Arc<dyn QueueStore>> {
        let guard = self.queue_store.read().await;
        guard.as_ref().cloned()
    }

    /// Store handle, or [`ServiceError::Degraded`] while none is usable.
    pub async fn require_queue_store(&self) -> Result<Arc<dyn QueueStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.queue_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new queue store implementation and leave degraded mode.
    pub async fn set_queue_store(&self, store: Arc<dyn QueueStore>) {
        {
            let mut guard = self.queue_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag, returning whether it changed.
    pub fn update_degraded(&self, value: bool) -> bool {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    /// Wait for exclusive access to one queue.
    pub async fn lock_queue(&self, id: QueueId) -> OwnedMutexGuard<()> {
        self.queue_lock(id).lock_owned().await
    }

    /// Exclusive access to one queue if nobody else holds it right now.
    pub fn try_lock_queue(&self, id: QueueId) -> Option<OwnedMutexGuard<()>> {
        self.queue_lock(id).try_lock_owned().ok()
    }

    /// Drop the lock entry of a deleted queue.
    pub fn forget_queue_lock(&self, id: QueueId) {
        self.queue_locks.remove(&id);
    }

    /// Serialize queue creation so the duplicate-slot check and the insert
    /// that follows it cannot interleave with another creation.
    pub async fn lock_creation(&self) -> MutexGuard<'_, ()> {
        self.creation_lock.lock().await
    }

    fn queue_lock(&self, id: QueueId) -> Arc<Mutex<()>> {
        self.queue_locks.entry(id).or_default().value().clone()
    }

    /// Broadcast hub used for the queue SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Port turn notices are handed to once a step has committed.
    pub fn notifications(&self) -> &dyn NotificationPort {
        self.notifications.as_ref()
    }

    /// Current instant according to the injected clock.
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Runtime settings.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
