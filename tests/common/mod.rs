#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use time::{Duration, OffsetDateTime, macros::datetime};
use turnstile_back::{
    config::AppConfig,
    dao::queue_store::{MemoryQueueStore, QueueStore},
    dto::queue::CreateQueueRequest,
    services::notifier::NotificationPort,
    state::{
        AppState, SharedState,
        actor::{Actor, Role},
        clock::ManualClock,
        queue::Notice,
    },
};
use uuid::Uuid;

/// Start of the window used by every scenario.
pub const T: OffsetDateTime = datetime!(2025-03-01 10:00 UTC);
pub const GROUP: &str = "IU7-51";

/// Notification port that keeps every notice it is handed.
#[derive(Default)]
pub struct RecordingPort {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingPort {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl NotificationPort for RecordingPort {
    fn dispatch(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

pub struct Harness {
    pub state: SharedState,
    pub clock: Arc<ManualClock>,
    pub port: Arc<RecordingPort>,
}

impl Harness {
    pub fn new(now: OffsetDateTime) -> Self {
        Self::with_store(now, Arc::new(MemoryQueueStore::new()), AppConfig::default())
    }

    pub fn with_store(now: OffsetDateTime, store: Arc<dyn QueueStore>, config: AppConfig) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let port = Arc::new(RecordingPort::default());
        let state = AppState::with_store(config, clock.clone(), port.clone(), store);
        Self { state, clock, port }
    }

    pub fn set_now(&self, now: OffsetDateTime) {
        self.clock.set(now);
    }
}

pub fn teacher() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Teacher, std::iter::empty::<String>())
        .with_display_name("Dr. Ivanova")
}

pub fn admin() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Admin, std::iter::empty::<String>())
}

pub fn student(name: &str) -> Actor {
    Actor::new(Uuid::new_v4(), Role::Student, [GROUP])
        .with_display_name(name)
        .with_contact(format!("chat-{name}"))
}

/// One hour window opening at `start`.
pub fn lab_request(title: &str, start: OffsetDateTime) -> CreateQueueRequest {
    CreateQueueRequest {
        title: title.into(),
        description: None,
        discipline: "Operating systems".into(),
        scheduled_start: start,
        scheduled_end: start + Duration::hours(1),
        eligible_groups: vec![GROUP.into()],
    }
}
