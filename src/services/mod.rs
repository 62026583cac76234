/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Notification port and its delivery backends.
pub mod notifier;
/// Queue management and turn-taking orchestration.
pub mod queue_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Periodic reconciliation of open queues.
pub mod sweeper;
