/// Health check payloads.
pub mod health;
/// Participant payloads.
pub mod participant;
/// Queue requests and responses.
pub mod queue;
/// Server-sent event payloads.
pub mod sse;
/// Shared validation helpers.
pub mod validation;
