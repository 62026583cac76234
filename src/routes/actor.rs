use axum::{extract::FromRequestParts, http::request::Parts};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    error::AppError,
    state::actor::{Actor, Role},
};

/// Actor UUID.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// `student`, `teacher` or `admin`.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
/// Comma-separated group names.
pub const ACTOR_GROUPS_HEADER: &str = "x-actor-groups";
/// Display name.
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
/// Notifier address, optional.
pub const ACTOR_CONTACT_HEADER: &str = "x-actor-contact";

/// OpenAPI description of the actor headers; extraction happens on [`Actor`].
#[allow(dead_code)]
#[derive(IntoParams)]
#[into_params(parameter_in = Header)]
pub struct ActorHeaders {
    /// Caller identity (UUID).
    #[param(rename = "X-Actor-Id")]
    actor_id: Uuid,
    /// `student`, `teacher` or `admin`.
    #[param(rename = "X-Actor-Role")]
    actor_role: String,
    /// Comma separated group memberships.
    #[param(rename = "X-Actor-Groups")]
    actor_groups: Option<String>,
    #[param(rename = "X-Actor-Name")]
    actor_name: Option<String>,
    /// Notification recipient, e.g. a Telegram chat id.
    #[param(rename = "X-Actor-Contact")]
    actor_contact: Option<String>,
}

/// Identity forwarded by the gateway in `X-Actor-*` headers. Credentials are
/// never checked here.
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = required(parts, ACTOR_ID_HEADER)?;
        let id = Uuid::parse_str(id.trim())
            .map_err(|_| AppError::Unauthorized(format!("`{ACTOR_ID_HEADER}` is not a UUID")))?;

        let role = required(parts, ACTOR_ROLE_HEADER)?;
        let role = Role::parse(role).ok_or_else(|| {
            AppError::Unauthorized(format!("unknown role `{role}` in `{ACTOR_ROLE_HEADER}`"))
        })?;

        let groups = optional(parts, ACTOR_GROUPS_HEADER)?
            .map(|groups| {
                groups
                    .split(',')
                    .map(str::trim)
                    .filter(|group| !group.is_empty())
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut actor = Actor::new(id, role, groups);
        if let Some(name) = optional(parts, ACTOR_NAME_HEADER)? {
            actor = actor.with_display_name(name);
        }
        if let Some(contact) = optional(parts, ACTOR_CONTACT_HEADER)? {
            actor = actor.with_contact(contact);
        }
        Ok(actor)
    }
}

fn required<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, AppError> {
    optional(parts, name)?
        .ok_or_else(|| AppError::Unauthorized(format!("missing actor header `{name}`")))
}

fn optional<'a>(parts: &'a Parts, name: &'static str) -> Result<Option<&'a str>, AppError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|value| Some(value.trim()).filter(|value| !value.is_empty()))
            .map_err(|_| AppError::Unauthorized(format!("header `{name}` is not valid text"))),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<()>) -> Result<Actor, AppError> {
        let (mut parts, _) = request.into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_all_actor_headers() {
        let id = Uuid::new_v4();
        let request = Request::builder()
            .header(ACTOR_ID_HEADER, id.to_string())
            .header(ACTOR_ROLE_HEADER, "Student")
            .header(ACTOR_GROUPS_HEADER, "IU7-51, IU7-52,,")
            .header(ACTOR_NAME_HEADER, "Alice")
            .header(ACTOR_CONTACT_HEADER, "100500")
            .body(())
            .unwrap();

        let actor = extract(request).await.unwrap();
        assert_eq!(actor.id, id);
        assert_eq!(actor.role, Role::Student);
        assert_eq!(
            actor.groups.iter().map(String::as_str).collect::<Vec<_>>(),
            ["IU7-51", "IU7-52"]
        );
        assert_eq!(actor.display_name.as_deref(), Some("Alice"));
        assert_eq!(actor.contact.as_deref(), Some("100500"));
    }

    #[tokio::test]
    async fn missing_or_malformed_identity_is_unauthorized() {
        let missing = Request::builder().body(()).unwrap();
        assert!(matches!(extract(missing).await, Err(AppError::Unauthorized(_))));

        let bad_role = Request::builder()
            .header(ACTOR_ID_HEADER, Uuid::new_v4().to_string())
            .header(ACTOR_ROLE_HEADER, "janitor")
            .body(())
            .unwrap();
        assert!(matches!(extract(bad_role).await, Err(AppError::Unauthorized(_))));
    }
}
