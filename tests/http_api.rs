mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use time::{Duration, format_description::well_known::Rfc3339};
use tower::ServiceExt;
use turnstile_back::{build_router, state::actor::Actor};

use common::{Harness, T, admin, student, teacher};

fn app(h: &Harness) -> Router {
    build_router(h.state.clone())
}

fn request(method: &str, uri: &str, actor: Option<&Actor>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        let role = match actor.role {
            turnstile_back::state::actor::Role::Student => "student",
            turnstile_back::state::actor::Role::Teacher => "teacher",
            turnstile_back::state::actor::Role::Admin => "admin",
        };
        let groups = actor.groups.iter().cloned().collect::<Vec<_>>().join(",");
        builder = builder
            .header("X-Actor-Id", actor.id.to_string())
            .header("X-Actor-Role", role)
            .header("X-Actor-Groups", groups);
        if let Some(contact) = &actor.contact {
            builder = builder.header("X-Actor-Contact", contact);
        }
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn create_body(title: &str) -> Value {
    json!({
        "title": title,
        "discipline": "Operating systems",
        "scheduled_start": T.format(&Rfc3339).unwrap(),
        "scheduled_end": (T + Duration::hours(1)).format(&Rfc3339).unwrap(),
        "eligible_groups": [common::GROUP],
    })
}

#[tokio::test]
async fn create_join_complete_over_http() {
    let h = Harness::new(T + Duration::minutes(1));
    let owner = teacher();
    let x = student("x");
    let y = student("y");

    let (status, created) = send(
        app(&h),
        request("POST", "/queues", Some(&owner), Some(create_body("Lab 1"))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "active");
    let id = created["id"].as_str().unwrap().to_owned();

    let (status, joined) = send(
        app(&h),
        request("POST", &format!("/queues/{id}/join"), Some(&x), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["status"], "current");
    assert_eq!(joined["position"], 1);

    let (_, joined) = send(
        app(&h),
        request("POST", &format!("/queues/{id}/join"), Some(&y), None),
    )
    .await;
    assert_eq!(joined["status"], "waiting");

    let (status, body) = send(
        app(&h),
        request("POST", &format!("/queues/{id}/complete"), Some(&y), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "not_current_turn");

    let (status, detail) = send(
        app(&h),
        request("POST", &format!("/queues/{id}/complete"), Some(&x), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["participants"][0]["status"], "done");
    assert_eq!(detail["participants"][1]["status"], "current");

    let (status, listed) = send(app(&h), request("GET", "/queues?status=active", Some(&y), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn error_kinds_map_to_statuses() {
    let h = Harness::new(T - Duration::minutes(30));
    let owner = teacher();

    let (status, body) = send(app(&h), request("GET", "/queues", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");

    let (_, created) = send(
        app(&h),
        request("POST", "/queues", Some(&owner), Some(create_body("Lab 2"))),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_owned();

    let (status, body) = send(
        app(&h),
        request("POST", "/queues", Some(&owner), Some(create_body("Lab 2 again"))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "already_exists");

    let mut inverted = create_body("Backwards");
    inverted["scheduled_end"] = json!((T - Duration::hours(1)).format(&Rfc3339).unwrap());
    let (status, body) = send(app(&h), request("POST", "/queues", Some(&owner), Some(inverted))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_window");

    let (status, _) = send(
        app(&h),
        request("POST", &format!("/queues/{id}/leave"), Some(&student("x")), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        app(&h),
        request(
            "GET",
            &format!("/queues/{}", uuid::Uuid::new_v4()),
            Some(&owner),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let (status, body) = send(
        app(&h),
        request("PATCH", &format!("/queues/{id}"), Some(&student("x")), Some(json!({"title": "mine"}))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "permission_denied");
}

#[tokio::test]
async fn blank_title_is_rejected_before_reaching_the_service() {
    let h = Harness::new(T - Duration::minutes(30));
    let mut body = create_body("x");
    body["title"] = json!("   ");

    let (status, _) = send(app(&h), request("POST", "/queues", Some(&teacher()), Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn force_close_requires_admin_role() {
    let h = Harness::new(T + Duration::minutes(1));
    let owner = teacher();
    let (_, created) = send(
        app(&h),
        request("POST", "/queues", Some(&owner), Some(create_body("Lab 3"))),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_owned();
    let uri = format!("/admin/queues/{id}/force-close");

    let (status, body) = send(app(&h), request("POST", &uri, Some(&owner), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "permission_denied");

    let (status, body) = send(app(&h), request("POST", &uri, Some(&admin()), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "closed");
    assert_eq!(body["close_reason"], "admin");

    let (status, body) = send(app(&h), request("POST", &uri, Some(&admin()), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state");
}

#[tokio::test]
async fn healthcheck_reports_memory_backend() {
    let h = Harness::new(T);
    let (status, body) = send(app(&h), request("GET", "/healthcheck", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storage"], "memory");
}
