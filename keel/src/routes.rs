use axum::Router;
use axum::routing::{get, post};
use keel_core::{Failure, Message};
use keel_server::{HandlerResult, Json, Path};
use serde::{Deserialize, Serialize};

/// Demo endpoints
pub fn router() -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/greet/{name}", get(greet))
        .route("/notes", post(create_note))
}

async fn hello() -> Json<Message> {
    Json(Message::success_with("Hello"))
}

async fn greet(Path(name): Path<String>) -> HandlerResult<Json<Message>> {
    if name.len() > 64 {
        return Err(Failure::bad_request("name is too long").into());
    }
    Ok(Json(Message::success_with(format!("Hello, {name}"))))
}

#[derive(Debug, Deserialize, Serialize)]
struct Note {
    title: String,
    body: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

async fn create_note(Json(note): Json<Note>) -> HandlerResult<Json<Note>> {
    let mut violations = Vec::new();
    if note.title.trim().is_empty() {
        violations.push("title must not be blank");
    }
    if note.tags.iter().any(|tag| tag.trim().is_empty()) {
        violations.push("tags must not be blank");
    }
    if !violations.is_empty() {
        return Err(Failure::validation(violations).into());
    }
    Ok(Json(note))
}
