//! Endpoints raising one failure of each kind

use axum::Router;
use axum::http::StatusCode;
use axum::http::header::SERVER;
use axum::response::IntoResponse;
use axum::routing::get;
use keel_core::{Failure, Message};
use keel_server::{HandlerResult, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct Item {
    pub name: String,
    pub qty: u32,
    pub note: Option<String>,
}

pub fn router() -> Router {
    Router::new()
        .route("/ok", get(ok))
        .route("/items", get(list_items).post(create_item))
        .route("/bad-request", get(bad_request))
        .route("/violations", get(violations))
        .route("/invalid", get(invalid))
        .route("/unauthorized", get(unauthorized))
        .route("/unavailable", get(unavailable))
        .route("/gone", get(gone))
        .route("/missing", get(missing))
        .route("/io", get(io_failure))
        .route("/panic", get(panics))
        .route("/branded", get(branded))
        .route("/large", get(large))
}

async fn ok() -> Json<Message> {
    Json(Message::success())
}

async fn list_items() -> Json<Vec<Item>> {
    Json(vec![Item {
        name: "bolt".to_owned(),
        qty: 3,
        note: None,
    }])
}

async fn create_item(Json(item): Json<Item>) -> (StatusCode, Json<Item>) {
    (StatusCode::CREATED, Json(item))
}

async fn bad_request() -> HandlerResult<Json<Message>> {
    Err(Failure::bad_request("could not read order")
        .with_source(std::io::Error::other("quantity overflow"))
        .into())
}

async fn violations() -> HandlerResult<Json<Message>> {
    Err(Failure::validation(["a must not be blank", "b must be positive"]).into())
}

async fn invalid() -> HandlerResult<Json<Message>> {
    Err(Failure::invalid("validator misconfigured")
        .with_source(std::io::Error::other("no constraint for field c"))
        .into())
}

async fn unauthorized() -> HandlerResult<Json<Message>> {
    Err(Failure::not_authorized("login required", ["Basic", "Bearer"]).into())
}

async fn unavailable() -> HandlerResult<Json<Message>> {
    Err(Failure::status(StatusCode::SERVICE_UNAVAILABLE, "maintenance")
        .with_source(std::io::Error::other("database offline"))
        .into())
}

async fn gone() -> HandlerResult<Json<Message>> {
    Err(Failure::status(StatusCode::NOT_FOUND, "order 7 archived").into())
}

async fn missing() -> HandlerResult<Json<Message>> {
    Err(Failure::not_found("order 7 does not exist")
        .with_source(std::io::Error::other("row missing"))
        .into())
}

async fn io_failure() -> HandlerResult<Json<Message>> {
    let contents = std::fs::read_to_string("/definitely/not/here/keel.txt")?;
    Ok(Json(Message::success_with(contents)))
}

async fn panics() -> Json<Message> {
    panic!("kaboom")
}

async fn branded() -> impl IntoResponse {
    ([(SERVER, "keel-test/1.0")], Json(Message::success()))
}

async fn large() -> Json<Message> {
    Json(Message::success_with("keel ".repeat(400)))
}
