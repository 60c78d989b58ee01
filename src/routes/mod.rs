//! HTTP routes for Codex

pub mod admin;
pub mod admin_corrections;
pub mod admin_users;
pub mod common;
pub mod corrections;
pub mod entities;
pub mod health;
pub mod schema;
pub mod users;

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};

pub use admin::handle_stats_request;
pub use admin_corrections::handle_admin_corrections_request;
pub use admin_users::handle_admin_users_request;
pub use common::{codex_error_response, error_response, json_response, FullBody};
pub use corrections::handle_corrections_request;
pub use entities::handle_entities_request;
pub use health::health_check;
pub use schema::{handle_admin_schema_request, handle_schema_request};
pub use users::handle_users_request;

use crate::server::AppState;

/// Route a request whose body has already been collected
pub async fn route(state: &AppState, req: Request<Bytes>) -> Response<FullBody> {
    let path = req.uri().path().to_string();

    match (req.method(), path.as_str()) {
        (&Method::OPTIONS, _) => preflight_response(),

        (&Method::GET, "/health") | (&Method::GET, "/healthz") => health_check(state),

        (_, p) if p.starts_with("/entities/") => handle_entities_request(state, &req, p).await,
        (_, p) if p.starts_with("/schema/") => handle_schema_request(state, &req, p),
        (_, p) if p.starts_with("/users/") => handle_users_request(state, &req, p).await,
        (_, p) if p == "/corrections" || p.starts_with("/corrections/") => {
            handle_corrections_request(state, &req, p).await
        }

        (_, "/admin/stats") => handle_stats_request(state, &req).await,
        (_, p) if p == "/admin/corrections" || p.starts_with("/admin/corrections/") => {
            handle_admin_corrections_request(state, &req, p).await
        }
        (_, p) if p == "/admin/users" || p.starts_with("/admin/users/") => {
            handle_admin_users_request(state, &req, p).await
        }
        (_, p) if p.starts_with("/admin/schema/") => handle_admin_schema_request(state, &req, p).await,

        _ => common::not_found_response(&path),
    }
}

/// CORS preflight response
fn preflight_response() -> Response<FullBody> {
    let mut response = Response::new(FullBody::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert("Access-Control-Allow-Origin", hyper::header::HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Headers",
        hyper::header::HeaderValue::from_static("authorization, content-type, if-none-match"),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        hyper::header::HeaderValue::from_static("GET, POST, PUT, OPTIONS"),
    );
    response
}
