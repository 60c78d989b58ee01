//! Public profile endpoint
//!
//! `GET /users/{username}` - page-cached; admin edits invalidate it.
//! Usernames match case-insensitively.

use bytes::Bytes;
use hyper::{Method, Request, Response};

use super::common::{cached_page, codex_error_response, method_not_allowed, not_found_response, path_segment, FullBody};
use crate::cache::PageKey;
use crate::server::AppState;
use crate::users::normalize_username;

pub async fn handle_users_request(state: &AppState, req: &Request<Bytes>, path: &str) -> Response<FullBody> {
    if req.method() != Method::GET {
        return method_not_allowed();
    }

    let raw = path.strip_prefix("/users/").unwrap_or("");
    if raw.is_empty() || raw.contains('/') {
        return not_found_response(path);
    }

    let username = match path_segment(raw) {
        Ok(username) => normalize_username(&username),
        Err(e) => return codex_error_response(&e),
    };

    let key = PageKey::user_profile(&username);
    cached_page(state, req, key, || async move { state.users.get_profile(&username).await }).await
}
