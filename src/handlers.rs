use spin_sdk::http::{Method, Request, Response};
use tracing::{debug, error};

use crate::core::errors::ApiError;
use crate::{auth, comments, feed, follow, posts, static_server, users, Blog};

fn is_read(req: &Request) -> bool {
    matches!(req.method(), Method::Get | Method::Head)
}

fn is_form(req: &Request) -> bool {
    matches!(req.method(), Method::Get | Method::Head | Method::Post)
}

fn method_not_allowed() -> Result<Response, ApiError> {
    Ok(Response::builder().status(405).body("Method Not Allowed").build())
}

fn post_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse::<u64>()
        .map_err(|_| ApiError::NotFound(format!("No post {}", raw)))
}

/// Dispatches one request. Internal failures come back as `Err`, every other
/// outcome (including 404s and redirects) as a response.
pub fn route(blog: &Blog, req: Request) -> anyhow::Result<Response> {
    let path = req.path().to_string();
    debug!(method = ?req.method(), path = %path, "request");

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let result = match segments.as_slice() {
        [] if is_read(&req) => feed::index(blog, &req),
        ["group", slug] if is_read(&req) => feed::group_posts(blog, &req, slug),
        ["profile", username] if is_read(&req) => feed::profile(blog, &req, username),
        ["profile", username, "follow"] if is_form(&req) => follow::profile_follow(blog, &req, username),
        ["profile", username, "unfollow"] if is_form(&req) => {
            follow::profile_unfollow(blog, &req, username)
        }
        ["follow"] if is_read(&req) => feed::follow_index(blog, &req),
        ["create"] if is_form(&req) => posts::post_create(blog, &req),
        ["posts", id] if is_read(&req) => post_id(id).and_then(|id| posts::post_detail(blog, &req, id)),
        ["posts", id, "edit"] if is_form(&req) => post_id(id).and_then(|id| posts::post_edit(blog, &req, id)),
        ["posts", id, "comment"] if is_form(&req) => {
            post_id(id).and_then(|id| comments::add_comment(blog, &req, id))
        }
        ["auth", "login"] if is_form(&req) => auth::login(blog, &req),
        ["auth", "signup"] if is_form(&req) => users::signup(blog, &req),
        ["auth", "logout"] if is_form(&req) => auth::logout(blog, &req),
        ["about", "author"] if is_read(&req) => static_server::about_author(),
        ["about", "tech"] if is_read(&req) => static_server::about_tech(),
        ["static", rest @ ..] if is_read(&req) && !rest.is_empty() => {
            static_server::serve_static(&rest.join("/"))
        }
        [] | ["group", _] | ["profile", _] | ["profile", _, "follow" | "unfollow"] | ["follow"]
        | ["create"] | ["posts", _] | ["posts", _, "edit" | "comment"]
        | ["auth", "login" | "signup" | "logout"] | ["about", "author" | "tech"] => method_not_allowed(),
        _ => Err(ApiError::NotFound(format!("No route for {}", path))),
    };

    match result {
        Ok(response) => Ok(response),
        Err(ApiError::InternalError(msg)) => {
            error!(path = %path, error = %msg, "request failed");
            Err(anyhow::anyhow!(msg))
        }
        Err(other) => Ok(other.into()),
    }
}
