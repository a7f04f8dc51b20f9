use chrono::Duration;
use spin_sdk::http::{Method, Request, Response};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{cookie, full_path, header_str, html, now, safe_next, verify_password};
use crate::core::query_params::{get_non_empty, parse_form, parse_query_params};
use crate::core::store::{KvStore, KvStoreExt};
use crate::models::models::{TokenData, User};
use crate::templates::{self, FormErrors};
use crate::users::{get_user, get_user_by_username};
use crate::Blog;

pub fn issue_token(store: &dyn KvStore, user_id: &str) -> anyhow::Result<String> {
    let token = Uuid::new_v4().to_string();
    let data = TokenData {
        user_id: user_id.to_string(),
        created_at: now(),
    };
    store.set_json(&token_key(&token), &data)?;

    store.update_json(TOKENS_LIST_KEY, |tokens: &mut Vec<String>| tokens.push(token.clone()))?;

    Ok(token)
}

pub fn revoke_token(store: &dyn KvStore, token: &str) -> anyhow::Result<()> {
    store.delete(&token_key(token))?;
    store.update_json(TOKENS_LIST_KEY, |tokens: &mut Vec<String>| tokens.retain(|t| t != token))
}

pub fn session_cookie(token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token)
}

fn expired_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE)
}

/// The session token from the cookie, or from an `Authorization: Bearer` header.
fn request_token(req: &Request) -> Option<&str> {
    if let Some(token) = header_str(req, "authorization").and_then(|h| h.strip_prefix("Bearer ")) {
        return Some(token);
    }
    cookie(req, SESSION_COOKIE).filter(|t| !t.is_empty())
}

pub fn validate_token(blog: &Blog, req: &Request) -> anyhow::Result<Option<String>> {
    let token = match request_token(req) {
        Some(t) => t,
        None => return Ok(None),
    };
    let data = match blog.store().get_json::<TokenData>(&token_key(token))? {
        Some(d) => d,
        None => return Ok(None),
    };

    let lifetime = Duration::try_hours(blog.settings().token_expiration_hours)
        .unwrap_or_else(|| Duration::hours(DEFAULT_TOKEN_EXPIRATION_HOURS));
    if now() - data.created_at > lifetime {
        return Ok(None);
    }

    Ok(Some(data.user_id))
}

/// The signed-in user, if any.
pub fn current_user(blog: &Blog, req: &Request) -> anyhow::Result<Option<User>> {
    match validate_token(blog, req)? {
        Some(user_id) => get_user(blog.store(), &user_id),
        None => Ok(None),
    }
}

/// The signed-in user, or a redirect to the login page that comes back here.
pub fn require_user(blog: &Blog, req: &Request) -> Result<User, ApiError> {
    current_user(blog, req)?.ok_or_else(|| ApiError::LoginRequired {
        next: full_path(req),
    })
}

// === HTTP Handlers ===

pub fn login(blog: &Blog, req: &Request) -> Result<Response, ApiError> {
    let params = parse_query_params(&req.uri());
    let next = safe_next(params.get("next").map(String::as_str));

    if !matches!(req.method(), Method::Post) {
        return Ok(html(200, templates::login_page("", &next, &FormErrors::default())?));
    }

    let form = parse_form(req.body());
    let username = get_non_empty(&form, "username").unwrap_or_default();
    let password = form.get("password").map(String::as_str).unwrap_or_default();
    let next = safe_next(form.get("next").map(String::as_str).or(Some(next.as_str())));

    if let Some(user) = get_user_by_username(blog.store(), username)? {
        if verify_password(password, &user.password) {
            let token = issue_token(blog.store(), &user.id)?;
            info!(user_id = %user.id, "user logged in");
            return Ok(Response::builder()
                .status(302)
                .header("location", next)
                .header("set-cookie", session_cookie(&token))
                .build());
        }
    }

    warn!(username, "rejected login");
    let mut errors = FormErrors::default();
    errors.add(
        "__all__",
        "Please enter a correct username and password. Note that both fields may be case-sensitive.",
    );
    Ok(html(200, templates::login_page(username, &next, &errors)?))
}

pub fn logout(blog: &Blog, req: &Request) -> Result<Response, ApiError> {
    if let Some(token) = request_token(req) {
        revoke_token(blog.store(), token)?;
    }

    Ok(Response::builder()
        .status(200)
        .header("content-type", "text/html; charset=utf-8")
        .header("set-cookie", expired_session_cookie())
        .body(templates::logged_out_page()?)
        .build())
}
