use std::sync::OnceLock;

use regex::Regex;
use spin_sdk::http::{Method, Request, Response};
use tracing::info;
use uuid::Uuid;

use crate::auth::{issue_token, session_cookie};
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{hash_password, html, now, validate_uuid};
use crate::core::query_params::{get_non_empty, parse_form};
use crate::core::store::{KvStore, KvStoreExt};
use crate::models::models::User;
use crate::templates::{self, FormErrors};
use crate::Blog;

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("Regex should compile"))
}

/// Field-level problems with a username, if any.
pub fn validate_username(username: &str) -> Option<String> {
    let len = username.chars().count();
    if username.is_empty() {
        Some("Username is required".to_string())
    } else if len < MIN_USERNAME_LENGTH || len > MAX_USERNAME_LENGTH {
        Some(format!(
            "Username must be {}-{} characters",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        ))
    } else if !username_regex().is_match(username) {
        Some("Username may contain only letters, digits and @/./+/-/_".to_string())
    } else {
        None
    }
}

pub fn create_user(store: &dyn KvStore, username: &str, password: &str) -> Result<User, ApiError> {
    if let Some(msg) = validate_username(username) {
        return Err(ApiError::BadRequest(msg));
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if store.exists(&username_key(username))? {
        return Err(ApiError::Conflict("Username exists".to_string()));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        password: hash_password(password)?,
        joined_at: now(),
    };

    store.set_json(&user_key(&user.id), &user)?;
    store.set_json(&username_key(username), &user.id)?;

    store.update_json(USERS_LIST_KEY, |users: &mut Vec<String>| users.push(user.id.clone()))?;

    info!(user_id = %user.id, username, "user created");
    Ok(user)
}

pub fn get_user(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Option<User>> {
    if !validate_uuid(user_id) {
        return Ok(None);
    }
    store.get_json(&user_key(user_id))
}

pub fn get_user_by_username(store: &dyn KvStore, username: &str) -> anyhow::Result<Option<User>> {
    match store.get_json::<String>(&username_key(username))? {
        Some(id) => get_user(store, &id),
        None => Ok(None),
    }
}

/// Like `get_user_by_username`, but a missing user is a 404.
pub fn require_user_by_username(store: &dyn KvStore, username: &str) -> Result<User, ApiError> {
    get_user_by_username(store, username)?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", username)))
}

/// Username for display; authors always exist, but stay readable if one is gone.
pub fn username_of(store: &dyn KvStore, user_id: &str) -> anyhow::Result<String> {
    Ok(get_user(store, user_id)?
        .map(|u| u.username)
        .unwrap_or_else(|| "[deleted]".to_string()))
}

// === HTTP Handlers ===

pub fn signup(blog: &Blog, req: &Request) -> Result<Response, ApiError> {
    if !matches!(req.method(), Method::Post) {
        return Ok(html(200, templates::signup_page("", &FormErrors::default())?));
    }

    let form = parse_form(req.body());
    let username = get_non_empty(&form, "username").unwrap_or_default();
    let password = form.get("password").map(String::as_str).unwrap_or_default();
    let confirm = form.get("password_confirm").map(String::as_str).unwrap_or(password);

    let mut errors = FormErrors::default();
    if password != confirm {
        errors.add("password_confirm", "Passwords do not match");
    }

    if errors.is_empty() {
        match create_user(blog.store(), username, password) {
            Ok(user) => {
                let token = issue_token(blog.store(), &user.id)?;
                return Ok(Response::builder()
                    .status(302)
                    .header("location", "/")
                    .header("set-cookie", session_cookie(&token))
                    .build());
            }
            Err(ApiError::BadRequest(msg)) => errors.add("username", &msg),
            Err(ApiError::Conflict(_)) => {
                errors.add("username", "A user with that username already exists")
            }
            Err(e) => return Err(e),
        }
    }

    Ok(html(200, templates::signup_page(username, &errors)?))
}
