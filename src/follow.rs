use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::require_user;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::redirect;
use crate::core::store::{KvStore, KvStoreExt};
use crate::models::models::{Followers, Followings};
use crate::users::require_user_by_username;
use crate::Blog;

/// Adds the edge `follower -> following`. Returns whether a new edge was made;
/// self-follows and repeats are no-ops.
pub fn follow_user(store: &dyn KvStore, follower_id: &str, following_id: &str) -> anyhow::Result<bool> {
    if follower_id == following_id {
        return Ok(false);
    }

    store.update_json(&followings_key(follower_id), |followings: &mut Followings| {
        if followings.iter().any(|id| id == following_id) {
            return false;
        }
        followings.push(following_id.to_string());
        true
    })
}

/// Returns whether an edge was removed.
pub fn unfollow_user(store: &dyn KvStore, follower_id: &str, following_id: &str) -> anyhow::Result<bool> {
    store.update_json(&followings_key(follower_id), |followings: &mut Followings| {
        let before = followings.len();
        followings.retain(|id| id != following_id);
        followings.len() != before
    })
}

pub fn get_followings(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Followings> {
    Ok(store.get_json(&followings_key(user_id))?.unwrap_or_default())
}

pub fn get_followers(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Followers> {
    let users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut followers = Vec::new();

    for id in users {
        if get_followings(store, &id)?.iter().any(|f| f == user_id) {
            followers.push(id);
        }
    }

    Ok(followers)
}

pub fn is_following(store: &dyn KvStore, follower_id: &str, following_id: &str) -> anyhow::Result<bool> {
    Ok(get_followings(store, follower_id)?
        .iter()
        .any(|id| id == following_id))
}

// === HTTP Handlers ===

pub fn profile_follow(blog: &Blog, req: &Request, username: &str) -> Result<Response, ApiError> {
    let user = require_user(blog, req)?;
    let author = require_user_by_username(blog.store(), username)?;

    if follow_user(blog.store(), &user.id, &author.id)? {
        info!(follower = %user.id, following = %author.id, "follow created");
    }

    Ok(redirect(&format!("/profile/{}/", author.username)))
}

pub fn profile_unfollow(blog: &Blog, req: &Request, username: &str) -> Result<Response, ApiError> {
    let user = require_user(blog, req)?;
    let author = require_user_by_username(blog.store(), username)?;

    if unfollow_user(blog.store(), &user.id, &author.id)? {
        info!(follower = %user.id, following = %author.id, "follow removed");
    }

    Ok(redirect(&format!("/profile/{}/", author.username)))
}
