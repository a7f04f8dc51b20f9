use spin_sdk::http::{Method, Request, Response};
use tracing::info;

use crate::auth::require_user;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{now, redirect};
use crate::core::query_params::{get_non_empty, parse_form};
use crate::core::store::{next_id, KvStore, KvStoreExt};
use crate::models::models::Comment;
use crate::posts::require_post;
use crate::Blog;

pub fn create_comment(
    store: &dyn KvStore,
    post_id: u64,
    user_id: &str,
    text: &str,
) -> Result<Comment, ApiError> {
    require_post(store, post_id)?;

    let text = text.trim();
    if text.is_empty() || text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(ApiError::BadRequest("Invalid comment".to_string()));
    }

    let comment = Comment {
        id: next_id(store, "comment")?,
        post_id,
        user_id: user_id.to_string(),
        text: text.to_string(),
        created_at: now(),
    };
    store.set_json(&comment_key(comment.id), &comment)?;

    store.update_json(&post_comments_key(post_id), |ids: &mut Vec<u64>| ids.push(comment.id))?;

    info!(comment_id = comment.id, post_id, user_id, "comment created");
    Ok(comment)
}

/// Comments on a post, oldest first.
pub fn comments_for_post(store: &dyn KvStore, post_id: u64) -> anyhow::Result<Vec<Comment>> {
    let ids: Vec<u64> = store.get_json(&post_comments_key(post_id))?.unwrap_or_default();
    let mut comments = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(comment) = store.get_json::<Comment>(&comment_key(id))? {
            comments.push(comment);
        }
    }
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(comments)
}

/// Returns how many comments were removed.
pub fn delete_comments_for_post(store: &dyn KvStore, post_id: u64) -> anyhow::Result<usize> {
    let ids: Vec<u64> = store.get_json(&post_comments_key(post_id))?.unwrap_or_default();
    for id in &ids {
        store.delete(&comment_key(*id))?;
    }
    store.delete(&post_comments_key(post_id))?;
    Ok(ids.len())
}

// === HTTP Handlers ===

pub fn add_comment(blog: &Blog, req: &Request, post_id: u64) -> Result<Response, ApiError> {
    let user = require_user(blog, req)?;
    let post = require_post(blog.store(), post_id)?;
    let detail_url = format!("/posts/{}/", post.id);

    if matches!(req.method(), Method::Post) {
        let form = parse_form(req.body());
        if let Some(text) = get_non_empty(&form, "text") {
            match create_comment(blog.store(), post.id, &user.id, text) {
                Ok(_) | Err(ApiError::BadRequest(_)) => {}
                Err(e) => return Err(e),
            }
        }
    }

    Ok(redirect(&detail_url))
}
