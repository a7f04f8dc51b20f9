use std::collections::HashMap;

use spin_sdk::http::{Method, Request, Response};
use tracing::{info, warn};

use crate::auth::{current_user, require_user};
use crate::comments::{comments_for_post, delete_comments_for_post};
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{html, now, redirect};
use crate::core::query_params::{get_non_empty, parse_form};
use crate::core::store::{next_id, KvStore, KvStoreExt};
use crate::groups::list_groups;
use crate::models::models::{Group, Post};
use crate::templates::{self, FormErrors, PostFormView};
use crate::Blog;

/// Validated content of the post form.
#[derive(Debug, Clone, PartialEq)]
pub struct PostForm {
    pub text: String,
    pub group_id: Option<u64>,
    /// `None` keeps the current image, `Some(None)` clears it.
    pub image: Option<Option<String>>,
}

impl PostForm {
    /// Validates raw form fields. `groups` are the choices the form offered.
    pub fn parse(groups: &[Group], form: &HashMap<String, String>) -> Result<PostForm, FormErrors> {
        let mut errors = FormErrors::default();

        let text = form.get("text").map(|t| t.trim()).unwrap_or_default();
        if text.is_empty() {
            errors.add("text", "This field is required.");
        } else if text.chars().count() > MAX_POST_LENGTH {
            errors.add(
                "text",
                &format!("Ensure this value has at most {} characters.", MAX_POST_LENGTH),
            );
        }

        let mut group_id = None;
        if let Some(raw) = get_non_empty(form, "group") {
            match raw.parse::<u64>() {
                Ok(id) if groups.iter().any(|g| g.id == id) => group_id = Some(id),
                _ => errors.add(
                    "group",
                    "Select a valid choice. That choice is not one of the available choices.",
                ),
            }
        }

        let mut image = None;
        if let Some(name) = get_non_empty(form, "image") {
            match image_reference(name) {
                Some(reference) => image = Some(Some(reference)),
                None => errors.add(
                    "image",
                    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
                ),
            }
        } else if form.contains_key("image-clear") {
            image = Some(None);
        }

        if errors.is_empty() {
            Ok(PostForm {
                text: text.to_string(),
                group_id,
                image,
            })
        } else {
            Err(errors)
        }
    }
}

/// Stored reference for an uploaded image file name, if it names an image.
pub fn image_reference(file_name: &str) -> Option<String> {
    let base = file_name
        .rsplit(&['/', '\\'][..])
        .next()
        .filter(|b| !b.is_empty() && *b != "." && *b != "..")?;
    let mime = mime_guess::from_path(base).first()?;
    if mime.type_() != mime_guess::mime::IMAGE {
        return None;
    }
    Some(format!("{}/{}", IMAGE_UPLOAD_DIR, base))
}

pub fn insert_post(store: &dyn KvStore, user_id: &str, form: PostForm) -> anyhow::Result<Post> {
    let post = Post {
        id: next_id(store, "post")?,
        user_id: user_id.to_string(),
        text: form.text,
        created_at: now(),
        updated_at: None,
        group_id: form.group_id,
        image: form.image.flatten(),
    };

    store.set_json(&post_key(post.id), &post)?;
    prepend_id(store, FEED_KEY, post.id)?;
    prepend_id(store, &user_posts_key(user_id), post.id)?;
    if let Some(group_id) = post.group_id {
        prepend_id(store, &group_posts_key(group_id), post.id)?;
    }

    info!(post_id = post.id, user_id, "post created");
    Ok(post)
}

pub fn get_post(store: &dyn KvStore, id: u64) -> anyhow::Result<Option<Post>> {
    store.get_json(&post_key(id))
}

pub fn require_post(store: &dyn KvStore, id: u64) -> Result<Post, ApiError> {
    get_post(store, id)?.ok_or_else(|| ApiError::NotFound("Post not found".to_string()))
}

pub fn update_post(store: &dyn KvStore, mut post: Post, form: PostForm) -> anyhow::Result<Post> {
    if post.group_id != form.group_id {
        if let Some(old) = post.group_id {
            remove_id(store, &group_posts_key(old), post.id)?;
        }
        if let Some(new) = form.group_id {
            prepend_id(store, &group_posts_key(new), post.id)?;
        }
    }

    post.text = form.text;
    post.group_id = form.group_id;
    if let Some(image) = form.image {
        post.image = image;
    }
    post.updated_at = Some(now());

    store.set_json(&post_key(post.id), &post)?;
    info!(post_id = post.id, "post updated");
    Ok(post)
}

/// Removes a post and, with it, every comment on it.
pub fn delete_post(store: &dyn KvStore, id: u64) -> Result<(), ApiError> {
    let post = require_post(store, id)?;

    let removed = delete_comments_for_post(store, id)?;
    remove_id(store, FEED_KEY, id)?;
    remove_id(store, &user_posts_key(&post.user_id), id)?;
    if let Some(group_id) = post.group_id {
        remove_id(store, &group_posts_key(group_id), id)?;
    }
    store.delete(&post_key(id))?;

    info!(post_id = id, comments = removed, "post deleted");
    Ok(())
}

fn prepend_id(store: &dyn KvStore, key: &str, id: u64) -> anyhow::Result<()> {
    store.update_json(key, |ids: &mut Vec<u64>| ids.insert(0, id))
}

fn remove_id(store: &dyn KvStore, key: &str, id: u64) -> anyhow::Result<()> {
    store.update_json(key, |ids: &mut Vec<u64>| ids.retain(|existing| *existing != id))
}

// === HTTP Handlers ===

pub fn post_detail(blog: &Blog, req: &Request, post_id: u64) -> Result<Response, ApiError> {
    let post = require_post(blog.store(), post_id)?;
    let viewer = current_user(blog, req)?;
    let comments = comments_for_post(blog.store(), post_id)?;
    let page = templates::post_detail_page(blog.store(), &post, &comments, viewer.as_ref())?;
    Ok(html(200, page))
}

pub fn post_create(blog: &Blog, req: &Request) -> Result<Response, ApiError> {
    let user = require_user(blog, req)?;
    let groups = list_groups(blog.store())?;

    if !matches!(req.method(), Method::Post) {
        let view = PostFormView::empty();
        return Ok(html(200, templates::post_form_page(&view, &groups, None)?));
    }

    let raw = parse_form(req.body());
    match PostForm::parse(&groups, &raw) {
        Ok(form) => {
            insert_post(blog.store(), &user.id, form)?;
            Ok(redirect(&format!("/profile/{}/", user.username)))
        }
        Err(errors) => {
            let view = PostFormView::from_input(&raw, errors);
            Ok(html(200, templates::post_form_page(&view, &groups, None)?))
        }
    }
}

pub fn post_edit(blog: &Blog, req: &Request, post_id: u64) -> Result<Response, ApiError> {
    let user = require_user(blog, req)?;
    let post = require_post(blog.store(), post_id)?;
    let detail_url = format!("/posts/{}/", post.id);

    if post.user_id != user.id {
        warn!(post_id, user_id = %user.id, "edit by non-author ignored");
        return Err(ApiError::Redirect(detail_url));
    }

    let groups = list_groups(blog.store())?;
    if !matches!(req.method(), Method::Post) {
        let view = PostFormView::from_post(&post);
        return Ok(html(200, templates::post_form_page(&view, &groups, Some(&post))?));
    }

    let raw = parse_form(req.body());
    match PostForm::parse(&groups, &raw) {
        Ok(form) => {
            update_post(blog.store(), post, form)?;
            Ok(redirect(&detail_url))
        }
        Err(errors) => {
            let view = PostFormView::from_input(&raw, errors);
            Ok(html(200, templates::post_form_page(&view, &groups, Some(&post))?))
        }
    }
}
