//! Paginated, newest-first post listings: home, group, author and the
//! personal feed of followed authors.
//!
//! Only the home listing goes through the page cache, and it is rendered
//! without any viewer-specific markup so one copy can serve everybody.

use spin_sdk::http::{Request, Response};

use crate::auth::{current_user, require_user};
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{full_path, html};
use crate::core::paginator::{paginate, Page};
use crate::core::query_params::parse_query_params;
use crate::core::store::{KvStore, KvStoreExt};
use crate::follow::{get_followers, get_followings, is_following};
use crate::groups::get_group_by_slug;
use crate::models::models::Post;
use crate::templates::{self, ProfileView};
use crate::users::require_user_by_username;
use crate::Blog;

#[derive(Debug, Clone, PartialEq)]
pub enum PostFilter {
    All,
    Group(u64),
    Author(String),
    FollowedBy(String),
}

/// Every post matching `filter`, newest first.
pub fn collect_posts(store: &dyn KvStore, filter: &PostFilter) -> anyhow::Result<Vec<Post>> {
    let ids: Vec<u64> = match filter {
        PostFilter::All => store.get_json(FEED_KEY)?.unwrap_or_default(),
        PostFilter::Group(id) => store.get_json(&group_posts_key(*id))?.unwrap_or_default(),
        PostFilter::Author(user_id) => store.get_json(&user_posts_key(user_id))?.unwrap_or_default(),
        PostFilter::FollowedBy(user_id) => {
            let mut ids = Vec::new();
            for author in get_followings(store, user_id)? {
                let authored: Vec<u64> = store.get_json(&user_posts_key(&author))?.unwrap_or_default();
                ids.extend(authored);
            }
            ids
        }
    };

    let mut posts = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(post) = store.get_json::<Post>(&post_key(id))? {
            if matches_filter(&post, filter) {
                posts.push(post);
            }
        }
    }

    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    posts.dedup_by_key(|p| p.id);
    Ok(posts)
}

fn matches_filter(post: &Post, filter: &PostFilter) -> bool {
    match filter {
        PostFilter::All | PostFilter::FollowedBy(_) => true,
        PostFilter::Group(id) => post.group_id == Some(*id),
        PostFilter::Author(user_id) => &post.user_id == user_id,
    }
}

/// The requested page of posts matching `filter`.
pub fn listing(store: &dyn KvStore, filter: &PostFilter, page: Option<&str>) -> anyhow::Result<Page<Post>> {
    let posts = collect_posts(store, filter)?;
    Ok(paginate(posts, POSTS_PER_PAGE, page))
}

fn page_param(req: &Request) -> Option<String> {
    parse_query_params(&req.uri()).get("page").cloned()
}

// === HTTP Handlers ===

pub fn index(blog: &Blog, req: &Request) -> Result<Response, ApiError> {
    let cache = blog.index_cache();
    let key = full_path(req);

    if let Some(body) = cache.get(&key)? {
        return Ok(html(200, body));
    }

    let page = listing(blog.store(), &PostFilter::All, page_param(req).as_deref())?;
    let body = templates::index_page(blog.store(), &page)?;
    cache.put(&key, &body)?;
    Ok(html(200, body))
}

pub fn group_posts(blog: &Blog, req: &Request, slug: &str) -> Result<Response, ApiError> {
    let group = get_group_by_slug(blog.store(), slug)?
        .ok_or_else(|| ApiError::NotFound(format!("Group {} not found", slug)))?;

    let page = listing(blog.store(), &PostFilter::Group(group.id), page_param(req).as_deref())?;
    Ok(html(200, templates::group_page(blog.store(), &group, &page)?))
}

pub fn profile(blog: &Blog, req: &Request, username: &str) -> Result<Response, ApiError> {
    let author = require_user_by_username(blog.store(), username)?;
    let viewer = current_user(blog, req)?;

    let page = listing(
        blog.store(),
        &PostFilter::Author(author.id.clone()),
        page_param(req).as_deref(),
    )?;

    let following = match &viewer {
        Some(v) if v.id != author.id => Some(is_following(blog.store(), &v.id, &author.id)?),
        _ => None,
    };
    let view = ProfileView {
        author: &author,
        following,
        followers_count: get_followers(blog.store(), &author.id)?.len(),
        followings_count: get_followings(blog.store(), &author.id)?.len(),
    };

    Ok(html(200, templates::profile_page(blog.store(), &view, &page)?))
}

pub fn follow_index(blog: &Blog, req: &Request) -> Result<Response, ApiError> {
    let user = require_user(blog, req)?;
    let page = listing(
        blog.store(),
        &PostFilter::FollowedBy(user.id.clone()),
        page_param(req).as_deref(),
    )?;
    Ok(html(200, templates::follow_page(blog.store(), &page)?))
}
