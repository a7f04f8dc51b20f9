use tracing::info;

use crate::config::*;
use crate::core::cache::PageCache;
use crate::core::errors::ApiError;
use crate::core::store::{KvStore, KvStoreExt};
use crate::follow::follow_user;
use crate::groups::{create_group, get_group_by_slug, list_groups};
use crate::models::models::User;
use crate::posts::{insert_post, PostForm};
use crate::users::{create_user, get_user_by_username};

const DEMO_GROUP_SLUG: &str = "general";

fn seed_user(store: &dyn KvStore, username: &str) -> anyhow::Result<(User, bool)> {
    if let Some(existing) = get_user_by_username(store, username)? {
        return Ok((existing, false));
    }
    match create_user(store, username, username) {
        Ok(user) => Ok((user, true)),
        Err(e) => Err(anyhow::anyhow!("seeding {} failed: {}", username, e)),
    }
}

fn seed_post(store: &dyn KvStore, user: &User, text: &str, group_id: Option<u64>) -> anyhow::Result<()> {
    let form = PostForm {
        text: text.to_string(),
        group_id,
        image: None,
    };
    insert_post(store, &user.id, form)?;
    Ok(())
}

/// Demo accounts (password = username), a group, a few posts and `test -> bob`.
/// Safe to call repeatedly.
pub fn init_test_data(store: &dyn KvStore) -> anyhow::Result<()> {
    let group_id = match get_group_by_slug(store, DEMO_GROUP_SLUG)? {
        Some(group) => group.id,
        None => create_group(store, "General", DEMO_GROUP_SLUG, "Anything goes")
            .map_err(|e: ApiError| anyhow::anyhow!("seeding group failed: {}", e))?
            .id,
    };

    let (test, created) = seed_user(store, "test")?;
    if created {
        seed_post(store, &test, "This is my first post on Postboard!", None)?;
    }

    let (alice, created) = seed_user(store, "alice")?;
    if created {
        seed_post(store, &alice, "Welcome to my blog! Excited to share thoughts here.", Some(group_id))?;
        seed_post(store, &alice, "Just finished an amazing project. Feeling productive today!", None)?;
    }

    let (bob, created) = seed_user(store, "bob")?;
    if created {
        seed_post(
            store,
            &bob,
            "Hey everyone! Just joined, looking forward to reading you all.",
            Some(group_id),
        )?;
    }

    follow_user(store, &test.id, &bob.id)?;
    info!("demo data ready");
    Ok(())
}

/// Removes every user, group, post, comment, follow edge, token and cached page.
pub fn reset_db_data(store: &dyn KvStore) -> anyhow::Result<()> {
    let users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    for id in &users {
        if let Some(user) = store.get_json::<User>(&user_key(id))? {
            store.delete(&username_key(&user.username))?;
        }
        store.delete(&user_key(id))?;
        store.delete(&user_posts_key(id))?;
        store.delete(&followings_key(id))?;
    }

    let posts: Vec<u64> = store.get_json(FEED_KEY)?.unwrap_or_default();
    for id in posts {
        let comments: Vec<u64> = store.get_json(&post_comments_key(id))?.unwrap_or_default();
        for comment in comments {
            store.delete(&comment_key(comment))?;
        }
        store.delete(&post_comments_key(id))?;
        store.delete(&post_key(id))?;
    }

    for group in list_groups(store)? {
        store.delete(&group_posts_key(group.id))?;
        store.delete(&group_slug_key(&group.slug))?;
        store.delete(&group_key(group.id))?;
    }

    let tokens: Vec<String> = store.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();
    for token in tokens {
        store.delete(&token_key(&token))?;
    }

    PageCache::new(store, chrono::Duration::zero()).clear()?;

    for key in [USERS_LIST_KEY, GROUPS_LIST_KEY, FEED_KEY, TOKENS_LIST_KEY] {
        store.delete(key)?;
    }
    for kind in ["post", "group", "comment"] {
        store.delete(&sequence_key(kind))?;
    }

    info!("all data removed");
    Ok(())
}
