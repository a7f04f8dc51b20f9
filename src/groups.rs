use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::store::{next_id, KvStore, KvStoreExt};
use crate::models::models::{Group, Post};

fn slug_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("Regex should compile"))
}

pub fn create_group(
    store: &dyn KvStore,
    title: &str,
    slug: &str,
    description: &str,
) -> Result<Group, ApiError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_GROUP_TITLE_LENGTH {
        return Err(ApiError::BadRequest("Invalid group title".to_string()));
    }
    if !slug_regex().is_match(slug) {
        return Err(ApiError::BadRequest("Invalid slug".to_string()));
    }
    if store.exists(&group_slug_key(slug))? {
        return Err(ApiError::Conflict("Slug exists".to_string()));
    }

    let group = Group {
        id: next_id(store, "group")?,
        title: title.to_string(),
        slug: slug.to_string(),
        description: description.to_string(),
    };

    store.set_json(&group_key(group.id), &group)?;
    store.set_json(&group_slug_key(slug), &group.id)?;

    store.update_json(GROUPS_LIST_KEY, |groups: &mut Vec<u64>| groups.push(group.id))?;

    info!(group_id = group.id, slug, "group created");
    Ok(group)
}

pub fn get_group(store: &dyn KvStore, id: u64) -> anyhow::Result<Option<Group>> {
    store.get_json(&group_key(id))
}

pub fn get_group_by_slug(store: &dyn KvStore, slug: &str) -> anyhow::Result<Option<Group>> {
    match store.get_json::<u64>(&group_slug_key(slug))? {
        Some(id) => get_group(store, id),
        None => Ok(None),
    }
}

pub fn list_groups(store: &dyn KvStore) -> anyhow::Result<Vec<Group>> {
    let ids: Vec<u64> = store.get_json(GROUPS_LIST_KEY)?.unwrap_or_default();
    let mut groups = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(group) = get_group(store, id)? {
            groups.push(group);
        }
    }
    Ok(groups)
}

/// Removes a group. Its posts stay, with their group cleared.
pub fn delete_group(store: &dyn KvStore, id: u64) -> Result<(), ApiError> {
    let group = get_group(store, id)?
        .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))?;

    let post_ids: Vec<u64> = store.get_json(&group_posts_key(id))?.unwrap_or_default();
    for post_id in &post_ids {
        if let Some(mut post) = store.get_json::<Post>(&post_key(*post_id))? {
            if post.group_id == Some(id) {
                post.group_id = None;
                store.set_json(&post_key(post.id), &post)?;
            }
        }
    }

    store.delete(&group_posts_key(id))?;
    store.delete(&group_slug_key(&group.slug))?;
    store.delete(&group_key(id))?;

    store.update_json(GROUPS_LIST_KEY, |groups: &mut Vec<u64>| groups.retain(|g| *g != id))?;

    info!(group_id = id, detached_posts = post_ids.len(), "group deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;

    #[test]
    fn slugs_are_validated_and_unique() {
        let store = MemoryStore::new();
        let group = create_group(&store, "Rust", "rust", "Systems talk").unwrap();
        assert_eq!(get_group_by_slug(&store, "rust").unwrap(), Some(group));
        assert!(matches!(
            create_group(&store, "Rust again", "rust", ""),
            Err(ApiError::Conflict(_))
        ));
        assert!(matches!(
            create_group(&store, "Spaces", "has space", ""),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(create_group(&store, "  ", "blank", ""), Err(ApiError::BadRequest(_))));
        assert_eq!(list_groups(&store).unwrap().len(), 1);
    }

    #[test]
    fn deleting_a_group_frees_its_slug() {
        let store = MemoryStore::new();
        let group = create_group(&store, "Cats", "cats", "").unwrap();
        delete_group(&store, group.id).unwrap();
        assert!(get_group_by_slug(&store, "cats").unwrap().is_none());
        assert!(list_groups(&store).unwrap().is_empty());
        assert!(matches!(delete_group(&store, group.id), Err(ApiError::NotFound(_))));
        create_group(&store, "Cats", "cats", "").unwrap();
    }
}
