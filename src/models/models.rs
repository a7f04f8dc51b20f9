use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Group {
    pub id: u64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

/// A post always has an author; its group is cleared when the group goes away.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: u64,
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub group_id: Option<u64>,
    pub image: Option<String>,
}

/// Removed together with its post.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Comment {
    pub id: u64,
    pub post_id: u64,
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Ids of the users someone follows.
pub type Followings = Vec<String>;
/// Ids of the users following someone.
pub type Followers = Vec<String>;
