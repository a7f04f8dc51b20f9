pub const POSTS_PER_PAGE: usize = 10;
pub const MAX_POST_LENGTH: usize = 5000;
pub const MAX_COMMENT_LENGTH: usize = 2000;
pub const MAX_GROUP_TITLE_LENGTH: usize = 200;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;

pub const SESSION_COOKIE: &str = "sessionid";
pub const LOGIN_URL: &str = "/auth/login/";
pub const IMAGE_UPLOAD_DIR: &str = "posts";

pub const DEFAULT_INDEX_CACHE_SECONDS: i64 = 20;
pub const MAX_INDEX_CACHE_SECONDS: i64 = 365 * 24 * 60 * 60;
pub const DEFAULT_TOKEN_EXPIRATION_HOURS: i64 = 24;
pub const MAX_TOKEN_EXPIRATION_HOURS: i64 = 10 * 365 * 24;

pub const USERS_LIST_KEY: &str = "users_list";
pub const GROUPS_LIST_KEY: &str = "groups_list";
pub const FEED_KEY: &str = "feed";
pub const TOKENS_LIST_KEY: &str = "tokens_list";
pub const CACHE_KEYS_KEY: &str = "cache_keys";

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

pub fn group_key(id: u64) -> String {
    format!("group:{}", id)
}

pub fn group_slug_key(slug: &str) -> String {
    format!("group_slug:{}", slug)
}

pub fn post_key(id: u64) -> String {
    format!("post:{}", id)
}

pub fn user_posts_key(user_id: &str) -> String {
    format!("user_posts:{}", user_id)
}

pub fn group_posts_key(group_id: u64) -> String {
    format!("group_posts:{}", group_id)
}

pub fn comment_key(id: u64) -> String {
    format!("comment:{}", id)
}

pub fn post_comments_key(post_id: u64) -> String {
    format!("comments:{}", post_id)
}

pub fn followings_key(user_id: &str) -> String {
    format!("followings:{}", user_id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn cache_key(key: &str) -> String {
    format!("cache:{}", key)
}

pub fn sequence_key(kind: &str) -> String {
    format!("seq:{}", kind)
}

/// Runtime settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub index_cache_seconds: i64,
    pub token_expiration_hours: i64,
    pub seed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            index_cache_seconds: DEFAULT_INDEX_CACHE_SECONDS,
            token_expiration_hours: DEFAULT_TOKEN_EXPIRATION_HOURS,
            seed: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: std::env::var("POSTBOARD_BIND").unwrap_or(defaults.bind),
            index_cache_seconds: env_i64("POSTBOARD_INDEX_CACHE_SECONDS")
                .map(|v| v.clamp(0, MAX_INDEX_CACHE_SECONDS))
                .unwrap_or(defaults.index_cache_seconds),
            token_expiration_hours: env_i64("POSTBOARD_TOKEN_EXPIRATION_HOURS")
                .map(|v| v.clamp(0, MAX_TOKEN_EXPIRATION_HOURS))
                .unwrap_or(defaults.token_expiration_hours),
            seed: std::env::var("POSTBOARD_SEED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.seed),
        }
    }
}

fn env_i64(name: &str) -> Option<i64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
}
