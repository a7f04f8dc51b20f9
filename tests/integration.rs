use postboard::comments::comments_for_post;
use postboard::config::{cache_key, Settings};
use postboard::core::store::{KvStore, MemoryStore};
use postboard::feed::{collect_posts, PostFilter};
use postboard::follow::get_followings;
use postboard::groups::{create_group, delete_group, get_group_by_slug};
use postboard::posts::{get_post, insert_post, PostForm};
use postboard::users::get_user_by_username;
use postboard::{handlers, Blog};
use spin_sdk::http::{Method, Request, Response};
use std::thread;

struct TestSite {
    store: MemoryStore,
    blog: Blog,
}

impl TestSite {
    fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    fn with_settings(settings: Settings) -> Self {
        let store = MemoryStore::new();
        let blog = Blog::new(store.clone(), settings);
        Self { store, blog }
    }

    fn send(&self, method: Method, path: &str, body: &str, session: Option<&str>) -> Response {
        handlers::route(&self.blog, request(method, path, body, session))
            .expect("request should not fail internally")
    }

    fn get(&self, path: &str, session: Option<&str>) -> Response {
        self.send(Method::Get, path, "", session)
    }

    fn post(&self, path: &str, body: &str, session: Option<&str>) -> Response {
        self.send(Method::Post, path, body, session)
    }

    /// Signs a new user up and returns their session token.
    fn signup(&self, username: &str) -> String {
        let body = format!(
            "username={}&password=pass123&password_confirm=pass123",
            username
        );
        let resp = self.post("/auth/signup/", &body, None);
        assert_eq!(*resp.status(), 302, "signup of {} failed", username);
        session_from(&resp)
    }

    fn user_id(&self, username: &str) -> String {
        get_user_by_username(&self.store, username)
            .unwrap()
            .expect("user exists")
            .id
    }

    fn write_post(&self, username: &str, text: &str, group_id: Option<u64>) -> u64 {
        let form = PostForm {
            text: text.to_string(),
            group_id,
            image: None,
        };
        insert_post(&self.store, &self.user_id(username), form).unwrap().id
    }

    fn post_count(&self) -> usize {
        collect_posts(&self.store, &PostFilter::All).unwrap().len()
    }
}

fn request(method: Method, path: &str, body: &str, session: Option<&str>) -> Request {
    let mut builder = Request::builder();
    builder.method(method).uri(path);
    builder.header("content-type", "application/x-www-form-urlencoded");
    if let Some(token) = session {
        builder.header("cookie", format!("sessionid={}", token));
    }
    builder.body(body.as_bytes().to_vec()).build()
}

/// Runs each GET on its own thread, every thread with its own `Blog` over
/// the shared store, and waits for all of them.
fn get_concurrently(store: &MemoryStore, requests: Vec<(String, Option<String>)>) {
    let handles: Vec<_> = requests
        .into_iter()
        .map(|(path, session)| {
            let store = store.clone();
            thread::spawn(move || {
                let blog = Blog::new(store, Settings::default());
                let req = request(Method::Get, &path, "", session.as_deref());
                handlers::route(&blog, req).expect("request should not fail internally");
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("request thread panicked");
    }
}

fn header(resp: &Response, name: &str) -> Option<String> {
    resp.header(name).and_then(|v| v.as_str()).map(str::to_string)
}

fn location(resp: &Response) -> String {
    header(resp, "location").expect("response should redirect")
}

fn session_from(resp: &Response) -> String {
    let cookie = header(resp, "set-cookie").expect("session cookie");
    cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("sessionid="))
        .expect("sessionid cookie")
        .to_string()
}

fn body(resp: &Response) -> String {
    String::from_utf8(resp.body().to_vec()).unwrap()
}

fn card_count(resp: &Response) -> usize {
    body(resp).matches(r#"class="post-card""#).count()
}

#[test]
fn test_create_post_redirects_to_profile() {
    let site = TestSite::new();
    let token = site.signup("auth");
    let before = site.post_count();

    let resp = site.post("/create/", "text=New+post&image=small.gif", Some(&token));

    assert_eq!(*resp.status(), 302);
    assert_eq!(location(&resp), "/profile/auth/");
    assert_eq!(site.post_count(), before + 1);

    let post = &collect_posts(&site.store, &PostFilter::All).unwrap()[0];
    assert_eq!(post.text, "New post");
    assert_eq!(post.user_id, site.user_id("auth"));
    assert_eq!(post.image.as_deref(), Some("posts/small.gif"));
}

#[test]
fn test_invalid_post_form_is_redisplayed() {
    let site = TestSite::new();
    let token = site.signup("auth");

    let resp = site.post("/create/", "text=&group=999", Some(&token));

    assert_eq!(*resp.status(), 200);
    let page = body(&resp);
    assert!(page.contains("This field is required."));
    assert!(page.contains("Select a valid choice."));
    assert_eq!(site.post_count(), 0);
}

#[test]
fn test_author_can_edit_post() {
    let site = TestSite::new();
    let token = site.signup("auth");
    let id = site.write_post("auth", "Original", None);

    let form = site.get(&format!("/posts/{}/edit/", id), Some(&token));
    assert_eq!(*form.status(), 200);
    assert!(body(&form).contains("Original"));

    let resp = site.post(&format!("/posts/{}/edit/", id), "text=Changed", Some(&token));
    assert_eq!(*resp.status(), 302);
    assert_eq!(location(&resp), format!("/posts/{}/", id));

    let post = get_post(&site.store, id).unwrap().unwrap();
    assert_eq!(post.text, "Changed");
    assert!(post.updated_at.is_some());
    assert_eq!(site.post_count(), 1);
}

#[test]
fn test_non_author_edit_is_silently_refused() {
    let site = TestSite::new();
    site.signup("auth");
    let intruder = site.signup("intruder");
    let id = site.write_post("auth", "Original", None);

    let resp = site.post(&format!("/posts/{}/edit/", id), "text=Hacked", Some(&intruder));

    assert_eq!(*resp.status(), 302);
    assert_eq!(location(&resp), format!("/posts/{}/", id));
    assert_eq!(get_post(&site.store, id).unwrap().unwrap().text, "Original");
}

#[test]
fn test_anonymous_users_are_sent_to_login() {
    let site = TestSite::new();
    site.signup("auth");
    let id = site.write_post("auth", "Post", None);

    let create = site.get("/create/", None);
    assert_eq!(location(&create), "/auth/login/?next=/create/");

    let edit = site.get(&format!("/posts/{}/edit/", id), None);
    assert_eq!(location(&edit), format!("/auth/login/?next=/posts/{}/edit/", id));

    let feed = site.get("/follow/", None);
    assert_eq!(location(&feed), "/auth/login/?next=/follow/");
}

#[test]
fn test_anonymous_comment_is_rejected() {
    let site = TestSite::new();
    site.signup("auth");
    let id = site.write_post("auth", "Post", None);

    let resp = site.post(&format!("/posts/{}/comment/", id), "text=Hello", None);

    assert_eq!(*resp.status(), 302);
    assert_eq!(location(&resp), format!("/auth/login/?next=/posts/{}/comment/", id));
    assert!(comments_for_post(&site.store, id).unwrap().is_empty());
}

#[test]
fn test_comment_appears_on_detail_page() {
    let site = TestSite::new();
    let token = site.signup("auth");
    let id = site.write_post("auth", "Post", None);

    let resp = site.post(&format!("/posts/{}/comment/", id), "text=New+comment", Some(&token));
    assert_eq!(location(&resp), format!("/posts/{}/", id));

    let comments = comments_for_post(&site.store, id).unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].text, "New comment");
    assert_eq!(comments[0].user_id, site.user_id("auth"));

    let detail = site.get(&format!("/posts/{}/", id), None);
    assert_eq!(*detail.status(), 200);
    assert!(body(&detail).contains("New comment"));
}

#[test]
fn test_listings_paginate_by_ten() {
    let site = TestSite::new();
    site.signup("auth");
    let group = create_group(&site.store, "Test group", "test-slug", "Description").unwrap();
    for i in 0..13 {
        site.write_post("auth", &format!("Post {}", i), Some(group.id));
    }

    for path in ["/", "/group/test-slug/", "/profile/auth/"] {
        let first = site.get(path, None);
        assert_eq!(*first.status(), 200, "{}", path);
        assert_eq!(card_count(&first), 10, "{}", path);

        let second = site.get(&format!("{}?page=2", path), None);
        assert_eq!(card_count(&second), 3, "{}", path);

        let beyond = site.get(&format!("{}?page=50", path), None);
        assert_eq!(card_count(&beyond), 3, "{}", path);
    }
}

#[test]
fn test_listings_are_newest_first() {
    let site = TestSite::new();
    site.signup("auth");
    let older = site.write_post("auth", "older", None);
    let newer = site.write_post("auth", "newer", None);

    let page = body(&site.get("/profile/auth/", None));
    let newer_at = page.find(&format!("/posts/{}/", newer)).unwrap();
    let older_at = page.find(&format!("/posts/{}/", older)).unwrap();
    assert!(newer_at < older_at);
}

#[test]
fn test_index_is_cached_until_cleared() {
    let site = TestSite::new();
    site.signup("auth");
    site.write_post("auth", "First", None);

    let before = body(&site.get("/", None));
    site.write_post("auth", "Second", None);

    let cached = body(&site.get("/", None));
    assert_eq!(before, cached);

    site.blog.index_cache().clear().unwrap();
    let fresh = body(&site.get("/", None));
    assert_ne!(before, fresh);
    assert!(fresh.contains("Second"));
}

#[test]
fn test_out_of_range_cache_setting_still_serves() {
    let settings = Settings {
        index_cache_seconds: i64::MAX,
        ..Settings::default()
    };
    let site = TestSite::with_settings(settings);
    site.signup("auth");
    site.write_post("auth", "Visible", None);

    let resp = site.get("/", None);
    assert_eq!(*resp.status(), 200);
    assert!(body(&resp).contains("Visible"));
}

#[test]
fn test_index_cache_expires() {
    let settings = Settings {
        index_cache_seconds: 0,
        ..Settings::default()
    };
    let site = TestSite::with_settings(settings);
    site.signup("auth");

    let before = body(&site.get("/", None));
    site.write_post("auth", "Fresh", None);
    let after = body(&site.get("/", None));
    assert_ne!(before, after);
}

#[test]
fn test_clear_drops_pages_cached_by_concurrent_requests() {
    let site = TestSite::new();
    site.signup("auth");
    for i in 0..25 {
        site.write_post("auth", &format!("Post {}", i), None);
    }

    for _ in 0..10 {
        let paths: Vec<String> = (1..=8).map(|page| format!("/?page={}", page)).collect();
        get_concurrently(&site.store, paths.iter().map(|p| (p.clone(), None)).collect());

        site.blog.index_cache().clear().unwrap();
        for path in &paths {
            assert!(!site.store.exists(&cache_key(path)).unwrap(), "{} survived clear", path);
        }
    }

    site.write_post("auth", "After the clear", None);
    assert!(body(&site.get("/?page=1", None)).contains("After the clear"));
}

#[test]
fn test_concurrent_follows_are_all_kept() {
    let site = TestSite::new();
    let reader = site.signup("reader");
    let writers: Vec<String> = (0..6).map(|i| format!("writer{}", i)).collect();
    for writer in &writers {
        site.signup(writer);
    }

    get_concurrently(
        &site.store,
        writers
            .iter()
            .map(|w| (format!("/profile/{}/follow/", w), Some(reader.clone())))
            .collect(),
    );

    let followings = get_followings(&site.store, &site.user_id("reader")).unwrap();
    assert_eq!(followings.len(), writers.len());
}

#[test]
fn test_follow_feed_shows_followed_authors_only() {
    let site = TestSite::new();
    let reader = site.signup("reader");
    site.signup("writer");
    let stranger = site.signup("stranger");

    let resp = site.get("/profile/writer/follow/", Some(&reader));
    assert_eq!(location(&resp), "/profile/writer/");

    let before = card_count(&site.get("/follow/", Some(&reader)));
    site.write_post("writer", "Fresh thoughts", None);

    let reader_feed = site.get("/follow/", Some(&reader));
    assert_eq!(card_count(&reader_feed), before + 1);
    assert!(body(&reader_feed).contains("Fresh thoughts"));

    let stranger_feed = site.get("/follow/", Some(&stranger));
    assert!(!body(&stranger_feed).contains("Fresh thoughts"));

    site.get("/profile/writer/unfollow/", Some(&reader));
    assert_eq!(card_count(&site.get("/follow/", Some(&reader))), 0);
}

#[test]
fn test_follow_guards() {
    let site = TestSite::new();
    let token = site.signup("auth");

    let own = site.get("/profile/auth/follow/", Some(&token));
    assert_eq!(location(&own), "/profile/auth/");
    assert!(get_followings(&site.store, &site.user_id("auth"))
        .unwrap()
        .is_empty());

    let missing = site.get("/profile/nobody/follow/", Some(&token));
    assert_eq!(*missing.status(), 404);

    let profile = body(&site.get("/profile/auth/", Some(&token)));
    assert!(!profile.contains("/follow/\">Follow"));
}

#[test]
fn test_deleting_group_keeps_posts() {
    let site = TestSite::new();
    site.signup("auth");
    let group = create_group(&site.store, "Test group", "test-slug", "").unwrap();
    let id = site.write_post("auth", "Grouped", Some(group.id));

    delete_group(&site.store, group.id).unwrap();

    let post = get_post(&site.store, id).unwrap().expect("post survives");
    assert_eq!(post.group_id, None);
    assert!(get_group_by_slug(&site.store, "test-slug").unwrap().is_none());
    assert_eq!(*site.get("/group/test-slug/", None).status(), 404);
    assert_eq!(*site.get(&format!("/posts/{}/", id), None).status(), 200);
}

#[test]
fn test_unknown_pages_are_404() {
    let site = TestSite::new();
    assert_eq!(*site.get("/unexisting_page/", None).status(), 404);
    assert_eq!(*site.get("/posts/1/", None).status(), 404);
    assert_eq!(*site.get("/posts/abc/", None).status(), 404);
    assert_eq!(*site.get("/profile/ghost/", None).status(), 404);
    assert_eq!(*site.get("/about/author/", None).status(), 200);
    assert_eq!(*site.get("/about/tech/", None).status(), 200);
    assert_eq!(*site.post("/", "", None).status(), 405);
}

#[test]
fn test_login_flow() {
    let site = TestSite::new();
    site.signup("auth");

    let bad = site.post("/auth/login/", "username=auth&password=wrong&next=/create/", None);
    assert_eq!(*bad.status(), 200);
    assert!(body(&bad).contains("Please enter a correct username and password."));

    let good = site.post("/auth/login/", "username=auth&password=pass123&next=/create/", None);
    assert_eq!(*good.status(), 302);
    assert_eq!(location(&good), "/create/");
    let token = session_from(&good);
    assert_eq!(*site.get("/create/", Some(&token)).status(), 200);

    let offsite = site.post(
        "/auth/login/",
        "username=auth&password=pass123&next=https://evil.example/",
        None,
    );
    assert_eq!(location(&offsite), "/");

    site.get("/auth/logout/", Some(&token));
    assert_eq!(*site.get("/create/", Some(&token)).status(), 302);
}

#[test]
fn test_duplicate_signup_is_redisplayed() {
    let site = TestSite::new();
    site.signup("auth");

    let resp = site.post(
        "/auth/signup/",
        "username=auth&password=pass123&password_confirm=pass123",
        None,
    );
    assert_eq!(*resp.status(), 200);
    assert!(body(&resp).contains("already exists"));
}

#[test]
fn test_expired_sessions_are_anonymous() {
    let settings = Settings {
        token_expiration_hours: -1,
        ..Settings::default()
    };
    let site = TestSite::with_settings(settings);
    let token = site.signup("auth");

    let resp = site.get("/create/", Some(&token));
    assert_eq!(location(&resp), "/auth/login/?next=/create/");
}
