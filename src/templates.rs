use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use ammonia::Builder;
use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;
use rust_embed::RustEmbed;
use spin_sdk::http::Response;

use crate::core::helpers::html;
use crate::core::paginator::Page;
use crate::core::store::KvStore;
use crate::groups::get_group;
use crate::models::models::{Comment, Group, Post, User};
use crate::users::username_of;

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

/// Field name -> messages, in a stable order for rendering.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FormErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FormErrors {
    pub fn add(&mut self, field: &str, message: &str) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn render(&self, field: &str) -> String {
        match self.get(field) {
            Some(messages) => {
                let items: String = messages
                    .iter()
                    .map(|m| format!("<li>{}</li>", encode_text(m)))
                    .collect();
                format!(r#"<ul class="errors">{}</ul>"#, items)
            }
            None => String::new(),
        }
    }
}

/// What the post form shows: submitted or stored values plus errors.
#[derive(Debug, Default, Clone)]
pub struct PostFormView {
    pub text: String,
    pub group: String,
    pub image: String,
    pub errors: FormErrors,
}

impl PostFormView {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_input(raw: &HashMap<String, String>, errors: FormErrors) -> Self {
        let value = |key: &str| raw.get(key).cloned().unwrap_or_default();
        Self {
            text: value("text"),
            group: value("group"),
            image: value("image"),
            errors,
        }
    }

    pub fn from_post(post: &Post) -> Self {
        Self {
            text: post.text.clone(),
            group: post.group_id.map(|g| g.to_string()).unwrap_or_default(),
            image: String::new(),
            errors: FormErrors::default(),
        }
    }
}

pub struct ProfileView<'a> {
    pub author: &'a User,
    /// `None` when the viewer is anonymous or looking at their own profile.
    pub following: Option<bool>,
    pub followers_count: usize,
    pub followings_count: usize,
}

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\{\{([A-Z_]+)\}\}").expect("Regex should compile"))
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"https?://[^\s"<>]+"#).expect("Regex should compile"))
}

fn load(name: &str) -> anyhow::Result<String> {
    let file = Templates::get(name).ok_or_else(|| anyhow::anyhow!("Template {} not found", name))?;
    Ok(String::from_utf8(file.data.to_vec())?)
}

/// Substitutes `{{NAME}}` placeholders in one pass; inserted values are never rescanned.
fn fill(template: &str, vars: &[(&str, String)]) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures| {
            vars.iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        })
        .into_owned()
}

fn render(name: &str, vars: &[(&str, String)]) -> anyhow::Result<String> {
    Ok(fill(&load(name)?, vars))
}

fn layout(title: &str, content: String) -> anyhow::Result<String> {
    render(
        "base.html",
        &[("PAGE_TITLE", encode_text(title).into_owned()), ("PAGE_CONTENT", content)],
    )
}

fn format_date(date: &chrono::DateTime<chrono::Utc>) -> String {
    date.format("%-d %B %Y %H:%M").to_string()
}

/// Escaped post text with line breaks kept and bare URLs turned into links.
pub fn render_post_text(text: &str) -> String {
    let escaped = encode_text(text);
    let linked = url_regex().replace_all(&escaped, |caps: &regex::Captures| {
        let url = &caps[0];
        format!(r#"<a href="{}" target="_blank">{}</a>"#, url, url)
    });
    let with_breaks = linked.replace("\r\n", "\n").replace('\n', "<br>");

    Builder::default()
        .tags(HashSet::from(["a", "br"]))
        .link_rel(Some("noopener noreferrer"))
        .clean(&with_breaks)
        .to_string()
}

fn post_card(store: &dyn KvStore, post: &Post) -> anyhow::Result<String> {
    let username = username_of(store, &post.user_id)?;
    let group = match post.group_id {
        Some(id) => get_group(store, id)?
            .map(|g| {
                format!(
                    r#" &middot; <a href="/group/{}/">{}</a>"#,
                    encode_double_quoted_attribute(&g.slug),
                    encode_text(&g.title)
                )
            })
            .unwrap_or_default(),
        None => String::new(),
    };

    Ok(format!(
        r#"<article class="post-card">
  <div class="meta">Author: <a href="/profile/{user_attr}/">{user}</a> &middot; {date}{group}</div>
  {image}
  <p>{text}</p>
  <a href="/posts/{id}/">details</a>
</article>"#,
        user_attr = encode_double_quoted_attribute(&username),
        user = encode_text(&username),
        date = format_date(&post.created_at),
        group = group,
        image = image_tag(post),
        text = render_post_text(&post.text),
        id = post.id,
    ))
}

/// Image references are file names with no stored bytes, so they are shown
/// as text rather than as an `<img>` nothing serves.
fn image_tag(post: &Post) -> String {
    match &post.image {
        Some(image) => format!(r#"<div class="image-ref">Image: {}</div>"#, encode_text(image)),
        None => String::new(),
    }
}

fn post_cards(store: &dyn KvStore, page: &Page<Post>) -> anyhow::Result<String> {
    if page.is_empty() {
        return Ok(r#"<p class="empty">No posts yet.</p>"#.to_string());
    }
    let cards = page
        .items
        .iter()
        .map(|post| post_card(store, post))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(cards.join("\n"))
}

fn pagination(page: &Page<Post>) -> String {
    if page.num_pages <= 1 {
        return String::new();
    }
    let mut links = Vec::new();
    if let Some(prev) = page.previous_page_number() {
        links.push(r#"<a href="?page=1">&laquo; first</a>"#.to_string());
        links.push(format!(r#"<a href="?page={}">previous</a>"#, prev));
    }
    links.push(format!("<span>Page {} of {}</span>", page.number, page.num_pages));
    if let Some(next) = page.next_page_number() {
        links.push(format!(r#"<a href="?page={}">next</a>"#, next));
        links.push(format!(r#"<a href="?page={}">last &raquo;</a>"#, page.num_pages));
    }
    format!(r#"<nav class="pagination">{}</nav>"#, links.join(" "))
}

fn listing_page(
    store: &dyn KvStore,
    title: &str,
    heading: &str,
    intro: String,
    page: &Page<Post>,
) -> anyhow::Result<String> {
    let content = render(
        "listing.html",
        &[
            ("HEADING", encode_text(heading).into_owned()),
            ("INTRO", intro),
            ("POST_CARDS", post_cards(store, page)?),
            ("PAGINATION", pagination(page)),
        ],
    )?;
    layout(title, content)
}

pub fn index_page(store: &dyn KvStore, page: &Page<Post>) -> anyhow::Result<String> {
    listing_page(store, "Latest posts", "Latest posts", String::new(), page)
}

pub fn group_page(store: &dyn KvStore, group: &Group, page: &Page<Post>) -> anyhow::Result<String> {
    let intro = format!("<p>{}</p>", encode_text(&group.description));
    listing_page(store, &group.title, &group.title, intro, page)
}

pub fn follow_page(store: &dyn KvStore, page: &Page<Post>) -> anyhow::Result<String> {
    listing_page(store, "Following", "Posts from authors you follow", String::new(), page)
}

pub fn profile_page(store: &dyn KvStore, view: &ProfileView, page: &Page<Post>) -> anyhow::Result<String> {
    let username = &view.author.username;
    let follow_button = match view.following {
        Some(true) => format!(
            r#"<a class="button" href="/profile/{}/unfollow/">Unfollow</a>"#,
            encode_double_quoted_attribute(username)
        ),
        Some(false) => format!(
            r#"<a class="button" href="/profile/{}/follow/">Follow</a>"#,
            encode_double_quoted_attribute(username)
        ),
        None => String::new(),
    };

    let content = render(
        "profile.html",
        &[
            ("PROFILE_USERNAME", encode_text(username).into_owned()),
            ("POST_COUNT", page.total.to_string()),
            ("FOLLOWERS_COUNT", view.followers_count.to_string()),
            ("FOLLOWINGS_COUNT", view.followings_count.to_string()),
            ("FOLLOW_BUTTON", follow_button),
            ("POST_CARDS", post_cards(store, page)?),
            ("PAGINATION", pagination(page)),
        ],
    )?;
    layout(&format!("Profile of {}", username), content)
}

pub fn post_detail_page(
    store: &dyn KvStore,
    post: &Post,
    comments: &[Comment],
    viewer: Option<&User>,
) -> anyhow::Result<String> {
    let author = username_of(store, &post.user_id)?;
    let author_posts = crate::feed::collect_posts(
        store,
        &crate::feed::PostFilter::Author(post.user_id.clone()),
    )?
    .len();

    let group = match post.group_id {
        Some(id) => get_group(store, id)?
            .map(|g| {
                format!(
                    r#"<div>Group: <a href="/group/{}/">{}</a></div>"#,
                    encode_double_quoted_attribute(&g.slug),
                    encode_text(&g.title)
                )
            })
            .unwrap_or_default(),
        None => String::new(),
    };

    let edit_link = match viewer {
        Some(v) if v.id == post.user_id => {
            format!(r#"<a href="/posts/{}/edit/">Edit post</a>"#, post.id)
        }
        _ => String::new(),
    };

    let comment_form = match viewer {
        Some(_) => format!(
            r#"<form method="post" action="/posts/{}/comment/">
      <label for="id_comment">Add a comment</label>
      <textarea id="id_comment" name="text" required></textarea>
      <button type="submit">Send</button>
    </form>"#,
            post.id
        ),
        None => String::new(),
    };

    let mut rendered_comments = String::new();
    for comment in comments {
        let name = username_of(store, &comment.user_id)?;
        rendered_comments.push_str(&format!(
            r#"<div class="comment"><a href="/profile/{}/">{}</a> <span class="meta">{}</span><p>{}</p></div>"#,
            encode_double_quoted_attribute(&name),
            encode_text(&name),
            format_date(&comment.created_at),
            render_post_text(&comment.text),
        ));
    }

    let title: String = post.text.chars().take(30).collect();
    let content = render(
        "post_detail.html",
        &[
            ("POST_DATE", format_date(&post.created_at)),
            ("POST_GROUP", group),
            ("AUTHOR_USERNAME", encode_text(&author).into_owned()),
            ("AUTHOR_POST_COUNT", author_posts.to_string()),
            ("EDIT_LINK", edit_link),
            ("POST_IMAGE", image_tag(post)),
            ("POST_TEXT", render_post_text(&post.text)),
            ("COMMENT_FORM", comment_form),
            ("COMMENTS", rendered_comments),
        ],
    )?;
    layout(&format!("Post {}", title), content)
}

pub fn post_form_page(view: &PostFormView, groups: &[Group], editing: Option<&Post>) -> anyhow::Result<String> {
    let options: String = groups
        .iter()
        .map(|g| {
            let id = g.id.to_string();
            let selected = if id == view.group { " selected" } else { "" };
            format!(
                r#"<option value="{}"{}>{}</option>"#,
                id,
                selected,
                encode_text(&g.title)
            )
        })
        .collect();

    let (heading, action, submit, image_clear) = match editing {
        Some(post) => (
            "Edit post",
            format!("/posts/{}/edit/", post.id),
            "Save",
            match &post.image {
                Some(current) => format!(
                    r#"<p>Currently: {} <label><input type="checkbox" name="image-clear"> Clear</label></p>"#,
                    encode_text(current)
                ),
                None => String::new(),
            },
        ),
        None => ("New post", "/create/".to_string(), "Add", String::new()),
    };

    let content = render(
        "post_form.html",
        &[
            ("FORM_HEADING", heading.to_string()),
            ("FORM_ACTION", action),
            ("TEXT_VALUE", encode_text(&view.text).into_owned()),
            ("TEXT_ERRORS", view.errors.render("text")),
            ("GROUP_OPTIONS", options),
            ("GROUP_ERRORS", view.errors.render("group")),
            ("IMAGE_VALUE", encode_double_quoted_attribute(&view.image).into_owned()),
            ("IMAGE_CLEAR", image_clear),
            ("IMAGE_ERRORS", view.errors.render("image")),
            ("SUBMIT_LABEL", submit.to_string()),
        ],
    )?;
    layout(heading, content)
}

pub fn login_page(username: &str, next: &str, errors: &FormErrors) -> anyhow::Result<String> {
    let content = render(
        "login.html",
        &[
            ("FORM_ERRORS", errors.render("__all__")),
            ("NEXT", encode_double_quoted_attribute(next).into_owned()),
            ("USERNAME", encode_double_quoted_attribute(username).into_owned()),
        ],
    )?;
    layout("Log in", content)
}

pub fn signup_page(username: &str, errors: &FormErrors) -> anyhow::Result<String> {
    let mut password_errors = errors.render("password");
    password_errors.push_str(&errors.render("password_confirm"));
    let content = render(
        "signup.html",
        &[
            ("USERNAME", encode_double_quoted_attribute(username).into_owned()),
            ("USERNAME_ERRORS", errors.render("username")),
            ("PASSWORD_ERRORS", password_errors),
        ],
    )?;
    layout("Sign up", content)
}

pub fn message_page(title: &str, heading: &str, text: &str) -> anyhow::Result<String> {
    let content = render(
        "message.html",
        &[
            ("HEADING", encode_text(heading).into_owned()),
            ("TEXT", encode_text(text).into_owned()),
        ],
    )?;
    layout(title, content)
}

pub fn logged_out_page() -> anyhow::Result<String> {
    message_page("Logged out", "You have logged out", "Come back soon.")
}

pub fn not_found_page(detail: &str) -> Response {
    match message_page("Page not found", "Page not found", detail) {
        Ok(body) => html(404, body),
        Err(_) => Response::builder()
            .status(404)
            .header("content-type", "text/plain; charset=utf-8")
            .body(detail.to_string())
            .build(),
    }
}
