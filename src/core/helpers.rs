use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::config::LOGIN_URL;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::PasswordHash;

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

pub fn html(status: u16, body: String) -> Response {
    Response::builder()
        .status(status)
        .header("content-type", "text/html; charset=utf-8")
        .body(body)
        .build()
}

pub fn redirect(location: &str) -> Response {
    Response::builder()
        .status(302)
        .header("location", location)
        .build()
}

/// Redirect to the login page, carrying `next` with its slashes left readable.
pub fn login_redirect(next: &str) -> Response {
    redirect(&login_url(next))
}

pub fn login_url(next: &str) -> String {
    let encoded = urlencoding::encode(next).replace("%2F", "/");
    format!("{}?next={}", LOGIN_URL, encoded)
}

/// Path plus query string, the way the client asked for it.
pub fn full_path(req: &Request) -> String {
    let query = req.query();
    if query.is_empty() {
        req.path().to_string()
    } else {
        format!("{}?{}", req.path(), query)
    }
}

pub fn header_str<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.header(name).and_then(|h| h.as_str())
}

pub fn cookie<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    header_str(req, "cookie")?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Only same-site absolute paths are accepted as redirect targets.
pub fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n.to_string(),
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spin_sdk::http::Method;

    #[test]
    fn passwords_verify_against_their_hash() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("other", &hash));
        assert!(!verify_password("s3cret", "not-a-hash"));
    }

    #[test]
    fn login_url_keeps_slashes() {
        assert_eq!(
            login_url("/posts/1/comment/"),
            "/auth/login/?next=/posts/1/comment/"
        );
        assert_eq!(login_url("/?page=2"), "/auth/login/?next=/%3Fpage%3D2");
    }

    #[test]
    fn next_must_stay_on_site() {
        assert_eq!(safe_next(Some("/create/")), "/create/");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn cookies_are_found_by_name() {
        let req = Request::builder()
            .method(Method::Get)
            .uri("/")
            .header("cookie", "theme=dark; sessionid=abc")
            .build();
        assert_eq!(cookie(&req, "sessionid"), Some("abc"));
        assert_eq!(cookie(&req, "missing"), None);
    }
}
