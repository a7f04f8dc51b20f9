use mime_guess::from_path;
use rust_embed::RustEmbed;
use spin_sdk::http::Response;

use crate::core::errors::ApiError;
use crate::core::helpers::html;
use crate::templates::message_page;

#[derive(RustEmbed)]
#[folder = "static"]
struct Assets;

pub fn serve_static(file_path: &str) -> Result<Response, ApiError> {
    let file = Assets::get(file_path)
        .ok_or_else(|| ApiError::NotFound(format!("Static file {} not found", file_path)))?;

    let mime = from_path(file_path).first_or_octet_stream();

    Ok(Response::builder()
        .status(200)
        .header("content-type", mime.as_ref())
        .body(file.data.to_vec())
        .build())
}

pub fn about_author() -> Result<Response, ApiError> {
    let page = message_page(
        "About the author",
        "Hi, I am the author",
        "This is where I tell you a bit about myself and why I started writing here.",
    )?;
    Ok(html(200, page))
}

pub fn about_tech() -> Result<Response, ApiError> {
    let page = message_page(
        "Technologies",
        "A very simple page",
        "Postboard runs as a Spin component or a native actix-web server on top of a key-value store.",
    )?;
    Ok(html(200, page))
}
